//! End-to-end agent cycle against a mock provider: analyze, decide,
//! generate, apply through the file coordinator, and learn.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_fleet::agent::InMemoryWorkSource;
use agent_fleet::{
    AgentRole, AgentRuntime, FileCoordinator, FleetConfig, FleetManager, IntelligenceStore,
    ModelSelector, ProviderKind, RequestRouter, Task, TaskKind,
};
use common::{GenerateBehavior, MockAdapter};

#[tokio::test]
async fn test_agent_applies_generated_artifact_and_learns() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().to_path_buf();

    let adapter = Arc::new(MockAdapter::new("local", ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    adapter.set_loaded("coder-7b", true);
    adapter.set_behavior(GenerateBehavior::Succeed(
        "# Monitoring component\n\nGenerated content.".to_string(),
    ));

    let handle = common::mock_handle(adapter, true, true, 2);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let coordinator = Arc::new(
        FileCoordinator::new(&workspace)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10)),
    );
    let store = Arc::new(
        IntelligenceStore::open(&workspace, coordinator.clone())
            .await
            .unwrap(),
    );
    let selector = Arc::new(ModelSelector::new(fleet.clone(), &FleetConfig::local_default()));
    let router = Arc::new(RequestRouter::new(fleet.clone(), selector));

    let work = Arc::new(InMemoryWorkSource::new(vec![Task::new(
        TaskKind::CreateComponent,
        "Monitoring component",
        "Write the monitoring component documentation.",
    )
    .with_priority(8)
    .with_complexity(3)
    .with_target("components/monitoring.md")]));

    let mut runtime = AgentRuntime::new(
        "backend-1",
        AgentRole::Backend,
        &workspace,
        router,
        coordinator.clone(),
        store.clone(),
        work,
    );

    // Long enough for exactly one iteration; the rest period outlives it.
    runtime
        .run(Instant::now() + Duration::from_millis(500))
        .await
        .unwrap();

    // The artifact was applied through the coordinator.
    let artifact = coordinator
        .safe_read("components/monitoring.md", "inspector")
        .await
        .expect("artifact missing");
    assert_eq!(
        String::from_utf8(artifact).unwrap(),
        "# Monitoring component\n\nGenerated content."
    );
    assert_eq!(coordinator.version("components/monitoring.md").await, 1);

    // Learning landed in the persistent store.
    let summary = store.summary("backend-1").await;
    assert!(summary.intelligence_level > 1.0);
    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.sessions_count, 1);
    assert!((summary.performance_score - 1.0).abs() < 1e-9);

    // The profile document survived to disk.
    let raw = std::fs::read_to_string(workspace.join("data/memory/agent_intelligence.json"))
        .unwrap();
    assert!(raw.contains("backend-1"));

    // The outcome was shared as an experience other agents can read.
    let insights = store
        .collaborative_insights("architect-1", Duration::from_secs(3600), 10)
        .await;
    assert!(insights
        .iter()
        .any(|i| i.kind == "task_completion" && i.source_agent == "backend-1"));
}

#[tokio::test]
async fn test_fallback_generation_does_not_apply_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().to_path_buf();

    let adapter = Arc::new(MockAdapter::new("local", ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    adapter.set_loaded("coder-7b", true);
    adapter.set_behavior(GenerateBehavior::TimeoutAlways);

    let handle = common::mock_handle(adapter, true, true, 2);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let coordinator = Arc::new(
        FileCoordinator::new(&workspace)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10)),
    );
    let store = Arc::new(
        IntelligenceStore::open(&workspace, coordinator.clone())
            .await
            .unwrap(),
    );
    let selector = Arc::new(ModelSelector::new(fleet.clone(), &FleetConfig::local_default()));
    let router = Arc::new(RequestRouter::new(fleet.clone(), selector));

    let work = Arc::new(InMemoryWorkSource::new(vec![Task::new(
        TaskKind::CreateComponent,
        "Doomed component",
        "This generation always times out.",
    )
    .with_complexity(3)
    .with_target("components/doomed.md")]));

    let mut runtime = AgentRuntime::new(
        "backend-1",
        AgentRole::Backend,
        &workspace,
        router,
        coordinator.clone(),
        store.clone(),
        work,
    );
    runtime
        .run(Instant::now() + Duration::from_millis(500))
        .await
        .unwrap();

    // No partial writes: the target file never appeared.
    assert!(!workspace.join("components/doomed.md").exists());

    // The failure was still recorded, without intelligence growth.
    let summary = store.summary("backend-1").await;
    assert_eq!(summary.tasks_completed, 1);
    assert!((summary.intelligence_level - 1.0).abs() < 1e-12);
}
