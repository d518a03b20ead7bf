//! Router scenarios: deadline fallback, stats accounting, single-instance
//! FIFO serialization, and the empty-fleet degradation path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_fleet::provider::GenerationParams;
use agent_fleet::{
    fallback_content, AgentRole, FleetConfig, FleetManager, ModelKey, ModelSelector, Priority,
    ProviderKind, RequestRouter, TaskKind,
};
use common::{GenerateBehavior, MockAdapter};

fn router_for(fleet: Arc<FleetManager>) -> Arc<RequestRouter> {
    let selector = Arc::new(ModelSelector::new(fleet.clone(), &FleetConfig::local_default()));
    Arc::new(RequestRouter::new(fleet, selector))
}

#[tokio::test]
async fn test_timeout_falls_back_and_counts_error() {
    let adapter = Arc::new(MockAdapter::new("local", ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    adapter.set_loaded("coder-7b", true);
    adapter.set_behavior(GenerateBehavior::TimeoutAlways);

    let handle = common::mock_handle(adapter, true, true, 2);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let key = ModelKey::new("local", "coder-7b");
    let errors_before = fleet.entry(&key).await.unwrap().errors;

    let router = router_for(fleet.clone());
    let prompt = "implement the user api";
    let result = router
        .generate(
            AgentRole::Backend,
            prompt,
            TaskKind::CreateComponent,
            Priority::Balanced,
            GenerationParams::default(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.model_used, "local/coder-7b");
    assert_eq!(result.content, fallback_content(prompt));
    assert_eq!(fleet.entry(&key).await.unwrap().errors, errors_before + 1);
}

#[tokio::test]
async fn test_empty_fleet_answers_with_fallback() {
    let adapter = Arc::new(MockAdapter::new("local", ProviderKind::OllamaNative));
    let handle = common::mock_handle(adapter, true, true, 2);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let router = router_for(fleet);
    let result = router
        .generate(
            AgentRole::Qa,
            "review the test plan",
            TaskKind::Generic,
            Priority::Quality,
            GenerationParams::default(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.model_used, "fallback");
    assert_eq!(result.content, fallback_content("review the test plan"));
}

#[tokio::test]
async fn test_single_instance_requests_never_overlap() {
    let adapter = Arc::new(
        MockAdapter::new("studio", ProviderKind::OpenaiChat)
            .with_generation_delay(Duration::from_millis(40)),
    );
    adapter.set_listed(&[("assistant-7b", None)]);
    adapter.set_loaded("assistant-7b", true);
    adapter.set_behavior(GenerateBehavior::Succeed("ok".to_string()));

    // max_concurrent_models == 1 routes through the FIFO serializer.
    let handle = common::mock_handle(adapter.clone(), false, false, 1);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let router = router_for(fleet);
    let mut joins = Vec::new();
    for _ in 0..4 {
        let router = router.clone();
        joins.push(tokio::spawn(async move {
            router
                .generate(
                    AgentRole::Architect,
                    "plan the system",
                    TaskKind::Generic,
                    Priority::Balanced,
                    GenerationParams::default(),
                )
                .await
        }));
    }
    for join in joins {
        let result = join.await.unwrap();
        assert!(result.success);
    }

    let spans = adapter.generation_spans();
    assert_eq!(spans.len(), 4);
    for window in spans.windows(2) {
        // Strict FIFO: each generation starts only after the previous ended.
        assert!(window[1].1 >= window[0].2, "generations overlapped");
    }
}

#[tokio::test]
async fn test_success_updates_rolling_stats() {
    let adapter = Arc::new(MockAdapter::new("local", ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    adapter.set_loaded("coder-7b", true);
    adapter.set_behavior(GenerateBehavior::Succeed("done".to_string()));

    let handle = common::mock_handle(adapter, true, true, 2);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let key = ModelKey::new("local", "coder-7b");
    let calls_before = fleet.entry(&key).await.unwrap().calls;

    let router = router_for(fleet.clone());
    let result = router
        .generate(
            AgentRole::Backend,
            "write a module",
            TaskKind::OptimizeCode,
            Priority::Speed,
            GenerationParams::default(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.content, "done");
    let entry = fleet.entry(&key).await.unwrap();
    assert_eq!(entry.calls, calls_before + 1);
    assert!(entry.last_used.is_some());
}
