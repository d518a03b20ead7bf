//! Fleet manager scenarios: VRAM budget enforcement, LRU eviction,
//! discovery of hot-added models, and provider outage handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_fleet::{
    AgentRole, FleetConfig, FleetError, FleetManager, ModelKey, ModelSelector, Priority, TaskKind,
};
use common::MockAdapter;

fn fleet_with(adapter: Arc<MockAdapter>, budget_mb: u64) -> Arc<FleetManager> {
    let handle = common::mock_handle(adapter, true, true, 2);
    Arc::new(FleetManager::with_providers(vec![handle], budget_mb))
}

#[tokio::test]
async fn test_single_slot_vram_swap() {
    // Budget 7000, models A (7b -> 4500) and B (8b -> 5000): loading B must
    // evict A, and usage never exceeds the budget at any step.
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None), ("assistant-8b", None)]);
    let fleet = fleet_with(adapter.clone(), 7000);

    fleet.discover().await.unwrap();
    assert_eq!(fleet.current_vram_mb().await, 0);

    let a = ModelKey::new("local", "coder-7b");
    let b = ModelKey::new("local", "assistant-8b");

    fleet.ensure_loaded(&a).await.unwrap();
    assert_eq!(fleet.current_vram_mb().await, 4500);
    assert!(fleet.current_vram_mb().await <= 7000);

    fleet.ensure_loaded(&b).await.unwrap();
    let usage = fleet.current_vram_mb().await;
    assert_eq!(usage, 5000);
    assert!(usage <= 7000);

    // A was evicted as least recently used.
    assert!(!fleet.entry(&a).await.unwrap().is_loaded);
    assert!(fleet.entry(&b).await.unwrap().is_loaded);
    assert!(!adapter.loaded_ids().contains("coder-7b"));
}

#[tokio::test]
async fn test_ensure_loaded_is_idempotent() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    let fleet = fleet_with(adapter, 7000);
    fleet.discover().await.unwrap();

    let key = ModelKey::new("local", "coder-7b");
    fleet.ensure_loaded(&key).await.unwrap();
    fleet.ensure_loaded(&key).await.unwrap();
    assert_eq!(fleet.current_vram_mb().await, 4500);
}

#[tokio::test]
async fn test_oversized_model_is_never_loaded() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("mega-70b", None)]);
    let fleet = fleet_with(adapter.clone(), 7000);
    fleet.discover().await.unwrap();

    let key = ModelKey::new("local", "mega-70b");
    let result = fleet.ensure_loaded(&key).await;
    assert!(matches!(result, Err(FleetError::OverBudget { .. })));
    assert_eq!(fleet.current_vram_mb().await, 0);
    assert!(!fleet.entry(&key).await.unwrap().is_loaded);
    assert!(adapter.loaded_ids().is_empty());
}

#[tokio::test]
async fn test_manual_load_provider_surfaces_hint() {
    let adapter = Arc::new(MockAdapter::new("studio", agent_fleet::ProviderKind::OpenaiChat));
    adapter.set_listed(&[("coder-7b", None)]);
    let handle = common::mock_handle(adapter, false, false, 1);
    let fleet = Arc::new(FleetManager::with_providers(vec![handle], 7000));
    fleet.discover().await.unwrap();

    let result = fleet.ensure_loaded(&ModelKey::new("studio", "coder-7b")).await;
    assert!(matches!(result, Err(FleetError::ManualLoadRequired { .. })));
    assert_eq!(fleet.current_vram_mb().await, 0);
}

#[tokio::test]
async fn test_hot_added_model_is_discovered_and_selectable() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    let fleet = fleet_with(adapter.clone(), 7000);

    fleet.discover().await.unwrap();
    assert_eq!(fleet.snapshot().await.len(), 1);

    // Operator loads a new model on the provider.
    adapter.set_listed(&[("coder-7b", None), ("qwen-chat-3b", None)]);
    adapter.set_loaded("qwen-chat-3b", true);

    fleet.discover().await.unwrap();
    let snapshot = fleet.snapshot().await;
    assert_eq!(snapshot.len(), 2);

    let hot_added = fleet
        .entry(&ModelKey::new("local", "qwen-chat-3b"))
        .await
        .unwrap();
    assert!(hot_added.is_loaded);
    assert!(hot_added.is_responsive);

    // A subsequent selection may return the new model; here it is the only
    // serviceable one, so it must.
    let selector = ModelSelector::new(fleet.clone(), &FleetConfig::local_default());
    let picked = selector
        .select(AgentRole::Orchestrator, TaskKind::Generic, Priority::Balanced)
        .await;
    assert_eq!(picked, Some(ModelKey::new("local", "qwen-chat-3b")));
}

#[tokio::test]
async fn test_offline_provider_keeps_models_listed_until_stale() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    adapter.set_loaded("coder-7b", true);
    let fleet = fleet_with(adapter.clone(), 7000);

    fleet.discover().await.unwrap();
    let key = ModelKey::new("local", "coder-7b");
    assert!(fleet.entry(&key).await.unwrap().is_loaded);
    assert!(fleet.provider_online("local").await);

    // Provider goes dark: models demote but stay listed inside the window.
    adapter.set_fail_listing(true);
    fleet.discover().await.unwrap();
    let entry = fleet.entry(&key).await.unwrap();
    assert!(!entry.is_loaded);
    assert!(!entry.is_responsive);
    assert!(!fleet.provider_online("local").await);
    assert_eq!(fleet.current_vram_mb().await, 0);
}

#[tokio::test]
async fn test_absent_models_are_evicted_after_stale_window() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    adapter.set_listed(&[("coder-7b", None)]);
    let handle = common::mock_handle(adapter.clone(), true, true, 2);
    let fleet = Arc::new(
        FleetManager::with_providers(vec![handle], 7000)
            .with_stale_window(Duration::from_millis(50)),
    );

    fleet.discover().await.unwrap();
    assert_eq!(fleet.snapshot().await.len(), 1);

    // Model disappears from the listing and the window elapses.
    adapter.set_listed(&[]);
    tokio::time::sleep(Duration::from_millis(80)).await;
    fleet.discover().await.unwrap();
    assert!(fleet.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_reported_size_feeds_estimate() {
    let adapter = Arc::new(MockAdapter::new("local", agent_fleet::ProviderKind::OllamaNative));
    // 6 GiB reported for a model whose name suggests only 2500 MB.
    adapter.set_listed(&[("tiny-3b", Some(6 * 1024 * 1024 * 1024))]);
    let fleet = fleet_with(adapter, 7000);
    fleet.discover().await.unwrap();

    let entry = fleet.entry(&ModelKey::new("local", "tiny-3b")).await.unwrap();
    assert_eq!(entry.estimated_vram_mb, 6144);
}
