//! Cold-start seeding and snapshot restore.

mod common;

use std::sync::Arc;

use common::{base_config, harness, heat_member};
use thermoflock::infrastructure::mock::{InMemoryRegistry, LoopbackExecutor};
use thermoflock::infrastructure::store::JsonStateStore;
use thermoflock::services::GroupService;
use thermoflock::{
    Actor, CommandExecutor, HvacMode, MemberRegistry, StateStore, TargetState,
};

#[tokio::test(start_paused = true)]
async fn first_full_snapshot_seeds_the_target() {
    let h = harness(base_config(&["trv_a", "trv_b"]));

    h.report("trv_a", heat_member(21.0)).await;
    // Only one member has reported; the target must stay empty.
    assert!(h.group.target_state().await.is_empty());

    h.report("trv_b", heat_member(21.0)).await;
    let state = h.group.target_state().await;
    assert_eq!(state.mode, Some(HvacMode::Heat));
    assert_eq!(state.temperature, Some(21.0));
    assert_eq!(state.source, Some(Actor::Restore));
}

#[tokio::test(start_paused = true)]
async fn seeding_happens_once() {
    let h = harness(base_config(&["trv_a"]));
    h.report("trv_a", heat_member(21.0)).await;
    assert_eq!(h.group.target_state().await.temperature, Some(21.0));

    // Later reports must not reseed an already-opinionated target.
    h.report("trv_a", heat_member(18.0)).await;
    assert_eq!(h.group.target_state().await.temperature, Some(21.0));
}

#[tokio::test(start_paused = true)]
async fn snapshot_restore_takes_precedence_over_seeding() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path().join("state.json")));
    store
        .save(&TargetState {
            mode: Some(HvacMode::Heat),
            temperature: Some(23.5),
            ..Default::default()
        })
        .unwrap();

    let registry = Arc::new(InMemoryRegistry::new());
    let executor = Arc::new(LoopbackExecutor::new(Arc::clone(&registry)));
    let group = GroupService::new(
        base_config(&["trv_a"]),
        registry.clone() as Arc<dyn MemberRegistry>,
        executor.clone() as Arc<dyn CommandExecutor>,
        Some(store.clone() as Arc<dyn StateStore>),
        None,
    )
    .unwrap();
    group.start().await;

    let state = group.target_state().await;
    assert_eq!(state.temperature, Some(23.5));
    assert_eq!(state.source, Some(Actor::Restore));

    // A later full snapshot does not overwrite the restored target.
    registry.set_member("trv_a", heat_member(19.0));
    group
        .handle_member_event(thermoflock::MemberEvent::new("trv_a", heat_member(19.0)))
        .await;
    assert_eq!(group.target_state().await.temperature, Some(23.5));
}

#[tokio::test(start_paused = true)]
async fn shutdown_saves_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStateStore::new(dir.path().join("state.json")));

    let registry = Arc::new(InMemoryRegistry::new());
    let executor = Arc::new(LoopbackExecutor::new(Arc::clone(&registry)));
    let group = GroupService::new(
        base_config(&["trv_a"]),
        registry.clone() as Arc<dyn MemberRegistry>,
        executor.clone() as Arc<dyn CommandExecutor>,
        Some(store.clone() as Arc<dyn StateStore>),
        None,
    )
    .unwrap();
    group.start().await;

    registry.set_member("trv_a", heat_member(21.0));
    group
        .handle_member_event(thermoflock::MemberEvent::new("trv_a", heat_member(21.0)))
        .await;
    group.set_temperature(22.0).await;
    group.shutdown().await;

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.temperature, Some(22.0));
    assert_eq!(saved.mode, Some(HvacMode::Heat));
}
