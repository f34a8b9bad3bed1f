//! Delay-gated window suppression: debounced force-off, blocked writes,
//! sibling-aware restore.

mod common;

use std::time::Duration;

use common::{base_config, harness, heat_member, Harness};
use thermoflock::{CommandKind, HvacMode, MemberId};

fn window_config() -> thermoflock::GroupConfig {
    let mut config = base_config(&["trv_a", "trv_b"]);
    config.window.sensors = vec!["w1".into(), "w2".into()];
    config
}

async fn window_harness() -> Harness {
    let h = harness(window_config());
    for entity in ["w1", "w2", "trv_a", "trv_b"] {
        h.registry.set_zone(entity, "living_room");
    }
    h.registry.set_sensor("w1", false);
    h.registry.set_sensor("w2", false);
    h.report("trv_a", heat_member(20.0)).await;
    h.report("trv_b", heat_member(20.0)).await;
    h.executor.clear();
    h
}

#[tokio::test(start_paused = true)]
async fn brief_open_never_triggers_an_off_command() {
    let h = window_harness().await;

    h.sensor("w1", true).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    h.sensor("w1", false).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(h.executor.issued().is_empty());
    assert!(!h.group.suppressed());
}

#[tokio::test(start_paused = true)]
async fn held_open_forces_zone_members_off_once() {
    let h = window_harness().await;

    h.sensor("w1", true).await;
    tokio::time::sleep(Duration::from_secs(16)).await;

    let issued = h.executor.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].kind, CommandKind::SetHvacMode { mode: HvacMode::Off });
    assert_eq!(
        issued[0].members,
        vec![MemberId::new("trv_a"), MemberId::new("trv_b")]
    );
    assert!(h.group.suppressed());
    // The target was never touched.
    assert_eq!(h.group.target_state().await.mode, Some(HvacMode::Heat));
}

#[tokio::test(start_paused = true)]
async fn suppression_blocks_writes_except_mode_changes() {
    let h = window_harness().await;
    h.sensor("w1", true).await;
    tokio::time::sleep(Duration::from_secs(16)).await;
    h.executor.clear();

    // Setpoint writes bounce off the gatekeeper and nothing is sent.
    let before = h.group.target_state().await.temperature;
    h.group.set_temperature(25.0).await;
    h.settle().await;
    assert_eq!(h.group.target_state().await.temperature, before);
    assert!(h.executor.issued().is_empty());

    // An explicit mode change still goes through.
    h.group.set_hvac_mode(HvacMode::Heat).await;
    h.settle().await;
    let issued = h.executor.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].kind, CommandKind::SetHvacMode { mode: HvacMode::Heat });
}

#[tokio::test(start_paused = true)]
async fn close_restores_exactly_the_forced_members() {
    let h = window_harness().await;
    h.sensor("w1", true).await;
    tokio::time::sleep(Duration::from_secs(16)).await;
    h.executor.clear();

    h.sensor("w1", false).await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    let issued = h.executor.issued();
    assert!(issued
        .iter()
        .any(|c| c.kind == CommandKind::SetHvacMode { mode: HvacMode::Heat }
            && c.members == vec![MemberId::new("trv_a"), MemberId::new("trv_b")]));
    assert!(!h.group.suppressed());
}

#[tokio::test(start_paused = true)]
async fn sibling_window_holds_the_whole_zone() {
    let h = window_harness().await;
    h.sensor("w1", true).await;
    h.sensor("w2", true).await;
    tokio::time::sleep(Duration::from_secs(16)).await;
    h.executor.clear();

    // One window closes, but its sibling is still open.
    h.sensor("w1", false).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h.executor.issued().is_empty());
    assert!(h.group.suppressed());

    // The second window closes; now the zone is released.
    h.sensor("w2", false).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(h
        .executor
        .issued()
        .iter()
        .any(|c| c.kind == CommandKind::SetHvacMode { mode: HvacMode::Heat }));
    assert!(!h.group.suppressed());
}

#[tokio::test(start_paused = true)]
async fn members_already_off_are_not_restored() {
    let h = window_harness().await;
    // B was manually off before the window opened.
    h.report("trv_b", heat_member(20.0).with_mode(HvacMode::Off)).await;
    h.executor.clear();

    h.sensor("w1", true).await;
    tokio::time::sleep(Duration::from_secs(16)).await;
    let issued = h.executor.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].members, vec![MemberId::new("trv_a")]);
    h.executor.clear();

    h.sensor("w1", false).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    for command in h.executor.issued() {
        assert_eq!(command.members, vec![MemberId::new("trv_a")]);
    }
}
