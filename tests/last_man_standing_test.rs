//! Partial-sync off handling: manually-off members stay off, and the
//! group only follows an off report from the final active member.

mod common;

use common::{base_config, harness, heat_member, off_member};
use thermoflock::{CommandKind, HvacMode, SyncMode};

fn partial_sync_config() -> thermoflock::GroupConfig {
    let mut config = base_config(&["trv_a", "trv_b"]);
    config.sync.mode = SyncMode::Enforce;
    config.ignore_off_members = true;
    config
}

#[tokio::test(start_paused = true)]
async fn off_report_is_rejected_while_another_member_is_active() {
    let h = harness(partial_sync_config());
    h.report("trv_a", heat_member(20.0)).await;
    h.report("trv_b", heat_member(20.0)).await;
    h.executor.clear();

    // A turns itself off; B is still heating.
    h.report("trv_a", off_member(20.0)).await;
    h.settle().await;

    // The target keeps heating, and the off member is left alone rather
    // than being woken back up.
    assert_eq!(h.group.target_state().await.mode, Some(HvacMode::Heat));
    assert!(h.executor.issued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn off_report_from_the_last_active_member_wins() {
    let h = harness(partial_sync_config());
    h.report("trv_a", heat_member(20.0)).await;
    h.report("trv_b", heat_member(20.0)).await;
    h.executor.clear();

    h.report("trv_a", off_member(20.0)).await;
    h.settle().await;
    assert_eq!(h.group.target_state().await.mode, Some(HvacMode::Heat));

    // B follows; it is the last man standing, so the group goes off.
    h.report("trv_b", off_member(20.0)).await;
    h.settle().await;
    assert_eq!(h.group.target_state().await.mode, Some(HvacMode::Off));
    // Everyone already reports off, so no corrective traffic either.
    assert!(h.executor.issued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn all_off_fleet_can_still_be_woken() {
    let h = harness(partial_sync_config());
    h.report("trv_a", off_member(18.0)).await;
    h.report("trv_b", off_member(18.0)).await;
    h.executor.clear();

    // Deadlock prevention: with every member off, an on command must
    // not be filtered down to nobody.
    h.group.set_hvac_mode(HvacMode::Heat).await;
    h.settle().await;

    let issued = h.executor.issued();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].kind, CommandKind::SetHvacMode { mode: HvacMode::Heat });
    assert_eq!(issued[0].members.len(), 2);
}
