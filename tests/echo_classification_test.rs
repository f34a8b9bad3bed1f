//! Echo, dirty-echo and side-effect handling through the full engine.

mod common;

use common::{base_config, harness, heat_member};
use thermoflock::{
    Actor, AttrMap, AttrValue, Attribute, BatchTag, CausalContext, HvacMode, MemberEvent,
    MemberId, SyncMode,
};

fn enforce_config() -> thermoflock::GroupConfig {
    let mut config = base_config(&["trv_a", "trv_b"]);
    config.sync.mode = SyncMode::Enforce;
    config
}

#[tokio::test(start_paused = true)]
async fn clean_echoes_cause_no_further_traffic() {
    let h = harness(enforce_config());
    h.report("trv_a", heat_member(18.0)).await;
    h.report("trv_b", heat_member(18.0)).await;

    h.group.set_temperature(21.0).await;
    h.settle().await;
    assert_eq!(h.executor.issued().len(), 1);
    h.executor.clear();

    // Deliver the acknowledgments; nothing new must be written or sent.
    let before = h.group.target_state().await;
    h.deliver_echoes().await;
    assert!(h.executor.issued().is_empty());
    assert_eq!(h.group.target_state().await.temperature, before.temperature);
}

#[tokio::test(start_paused = true)]
async fn dirty_echo_does_not_overwrite_the_order() {
    let h = harness(enforce_config());
    h.report("trv_a", heat_member(21.0)).await;
    h.report("trv_b", heat_member(21.0)).await;
    h.executor.clear();

    // We ordered 19.5; the device acknowledges with a stale 22.0.
    let mut changes = AttrMap::new();
    changes.insert(Attribute::Temperature, AttrValue::Number(19.5));
    h.group.set_temperature(19.5).await;
    h.settle().await;
    h.executor.clear();

    let stale = heat_member(22.0);
    h.registry.set_member("trv_a", stale.clone());
    let event = MemberEvent::new("trv_a", stale).with_cause(CausalContext {
        tag: BatchTag::new(Actor::Command, None),
        payload: changes,
    });
    h.group.handle_member_event(event).await;
    h.settle().await;

    // The order stands and no enforcement round was started.
    assert_eq!(h.group.target_state().await.temperature, Some(19.5));
    assert!(h.executor.issued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn side_effects_are_accepted_only_from_the_batch_master() {
    let h = harness(enforce_config());
    h.report("trv_a", heat_member(18.0)).await;
    h.report("trv_b", heat_member(18.0)).await;

    // Give the target an opinion on fan mode so deviations register.
    h.group.set_fan_mode("low").await;
    h.deliver_echoes().await;
    h.executor.clear();

    let cause = CausalContext {
        tag: BatchTag::new(Actor::Command, Some(MemberId::new("trv_a"))),
        payload: AttrMap::from([(Attribute::PresetMode, AttrValue::choice("eco"))]),
    };

    // A passive receiver reports an unordered fan change: suppressed.
    let mut snapshot = heat_member(18.0);
    snapshot.fan_mode = Some("medium".into());
    h.registry.set_member("trv_b", snapshot.clone());
    h.group
        .handle_member_event(MemberEvent::new("trv_b", snapshot).with_cause(cause.clone()))
        .await;
    assert_eq!(h.group.target_state().await.fan_mode, Some("low".to_string()));

    // The member that triggered the batch reports it: adopted.
    let mut snapshot = heat_member(18.0);
    snapshot.fan_mode = Some("medium".into());
    h.registry.set_member("trv_a", snapshot.clone());
    h.group
        .handle_member_event(MemberEvent::new("trv_a", snapshot).with_cause(cause))
        .await;
    assert_eq!(h.group.target_state().await.fan_mode, Some("medium".to_string()));
}

#[tokio::test(start_paused = true)]
async fn override_echoes_never_feed_back() {
    let h = harness(enforce_config());
    h.report("trv_a", heat_member(21.0)).await;
    h.report("trv_b", heat_member(21.0)).await;
    h.executor.clear();

    // An off acknowledgment tagged by the suppression controller must
    // not pull the target down.
    let snapshot = heat_member(21.0).with_mode(HvacMode::Off);
    h.registry.set_member("trv_a", snapshot.clone());
    let event = MemberEvent::new("trv_a", snapshot).with_cause(CausalContext {
        tag: BatchTag::new(Actor::Window, None),
        payload: AttrMap::from([(Attribute::HvacMode, AttrValue::Mode(HvacMode::Off))]),
    });
    h.group.handle_member_event(event).await;
    h.settle().await;

    assert_eq!(h.group.target_state().await.mode, Some(HvacMode::Heat));
    assert!(h.executor.issued().is_empty());
}
