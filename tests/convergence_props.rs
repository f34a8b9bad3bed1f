//! Property tests for tolerance comparison and delta computation.

use proptest::prelude::*;

use thermoflock::{
    AttrValue, Attribute, HvacMode, MemberId, MemberSnapshot, StateDelta, TargetState,
};

fn temp() -> impl Strategy<Value = f64> {
    5.0f64..35.0
}

proptest! {
    /// Tolerance comparison is symmetric.
    #[test]
    fn matches_is_symmetric(a in temp(), b in temp(), tolerance in 0.01f64..2.0) {
        let va = AttrValue::Number(a);
        let vb = AttrValue::Number(b);
        prop_assert_eq!(va.matches(&vb, tolerance), vb.matches(&va, tolerance));
    }

    /// Numbers match exactly when their distance is under the tolerance.
    #[test]
    fn matches_tracks_distance(a in temp(), b in temp(), tolerance in 0.01f64..2.0) {
        let within = (a - b).abs() < tolerance;
        prop_assert_eq!(
            AttrValue::Number(a).matches(&AttrValue::Number(b), tolerance),
            within
        );
    }

    /// A delta never contains a setpoint that is within tolerance of the
    /// target, and always contains one that deviates beyond it.
    #[test]
    fn delta_respects_tolerance(
        target_temp in temp(),
        member_temp in temp(),
        tolerance in 0.01f64..2.0,
    ) {
        let target = TargetState {
            mode: Some(HvacMode::Heat),
            temperature: Some(target_temp),
            ..Default::default()
        };
        let snapshot = MemberSnapshot::default()
            .with_mode(HvacMode::Heat)
            .with_temperature(member_temp);
        let delta = StateDelta::compute(
            MemberId::new("trv_a"),
            &snapshot,
            &target,
            tolerance,
        );

        let deviates = (target_temp - member_temp).abs() >= tolerance;
        prop_assert_eq!(delta.changes.contains_key(&Attribute::Temperature), deviates);
    }

    /// Attributes the target has no opinion about never appear in a delta.
    #[test]
    fn delta_ignores_unset_target_attributes(member_temp in temp()) {
        let target = TargetState::default();
        let snapshot = MemberSnapshot::default()
            .with_mode(HvacMode::Heat)
            .with_temperature(member_temp);
        let delta = StateDelta::compute(
            MemberId::new("trv_a"),
            &snapshot,
            &target,
            0.1,
        );
        prop_assert!(delta.is_empty());
    }
}
