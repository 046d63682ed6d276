use serde_json::json;

use super::*;

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

#[test]
fn base_follows_activity_formula() {
    let params = CooldownParams::default();
    assert_close(params.base(0).expect("base"), 2.5 * 11.96_f64.sqrt() + 6.5);
    assert_close(params.base(1000).expect("base"), 2.5 * 1011.96_f64.sqrt() + 6.5);

    let legacy = CooldownParams { user_offset: 12.0, ..CooldownParams::default() };
    assert_close(legacy.base(4).expect("base"), 2.5 * 4.0 + 6.5);
}

#[test]
fn first_entry_has_no_stack_multiplier() {
    let params = CooldownParams::default();
    let schedule = params.schedule(250).expect("schedule");
    assert_eq!(schedule.entries.len(), STACK_SIZE as usize);
    assert_close(schedule.entries[0].incremental_seconds, params.base(250).expect("base"));
    assert_close(schedule.entries[0].cumulative_seconds, schedule.entries[0].incremental_seconds);
}

#[test]
fn stacked_entries_scale_by_triangular_factor() {
    let base = 10.0;
    let factors = [1.0, 6.0, 12.0, 21.0, 33.0, 48.0];
    for (stack, factor) in (0..STACK_SIZE).zip(factors) {
        assert_close(incremental(base, stack, 3.0), base * factor);
    }
}

#[test]
fn cumulative_is_strictly_increasing() {
    for online in [0, 1, 37, 1200, 50_000] {
        let schedule = CooldownParams::default().schedule(online).expect("schedule");
        for pair in schedule.entries.windows(2) {
            assert!(pair[1].cumulative_seconds > pair[0].cumulative_seconds, "online {online}");
        }
        let sum: f64 = schedule.entries.iter().map(|e| e.incremental_seconds).sum();
        assert_close(schedule.entries[5].cumulative_seconds, sum);
    }
}

#[test]
fn negative_online_is_rejected() {
    assert_eq!(CooldownParams::default().schedule(-1), Err(CooldownError::NegativeOnline(-1)));
    let policy = CooldownPolicy::Activity(CooldownParams::default());
    let err = policy.schedule(-5, None).expect_err("negative");
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn triangular_numbers() {
    assert_eq!((0..6).map(triangular).collect::<Vec<_>>(), vec![0, 1, 3, 6, 10, 15]);
}

// =============================================================================
// POLICY
// =============================================================================

#[test]
fn policy_reads_activity_info() {
    let info = json!({
        "type": "activity",
        "activityCooldown": {"steepness": 3.0, "multiplier": 2.0, "globalOffset": 1.0, "userOffset": 0.0}
    });
    let policy = CooldownPolicy::from_info(Some(&info), CooldownParams::default());
    let schedule = policy.schedule(16, None).expect("schedule");
    assert_close(schedule.entries[0].incremental_seconds, (3.0 * 4.0 + 1.0) * 2.0);

    let overridden = policy.schedule(16, Some(0.5)).expect("schedule");
    assert_close(overridden.entries[0].incremental_seconds, (3.0 * 4.0 + 1.0) * 0.5);
}

#[test]
fn policy_reads_static_info() {
    let info = json!({"type": "static", "staticCooldownSeconds": 30.0});
    let policy = CooldownPolicy::from_info(Some(&info), CooldownParams::default());
    let schedule = policy.schedule(999, None).expect("schedule");
    assert_close(schedule.entries[0].incremental_seconds, 30.0);
    assert_close(schedule.entries[1].incremental_seconds, 180.0);
}

#[test]
fn unrecognised_info_falls_back() {
    let fallback = CooldownParams { user_offset: 12.0, ..CooldownParams::default() };
    for info in [json!({"type": "weird"}), json!({"type": "activity"}), json!(null)] {
        assert_eq!(CooldownPolicy::from_info(Some(&info), fallback), CooldownPolicy::Activity(fallback));
    }
    assert_eq!(CooldownPolicy::from_info(None, fallback), CooldownPolicy::Activity(fallback));
}

#[test]
fn invalid_multiplier_is_rejected() {
    let policy = CooldownPolicy::Activity(CooldownParams::default());
    assert_eq!(policy.schedule(1, Some(0.0)), Err(CooldownError::InvalidMultiplier(0.0)));
    assert!(policy.schedule(1, Some(f64::NAN)).is_err());
}

// =============================================================================
// FORMAT
// =============================================================================

#[test]
fn formats_minutes_and_hours() {
    assert_eq!(format_duration(75.5), "01:15.50");
    assert_eq!(format_duration(5.0), "00:05.00");
    assert_eq!(format_duration(3725.25), "01:02:05.25");
}
