//! Tests for the schedule module.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use reqsched_core::{ScheduleSpec, ValidationError};
use reqsched_template::{EvaluationContext, FixedClock, TemplateEngine};

use super::cron::normalize_cron;
use super::*;

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn engine() -> ScheduleEngine {
    let ctx = EvaluationContext::with_clock(Arc::new(FixedClock::new(reference())));
    ScheduleEngine::with_cron(TemplateEngine::new(Arc::new(ctx)))
}

// ── Cron helpers ────────────────────────────────────────────────────

#[test]
fn normalize_5_field_cron() {
    assert_eq!(normalize_cron("*/15 * * * *"), "0 */15 * * * *");
    assert_eq!(normalize_cron("  0 9 * * 1-5 "), "0 0 9 * * 1-5");
}

#[test]
fn normalize_6_field_passes_through() {
    assert_eq!(normalize_cron("30 */5 * * * *"), "30 */5 * * * *");
    assert_eq!(normalize_cron("@hourly"), "@hourly");
}

#[test]
fn cron_next_is_strictly_after() {
    let r = CronRecurrence;
    let next = r.next_after("*/5 * * * *", reference()).unwrap();
    assert_eq!(next, reference() + TimeDelta::minutes(5));

    let hourly = r.next_after("@hourly", reference()).unwrap();
    assert_eq!(hourly, reference() + TimeDelta::hours(1));
}

#[test]
fn cron_rejects_garbage() {
    let err = CronRecurrence.validate("every tuesday").unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidCron { ref pattern, .. } if pattern == "every tuesday"));
}

// ── compute_next ────────────────────────────────────────────────────

#[test]
fn absolute_in_past_is_returned_verbatim() {
    let t = reference() - TimeDelta::hours(3);
    let got = engine()
        .compute_next(&ScheduleSpec::absolute(t.timestamp()), reference())
        .unwrap();
    assert_eq!(got, t);
}

#[test]
fn absolute_equal_to_reference() {
    let got = engine()
        .compute_next(&ScheduleSpec::absolute(reference().timestamp()), reference())
        .unwrap();
    assert_eq!(got, reference());
}

#[test]
fn relative_five_minutes() {
    let got = engine()
        .compute_next(&ScheduleSpec::relative("5m"), reference())
        .unwrap();
    assert_eq!(got, reference() + TimeDelta::seconds(300));
}

#[test]
fn relative_bad_duration() {
    let err = engine()
        .compute_next(&ScheduleSpec::relative("5 minutes"), reference())
        .unwrap_err();
    assert!(matches!(err, ScheduleError::InvalidDuration { .. }));
}

#[test]
fn computed_uses_template_engine() {
    let got = engine()
        .compute_next(
            &ScheduleSpec::computed("{{ addMinutes 15 now | unix }}"),
            reference(),
        )
        .unwrap();
    assert_eq!(got, reference() + TimeDelta::minutes(15));
}

#[test]
fn computed_non_integer_is_template_error() {
    let err = engine()
        .compute_next(&ScheduleSpec::computed("{{ now | rfc3339 }}"), reference())
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Template(reqsched_template::TemplateError::NotAnInteger(_))
    ));
}

#[test]
fn recurring_uses_resolver() {
    let got = engine()
        .compute_next(&ScheduleSpec::recurring("0 * * * *"), reference())
        .unwrap();
    assert_eq!(got, reference() + TimeDelta::hours(1));
    assert_eq!(got.minute(), 0);
}

#[test]
fn jitter_stays_within_bounds() {
    let e = engine();
    let spec = ScheduleSpec::relative("1m").with_jitter("30s");
    let base = reference() + TimeDelta::minutes(1);
    for _ in 0..200 {
        let got = e.compute_next(&spec, reference()).unwrap();
        assert!(got >= base, "jitter must never move earlier");
        assert!(got <= base + TimeDelta::seconds(30));
    }
}

#[test]
fn fire_base_is_stable_under_jitter() {
    let e = engine();
    let fixed = reference().timestamp() - 30;
    let spec = ScheduleSpec::computed(format!("{{{{ \"{fixed}\" }}}}")).with_jitter("5s");
    let first = e.compute_fire(&spec, reference()).unwrap();
    for _ in 0..20 {
        let again = e.compute_fire(&spec, reference()).unwrap();
        assert_eq!(again.base, first.base);
        assert!(again.at >= again.base && again.at <= again.base + TimeDelta::seconds(5));
    }
    assert_eq!(first.base.timestamp(), fixed);
}

#[test]
fn plus_minus_jitter_is_delay_only() {
    let e = engine();
    let t = reference().timestamp();
    let spec = ScheduleSpec::absolute(t).with_jitter("±10s");
    for _ in 0..100 {
        let got = e.compute_next(&spec, reference()).unwrap();
        assert!(got >= reference() && got <= reference() + TimeDelta::seconds(10));
    }
}

#[test]
fn seeded_jitter_is_reproducible() {
    let a = engine();
    let b = engine();
    a.templates().context().set_seed(5);
    b.templates().context().set_seed(5);
    let spec = ScheduleSpec::relative("0s").with_jitter("1h");
    for _ in 0..5 {
        assert_eq!(
            a.compute_next(&spec, reference()).unwrap(),
            b.compute_next(&spec, reference()).unwrap()
        );
    }
}

#[test]
fn zero_or_multiple_strategies_fail() {
    let e = engine();
    let err = e.compute_next(&ScheduleSpec::default(), reference()).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::Validation(ValidationError::ScheduleCardinality { found: 0 })
    );

    let two = ScheduleSpec {
        epoch: Some(1),
        cron: Some("* * * * *".into()),
        ..Default::default()
    };
    assert!(matches!(
        e.validate(&two),
        Err(ScheduleError::Validation(ValidationError::ScheduleCardinality { found: 2 }))
    ));
}

// ── validate ────────────────────────────────────────────────────────

#[test]
fn validate_accepts_each_strategy() {
    let e = engine();
    e.validate(&ScheduleSpec::absolute(0)).unwrap();
    e.validate(&ScheduleSpec::relative("90s").with_jitter("±5s")).unwrap();
    e.validate(&ScheduleSpec::computed("{{ now | unix }}")).unwrap();
    e.validate(&ScheduleSpec::recurring("*/5 * * * *")).unwrap();
}

#[test]
fn validate_rejects_bad_parts() {
    let e = engine();
    assert!(matches!(
        e.validate(&ScheduleSpec::absolute(-1)),
        Err(ScheduleError::Validation(ValidationError::Field { .. }))
    ));
    assert!(matches!(
        e.validate(&ScheduleSpec::relative("soon")),
        Err(ScheduleError::InvalidDuration { .. })
    ));
    assert!(matches!(
        e.validate(&ScheduleSpec::recurring("61 * * * *")),
        Err(ScheduleError::InvalidCron { .. })
    ));
    assert!(matches!(
        e.validate(&ScheduleSpec::relative("1m").with_jitter("lots")),
        Err(ScheduleError::InvalidDuration { .. })
    ));
    assert!(matches!(
        e.validate(&ScheduleSpec::computed("{{ whenever }}")),
        Err(ScheduleError::Template(_))
    ));
}

#[test]
fn validate_never_evaluates() {
    let e = engine();
    e.validate(&ScheduleSpec::computed("{{ seq }}")).unwrap();
    assert_eq!(e.templates().context().current_sequence(), 0);
}
