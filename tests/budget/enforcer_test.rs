//! Budget governor tests.

use chrono::{Duration, Utc};
use sentryai::budget::{BudgetEnforcer, BudgetStop, CognitiveBudget};

fn small_budget() -> CognitiveBudget {
    CognitiveBudget {
        max_steps: 3,
        max_cost_usd: 1.0,
        max_runtime_minutes: 10,
        max_idle_seconds: 120,
        max_consecutive_errors: 2,
        max_retries_per_target: 2,
        ..CognitiveBudget::default()
    }
}

fn args() -> serde_json::Value {
    serde_json::json!({ "domain": "www.example.com" })
}

#[test]
fn fresh_enforcer_can_proceed() {
    let enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    assert!(enforcer.check_can_proceed().is_ok());
}

#[test]
fn step_limit_stops_the_mission() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    for _ in 0..3 {
        let _ = enforcer.record_action("subfinder", "www.example.com", &args(), 0.0);
    }
    let stop = enforcer.check_can_proceed();
    assert!(matches!(stop, Err(BudgetStop::StepLimit { used: 3, limit: 3 })));
}

#[test]
fn cost_limit_stops_the_mission() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    let _ = enforcer.add_cost(1.5);
    assert!(matches!(
        enforcer.check_can_proceed(),
        Err(BudgetStop::CostLimit { .. })
    ));
}

#[test]
fn runtime_limit_stops_the_mission() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.state.started_at = Utc::now()
        .checked_sub_signed(Duration::minutes(11))
        .expect("valid timestamp");
    enforcer.state.last_action_at = Utc::now();
    assert!(matches!(
        enforcer.check_can_proceed(),
        Err(BudgetStop::TimeLimit { .. })
    ));
}

#[test]
fn idle_limit_stops_the_mission() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.state.last_action_at = Utc::now()
        .checked_sub_signed(Duration::seconds(121))
        .expect("valid timestamp");
    assert!(matches!(
        enforcer.check_can_proceed(),
        Err(BudgetStop::IdleLimit { .. })
    ));
}

#[test]
fn consecutive_errors_stop_the_mission() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.record_error("tool_failure", "connection refused");
    enforcer.record_error("tool_failure", "connection refused");
    assert!(matches!(
        enforcer.check_can_proceed(),
        Err(BudgetStop::ConsecutiveErrors { count: 2 })
    ));
}

#[test]
fn successful_action_resets_error_streak() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.record_error("tool_failure", "timeout");
    let _ = enforcer.record_action("subfinder", "www.example.com", &args(), 0.0);
    assert_eq!(enforcer.state.consecutive_errors, 0);
    assert_eq!(enforcer.state.errors_total, 1);
}

#[test]
fn kill_is_reported_with_its_reason() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.kill("op request");
    match enforcer.check_can_proceed() {
        Err(BudgetStop::Killed { reason }) => assert_eq!(reason, "op request"),
        other => panic!("expected kill stop, got {other:?}"),
    }
}

#[test]
fn pause_and_resume() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    enforcer.pause();
    assert!(matches!(
        enforcer.check_can_proceed(),
        Err(BudgetStop::Paused)
    ));
    enforcer.resume();
    assert!(enforcer.check_can_proceed().is_ok());
}

#[test]
fn retry_cap_is_per_normalized_target() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    assert!(enforcer.record_retry("www.example.com"));
    // Case and trailing slash normalize to the same key.
    assert!(enforcer.record_retry("WWW.Example.com/"));
    assert!(!enforcer.record_retry("www.example.com"));
    // A different target has its own counter.
    assert!(enforcer.record_retry("api.example.com"));
}

#[test]
fn cost_warning_fires_at_threshold() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    let alerts = enforcer.add_cost(0.85);
    assert!(alerts
        .iter()
        .any(|a| a.violation == sentryai::budget::BudgetViolation::CostLimit));
}

#[test]
fn status_snapshot_reports_consumption() {
    let mut enforcer = BudgetEnforcer::new(small_budget(), "m-1");
    let _ = enforcer.record_action("subfinder", "www.example.com", &args(), 0.25);
    let status = enforcer.status();
    assert_eq!(status.mission_id, "m-1");
    assert!(status.is_active);
    assert_eq!(status.steps.used, 1.0);
    assert_eq!(status.steps.limit, 3.0);
    assert!((status.cost.used - 0.25).abs() < 1e-9);
    assert!((status.cost.remaining - 0.75).abs() < 1e-9);
}
