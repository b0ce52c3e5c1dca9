//! Signal dispatch-table tests.

use sentryai::mission::{parse_signal, MissionSignal, SignalParseError};

#[test]
fn approve_plan_decodes_step_ids() {
    let data = serde_json::json!({
        "plan_id": "plan-1",
        "approved_steps": [1, 2, 3],
    });
    let signal = parse_signal("approve_plan", &data).expect("decode");
    assert_eq!(
        signal,
        MissionSignal::ApprovePlan {
            plan_id: Some("plan-1".to_owned()),
            step_ids: vec![1, 2, 3],
        }
    );
}

#[test]
fn approve_plan_without_steps_is_invalid() {
    let result = parse_signal("approve_plan", &serde_json::json!({}));
    assert!(matches!(
        result,
        Err(SignalParseError::InvalidPayload { .. })
    ));
}

#[test]
fn pause_and_resume_take_no_payload() {
    assert_eq!(
        parse_signal("pause", &serde_json::Value::Null).expect("pause"),
        MissionSignal::Pause
    );
    assert_eq!(
        parse_signal("resume", &serde_json::Value::Null).expect("resume"),
        MissionSignal::Resume
    );
}

#[test]
fn kill_defaults_its_reason() {
    let signal = parse_signal("kill", &serde_json::Value::Null).expect("kill");
    assert_eq!(
        signal,
        MissionSignal::Kill {
            reason: "user requested termination".to_owned(),
        }
    );
}

#[test]
fn kill_carries_an_explicit_reason() {
    let data = serde_json::json!({ "reason": "window closed" });
    let signal = parse_signal("kill", &data).expect("kill");
    assert_eq!(
        signal,
        MissionSignal::Kill {
            reason: "window closed".to_owned(),
        }
    );
}

#[test]
fn unknown_signals_are_rejected() {
    let result = parse_signal("self_destruct", &serde_json::Value::Null);
    assert!(matches!(result, Err(SignalParseError::Unknown(_))));
}
