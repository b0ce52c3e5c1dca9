//! End-to-end mission scenarios over scripted fakes.

use std::sync::Arc;
use std::time::Duration;

use sentryai::adapters::GraphStore;
use sentryai::budget::CognitiveBudget;
use sentryai::mission::{MissionSignal, WorkflowPhase};
use sentryai::types::MissionStatus;

use super::support::{
    mixed_plan_json, nuclei_record, observe_mission, ok_output, plan_json, reflection_json,
    repetitive_plan_json, scan_input, spawn_mission, wait_for_frame, wait_for_snapshot, FakeRun,
    FakeRunner, ScriptedProvider,
};

fn budget(max_steps: u32) -> CognitiveBudget {
    CognitiveBudget {
        max_steps,
        max_cost_usd: 1.0,
        max_runtime_minutes: 10,
        ..CognitiveBudget::default()
    }
}

#[tokio::test]
async fn approve_path_executes_all_approved_steps() {
    let provider = ScriptedProvider::new(&[
        plan_json(&["www.example.com", "www.example.com", "www.example.com"]),
        reflection_json(),
    ]);
    let runner = FakeRunner::scripted(Vec::new());
    let input = scan_input(false, budget(5));

    let mut harness = spawn_mission(input, provider, Arc::clone(&runner)).await;

    wait_for_snapshot(&mut harness.control, |s| {
        s.phase == WorkflowPhase::AwaitingApproval
    })
    .await;

    harness
        .control
        .signal_tx
        .send(MissionSignal::ApprovePlan {
            plan_id: Some("plan-1".to_owned()),
            step_ids: vec![1, 2, 3],
        })
        .expect("send approval");

    let output = harness.handle.await.expect("workflow task");
    assert_eq!(output.status, MissionStatus::Completed);
    assert_eq!(output.steps_taken, 3);
    assert!(output.cost_usd <= 1.0);
    assert_eq!(runner.calls().len(), 3);
}

#[tokio::test]
async fn auto_pilot_exhausts_the_step_budget() {
    let provider = ScriptedProvider::new(&[plan_json(&[
        "www.example.com",
        "www.example.com",
        "www.example.com",
    ])]);
    let runner = FakeRunner::scripted(Vec::new());
    let input = scan_input(true, budget(2));

    let harness = spawn_mission(input, provider, Arc::clone(&runner)).await;
    let output = harness.handle.await.expect("workflow task");

    assert_eq!(output.status, MissionStatus::Exhausted);
    assert_eq!(output.steps_taken, 2);
    assert_eq!(runner.calls().len(), 2);
    let message = output.error_message.expect("exhaustion reason");
    assert!(message.contains("step budget"), "got: {message}");
}

#[tokio::test]
async fn out_of_scope_step_is_skipped_and_mission_completes() {
    let provider = ScriptedProvider::new(&[
        plan_json(&["www.example.com", "admin.example.com", "www.example.com"]),
        reflection_json(),
    ]);
    let runner = FakeRunner::scripted(Vec::new());

    let mut input = scan_input(true, budget(5));
    input.targets = vec![
        "www.example.com".to_owned(),
        "admin.example.com".to_owned(),
    ];
    input.excluded_scope = vec!["admin.example.com".to_owned()];
    let mission_id = input.mission_id.clone();

    let harness = spawn_mission(input, provider, Arc::clone(&runner)).await;
    let mut events = observe_mission(&harness, &mission_id);

    let violation = wait_for_frame(&mut events, |f| f["type"] == "server:scope_violation").await;
    assert_eq!(violation["payload"]["step_id"], 2);

    let output = harness.handle.await.expect("workflow task");
    assert_eq!(output.status, MissionStatus::Completed);
    // Steps 1 and 3 ran; step 2 never reached the sandbox.
    assert_eq!(output.steps_taken, 2);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn repeated_identical_actions_break_the_mission() {
    let provider =
        ScriptedProvider::new(&[repetitive_plan_json("https://www.example.com", 12)]);
    let runner = FakeRunner::scripted(Vec::new());

    let mut input = scan_input(true, budget(50));
    input.targets = vec!["https://www.example.com".to_owned()];

    let harness = spawn_mission(input, provider, runner).await;
    let output = harness.handle.await.expect("workflow task");

    assert_eq!(output.status, MissionStatus::Failed);
    assert_eq!(output.error_message.as_deref(), Some("loop detected"));
    // The loop is flagged on the action that fills the detection window.
    assert_eq!(output.steps_taken, 10);
}

#[tokio::test]
async fn kill_during_execution_stops_promptly_and_keeps_early_findings() {
    let provider = ScriptedProvider::new(&[mixed_plan_json("https://www.example.com")]);

    // Step 1 produces a finding-bearing record instantly; step 2 hangs.
    let runner = FakeRunner::scripted(vec![
        FakeRun {
            delay: Duration::ZERO,
            output: ok_output(&nuclei_record("www.example.com")),
        },
        FakeRun {
            delay: Duration::from_secs(30),
            output: ok_output(""),
        },
    ]);

    let mut input = scan_input(true, budget(5));
    input.targets = vec!["https://www.example.com".to_owned()];
    let mission_id = input.mission_id.clone();
    let harness = spawn_mission(input, provider, runner).await;
    let mut events = observe_mission(&harness, &mission_id);

    // Wait until step 2 is actually running, then kill.
    let _ = wait_for_frame(&mut events, |f| {
        f["type"] == "server:step_begin" && f["payload"]["step_id"] == 2
    })
    .await;

    harness
        .control
        .signal_tx
        .send(MissionSignal::Kill {
            reason: "op request".to_owned(),
        })
        .expect("send kill");

    let output = tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .expect("killed within grace interval")
        .expect("workflow task");

    assert_eq!(output.status, MissionStatus::Killed);
    assert_eq!(output.error_message.as_deref(), Some("op request"));
    assert_eq!(output.steps_taken, 1);
    // Findings reflect step 1 only.
    assert_eq!(output.findings.len(), 1);
    assert_eq!(output.findings[0].step_id, Some(1));
}

#[tokio::test]
async fn kill_while_awaiting_approval() {
    let provider = ScriptedProvider::new(&[plan_json(&["www.example.com"])]);
    let runner = FakeRunner::scripted(Vec::new());
    let input = scan_input(false, budget(5));

    let mut harness = spawn_mission(input, provider, runner).await;
    wait_for_snapshot(&mut harness.control, |s| {
        s.phase == WorkflowPhase::AwaitingApproval
    })
    .await;

    harness
        .control
        .signal_tx
        .send(MissionSignal::Kill {
            reason: "changed my mind".to_owned(),
        })
        .expect("send kill");

    let output = harness.handle.await.expect("workflow task");
    assert_eq!(output.status, MissionStatus::Killed);
    assert_eq!(output.steps_taken, 0);
}

#[tokio::test]
async fn later_approval_overrides_earlier_one() {
    let provider = ScriptedProvider::new(&[
        plan_json(&["www.example.com", "www.example.com", "www.example.com"]),
        reflection_json(),
    ]);
    let runner = FakeRunner::scripted(Vec::new());
    let input = scan_input(false, budget(5));

    let harness = spawn_mission(input, provider, Arc::clone(&runner)).await;

    // Both approvals are queued before the workflow reaches the wait: the
    // later set wins.
    harness
        .control
        .signal_tx
        .send(MissionSignal::ApprovePlan {
            plan_id: None,
            step_ids: vec![1],
        })
        .expect("first approval");
    harness
        .control
        .signal_tx
        .send(MissionSignal::ApprovePlan {
            plan_id: None,
            step_ids: vec![2, 3],
        })
        .expect("second approval");

    let output = harness.handle.await.expect("workflow task");
    assert_eq!(output.status, MissionStatus::Completed);
    assert_eq!(output.steps_taken, 2);
}

#[tokio::test]
async fn findings_are_collected_and_stamped() {
    let provider = ScriptedProvider::new(&[
        repetitive_plan_json("https://www.example.com", 1),
        reflection_json(),
    ]);
    let runner = FakeRunner::scripted(vec![FakeRun {
        delay: Duration::ZERO,
        output: ok_output(&nuclei_record("www.example.com")),
    }]);

    let mut input = scan_input(true, budget(5));
    input.targets = vec!["https://www.example.com".to_owned()];

    let harness = spawn_mission(input, provider, runner).await;
    let output = harness.handle.await.expect("workflow task");

    assert_eq!(output.status, MissionStatus::Completed);
    assert_eq!(output.findings.len(), 1);
    let finding = &output.findings[0];
    assert_eq!(finding.title, "Reflected XSS");
    assert_eq!(finding.step_id, Some(1));
    assert_eq!(finding.mission_id.as_deref(), Some(output.mission_id.as_str()));

    // The finding is linked to its affected asset in the mission's graph.
    let assets = harness
        .graph
        .assets(&output.mission_id)
        .await
        .expect("graph assets");
    assert!(assets
        .iter()
        .any(|n| n.kind == "host" && n.key == finding.affected_asset));
    assert!(assets
        .iter()
        .any(|n| n.kind == "finding" && n.key == finding.id));

    let edges = harness.graph.edges(&output.mission_id);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relation, "has_finding");
    assert_eq!(edges[0].from_key, finding.affected_asset);
    assert_eq!(edges[0].to_key, finding.id);
}

#[tokio::test]
async fn pause_and_resume_between_steps() {
    let provider = ScriptedProvider::new(&[
        plan_json(&["www.example.com", "www.example.com"]),
        reflection_json(),
    ]);
    // Step 1 takes long enough that a pause lands before step 2.
    let runner = FakeRunner::scripted(vec![FakeRun {
        delay: Duration::from_millis(300),
        output: ok_output(""),
    }]);
    let input = scan_input(true, budget(5));
    let mission_id = input.mission_id.clone();

    let mut harness = spawn_mission(input, provider, runner).await;
    let mut events = observe_mission(&harness, &mission_id);

    let _ = wait_for_frame(&mut events, |f| {
        f["type"] == "server:step_begin" && f["payload"]["step_id"] == 1
    })
    .await;

    harness
        .control
        .signal_tx
        .send(MissionSignal::Pause)
        .expect("send pause");

    wait_for_snapshot(&mut harness.control, |s| s.phase == WorkflowPhase::Paused).await;

    harness
        .control
        .signal_tx
        .send(MissionSignal::Resume)
        .expect("send resume");

    let output = harness.handle.await.expect("workflow task");
    assert_eq!(output.status, MissionStatus::Completed);
    assert_eq!(output.steps_taken, 2);
}
