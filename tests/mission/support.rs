//! Mission test harness: scripted provider, fake sandbox runner, and a
//! workflow spawner wired to in-process fakes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use sentryai::adapters::InMemoryGraph;
use sentryai::agent::{GuardrailLoop, LlmError, LlmProvider, LlmRequest, LlmResponse};
use sentryai::budget::CognitiveBudget;
use sentryai::events::{EventFabric, EventSink, Frame};
use sentryai::integrations::{IntegrationConfig, IntegrationHub};
use sentryai::mission::{Activities, ActivityJournal, MissionControl, MissionWorkflow};
use sentryai::scope::{ScopeConfig, ScopeEnforcer};
use sentryai::tools::{RunOutput, SandboxError, ToolDispatcher, ToolRegistry, ToolRunner};
use sentryai::types::{ScanInput, ScanOutput};

/// Provider replaying scripted responses in order.
#[derive(Debug)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    /// Script responses returned in order; exhaustion is a transport error.
    pub fn new(responses: &[String]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().cloned().collect()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or_else(|| LlmError::Http("script exhausted".to_owned()))?;
        Ok(LlmResponse {
            content: next,
            input_tokens: 500,
            output_tokens: 200,
        })
    }

    fn model(&self) -> &str {
        "gpt-4o-mini"
    }
}

/// One scripted sandbox run.
#[derive(Debug, Clone)]
pub struct FakeRun {
    /// Simulated run duration (the runner actually sleeps).
    pub delay: Duration,
    /// The output returned.
    pub output: RunOutput,
}

/// Sandbox runner that replays scripted outputs; unscripted calls return
/// an instant empty success.
#[derive(Debug, Default)]
pub struct FakeRunner {
    runs: Mutex<VecDeque<FakeRun>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    /// Create a runner with scripted runs consumed in order.
    pub fn scripted(runs: Vec<FakeRun>) -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(runs.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Argvs of every run the sandbox received.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// An instant empty success output.
pub fn ok_output(stdout: &str) -> RunOutput {
    RunOutput {
        exit_code: Some(0),
        stdout: stdout.to_owned(),
        stderr: String::new(),
        timed_out: false,
        duration: Duration::from_millis(5),
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(
        &self,
        _image: &str,
        argv: &[String],
        _timeout: Duration,
    ) -> Result<RunOutput, SandboxError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(argv.to_vec());
        }
        let run = self
            .runs
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or(FakeRun {
                delay: Duration::ZERO,
                output: ok_output(""),
            });
        if !run.delay.is_zero() {
            tokio::time::sleep(run.delay).await;
        }
        Ok(run.output)
    }
}

/// A spawned mission with everything a test needs to drive it.
pub struct Harness {
    /// Keeps the registry and database directories alive.
    pub dirs: Vec<TempDir>,
    /// Signal/query handle.
    pub control: MissionControl,
    /// The running workflow task.
    pub handle: JoinHandle<ScanOutput>,
    /// The in-process fabric (connect observers here).
    pub fabric: Arc<EventFabric>,
    /// The mission's graph store, for asset/edge assertions.
    pub graph: Arc<InMemoryGraph>,
}

/// Connect an observer session subscribed to a mission's job-log channel.
///
/// Step-level progress frames are mission-scoped; fleet-wide frames arrive
/// on the same queue via broadcast.
pub fn observe_mission(
    harness: &Harness,
    mission_id: &str,
) -> tokio::sync::mpsc::Receiver<Frame> {
    let (session, rx) = harness.fabric.connect();
    harness
        .fabric
        .subscribe(&session, &format!("job_logs:{mission_id}"));
    rx
}

/// A SQLite pool on a fresh temp file.
pub async fn temp_pool(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("sqlite pool")
}

/// Default mission input over `www.example.com`.
pub fn scan_input(auto_pilot: bool, budget: CognitiveBudget) -> ScanInput {
    ScanInput {
        mission_id: format!("m-{}", uuid_suffix()),
        tenant_id: "default".to_owned(),
        user_id: "operator".to_owned(),
        objective: "find XSS".to_owned(),
        targets: vec!["www.example.com".to_owned()],
        allowed_scope: vec!["*.example.com".to_owned()],
        excluded_scope: Vec::new(),
        budget,
        auto_pilot,
        notify_on_finding: false,
    }
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Spawn a workflow over the scripted provider and runner.
pub async fn spawn_mission(
    input: ScanInput,
    provider: Arc<ScriptedProvider>,
    runner: Arc<FakeRunner>,
) -> Harness {
    let registry_dir = tempfile::tempdir().expect("registry dir");
    let db_dir = tempfile::tempdir().expect("db dir");

    let registry =
        ToolRegistry::new_without_watcher(registry_dir.path().to_path_buf()).expect("registry");
    let pool = temp_pool(&db_dir).await;
    let journal = ActivityJournal::new(pool).await.expect("journal");

    let fabric = Arc::new(EventFabric::new());
    let sink = EventSink::new(Arc::clone(&fabric), None);
    let graph = Arc::new(InMemoryGraph::default());

    let scope = ScopeEnforcer::new(ScopeConfig::from_patterns(
        &input.allowed_scope,
        &input.excluded_scope,
    ));
    let budget = sentryai::budget::BudgetEnforcer::new(input.budget.clone(), &input.mission_id);

    let activities = Activities::new(
        &input.mission_id,
        journal,
        GuardrailLoop::new(provider, Arc::clone(&registry)),
        ToolDispatcher::new(Arc::clone(&registry), runner),
        sink,
        Arc::new(IntegrationHub::new(IntegrationConfig::default())),
        Arc::clone(&graph) as Arc<dyn sentryai::adapters::GraphStore>,
    );

    let (workflow, control) =
        MissionWorkflow::new(input, scope, budget, activities, registry);
    let handle = tokio::spawn(workflow.run());

    Harness {
        dirs: vec![registry_dir, db_dir],
        control,
        handle,
        fabric,
        graph,
    }
}

/// JSON for a plan whose steps run `httpx` against the given targets.
pub fn plan_json(targets: &[&str]) -> String {
    let steps: Vec<serde_json::Value> = targets
        .iter()
        .enumerate()
        .map(|(i, target)| {
            serde_json::json!({
                "id": i.saturating_add(1),
                "title": format!("Probe {target}"),
                "description": "HTTP probe",
                "risk": "low",
                "can_skip": false,
                "depends_on": [],
                "tool": {
                    "tool_name": "httpx",
                    "arguments": { "target": *target, "silent": true, "json": true },
                    "target": *target,
                    "rationale": "check liveness",
                    "expected_output": "probe records",
                    "timeout_seconds": 60
                }
            })
        })
        .collect();

    serde_json::json!({
        "plan_id": "plan-1",
        "objective": "find XSS",
        "estimated_duration_minutes": 5,
        "estimated_cost_usd": 0.05,
        "steps": steps,
    })
    .to_string()
}

/// JSON for a three-step plan: one nuclei scan, then two httpx probes.
pub fn mixed_plan_json(target: &str) -> String {
    serde_json::json!({
        "plan_id": "plan-mixed",
        "objective": "find XSS",
        "steps": [
            {
                "id": 1,
                "title": "Scan for XSS",
                "description": "Template scan",
                "risk": "medium",
                "can_skip": false,
                "depends_on": [],
                "tool": {
                    "tool_name": "nuclei",
                    "arguments": { "url": target, "tags": ["xss"], "jsonl": true },
                    "target": target,
                    "rationale": "look for XSS",
                    "expected_output": "findings",
                    "timeout_seconds": 60
                }
            },
            {
                "id": 2,
                "title": "Probe",
                "description": "HTTP probe",
                "risk": "low",
                "can_skip": true,
                "depends_on": [1],
                "tool": {
                    "tool_name": "httpx",
                    "arguments": { "target": target, "silent": true, "json": true },
                    "target": target,
                    "rationale": "check liveness",
                    "expected_output": "probe records",
                    "timeout_seconds": 60
                }
            },
            {
                "id": 3,
                "title": "Probe again",
                "description": "HTTP probe",
                "risk": "low",
                "can_skip": true,
                "depends_on": [2],
                "tool": {
                    "tool_name": "httpx",
                    "arguments": { "target": target, "silent": true, "json": true },
                    "target": target,
                    "rationale": "confirm liveness",
                    "expected_output": "probe records",
                    "timeout_seconds": 60
                }
            }
        ],
    })
    .to_string()
}

/// JSON for a plan of `count` identical nuclei steps against one target.
pub fn repetitive_plan_json(target: &str, count: usize) -> String {
    let steps: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "id": i.saturating_add(1),
                "title": "Scan for XSS",
                "description": "Template scan",
                "risk": "medium",
                "can_skip": false,
                "depends_on": [],
                "tool": {
                    "tool_name": "nuclei",
                    "arguments": { "url": target, "tags": ["xss"], "jsonl": true },
                    "target": target,
                    "rationale": "look for XSS",
                    "expected_output": "findings",
                    "timeout_seconds": 60
                }
            })
        })
        .collect();

    serde_json::json!({
        "plan_id": "plan-loop",
        "objective": "find XSS",
        "steps": steps,
    })
    .to_string()
}

/// JSON for a terminal reflection step with no tool call.
pub fn reflection_json() -> String {
    serde_json::json!({
        "thought": "objective satisfied",
        "reasoning": "all planned steps executed",
        "tool_call": null,
        "status_update": "done",
        "is_complete": true,
        "findings": []
    })
    .to_string()
}

/// One nuclei JSONL record that maps to a finding.
pub fn nuclei_record(target: &str) -> String {
    serde_json::json!({
        "template-id": "reflected-xss",
        "info": {
            "name": "Reflected XSS",
            "severity": "high",
            "description": "Parameter echoes unsanitized input"
        },
        "matched-at": format!("https://{target}/search?q=test"),
        "host": target,
    })
    .to_string()
}

/// Wait (bounded) until the mission snapshot satisfies a predicate.
pub async fn wait_for_snapshot(
    control: &mut MissionControl,
    predicate: impl Fn(&sentryai::mission::StatusSnapshot) -> bool,
) {
    let deadline = Duration::from_secs(10);
    let wait = async {
        loop {
            if predicate(&control.status_rx.borrow().clone()) {
                break;
            }
            if control.status_rx.changed().await.is_err() {
                break;
            }
        }
    };
    tokio::time::timeout(deadline, wait)
        .await
        .expect("snapshot condition within deadline");
}

/// Wait (bounded) for the next fabric frame matching a predicate.
pub async fn wait_for_frame(
    rx: &mut tokio::sync::mpsc::Receiver<Frame>,
    predicate: impl Fn(&Frame) -> bool,
) -> Frame {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await {
                Some(frame) if predicate(&frame) => return frame,
                Some(_) => continue,
                None => panic!("fabric stream closed before expected frame"),
            }
        }
    })
    .await
    .expect("frame within deadline")
}
