//! The mission workflow: the durable orchestrator.
//!
//! One workflow instance drives one mission through plan → approval →
//! execution → terminal status, consulting the budget enforcer before every
//! step, the scope enforcer before every tool invocation, and emitting
//! progress through the event fabric. The body is deterministic; all side
//! effects run as journaled activities, so a restarted process replays to
//! the same state.
//!
//! External control arrives as signals through an explicit dispatch table
//! (`approve_plan`, `pause`, `resume`, `kill`); reads are served from a
//! `watch` snapshot and never mutate.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::budget::{BudgetAlert, BudgetEnforcer, BudgetStatusSnapshot, BudgetStop, BudgetViolation};
use crate::integrations::IntegrationEvent;
use crate::scope::ScopeEnforcer;
use crate::tools::ToolExecution;
use crate::types::{
    Event, EventTopic, ExecutionPlan, Finding, MissionStatus, PlanStep, ScanInput, ScanOutput,
};

use super::activities::{Activities, ActivityOutcome};

/// How many recent step summaries are carried into the agent prompt.
const RECENT_STEP_CONTEXT: usize = 10;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Internal workflow phase; a refinement of [`MissionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    /// Created, not yet started.
    Pending,
    /// Generating the execution plan.
    Planning,
    /// Plan proposed; waiting for an approval signal.
    AwaitingApproval,
    /// Executing approved steps.
    Executing,
    /// Suspended; waiting for resume or kill.
    Paused,
    /// Terminal: all approved steps done.
    Completed,
    /// Terminal: killed by signal.
    Killed,
    /// Terminal: a budget governor stopped the mission.
    Exhausted,
    /// Terminal: unrecoverable error.
    Failed,
}

impl WorkflowPhase {
    /// Whether the phase is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Killed | Self::Exhausted | Self::Failed
        )
    }

    /// The externally visible status for this phase.
    pub fn to_status(self) -> MissionStatus {
        match self {
            Self::Pending => MissionStatus::Pending,
            Self::Planning | Self::AwaitingApproval | Self::Executing => MissionStatus::Running,
            Self::Paused => MissionStatus::Paused,
            Self::Completed => MissionStatus::Completed,
            Self::Killed => MissionStatus::Killed,
            Self::Exhausted => MissionStatus::Exhausted,
            Self::Failed => MissionStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// External control signals accepted by a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum MissionSignal {
    /// Approve a set of plan steps. Last write wins until execution begins;
    /// ignored afterwards.
    ApprovePlan {
        /// Plan the approval refers to (informational).
        plan_id: Option<String>,
        /// Step ids approved for execution.
        step_ids: Vec<u32>,
    },
    /// Suspend execution before the next step.
    Pause,
    /// Resume a paused mission.
    Resume,
    /// Hard-kill the mission.
    Kill {
        /// Reason recorded on the mission.
        reason: String,
    },
}

/// Failure to decode an external signal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalParseError {
    /// The signal name is not in the dispatch table.
    #[error("unknown signal: {0}")]
    Unknown(String),
    /// The payload did not match the signal's expected shape.
    #[error("invalid payload for signal {signal}: {detail}")]
    InvalidPayload {
        /// The signal being decoded.
        signal: String,
        /// What was wrong.
        detail: String,
    },
}

/// Decode a named signal with its payload.
///
/// The dispatch table is explicit: one arm per signal name, typed payloads.
///
/// # Errors
///
/// Returns [`SignalParseError`] for unknown names or malformed payloads.
pub fn parse_signal(
    name: &str,
    data: &serde_json::Value,
) -> Result<MissionSignal, SignalParseError> {
    match name {
        "approve_plan" => {
            let step_ids = data
                .get("approved_steps")
                .and_then(serde_json::Value::as_array)
                .ok_or_else(|| SignalParseError::InvalidPayload {
                    signal: name.to_owned(),
                    detail: "approved_steps must be an array of step ids".to_owned(),
                })?
                .iter()
                .filter_map(serde_json::Value::as_u64)
                .filter_map(|id| u32::try_from(id).ok())
                .collect();
            let plan_id = data
                .get("plan_id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned);
            Ok(MissionSignal::ApprovePlan { plan_id, step_ids })
        }
        "pause" => Ok(MissionSignal::Pause),
        "resume" => Ok(MissionSignal::Resume),
        "kill" => {
            let reason = data
                .get("reason")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("user requested termination")
                .to_owned();
            Ok(MissionSignal::Kill { reason })
        }
        other => Err(SignalParseError::Unknown(other.to_owned())),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Read-only snapshot served to `status()` and `findings()` queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Mission identifier.
    pub mission_id: String,
    /// Current workflow phase.
    pub phase: WorkflowPhase,
    /// Externally visible status.
    pub status: MissionStatus,
    /// Whether the mission is paused.
    pub is_paused: bool,
    /// Whether the mission has been killed.
    pub is_killed: bool,
    /// Budget consumption, once initialized.
    pub budget: Option<BudgetStatusSnapshot>,
    /// The proposed plan, once generated.
    pub plan: Option<ExecutionPlan>,
    /// Approved step ids.
    pub approved_steps: Vec<u32>,
    /// Findings collected so far.
    pub findings: Vec<Finding>,
    /// Terminal error message, when present.
    pub error_message: Option<String>,
}

impl StatusSnapshot {
    /// Initial snapshot for a mission that has not started.
    pub fn initial(mission_id: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            phase: WorkflowPhase::Pending,
            status: MissionStatus::Pending,
            is_paused: false,
            is_killed: false,
            budget: None,
            plan: None,
            approved_steps: Vec::new(),
            findings: Vec::new(),
            error_message: None,
        }
    }
}

/// Control handle held by the mission manager.
#[derive(Debug, Clone)]
pub struct MissionControl {
    /// Signal injection endpoint.
    pub signal_tx: mpsc::UnboundedSender<MissionSignal>,
    /// Query endpoint (read-only snapshots).
    pub status_rx: watch::Receiver<StatusSnapshot>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Approval bookkeeping (kept apart from the budget so signal handling can
/// borrow them independently while an activity is in flight).
#[derive(Debug, Default)]
struct ApprovalState {
    steps: Vec<u32>,
    received: bool,
}

/// Apply one signal to the control state. Runs inline at suspension points
/// and between steps; never suspends.
fn apply_signal(
    budget: &mut BudgetEnforcer,
    approval: &mut ApprovalState,
    execution_started: bool,
    signal: MissionSignal,
) {
    match signal {
        MissionSignal::ApprovePlan { step_ids, .. } => {
            if execution_started {
                debug!("ignoring approve_plan after execution start");
            } else {
                approval.steps = step_ids;
                approval.received = true;
            }
        }
        MissionSignal::Pause => budget.pause(),
        MissionSignal::Resume => budget.resume(),
        MissionSignal::Kill { reason } => budget.kill(reason),
    }
}

/// Outcome of driving one step's tool execution to completion.
enum StepOutcome {
    /// Tool ran and exited cleanly.
    Success(Box<ToolExecution>),
    /// Step failed terminally; the mission continues.
    StepFailed(String),
    /// A kill signal was observed.
    Killed,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A running mission's orchestrator.
pub struct MissionWorkflow {
    input: ScanInput,
    scope: ScopeEnforcer,
    budget: BudgetEnforcer,
    activities: Activities,
    registry: std::sync::Arc<crate::tools::ToolRegistry>,
    signal_rx: mpsc::UnboundedReceiver<MissionSignal>,
    status_tx: watch::Sender<StatusSnapshot>,
    phase: WorkflowPhase,
    plan: Option<ExecutionPlan>,
    approval: ApprovalState,
    execution_started: bool,
    findings: Vec<Finding>,
    recent_steps: Vec<String>,
    error_message: Option<String>,
    started: Instant,
}

impl std::fmt::Debug for MissionWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionWorkflow")
            .field("mission_id", &self.input.mission_id)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl MissionWorkflow {
    /// Build a workflow and its control handle.
    pub fn new(
        input: ScanInput,
        scope: ScopeEnforcer,
        budget: BudgetEnforcer,
        activities: Activities,
        registry: std::sync::Arc<crate::tools::ToolRegistry>,
    ) -> (Self, MissionControl) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::initial(&input.mission_id));

        let workflow = Self {
            input,
            scope,
            budget,
            activities,
            registry,
            signal_rx,
            status_tx,
            phase: WorkflowPhase::Pending,
            plan: None,
            approval: ApprovalState::default(),
            execution_started: false,
            findings: Vec::new(),
            recent_steps: Vec::new(),
            error_message: None,
            started: Instant::now(),
        };

        (workflow, MissionControl { signal_tx, status_rx })
    }

    /// Drive the mission to a terminal status.
    pub async fn run(mut self) -> ScanOutput {
        info!(mission_id = %self.input.mission_id, objective = %self.input.objective, "mission started");
        self.started = Instant::now();

        // Phase 1: plan.
        self.enter_phase(WorkflowPhase::Planning).await;

        let ctx = self.prompt_context();
        let planned = match self.activities.generate_plan(&ctx).await {
            Ok(planned) => planned,
            Err(e) => {
                return self
                    .finish(WorkflowPhase::Failed, Some(format!("plan generation failed: {e}")))
                    .await;
            }
        };

        let alerts = self.budget.add_cost(planned.cost_usd);
        if self.handle_alerts(alerts).await {
            return self
                .finish(WorkflowPhase::Failed, Some("loop detected".to_owned()))
                .await;
        }

        let plan_payload = serde_json::to_value(&planned.plan).unwrap_or_default();
        self.plan = Some(planned.plan);
        self.activities
            .emit_event(Event::now(
                &self.input.mission_id,
                EventTopic::PlanProposal,
                "plan_proposal",
                plan_payload,
            ))
            .await;

        // Phase 2: approval (auto-pilot self-approves every step).
        if self.input.auto_pilot {
            self.approval.steps = self
                .plan
                .as_ref()
                .map(|p| p.steps.iter().map(|s| s.id).collect())
                .unwrap_or_default();
            self.approval.received = true;
        } else {
            self.enter_phase(WorkflowPhase::AwaitingApproval).await;
            if let Some(output) = self.await_approval().await {
                return output;
            }
        }

        if self.budget.state.killed {
            return self.finish(WorkflowPhase::Killed, self.budget.state.kill_reason.clone()).await;
        }

        // Phase 3: execute.
        self.execution_started = true;
        self.enter_phase(WorkflowPhase::Executing).await;

        let steps = self
            .plan
            .as_ref()
            .map(|p| p.steps.clone())
            .unwrap_or_default();

        for step in steps {
            self.drain_signals();

            if self.budget.state.killed {
                return self
                    .finish(WorkflowPhase::Killed, self.budget.state.kill_reason.clone())
                    .await;
            }

            if self.budget.state.paused {
                if let Some(output) = self.await_resume().await {
                    return output;
                }
            }

            if !self.approval.steps.contains(&step.id) {
                debug!(step_id = step.id, "step not approved; skipping");
                continue;
            }

            // Budget gate.
            if let Err(stop) = self.budget.check_can_proceed() {
                return match stop {
                    BudgetStop::Killed { reason } => {
                        self.finish(WorkflowPhase::Killed, Some(reason)).await
                    }
                    other => {
                        self.finish(WorkflowPhase::Exhausted, Some(other.to_string())).await
                    }
                };
            }

            self.activities
                .emit_event(Event::now(
                    &self.input.mission_id,
                    EventTopic::StepBegin,
                    "step_begin",
                    serde_json::json!({
                        "step_id": step.id,
                        "title": step.title,
                        "tool": step.tool.tool_name,
                        "target": step.tool.target,
                    }),
                ))
                .await;

            // Scope gate: violation skips the step, mission continues.
            if let Err(violation) = self
                .scope
                .validate_tool_call(&step.tool.tool_name, &step.tool.arguments_value())
            {
                warn!(step_id = step.id, error = %violation, "step blocked by scope");
                self.activities
                    .emit_event(Event::now(
                        &self.input.mission_id,
                        EventTopic::ScopeViolation,
                        "scope_violation",
                        serde_json::json!({
                            "step_id": step.id,
                            "reason": violation.to_string(),
                        }),
                    ))
                    .await;
                continue;
            }

            // Execute under the watchdog, honoring retries and kill.
            match self.run_step_tool(&step).await {
                StepOutcome::Killed => {
                    return self
                        .finish(WorkflowPhase::Killed, self.budget.state.kill_reason.clone())
                        .await;
                }
                StepOutcome::StepFailed(message) => {
                    self.budget.record_error("step_error", &message);
                    self.push_recent(format!(
                        "step {} ({}) failed: {message}",
                        step.id, step.tool.tool_name
                    ));
                    self.activities
                        .emit_event(Event::now(
                            &self.input.mission_id,
                            EventTopic::StepComplete,
                            "step_error",
                            serde_json::json!({
                                "step_id": step.id,
                                "error": message,
                            }),
                        ))
                        .await;
                    self.publish();
                }
                StepOutcome::Success(execution) => {
                    if let Some(output) = self.record_step_success(&step, *execution).await {
                        return output;
                    }
                }
            }
        }

        // Optional reflection turn over the executed steps.
        self.run_reflection().await;

        self.finish(WorkflowPhase::Completed, None).await
    }

    // -- per-step execution -------------------------------------------------

    /// Drive one tool activity to completion, retrying transient failures
    /// within the per-target cap and observing kill at the suspension point.
    async fn run_step_tool(&mut self, step: &PlanStep) -> StepOutcome {
        loop {
            let outcome = {
                let mut fut =
                    Box::pin(self.activities.execute_tool(&step.tool, &self.scope));
                loop {
                    tokio::select! {
                        outcome = &mut fut => break outcome,
                        signal = self.signal_rx.recv() => {
                            match signal {
                                Some(signal) => {
                                    apply_signal(
                                        &mut self.budget,
                                        &mut self.approval,
                                        self.execution_started,
                                        signal,
                                    );
                                    if self.budget.state.killed {
                                        // Cancel the in-flight activity.
                                        return StepOutcome::Killed;
                                    }
                                }
                                None => {
                                    self.budget.kill("signal channel closed");
                                    return StepOutcome::Killed;
                                }
                            }
                        }
                    }
                }
            };

            match outcome {
                ActivityOutcome::Ok { value } if !value.failed() => {
                    return StepOutcome::Success(Box::new(value));
                }
                ActivityOutcome::Ok { value } => {
                    let detail = failure_detail(&value);
                    self.budget.record_error("tool_failure", &detail);
                    if value.retryable_failure && self.budget.record_retry(&step.tool.target) {
                        debug!(step_id = step.id, "retrying transient tool failure");
                        continue;
                    }
                    return StepOutcome::StepFailed(detail);
                }
                ActivityOutcome::Err { message, retryable } => {
                    self.budget.record_error("dispatch_error", &message);
                    if retryable && self.budget.record_retry(&step.tool.target) {
                        debug!(step_id = step.id, "retrying transient dispatch failure");
                        continue;
                    }
                    return StepOutcome::StepFailed(message);
                }
            }
        }
    }

    /// Account, publish, and collect findings for a successful step.
    ///
    /// Returns a terminal output when a loop-detection alert aborts the
    /// mission.
    async fn record_step_success(
        &mut self,
        step: &PlanStep,
        execution: ToolExecution,
    ) -> Option<ScanOutput> {
        let alerts = self.budget.record_action(
            &step.tool.tool_name,
            &step.tool.target,
            &step.tool.arguments_value(),
            0.0,
        );
        if self.handle_alerts(alerts).await {
            return Some(
                self.finish(WorkflowPhase::Failed, Some("loop detected".to_owned()))
                    .await,
            );
        }

        for mut finding in execution.findings.clone() {
            finding.step_id = Some(step.id);
            finding.mission_id = Some(self.input.mission_id.clone());

            self.activities
                .emit_event(Event::now(
                    &self.input.mission_id,
                    EventTopic::Finding,
                    finding.severity.as_str(),
                    serde_json::to_value(&finding).unwrap_or_default(),
                ))
                .await;

            if self.input.notify_on_finding {
                self.activities.notify_finding(&finding).await;
            }

            self.activities.record_finding_edge(&finding).await;
            self.activities
                .emit_event(Event::now(
                    &self.input.mission_id,
                    EventTopic::GraphUpdate,
                    "edge_added",
                    serde_json::json!({
                        "from": finding.affected_asset,
                        "to": finding.id,
                        "relation": "has_finding",
                    }),
                ))
                .await;

            self.findings.push(finding);
        }

        // Discovered assets feed the mission's graph scope.
        let assets = extract_asset_keys(&execution.records);
        if !assets.is_empty() && execution.category != "vulnerability" {
            let written = self.activities.record_assets("host", &assets).await;
            if written > 0 {
                self.activities
                    .emit_event(Event::now(
                        &self.input.mission_id,
                        EventTopic::GraphUpdate,
                        "node_added",
                        serde_json::json!({
                            "step_id": step.id,
                            "count": written,
                        }),
                    ))
                    .await;
            }
        }

        self.push_recent(format!(
            "step {} ({} on {}) completed with {} findings",
            step.id,
            step.tool.tool_name,
            step.tool.target,
            execution.findings.len()
        ));

        self.activities
            .emit_event(Event::now(
                &self.input.mission_id,
                EventTopic::StepComplete,
                "step_complete",
                serde_json::json!({
                    "step_id": step.id,
                    "exit_code": execution.exit_code,
                    "duration_seconds": execution.duration_seconds,
                    "findings": execution.findings.len(),
                }),
            ))
            .await;

        self.publish();
        None
    }

    /// One reflection turn over the mission's observations. Best-effort:
    /// provider failures are logged and ignored.
    async fn run_reflection(&mut self) {
        let observation = if self.recent_steps.is_empty() {
            "no steps were executed".to_owned()
        } else {
            self.recent_steps.join("\n")
        };

        let ctx = self.prompt_context();
        match self.activities.reflect(&ctx, &observation).await {
            Ok(reflection) => {
                let alerts = self.budget.add_cost(reflection.cost_usd);
                // Warnings only at this point; the mission is closing out.
                let _ = self.handle_alerts(alerts).await;

                self.activities
                    .emit_event(Event::now(
                        &self.input.mission_id,
                        EventTopic::AgentThought,
                        "reflection",
                        serde_json::json!({
                            "thought": reflection.step.thought,
                            "status_update": reflection.step.status_update,
                        }),
                    ))
                    .await;

                for mut finding in reflection.step.findings {
                    finding.mission_id = Some(self.input.mission_id.clone());
                    self.activities
                        .emit_event(Event::now(
                            &self.input.mission_id,
                            EventTopic::Finding,
                            finding.severity.as_str(),
                            serde_json::to_value(&finding).unwrap_or_default(),
                        ))
                        .await;
                    if self.input.notify_on_finding {
                        self.activities.notify_finding(&finding).await;
                    }
                    self.activities.record_finding_edge(&finding).await;
                    self.findings.push(finding);
                }
            }
            Err(e) => {
                warn!(mission_id = %self.input.mission_id, error = %e, "reflection skipped");
            }
        }
    }

    // -- suspension points --------------------------------------------------

    /// Wait for an approval (or kill) signal, bounded by the idle budget.
    ///
    /// Returns a terminal output when the wait itself ends the mission.
    async fn await_approval(&mut self) -> Option<ScanOutput> {
        let idle_cap = Duration::from_secs(u64::from(self.budget.budget.max_idle_seconds));

        while !self.approval.received && !self.budget.state.killed {
            tokio::select! {
                signal = self.signal_rx.recv() => {
                    match signal {
                        Some(signal) => {
                            apply_signal(
                                &mut self.budget,
                                &mut self.approval,
                                self.execution_started,
                                signal,
                            );
                            // Apply any queued re-approvals too: last write
                            // wins on the approved set before execution.
                            self.drain_signals();
                        }
                        None => {
                            return Some(
                                self.finish(
                                    WorkflowPhase::Failed,
                                    Some("signal channel closed".to_owned()),
                                )
                                .await,
                            );
                        }
                    }
                }
                () = tokio::time::sleep(idle_cap) => {
                    return Some(
                        self.finish(
                            WorkflowPhase::Exhausted,
                            Some(format!(
                                "no approval within idle budget ({}s)",
                                self.budget.budget.max_idle_seconds
                            )),
                        )
                        .await,
                    );
                }
            }
        }
        None
    }

    /// Wait while paused, bounded by the idle budget.
    async fn await_resume(&mut self) -> Option<ScanOutput> {
        self.enter_phase(WorkflowPhase::Paused).await;
        let idle_cap = Duration::from_secs(u64::from(self.budget.budget.max_idle_seconds));

        while self.budget.state.paused && !self.budget.state.killed {
            tokio::select! {
                signal = self.signal_rx.recv() => {
                    match signal {
                        Some(signal) => apply_signal(
                            &mut self.budget,
                            &mut self.approval,
                            self.execution_started,
                            signal,
                        ),
                        None => {
                            return Some(
                                self.finish(
                                    WorkflowPhase::Failed,
                                    Some("signal channel closed".to_owned()),
                                )
                                .await,
                            );
                        }
                    }
                }
                () = tokio::time::sleep(idle_cap) => {
                    return Some(
                        self.finish(
                            WorkflowPhase::Exhausted,
                            Some(format!(
                                "paused past idle budget ({}s)",
                                self.budget.budget.max_idle_seconds
                            )),
                        )
                        .await,
                    );
                }
            }
        }

        if self.budget.state.killed {
            return Some(
                self.finish(WorkflowPhase::Killed, self.budget.state.kill_reason.clone())
                    .await,
            );
        }

        self.enter_phase(WorkflowPhase::Executing).await;
        None
    }

    /// Apply any queued signals without suspending.
    fn drain_signals(&mut self) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            apply_signal(
                &mut self.budget,
                &mut self.approval,
                self.execution_started,
                signal,
            );
        }
    }

    // -- bookkeeping --------------------------------------------------------

    /// Emit budget alerts; returns `true` when a loop-detection alert should
    /// abort the mission (detection fired and the policy did not pause).
    async fn handle_alerts(&mut self, alerts: Vec<BudgetAlert>) -> bool {
        let mut abort = false;
        for alert in alerts {
            self.activities
                .emit_event(Event::now(
                    &self.input.mission_id,
                    EventTopic::BudgetWarning,
                    alert.violation.as_str(),
                    serde_json::json!({ "detail": alert.detail }),
                ))
                .await;

            if alert.violation == BudgetViolation::LoopDetected && !self.budget.state.paused {
                abort = true;
            }
        }
        abort
    }

    /// Transition phases, publishing the snapshot and a status event.
    async fn enter_phase(&mut self, phase: WorkflowPhase) {
        self.phase = phase;
        self.publish();
        self.activities
            .emit_event(Event::now(
                &self.input.mission_id,
                EventTopic::Status,
                self.phase.to_status().as_str(),
                serde_json::json!({ "phase": phase }),
            ))
            .await;
    }

    /// Close the mission with a terminal phase.
    async fn finish(&mut self, phase: WorkflowPhase, error_message: Option<String>) -> ScanOutput {
        self.phase = phase;
        self.error_message = error_message.clone();
        let status = phase.to_status();

        self.activities
            .emit_event(Event::now(
                &self.input.mission_id,
                EventTopic::Status,
                status.as_str(),
                serde_json::json!({
                    "phase": phase,
                    "error_message": error_message,
                }),
            ))
            .await;

        let output = ScanOutput {
            mission_id: self.input.mission_id.clone(),
            status,
            findings: self.findings.clone(),
            steps_taken: self.budget.state.steps_taken,
            cost_usd: self.budget.state.total_cost_usd,
            runtime_seconds: self.started.elapsed().as_secs_f64(),
            error_message,
        };

        let lifecycle = match status {
            MissionStatus::Completed => Some(IntegrationEvent::ScanComplete),
            MissionStatus::Failed => Some(IntegrationEvent::ScanFailed),
            _ => None,
        };
        if let Some(event) = lifecycle {
            let payload = serde_json::to_value(&output).unwrap_or_default();
            self.activities.notify_scan(event, payload).await;
        }

        self.activities.finalize().await;
        self.publish();

        info!(
            mission_id = %self.input.mission_id,
            status = status.as_str(),
            steps = output.steps_taken,
            findings = output.findings.len(),
            "mission finished"
        );
        output
    }

    /// Publish the current snapshot to query readers.
    fn publish(&self) {
        let snapshot = StatusSnapshot {
            mission_id: self.input.mission_id.clone(),
            phase: self.phase,
            status: self.phase.to_status(),
            is_paused: self.budget.state.paused,
            is_killed: self.budget.state.killed,
            budget: Some(self.budget.status()),
            plan: self.plan.clone(),
            approved_steps: self.approval.steps.clone(),
            findings: self.findings.clone(),
            error_message: self.error_message.clone(),
        };
        let _ = self.status_tx.send(snapshot);
    }

    /// Append a step summary for the agent's memory context.
    fn push_recent(&mut self, summary: String) {
        if self.recent_steps.len() >= RECENT_STEP_CONTEXT {
            self.recent_steps.remove(0);
        }
        self.recent_steps.push(summary);
    }

    /// Compose the prompt context for agent turns.
    fn prompt_context(&self) -> crate::agent::PromptContext {
        let status = self.budget.status();
        crate::agent::PromptContext {
            objective: self.input.objective.clone(),
            targets: self.input.targets.clone(),
            allowed_scope: self.input.allowed_scope.clone(),
            excluded_scope: self.input.excluded_scope.clone(),
            budget_summary: format!(
                "steps {}/{}, cost ${:.2}/${:.2}, runtime {:.1}/{} minutes",
                self.budget.state.steps_taken,
                self.budget.budget.max_steps,
                self.budget.state.total_cost_usd,
                self.budget.budget.max_cost_usd,
                status.time.used,
                self.budget.budget.max_runtime_minutes,
            ),
            tool_definitions: self.registry.agent_definitions(),
            recent_steps: self.recent_steps.clone(),
        }
    }
}

/// Pull asset identifiers (host/ip/url fields) out of parsed tool records.
fn extract_asset_keys(records: &serde_json::Value) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(items) = records.as_array() {
        for record in items {
            for field in ["host", "ip", "url"] {
                if let Some(value) = record.get(field).and_then(serde_json::Value::as_str) {
                    if !keys.iter().any(|k| k == value) {
                        keys.push(value.to_owned());
                    }
                }
            }
        }
    }
    keys
}

/// Failure description for a completed-but-failed tool run.
fn failure_detail(execution: &ToolExecution) -> String {
    if execution.timed_out {
        format!("{} timed out", execution.tool_name)
    } else {
        let stderr: String = execution.stderr.chars().take(200).collect();
        format!(
            "{} exited with code {:?}: {stderr}",
            execution.tool_name, execution.exit_code
        )
    }
}
