//! Core data model shared across the mission execution core.
//!
//! Every object that crosses a process or wire boundary lives here as a
//! strictly-decoded type: agent-originated shapes refuse unknown fields so a
//! malformed or hallucinated payload fails at the decoder, not deep inside
//! the workflow.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tenancy
// ---------------------------------------------------------------------------

/// Opaque tenant namespace plumbed through the event fabric and dispatcher.
///
/// The core does not interpret these values; they only scope external
/// resources (pub/sub channels, container labels).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Namespace prefix for external resources.
    pub namespace: String,
}

impl TenantContext {
    /// A single-tenant default context.
    pub fn single() -> Self {
        Self {
            tenant_id: "default".to_owned(),
            namespace: "sentry".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Mission status
// ---------------------------------------------------------------------------

/// Externally visible mission status (persisted on the mission row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Created, not yet running.
    Pending,
    /// Workflow is planning or executing.
    Running,
    /// Suspended awaiting human intervention.
    Paused,
    /// All approved steps executed.
    Completed,
    /// Operator or policy kill.
    Killed,
    /// A budget governor stopped the mission.
    Exhausted,
    /// Unrecoverable error.
    Failed,
}

impl MissionStatus {
    /// Whether this status is terminal (the mission row becomes read-only).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Killed | Self::Exhausted | Self::Failed
        )
    }

    /// Stable wire string for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Killed => "killed",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "killed" => Ok(Self::Killed),
            "exhausted" => Ok(Self::Exhausted),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mission status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Finding severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational observation.
    Info,
    /// Low impact.
    Low,
    /// Medium impact.
    Medium,
    /// High impact.
    High,
    /// Critical impact.
    Critical,
}

impl Severity {
    /// Stable wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Assessed likelihood that a finding is a false positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalsePositiveLikelihood {
    /// Unlikely to be a false positive.
    Low,
    /// Possibly a false positive.
    Medium,
    /// Likely a false positive.
    High,
}

/// A security finding produced by a mission step.
///
/// Findings are append-only within a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Finding {
    /// Finding identifier.
    pub id: String,
    /// Severity classification.
    pub severity: Severity,
    /// Short title.
    pub title: String,
    /// Full description.
    pub description: String,
    /// The asset the finding applies to.
    pub affected_asset: String,
    /// Raw evidence captured from tool output.
    #[serde(default)]
    pub evidence: Option<String>,
    /// Steps to reproduce.
    #[serde(default)]
    pub reproduction_steps: Option<String>,
    /// Suggested remediation.
    #[serde(default)]
    pub remediation: Option<String>,
    /// CWE identifier, when known.
    #[serde(default)]
    pub cwe: Option<String>,
    /// CVSS score, when known.
    #[serde(default)]
    pub cvss: Option<f64>,
    /// Confidence in [0, 1].
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// False-positive likelihood assessment.
    #[serde(default = "default_fp_likelihood")]
    pub false_positive_likelihood: FalsePositiveLikelihood,
    /// Plan step that produced the finding (filled in by the workflow).
    #[serde(default)]
    pub step_id: Option<u32>,
    /// Owning mission (filled in by the workflow).
    #[serde(default)]
    pub mission_id: Option<String>,
}

fn default_confidence() -> f64 {
    0.5
}

fn default_fp_likelihood() -> FalsePositiveLikelihood {
    FalsePositiveLikelihood::Medium
}

// ---------------------------------------------------------------------------
// Plans and tool calls
// ---------------------------------------------------------------------------

/// Risk classification for a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Passive or read-only activity.
    Low,
    /// Active probing.
    Medium,
    /// Potentially disruptive activity.
    High,
}

/// A structured tool invocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    /// Name of the tool; must resolve in the registry.
    pub tool_name: String,
    /// Arguments matching the tool schema.
    pub arguments: BTreeMap<String, serde_json::Value>,
    /// The mission target this invocation addresses.
    pub target: String,
    /// Why the agent chose this invocation.
    #[serde(default)]
    pub rationale: Option<String>,
    /// What the agent expects to learn.
    #[serde(default)]
    pub expected_output: Option<String>,
    /// Requested timeout in seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_seconds: u64,
}

fn default_tool_timeout() -> u64 {
    300
}

impl ToolCall {
    /// Arguments as a JSON object value (for scope extraction and hashing).
    pub fn arguments_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.arguments).unwrap_or(serde_json::Value::Null)
    }
}

/// One step of an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanStep {
    /// Step id; dense and monotonically increasing from 1.
    pub id: u32,
    /// Short title.
    pub title: String,
    /// What the step does and why.
    pub description: String,
    /// Risk classification.
    pub risk: RiskLevel,
    /// Whether the step may be skipped without aborting the mission.
    #[serde(default)]
    pub can_skip: bool,
    /// The tool invocation this step performs.
    pub tool: ToolCall,
    /// Ids of steps this one depends on; all must be smaller than `id`.
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

/// An ordered execution plan proposed by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionPlan {
    /// Plan identifier.
    pub plan_id: String,
    /// Echo of the mission objective the plan addresses.
    pub objective: String,
    /// Estimated duration in minutes.
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    /// Estimated cost in USD.
    #[serde(default)]
    pub estimated_cost_usd: Option<f64>,
    /// Ordered plan steps.
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Validate plan structure: ids dense from 1, dependencies point
    /// backwards, and every step target is one of the declared mission
    /// targets.
    ///
    /// # Errors
    ///
    /// Returns a description of the first structural violation.
    pub fn validate_structure(&self, mission_targets: &[String]) -> Result<(), String> {
        for (index, step) in self.steps.iter().enumerate() {
            let expected = u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX);
            if step.id != expected {
                return Err(format!(
                    "step ids must be dense from 1: position {index} has id {}",
                    step.id
                ));
            }
            if let Some(dep) = step.depends_on.iter().find(|d| **d >= step.id) {
                return Err(format!(
                    "step {} depends on {dep}, which is not an earlier step",
                    step.id
                ));
            }
            let target = step.tool.target.to_lowercase();
            if !mission_targets.iter().any(|t| t.to_lowercase() == target) {
                return Err(format!(
                    "step {} targets '{}' which is not a declared mission target",
                    step.id, step.tool.target
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Agent steps
// ---------------------------------------------------------------------------

/// One reasoning step returned by the agent after the plan turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentStep {
    /// The agent's current thought.
    pub thought: String,
    /// Supporting reasoning.
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Tool invocation to perform next, if any.
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    /// Status line for observers.
    pub status_update: String,
    /// Whether the agent considers the objective complete.
    pub is_complete: bool,
    /// Findings surfaced by this step.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl AgentStep {
    /// The synthesized terminal step used when guardrail retries run out.
    pub fn agent_error() -> Self {
        Self {
            thought: "unable to produce a valid step".to_owned(),
            reasoning: None,
            tool_call: None,
            status_update: "agent error".to_owned(),
            is_complete: true,
            findings: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Topics on which mission events are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// A plan awaiting approval.
    PlanProposal,
    /// A step is starting.
    StepBegin,
    /// A step finished.
    StepComplete,
    /// A step was blocked by the scope enforcer.
    ScopeViolation,
    /// A budget governor raised a warning.
    BudgetWarning,
    /// A new finding.
    Finding,
    /// Mission status change.
    Status,
    /// Agent narration for observers.
    AgentThought,
    /// Asset-graph change.
    GraphUpdate,
}

impl EventTopic {
    /// Stable wire string for the topic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlanProposal => "plan_proposal",
            Self::StepBegin => "step_begin",
            Self::StepComplete => "step_complete",
            Self::ScopeViolation => "scope_violation",
            Self::BudgetWarning => "budget_warning",
            Self::Finding => "finding",
            Self::Status => "status",
            Self::AgentThought => "agent_thought",
            Self::GraphUpdate => "graph_update",
        }
    }
}

/// Envelope for every event leaving the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Originating mission.
    pub mission_id: String,
    /// Topic the event belongs to.
    pub topic: EventTopic,
    /// Event kind within the topic (free-form discriminator).
    pub kind: String,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Topic-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn now(
        mission_id: impl Into<String>,
        topic: EventTopic,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            topic,
            kind: kind.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan input / output
// ---------------------------------------------------------------------------

/// Input for a mission workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanInput {
    /// Mission identifier.
    pub mission_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Requesting user.
    pub user_id: String,
    /// Natural-language objective.
    pub objective: String,
    /// Declared target set (ordered).
    pub targets: Vec<String>,
    /// Allowed scope patterns.
    pub allowed_scope: Vec<String>,
    /// Excluded scope patterns.
    #[serde(default)]
    pub excluded_scope: Vec<String>,
    /// Budget overrides (defaults applied when omitted).
    #[serde(default)]
    pub budget: crate::budget::CognitiveBudget,
    /// Skip human approval and self-approve every step.
    #[serde(default)]
    pub auto_pilot: bool,
    /// Dispatch integrations on each finding.
    #[serde(default = "default_true")]
    pub notify_on_finding: bool,
}

fn default_true() -> bool {
    true
}

/// Output of a completed mission workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// Mission identifier.
    pub mission_id: String,
    /// Terminal status.
    pub status: MissionStatus,
    /// All findings collected.
    pub findings: Vec<Finding>,
    /// Steps consumed.
    pub steps_taken: u32,
    /// Cost consumed in USD.
    pub cost_usd: f64,
    /// Wall-clock runtime in seconds.
    pub runtime_seconds: f64,
    /// Human-readable terminal error, when not completed.
    #[serde(default)]
    pub error_message: Option<String>,
}
