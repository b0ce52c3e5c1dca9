//! Cognitive budgets and loop prevention.
//!
//! Guards every mission against the "loop of death": step caps, cost caps,
//! wall-clock and idle limits, consecutive-error tracking, per-target retry
//! caps, and repetition detection over recent action signatures.
//!
//! The enforcer is mission-local and mutated only from the workflow body;
//! checks and recordings never suspend.

pub mod cost;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Size of the retained action-signature history.
const ACTION_HISTORY_CAPACITY: usize = 50;

/// Argument keys ignored when computing an action signature.
const VOLATILE_KEYS: &[&str] = &["timestamp", "request_id", "session_id"];

/// Fraction of the step budget that triggers a consumption warning.
const STEP_WARNING_RATIO: f64 = 0.9;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Budget configuration for an agent mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveBudget {
    /// Maximum tool invocations for the mission.
    pub max_steps: u32,
    /// Maximum consecutive errors before the mission is stopped.
    pub max_consecutive_errors: u32,
    /// Maximum retries against the same (normalized) target.
    pub max_retries_per_target: u32,
    /// Total API cost limit in USD.
    pub max_cost_usd: f64,
    /// Fraction of the cost budget that triggers a warning.
    pub warning_cost_threshold: f64,
    /// Maximum mission duration in minutes.
    pub max_runtime_minutes: u32,
    /// Maximum idle time between actions in seconds.
    pub max_idle_seconds: u32,
    /// Number of recent actions analyzed for repetition.
    pub loop_detection_window: usize,
    /// Share of identical signatures in the window that flags a loop.
    pub similarity_threshold: f64,
    /// Pause (instead of merely flagging) when a warning fires.
    pub pause_on_warning: bool,
}

impl Default for CognitiveBudget {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_consecutive_errors: 3,
            max_retries_per_target: 3,
            max_cost_usd: 5.0,
            warning_cost_threshold: 0.8,
            max_runtime_minutes: 60,
            max_idle_seconds: 120,
            loop_detection_window: 10,
            similarity_threshold: 0.8,
            pause_on_warning: false,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// One recorded action in the loop-detection history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// 16-char signature digest.
    pub signature: String,
    /// Action type (usually a tool name).
    pub action_type: String,
    /// The action's target.
    pub target: String,
    /// When the action was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Current state of budget consumption.
///
/// Fields are public so the owning workflow (and tests) can inspect and,
/// where needed, reconstruct state during replay.
#[derive(Debug, Clone)]
pub struct BudgetState {
    /// Tool invocations taken so far.
    pub steps_taken: u32,
    /// Accumulated cost in USD.
    pub total_cost_usd: f64,
    /// Total errors encountered.
    pub errors_total: u32,
    /// Errors since the last successful action.
    pub consecutive_errors: u32,
    /// Mission start time.
    pub started_at: DateTime<Utc>,
    /// Timestamp of the most recent action or error.
    pub last_action_at: DateTime<Utc>,
    /// Recent action records for loop detection (bounded).
    pub action_history: VecDeque<ActionRecord>,
    /// Retry counters keyed by normalized target.
    pub retry_counts: HashMap<String, u32>,
    /// Whether the mission is paused.
    pub paused: bool,
    /// Whether the mission has been hard-killed.
    pub killed: bool,
    /// Reason supplied with the kill, if any.
    pub kill_reason: Option<String>,
}

impl Default for BudgetState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            steps_taken: 0,
            total_cost_usd: 0.0,
            errors_total: 0,
            consecutive_errors: 0,
            started_at: now,
            last_action_at: now,
            action_history: VecDeque::with_capacity(ACTION_HISTORY_CAPACITY),
            retry_counts: HashMap::new(),
            paused: false,
            killed: false,
            kill_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stops, violations, alerts
// ---------------------------------------------------------------------------

/// Reason the mission may not proceed with its next action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BudgetStop {
    /// The mission has been hard-killed.
    #[error("mission killed: {reason}")]
    Killed {
        /// Reason supplied with the kill.
        reason: String,
    },
    /// The mission is paused awaiting human intervention.
    #[error("mission is paused - awaiting human intervention")]
    Paused,
    /// Step budget exhausted.
    #[error("step budget exhausted ({used}/{limit})")]
    StepLimit {
        /// Steps taken.
        used: u32,
        /// Configured cap.
        limit: u32,
    },
    /// Cost budget exhausted.
    #[error("cost budget exhausted (${used:.2}/${limit:.2})")]
    CostLimit {
        /// Cost accumulated in USD.
        used: f64,
        /// Configured cap in USD.
        limit: f64,
    },
    /// Wall-clock budget exhausted.
    #[error("time budget exhausted ({elapsed_minutes:.1}/{limit_minutes} minutes)")]
    TimeLimit {
        /// Minutes elapsed since mission start.
        elapsed_minutes: f64,
        /// Configured cap in minutes.
        limit_minutes: u32,
    },
    /// No action recorded for too long.
    #[error("agent idle too long ({idle_seconds:.0}s > {limit_seconds}s)")]
    IdleLimit {
        /// Seconds since the last action.
        idle_seconds: f64,
        /// Configured idle cap in seconds.
        limit_seconds: u32,
    },
    /// Too many consecutive errors.
    #[error("too many consecutive errors ({count})")]
    ConsecutiveErrors {
        /// Current consecutive error count.
        count: u32,
    },
}

/// Classified budget violation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetViolation {
    /// Step cap reached or approaching.
    StepLimit,
    /// Cost cap reached or approaching.
    CostLimit,
    /// Wall-clock cap reached.
    TimeLimit,
    /// Repetitive action pattern detected.
    LoopDetected,
    /// Operator-initiated kill.
    ManualKill,
}

impl BudgetViolation {
    /// Stable wire string for the violation kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepLimit => "step_limit",
            Self::CostLimit => "cost_limit",
            Self::TimeLimit => "time_limit",
            Self::LoopDetected => "loop_detected",
            Self::ManualKill => "manual_kill",
        }
    }
}

/// A violation or warning raised while recording an action.
///
/// The workflow decides what each alert means for the mission; the enforcer
/// only flags (and optionally pauses, per `pause_on_warning`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// What kind of violation fired.
    pub violation: BudgetViolation,
    /// Human-readable detail.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// Consumption snapshot for one budget axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisStatus {
    /// Amount consumed.
    pub used: f64,
    /// Configured limit.
    pub limit: f64,
    /// Remaining headroom (never negative).
    pub remaining: f64,
    /// Consumption percentage (0-100, uncapped above the limit).
    pub percent: f64,
}

impl AxisStatus {
    fn new(used: f64, limit: f64) -> Self {
        let percent = if limit > 0.0 { used / limit * 100.0 } else { 100.0 };
        Self {
            used,
            limit,
            remaining: (limit - used).max(0.0),
            percent,
        }
    }
}

/// Full budget status, surfaced through the workflow `status()` query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatusSnapshot {
    /// Mission identifier.
    pub mission_id: String,
    /// Not killed and not paused.
    pub is_active: bool,
    /// Paused flag.
    pub is_paused: bool,
    /// Killed flag.
    pub is_killed: bool,
    /// Kill reason when killed.
    pub kill_reason: Option<String>,
    /// Step consumption.
    pub steps: AxisStatus,
    /// Cost consumption (USD).
    pub cost: AxisStatus,
    /// Time consumption (minutes).
    pub time: AxisStatus,
    /// Total errors recorded.
    pub errors_total: u32,
    /// Current consecutive error streak.
    pub consecutive_errors: u32,
}

// ---------------------------------------------------------------------------
// Enforcer
// ---------------------------------------------------------------------------

/// Enforces cognitive budgets on mission actions.
///
/// Consult [`check_can_proceed`](Self::check_can_proceed) before every
/// action and record the outcome afterwards with
/// [`record_action`](Self::record_action) or
/// [`record_error`](Self::record_error).
#[derive(Debug, Clone)]
pub struct BudgetEnforcer {
    /// Configured limits.
    pub budget: CognitiveBudget,
    /// Live consumption state.
    pub state: BudgetState,
    mission_id: String,
}

impl BudgetEnforcer {
    /// Create an enforcer for a mission.
    pub fn new(budget: CognitiveBudget, mission_id: impl Into<String>) -> Self {
        Self {
            budget,
            state: BudgetState::default(),
            mission_id: mission_id.into(),
        }
    }

    /// Check whether the next action may proceed.
    ///
    /// # Errors
    ///
    /// Returns the first [`BudgetStop`] that applies, checked in order:
    /// killed, paused, steps, cost, runtime, idle, consecutive errors.
    pub fn check_can_proceed(&self) -> Result<(), BudgetStop> {
        if self.state.killed {
            return Err(BudgetStop::Killed {
                reason: self
                    .state
                    .kill_reason
                    .clone()
                    .unwrap_or_else(|| "unspecified".to_owned()),
            });
        }

        if self.state.paused {
            return Err(BudgetStop::Paused);
        }

        if self.state.steps_taken >= self.budget.max_steps {
            return Err(BudgetStop::StepLimit {
                used: self.state.steps_taken,
                limit: self.budget.max_steps,
            });
        }

        if self.state.total_cost_usd >= self.budget.max_cost_usd {
            return Err(BudgetStop::CostLimit {
                used: self.state.total_cost_usd,
                limit: self.budget.max_cost_usd,
            });
        }

        let now = Utc::now();
        let runtime = now.signed_duration_since(self.state.started_at);
        if runtime > Duration::minutes(i64::from(self.budget.max_runtime_minutes)) {
            return Err(BudgetStop::TimeLimit {
                elapsed_minutes: duration_minutes(runtime),
                limit_minutes: self.budget.max_runtime_minutes,
            });
        }

        let idle = now.signed_duration_since(self.state.last_action_at);
        if idle > Duration::seconds(i64::from(self.budget.max_idle_seconds)) {
            return Err(BudgetStop::IdleLimit {
                idle_seconds: duration_seconds(idle),
                limit_seconds: self.budget.max_idle_seconds,
            });
        }

        if self.state.consecutive_errors >= self.budget.max_consecutive_errors {
            return Err(BudgetStop::ConsecutiveErrors {
                count: self.state.consecutive_errors,
            });
        }

        Ok(())
    }

    /// Record a successfully completed action.
    ///
    /// Increments steps, adds cost, refreshes the idle clock, resets the
    /// consecutive-error streak, appends the action signature, then runs
    /// warning and loop checks. Returned alerts are for the workflow to
    /// act on.
    pub fn record_action(
        &mut self,
        action_type: &str,
        target: &str,
        parameters: &serde_json::Value,
        cost_usd: f64,
    ) -> Vec<BudgetAlert> {
        self.state.steps_taken = self.state.steps_taken.saturating_add(1);
        self.state.total_cost_usd += cost_usd;
        self.state.last_action_at = Utc::now();
        self.state.consecutive_errors = 0;

        let signature = compute_action_signature(action_type, target, parameters);
        if self.state.action_history.len() >= ACTION_HISTORY_CAPACITY {
            self.state.action_history.pop_front();
        }
        self.state.action_history.push_back(ActionRecord {
            signature,
            action_type: action_type.to_owned(),
            target: target.to_owned(),
            timestamp: self.state.last_action_at,
        });

        let mut alerts = self.check_warnings();
        if let Some(alert) = self.check_for_loops() {
            alerts.push(alert);
        }
        alerts
    }

    /// Record a failed action.
    pub fn record_error(&mut self, error_type: &str, detail: &str) {
        self.state.errors_total = self.state.errors_total.saturating_add(1);
        self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
        self.state.last_action_at = Utc::now();
        tracing::debug!(
            mission_id = %self.mission_id,
            error_type = %error_type,
            detail = %detail,
            consecutive = self.state.consecutive_errors,
            "recorded action error"
        );
    }

    /// Record a retry attempt against a target.
    ///
    /// Returns `true` when the retry is within the per-target cap.
    pub fn record_retry(&mut self, target: &str) -> bool {
        let key = normalize_target(target);
        let current = self.state.retry_counts.get(&key).copied().unwrap_or(0);

        if current >= self.budget.max_retries_per_target {
            return false;
        }

        self.state
            .retry_counts
            .insert(key, current.saturating_add(1));
        true
    }

    /// Add cost (e.g. LLM tokens) without consuming a step.
    ///
    /// Returns any warning alerts the added cost triggered.
    pub fn add_cost(&mut self, cost_usd: f64) -> Vec<BudgetAlert> {
        self.state.total_cost_usd += cost_usd;
        self.check_warnings()
    }

    /// Pause the mission; requires an explicit resume.
    pub fn pause(&mut self) {
        self.state.paused = true;
    }

    /// Resume a paused mission, clearing the consecutive-error streak.
    pub fn resume(&mut self) {
        self.state.paused = false;
        self.state.consecutive_errors = 0;
        self.state.last_action_at = Utc::now();
    }

    /// Hard-kill the mission. Cannot be undone.
    pub fn kill(&mut self, reason: impl Into<String>) {
        self.state.killed = true;
        self.state.kill_reason = Some(reason.into());
    }

    /// Current budget status snapshot.
    pub fn status(&self) -> BudgetStatusSnapshot {
        let runtime = Utc::now().signed_duration_since(self.state.started_at);
        BudgetStatusSnapshot {
            mission_id: self.mission_id.clone(),
            is_active: !self.state.killed && !self.state.paused,
            is_paused: self.state.paused,
            is_killed: self.state.killed,
            kill_reason: self.state.kill_reason.clone(),
            steps: AxisStatus::new(
                f64::from(self.state.steps_taken),
                f64::from(self.budget.max_steps),
            ),
            cost: AxisStatus::new(self.state.total_cost_usd, self.budget.max_cost_usd),
            time: AxisStatus::new(
                duration_minutes(runtime),
                f64::from(self.budget.max_runtime_minutes),
            ),
            errors_total: self.state.errors_total,
            consecutive_errors: self.state.consecutive_errors,
        }
    }

    /// Check cost/step consumption warnings.
    fn check_warnings(&mut self) -> Vec<BudgetAlert> {
        let mut alerts = Vec::new();

        if self.budget.max_cost_usd > 0.0 {
            let cost_ratio = self.state.total_cost_usd / self.budget.max_cost_usd;
            if cost_ratio >= self.budget.warning_cost_threshold {
                alerts.push(BudgetAlert {
                    violation: BudgetViolation::CostLimit,
                    detail: format!(
                        "cost at {:.0}% of budget (${:.2}/${:.2})",
                        cost_ratio * 100.0,
                        self.state.total_cost_usd,
                        self.budget.max_cost_usd
                    ),
                });
                if self.budget.pause_on_warning {
                    self.state.paused = true;
                }
            }
        }

        if self.budget.max_steps > 0 {
            let step_ratio =
                f64::from(self.state.steps_taken) / f64::from(self.budget.max_steps);
            if step_ratio >= STEP_WARNING_RATIO {
                alerts.push(BudgetAlert {
                    violation: BudgetViolation::StepLimit,
                    detail: format!(
                        "steps at {:.0}% of budget ({}/{})",
                        step_ratio * 100.0,
                        self.state.steps_taken,
                        self.budget.max_steps
                    ),
                });
                if self.budget.pause_on_warning {
                    self.state.paused = true;
                }
            }
        }

        alerts
    }

    /// Detect repetitive action patterns over the recent window.
    fn check_for_loops(&mut self) -> Option<BudgetAlert> {
        let window = self.budget.loop_detection_window;
        if window == 0 || self.state.action_history.len() < window {
            return None;
        }

        let recent: Vec<&ActionRecord> = self
            .state
            .action_history
            .iter()
            .rev()
            .take(window)
            .collect();

        let mut freq: HashMap<&str, usize> = HashMap::new();
        for record in &recent {
            let count = freq.entry(record.signature.as_str()).or_insert(0);
            *count = count.saturating_add(1);
        }

        let (signature, count) = freq.into_iter().max_by_key(|(_, c)| *c)?;

        #[allow(clippy::cast_precision_loss)]
        let share = count as f64 / recent.len() as f64;
        if share < self.budget.similarity_threshold {
            return None;
        }

        if self.budget.pause_on_warning {
            self.state.paused = true;
        }

        Some(BudgetAlert {
            violation: BudgetViolation::LoopDetected,
            detail: format!(
                "detected repetitive action pattern: {signature} ({count} times in last {} actions)",
                recent.len()
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Compute the 16-char signature digest for an action.
///
/// Volatile keys are dropped, the remainder sorted, and the canonical
/// `type:target:params` string hashed with SHA-256.
pub fn compute_action_signature(
    action_type: &str,
    target: &str,
    parameters: &serde_json::Value,
) -> String {
    let normalized: std::collections::BTreeMap<&str, &serde_json::Value> = parameters
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(k, _)| !VOLATILE_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v))
                .collect()
        })
        .unwrap_or_default();

    let params = serde_json::to_string(&normalized).unwrap_or_default();
    let digest = Sha256::digest(format!("{action_type}:{target}:{params}").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.chars().take(16).collect()
}

/// Normalize a target for retry bookkeeping.
fn normalize_target(target: &str) -> String {
    target.trim().trim_end_matches('/').to_lowercase()
}

/// Signed duration in fractional minutes (never negative).
fn duration_minutes(d: Duration) -> f64 {
    duration_seconds(d) / 60.0
}

/// Signed duration in fractional seconds (never negative).
fn duration_seconds(d: Duration) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = d.num_milliseconds().max(0) as f64;
    millis / 1_000.0
}
