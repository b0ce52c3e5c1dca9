//! Tool dispatch: structured call in, sandboxed process out.
//!
//! The dispatcher resolves the schema, validates arguments, re-checks scope
//! (defense in depth with the workflow gate), synthesizes the command, runs
//! it in the sandbox, parses output, and classifies failures as retryable
//! or terminal.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::scope::{ScopeEnforcer, ScopeViolation};
use crate::types::{FalsePositiveLikelihood, Finding, Severity, ToolCall};

use super::command::synthesize_command;
use super::output::parse_output;
use super::registry::ToolRegistry;
use super::sandbox::{SandboxError, ToolRunner};
use super::schema::{ArgumentError, ToolSchema};

/// Stderr fragments that mark a failure as transient.
const RETRYABLE_STDERR_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "temporary failure",
    "timeout",
    "i/o timeout",
    "tls handshake",
    "no route to host",
];

/// Terminal dispatch failures (the step cannot be retried as-is).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The tool is not in the registry.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The unresolved tool name.
        name: String,
    },

    /// Arguments failed schema validation.
    #[error(transparent)]
    InvalidArguments(#[from] ArgumentError),

    /// Target extraction or scope check failed at the dispatcher level.
    #[error(transparent)]
    Scope(#[from] ScopeViolation),

    /// Sandbox could not run the tool.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl DispatchError {
    /// Whether this failure class is worth retrying.
    ///
    /// Only daemon-level sandbox hiccups qualify; everything else is a
    /// terminal error for the step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Sandbox(SandboxError::Infrastructure(_)))
    }
}

/// The captured, parsed result of one tool invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolExecution {
    /// Tool that ran.
    pub tool_name: String,
    /// The tool's category (drives asset-graph extraction downstream).
    pub category: String,
    /// Target the call addressed.
    pub target: String,
    /// Process exit code.
    pub exit_code: Option<i64>,
    /// Whether the watchdog fired.
    pub timed_out: bool,
    /// Parsed output records (format per the schema).
    pub records: Value,
    /// Captured stderr (bounded upstream).
    pub stderr: String,
    /// Findings extracted from the output.
    pub findings: Vec<Finding>,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
    /// Whether a failure looks transient (timeout or retryable stderr).
    pub retryable_failure: bool,
}

impl ToolExecution {
    /// Whether the invocation failed.
    pub fn failed(&self) -> bool {
        self.timed_out || self.exit_code != Some(0)
    }
}

/// Translates [`ToolCall`]s into sandboxed process runs.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    runner: Arc<dyn ToolRunner>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    /// Create a dispatcher over a registry and runner.
    pub fn new(registry: Arc<ToolRegistry>, runner: Arc<dyn ToolRunner>) -> Self {
        Self { registry, runner }
    }

    /// The registry backing this dispatcher.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute a tool call in the sandbox.
    ///
    /// The mission's scope enforcer is consulted again here so no dispatch
    /// path can bypass the workflow-level gate.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] for unknown tools, invalid arguments,
    /// scope violations, or sandbox failures. Transient tool failures are
    /// *not* errors; they come back as a [`ToolExecution`] with
    /// `retryable_failure` set.
    pub async fn execute(
        &self,
        call: &ToolCall,
        scope: &ScopeEnforcer,
    ) -> Result<ToolExecution, DispatchError> {
        let schema = self
            .registry
            .get(&call.tool_name)
            .ok_or_else(|| DispatchError::UnknownTool {
                name: call.tool_name.clone(),
            })?;

        schema.validate_arguments(&call.arguments)?;
        scope.validate_tool_call(&call.tool_name, &call.arguments_value())?;

        let image = schema
            .container_image
            .as_deref()
            .ok_or_else(|| SandboxError::NotSandboxable {
                tool: call.tool_name.clone(),
            })?;

        let argv = synthesize_command(&schema, &call.arguments);
        let timeout =
            Duration::from_secs(call.timeout_seconds.min(schema.timeout_default_seconds));

        debug!(
            tool = %call.tool_name,
            target = %call.target,
            timeout_seconds = timeout.as_secs(),
            "dispatching tool"
        );

        let output = self.runner.run(image, &argv, timeout).await?;

        let records = parse_output(schema.output_format, &output.stdout);
        let failed = output.timed_out || output.exit_code != Some(0);
        let retryable_failure = failed && (output.timed_out || stderr_retryable(&output.stderr));

        let findings = if failed {
            Vec::new()
        } else {
            extract_findings(&schema, &records, &call.target)
        };

        if !findings.is_empty() {
            info!(
                tool = %call.tool_name,
                target = %call.target,
                count = findings.len(),
                "tool produced findings"
            );
        }

        Ok(ToolExecution {
            tool_name: call.tool_name.clone(),
            category: schema.category.clone(),
            target: call.target.clone(),
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            records,
            stderr: output.stderr,
            findings,
            duration_seconds: output.duration.as_secs_f64(),
            retryable_failure,
        })
    }
}

/// Whether stderr content matches a known transient pattern.
fn stderr_retryable(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    RETRYABLE_STDERR_PATTERNS
        .iter()
        .any(|p| lower.contains(p))
}

/// Map vulnerability-scanner records to findings.
///
/// Only tools in the `vulnerability` category report findings directly;
/// recon output feeds the agent's next step instead.
fn extract_findings(schema: &ToolSchema, records: &Value, target: &str) -> Vec<Finding> {
    if schema.category != "vulnerability" {
        return Vec::new();
    }

    let items = match records.as_array() {
        Some(items) => items,
        None => return Vec::new(),
    };

    items
        .iter()
        .filter(|record| record.get("error").is_none())
        .map(|record| record_to_finding(record, target))
        .collect()
}

/// Convert one scanner record (nuclei JSONL shape) to a [`Finding`].
fn record_to_finding(record: &Value, target: &str) -> Finding {
    let info = record.get("info");
    let title = info
        .and_then(|i| i.get("name"))
        .and_then(Value::as_str)
        .or_else(|| record.get("template-id").and_then(Value::as_str))
        .unwrap_or("unnamed finding")
        .to_owned();
    let description = info
        .and_then(|i| i.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let severity = info
        .and_then(|i| i.get("severity"))
        .and_then(Value::as_str)
        .map(parse_severity)
        .unwrap_or(Severity::Info);
    let affected = record
        .get("matched-at")
        .or_else(|| record.get("host"))
        .and_then(Value::as_str)
        .unwrap_or(target)
        .to_owned();
    let remediation = info
        .and_then(|i| i.get("remediation"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    Finding {
        id: uuid::Uuid::new_v4().to_string(),
        severity,
        title,
        description,
        affected_asset: affected,
        evidence: Some(record.to_string()),
        reproduction_steps: None,
        remediation,
        cwe: None,
        cvss: None,
        confidence: 0.7,
        false_positive_likelihood: FalsePositiveLikelihood::Medium,
        step_id: None,
        mission_id: None,
    }
}

/// Parse a scanner severity label.
fn parse_severity(label: &str) -> Severity {
    match label.to_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" => Severity::Medium,
        "low" => Severity::Low,
        _ => Severity::Info,
    }
}
