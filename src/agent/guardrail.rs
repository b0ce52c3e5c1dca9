//! The guardrail loop: raw model output in, validated typed step out.
//!
//! Validation pipeline, stopping at the first failure: strip code fences →
//! parse JSON → strict schema decode → registry lookup for the tool →
//! argument validation against the tool schema → safety regex scan over the
//! serialized arguments. Failures are fed back to the model for up to three
//! retries; plan turns fail the mission on exhaustion, step turns degrade
//! to a synthesized terminal step.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::budget::cost::estimate_cost;
use crate::tools::ToolRegistry;
use crate::types::{AgentStep, ExecutionPlan, ToolCall};

use super::prompt::{assemble_system_prompt, plan_request, step_request, PromptContext};
use super::provider::{LlmError, LlmProvider, LlmRequest};

/// Maximum validation retries before giving up on the model.
const MAX_RETRIES: u32 = 3;

/// Response token cap for plan and step turns.
const MAX_RESPONSE_TOKENS: u32 = 4_096;

/// Destructive-argument patterns. Compiled once.
static SAFETY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Recursive delete of roots or homes
        r"rm\s+(-[a-zA-Z]*r[a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*r)\s+(/|~|\$HOME)",
        // Shell-pipe-to-interpreter
        r"(curl|wget)[^|;&]*\|\s*(ba)?sh",
        // Raw device writes
        r"dd\s+[^|;&]*of=/dev/",
        r">\s*/dev/(sd|hd|nvme)",
        // Permissive chmod
        r"chmod\s+(-[a-zA-Z]+\s+)?777\s+/",
        // Fork bomb
        r":\(\)\s*\{\s*:\|:",
        // Filesystem creation
        r"mkfs(\.[a-z0-9]+)?\s",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single validation failure, fed back to the model verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuardrailError {
    /// Output was not parseable JSON.
    #[error("JSON_INVALID: {0}")]
    JsonInvalid(String),

    /// JSON did not match the expected shape.
    #[error("SCHEMA_INVALID: {0}")]
    SchemaInvalid(String),

    /// The step names a tool absent from the registry.
    #[error("HALLUCINATED_TOOL: no tool named '{0}' exists")]
    HallucinatedTool(String),

    /// Arguments failed tool-schema validation.
    #[error("BAD_ARGUMENTS: {0}")]
    BadArguments(String),

    /// Serialized arguments matched a destructive pattern.
    #[error("SAFETY_VIOLATION: arguments match a destructive pattern")]
    SafetyViolation,
}

/// Terminal guardrail failure after retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum GuardrailFailure {
    /// The provider itself failed.
    #[error(transparent)]
    Provider(#[from] LlmError),

    /// The model never produced valid output.
    #[error("model failed validation after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The final validation error.
        last: GuardrailError,
    },
}

// ---------------------------------------------------------------------------
// Validation pipeline
// ---------------------------------------------------------------------------

/// Strip markdown code-fence markers from model output.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Run the safety regex set over serialized tool arguments.
fn check_safety(call: &ToolCall) -> Result<(), GuardrailError> {
    let serialized = serde_json::to_string(&call.arguments).unwrap_or_default();
    if SAFETY_PATTERNS.iter().any(|p| p.is_match(&serialized)) {
        return Err(GuardrailError::SafetyViolation);
    }
    Ok(())
}

/// Validate a tool call against the registry.
fn check_tool_call(call: &ToolCall, registry: &ToolRegistry) -> Result<(), GuardrailError> {
    let schema = registry
        .get(&call.tool_name)
        .ok_or_else(|| GuardrailError::HallucinatedTool(call.tool_name.clone()))?;

    schema
        .validate_arguments(&call.arguments)
        .map_err(|e| GuardrailError::BadArguments(e.to_string()))?;

    check_safety(call)
}

/// Validate raw model output as an [`AgentStep`].
///
/// # Errors
///
/// Returns the first [`GuardrailError`] in the pipeline.
pub fn validate_agent_step(
    raw: &str,
    registry: &ToolRegistry,
) -> Result<AgentStep, GuardrailError> {
    let cleaned = strip_fences(raw);

    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| GuardrailError::JsonInvalid(e.to_string()))?;

    let step: AgentStep = serde_json::from_value(value)
        .map_err(|e| GuardrailError::SchemaInvalid(e.to_string()))?;

    if let Some(call) = &step.tool_call {
        check_tool_call(call, registry)?;
    }

    Ok(step)
}

/// Validate raw model output as an [`ExecutionPlan`].
///
/// Beyond the shape, every step's tool call is validated against the
/// registry and the plan structure is checked (dense ids, backward
/// dependencies, declared targets).
///
/// # Errors
///
/// Returns the first [`GuardrailError`] in the pipeline.
pub fn validate_execution_plan(
    raw: &str,
    registry: &ToolRegistry,
    mission_targets: &[String],
) -> Result<ExecutionPlan, GuardrailError> {
    let cleaned = strip_fences(raw);

    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| GuardrailError::JsonInvalid(e.to_string()))?;

    let plan: ExecutionPlan = serde_json::from_value(value)
        .map_err(|e| GuardrailError::SchemaInvalid(e.to_string()))?;

    plan.validate_structure(mission_targets)
        .map_err(GuardrailError::SchemaInvalid)?;

    for step in &plan.steps {
        check_tool_call(&step.tool, registry)?;
    }

    Ok(plan)
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// The validate-and-retry wrapper around each LLM call.
#[derive(Clone)]
pub struct GuardrailLoop {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for GuardrailLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailLoop")
            .field("model", &self.provider.model())
            .finish_non_exhaustive()
    }
}

/// A validated result plus the estimated USD cost of producing it.
#[derive(Debug, Clone)]
pub struct Guarded<T> {
    /// The validated value.
    pub value: T,
    /// Estimated LLM cost across all attempts.
    pub cost_usd: f64,
}

impl GuardrailLoop {
    /// Create a guardrail loop over a provider and tool registry.
    pub fn new(provider: Arc<dyn LlmProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self { provider, registry }
    }

    /// First-turn call: produce a validated execution plan.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailFailure`] when the provider fails or the model
    /// cannot produce a valid plan within the retry budget.
    pub async fn propose_plan(
        &self,
        ctx: &PromptContext,
    ) -> Result<Guarded<ExecutionPlan>, GuardrailFailure> {
        let system = assemble_system_prompt(ctx);
        let base_user = plan_request(ctx);

        self.run_validated(&system, &base_user, |raw| {
            validate_execution_plan(raw, &self.registry, &ctx.targets)
        })
        .await
    }

    /// Reflection turn: produce the next validated agent step.
    ///
    /// On retry exhaustion this degrades to the synthesized terminal step
    /// rather than failing, so the mission can close out cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`GuardrailFailure::Provider`] only for provider transport
    /// failures.
    pub async fn next_step(
        &self,
        ctx: &PromptContext,
        previous_observation: Option<&str>,
    ) -> Result<Guarded<AgentStep>, GuardrailFailure> {
        let system = assemble_system_prompt(ctx);
        let base_user = step_request(ctx, previous_observation);

        match self
            .run_validated(&system, &base_user, |raw| {
                validate_agent_step(raw, &self.registry)
            })
            .await
        {
            Ok(guarded) => Ok(guarded),
            Err(GuardrailFailure::RetriesExhausted { attempts, last }) => {
                warn!(attempts, error = %last, "guardrail retries exhausted; synthesizing terminal step");
                Ok(Guarded {
                    value: AgentStep::agent_error(),
                    cost_usd: 0.0,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Shared call-validate-retry loop.
    async fn run_validated<T, F>(
        &self,
        system: &str,
        base_user: &str,
        validate: F,
    ) -> Result<Guarded<T>, GuardrailFailure>
    where
        F: Fn(&str) -> Result<T, GuardrailError>,
    {
        let mut user = base_user.to_owned();
        let mut cost_usd = 0.0_f64;
        let mut last_error: Option<GuardrailError> = None;

        for attempt in 1..=MAX_RETRIES {
            let response = self
                .provider
                .complete(LlmRequest {
                    system: system.to_owned(),
                    user: user.clone(),
                    max_tokens: MAX_RESPONSE_TOKENS,
                })
                .await?;

            cost_usd += estimate_cost(
                self.provider.model(),
                response.input_tokens,
                response.output_tokens,
            );

            match validate(&response.content) {
                Ok(value) => {
                    debug!(attempt, "guardrail validation passed");
                    return Ok(Guarded { value, cost_usd });
                }
                Err(error) => {
                    debug!(attempt, error = %error, "guardrail validation failed");
                    user = format!(
                        "{base_user}\n\nYour previous response was rejected: {error}. \
                         Correct the problem and respond with valid JSON only."
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(GuardrailFailure::RetriesExhausted {
            attempts: MAX_RETRIES,
            last: last_error.unwrap_or_else(|| {
                GuardrailError::JsonInvalid("no attempts were made".to_owned())
            }),
        })
    }
}
