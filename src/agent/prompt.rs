//! Prompt assembly for the mission agent.
//!
//! The system prompt is composed from four blocks at runtime: the static
//! identity and prime directives, recent memory context, the available tool
//! definitions, and the scope + budget block. The current objective (and,
//! after the first turn, the previous observation) goes into the user
//! content.

/// Static identity and prime directives. These never vary per mission.
const PRIME_DIRECTIVES: &str = "\
You are SentryAI, an autonomous security-assessment agent operating under a \
strict safety charter.

Prime directives, in priority order:
1. SAFETY: never take an action that could damage or disrupt a target.
2. SCOPE: only ever touch targets inside the declared scope. If a discovered \
asset is outside scope, report it; never scan it.
3. NO HALLUCINATION: only call tools that are listed below, with arguments \
their schemas declare.
4. EVIDENCE: every finding must cite concrete evidence from tool output.
5. EFFICIENCY: respect the step, cost, and time budgets; do not repeat \
actions that already produced their result.
6. LEGALITY: you operate only under the authorization this mission carries.

You communicate exclusively in strict JSON matching the requested shape. \
No prose, no markdown fences.";

/// Everything needed to compose one prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Mission objective.
    pub objective: String,
    /// Declared targets.
    pub targets: Vec<String>,
    /// Allowed scope patterns.
    pub allowed_scope: Vec<String>,
    /// Excluded scope patterns.
    pub excluded_scope: Vec<String>,
    /// Human-readable budget summary.
    pub budget_summary: String,
    /// Tool definitions in agent-consumable form.
    pub tool_definitions: Vec<serde_json::Value>,
    /// Summaries of the last k steps, oldest first.
    pub recent_steps: Vec<String>,
}

/// Assemble the four-block system prompt.
pub fn assemble_system_prompt(ctx: &PromptContext) -> String {
    let memory_block = if ctx.recent_steps.is_empty() {
        "No previous steps in this mission.".to_owned()
    } else {
        ctx.recent_steps
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let tools_block = serde_json::to_string_pretty(&ctx.tool_definitions)
        .unwrap_or_else(|_| "[]".to_owned());

    let allowed = bullet_list(&ctx.allowed_scope, "(none declared)");
    let excluded = bullet_list(&ctx.excluded_scope, "(none)");

    format!(
        "{PRIME_DIRECTIVES}\n\n\
         ## Recent Steps\n{memory_block}\n\n\
         ## Available Tools\n{tools_block}\n\n\
         ## Scope\nAllowed:\n{allowed}\nExcluded:\n{excluded}\n\n\
         ## Budget\n{budget}",
        budget = ctx.budget_summary,
    )
}

/// First-turn user content: request an execution plan.
pub fn plan_request(ctx: &PromptContext) -> String {
    let targets = bullet_list(&ctx.targets, "(none)");
    format!(
        "Objective: {objective}\n\
         Targets:\n{targets}\n\n\
         Produce an execution plan as a single JSON object:\n\
         {{\n\
         \x20 \"plan_id\": \"<uuid>\",\n\
         \x20 \"objective\": \"<echo of the objective>\",\n\
         \x20 \"estimated_duration_minutes\": <int>,\n\
         \x20 \"estimated_cost_usd\": <number>,\n\
         \x20 \"steps\": [\n\
         \x20   {{\"id\": 1, \"title\": \"...\", \"description\": \"...\",\n\
         \x20    \"risk\": \"low|medium|high\", \"can_skip\": false,\n\
         \x20    \"depends_on\": [],\n\
         \x20    \"tool\": {{\"tool_name\": \"...\", \"arguments\": {{...}},\n\
         \x20             \"target\": \"<one of the targets>\",\n\
         \x20             \"rationale\": \"...\", \"expected_output\": \"...\",\n\
         \x20             \"timeout_seconds\": 300}}}}\n\
         \x20 ]\n\
         }}\n\n\
         Step ids must be dense starting at 1; depends_on may only reference \
         earlier steps; every step target must be one of the declared targets. \
         Respond with the JSON object only.",
        objective = ctx.objective,
    )
}

/// Per-turn user content: request the next agent step.
pub fn step_request(ctx: &PromptContext, previous_observation: Option<&str>) -> String {
    let observation_block = match previous_observation {
        Some(obs) => format!("\n\nPrevious observation:\n{obs}"),
        None => String::new(),
    };

    format!(
        "Objective: {objective}{observation_block}\n\n\
         Respond with a single JSON object:\n\
         {{\n\
         \x20 \"thought\": \"...\",\n\
         \x20 \"reasoning\": \"...\",\n\
         \x20 \"tool_call\": {{...}} or null,\n\
         \x20 \"status_update\": \"...\",\n\
         \x20 \"is_complete\": true|false,\n\
         \x20 \"findings\": []\n\
         }}\n\
         Respond with the JSON object only.",
        objective = ctx.objective,
    )
}

/// Render lines as a bullet list, with a placeholder for the empty case.
fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        format!("  {empty}")
    } else {
        items
            .iter()
            .map(|i| format!("  - {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
