//! Prompt assembly tests.

use sentryai::agent::prompt::{assemble_system_prompt, plan_request, step_request};
use sentryai::agent::PromptContext;

fn ctx() -> PromptContext {
    PromptContext {
        objective: "find XSS on the storefront".to_owned(),
        targets: vec!["www.example.com".to_owned()],
        allowed_scope: vec!["*.example.com".to_owned()],
        excluded_scope: vec!["admin.example.com".to_owned()],
        budget_summary: "steps 0/5, cost $0.00/$1.00, runtime 0.0/10 minutes".to_owned(),
        tool_definitions: vec![serde_json::json!({
            "name": "subfinder",
            "description": "Passive subdomain enumeration",
        })],
        recent_steps: vec!["step 1 (subfinder on www.example.com) completed with 0 findings".to_owned()],
    }
}

#[test]
fn system_prompt_contains_all_four_blocks() {
    let prompt = assemble_system_prompt(&ctx());

    // Block 1: identity and directives.
    assert!(prompt.contains("SentryAI"));
    assert!(prompt.contains("SCOPE: only ever touch targets inside the declared scope"));

    // Block 2: recent memory.
    assert!(prompt.contains("## Recent Steps"));
    assert!(prompt.contains("step 1 (subfinder"));

    // Block 3: tool definitions.
    assert!(prompt.contains("## Available Tools"));
    assert!(prompt.contains("subfinder"));

    // Block 4: scope and budget.
    assert!(prompt.contains("*.example.com"));
    assert!(prompt.contains("admin.example.com"));
    assert!(prompt.contains("cost $0.00/$1.00"));
}

#[test]
fn empty_memory_block_says_so() {
    let mut context = ctx();
    context.recent_steps.clear();
    let prompt = assemble_system_prompt(&context);
    assert!(prompt.contains("No previous steps in this mission."));
}

#[test]
fn plan_request_names_objective_and_targets() {
    let request = plan_request(&ctx());
    assert!(request.contains("find XSS on the storefront"));
    assert!(request.contains("www.example.com"));
    assert!(request.contains("\"plan_id\""));
    assert!(request.contains("dense starting at 1"));
}

#[test]
fn step_request_includes_previous_observation() {
    let request = step_request(&ctx(), Some("subfinder found 12 hosts"));
    assert!(request.contains("Previous observation:"));
    assert!(request.contains("subfinder found 12 hosts"));
    assert!(request.contains("\"is_complete\""));
}

#[test]
fn first_step_request_has_no_observation_block() {
    let request = step_request(&ctx(), None);
    assert!(!request.contains("Previous observation:"));
}
