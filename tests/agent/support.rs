//! Shared agent-test fixtures: a scripted provider and registry helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sentryai::agent::{LlmError, LlmProvider, LlmRequest, LlmResponse};
use sentryai::tools::ToolRegistry;

/// Provider that replays a scripted sequence of responses.
#[derive(Debug)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    /// Prompts received, for assertions on feedback content.
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    /// Script the provider with responses returned in order.
    pub fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| (*s).to_owned()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
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

/// A watcher-free registry seeded with builtins in a temp directory.
pub fn temp_registry() -> (tempfile::TempDir, Arc<ToolRegistry>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry =
        ToolRegistry::new_without_watcher(dir.path().to_path_buf()).expect("registry");
    (dir, registry)
}

/// A minimal valid agent-step JSON with a subfinder call.
pub fn valid_step_json(target: &str) -> String {
    serde_json::json!({
        "thought": "enumerate subdomains first",
        "reasoning": "passive recon is the lowest-risk starting point",
        "tool_call": {
            "tool_name": "subfinder",
            "arguments": { "domain": target, "silent": true, "json": true },
            "target": target,
            "rationale": "find assets",
            "expected_output": "subdomain list",
            "timeout_seconds": 120
        },
        "status_update": "starting recon",
        "is_complete": false,
        "findings": []
    })
    .to_string()
}

/// A minimal valid single-step plan JSON against `target`.
pub fn valid_plan_json(target: &str) -> String {
    serde_json::json!({
        "plan_id": "plan-1",
        "objective": "find exposure",
        "estimated_duration_minutes": 5,
        "estimated_cost_usd": 0.05,
        "steps": [{
            "id": 1,
            "title": "Enumerate subdomains",
            "description": "Passive enumeration",
            "risk": "low",
            "can_skip": false,
            "depends_on": [],
            "tool": {
                "tool_name": "subfinder",
                "arguments": { "domain": target, "silent": true, "json": true },
                "target": target,
                "rationale": "find assets",
                "expected_output": "subdomain list",
                "timeout_seconds": 120
            }
        }]
    })
    .to_string()
}
