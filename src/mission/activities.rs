//! Mission activities: the non-deterministic edges of the workflow.
//!
//! Every method here is an activity with a stable sequence identity. On
//! first execution the real side effect runs and its result is journaled;
//! on replay (after a process restart) the journaled result is returned
//! and the side effect is not repeated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{AssetEdge, AssetNode, GraphStore};
use crate::agent::{GuardrailFailure, GuardrailLoop, PromptContext};
use crate::events::EventSink;
use crate::integrations::{IntegrationEvent, IntegrationHub};
use crate::scope::ScopeEnforcer;
use crate::tools::{ToolDispatcher, ToolExecution};
use crate::types::{AgentStep, Event, ExecutionPlan, Finding, ToolCall};

use super::journal::ActivityJournal;

/// Journaled outcome of a fallible activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActivityOutcome<T> {
    /// The activity succeeded.
    Ok {
        /// The activity's result.
        value: T,
    },
    /// The activity failed.
    Err {
        /// Failure description.
        message: String,
        /// Whether the failure class is retryable.
        retryable: bool,
    },
}

/// Journaled result of a plan-generation activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedResult {
    /// The validated plan.
    pub plan: ExecutionPlan,
    /// Estimated LLM cost of producing it.
    pub cost_usd: f64,
}

/// Journaled result of a reflection activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionResult {
    /// The validated agent step.
    pub step: AgentStep,
    /// Estimated LLM cost of producing it.
    pub cost_usd: f64,
}

/// Bundle of side-effectful collaborators with journal-backed replay.
pub struct Activities {
    mission_id: String,
    journal: ActivityJournal,
    guardrail: GuardrailLoop,
    dispatcher: ToolDispatcher,
    sink: EventSink,
    integrations: Arc<IntegrationHub>,
    graph: Arc<dyn GraphStore>,
    seq: i64,
}

impl std::fmt::Debug for Activities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activities")
            .field("mission_id", &self.mission_id)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl Activities {
    /// Create the activity bundle for one mission.
    pub fn new(
        mission_id: impl Into<String>,
        journal: ActivityJournal,
        guardrail: GuardrailLoop,
        dispatcher: ToolDispatcher,
        sink: EventSink,
        integrations: Arc<IntegrationHub>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            mission_id: mission_id.into(),
            journal,
            guardrail,
            dispatcher,
            sink,
            integrations,
            graph,
            seq: 0,
        }
    }

    /// Allocate the next activity sequence number.
    fn next_seq(&mut self) -> i64 {
        self.seq = self.seq.saturating_add(1);
        self.seq
    }

    /// Fetch a journaled result for the given sequence, if any.
    async fn replay<T: serde::de::DeserializeOwned>(&self, seq: i64) -> Option<T> {
        match self.journal.lookup(&self.mission_id, seq).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => {
                    debug!(mission_id = %self.mission_id, seq, "replaying journaled activity");
                    Some(decoded)
                }
                Err(e) => {
                    warn!(mission_id = %self.mission_id, seq, error = %e, "journal entry undecodable; re-running");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(mission_id = %self.mission_id, seq, error = %e, "journal lookup failed; re-running");
                None
            }
        }
    }

    /// Record an activity result, logging (not failing) on journal errors.
    async fn commit<T: Serialize>(&self, seq: i64, name: &str, value: &T) {
        let encoded = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(mission_id = %self.mission_id, seq, error = %e, "activity result not journalable");
                return;
            }
        };
        if let Err(e) = self.journal.record(&self.mission_id, seq, name, &encoded).await {
            warn!(mission_id = %self.mission_id, seq, error = %e, "journal write failed");
        }
    }

    /// Generate the execution plan (first LLM turn).
    ///
    /// # Errors
    ///
    /// Returns the guardrail failure when the model cannot produce a valid
    /// plan; failures are not journaled, so a restarted mission retries.
    pub async fn generate_plan(
        &mut self,
        ctx: &PromptContext,
    ) -> Result<PlannedResult, GuardrailFailure> {
        let seq = self.next_seq();
        if let Some(result) = self.replay::<PlannedResult>(seq).await {
            return Ok(result);
        }

        let guarded = self.guardrail.propose_plan(ctx).await?;
        let result = PlannedResult {
            plan: guarded.value,
            cost_usd: guarded.cost_usd,
        };
        self.commit(seq, "generate_plan", &result).await;
        Ok(result)
    }

    /// Run one reflection turn over the latest observation.
    ///
    /// # Errors
    ///
    /// Returns a guardrail failure only for provider transport errors;
    /// validation exhaustion degrades to the synthesized terminal step.
    pub async fn reflect(
        &mut self,
        ctx: &PromptContext,
        observation: &str,
    ) -> Result<ReflectionResult, GuardrailFailure> {
        let seq = self.next_seq();
        if let Some(result) = self.replay::<ReflectionResult>(seq).await {
            return Ok(result);
        }

        let guarded = self.guardrail.next_step(ctx, Some(observation)).await?;
        let result = ReflectionResult {
            step: guarded.value,
            cost_usd: guarded.cost_usd,
        };
        self.commit(seq, "reflect", &result).await;
        Ok(result)
    }

    /// Execute one tool call in the sandbox.
    ///
    /// Both success and failure are journaled so replay reproduces the
    /// budget and retry accounting exactly.
    pub async fn execute_tool(
        &mut self,
        call: &ToolCall,
        scope: &ScopeEnforcer,
    ) -> ActivityOutcome<ToolExecution> {
        let seq = self.next_seq();
        if let Some(result) = self.replay::<ActivityOutcome<ToolExecution>>(seq).await {
            return result;
        }

        let outcome = match self.dispatcher.execute(call, scope).await {
            Ok(execution) => ActivityOutcome::Ok { value: execution },
            Err(error) => ActivityOutcome::Err {
                retryable: error.is_retryable(),
                message: error.to_string(),
            },
        };
        self.commit(seq, "execute_tool", &outcome).await;
        outcome
    }

    /// Emit one event through the fabric and bridge, exactly once.
    pub async fn emit_event(&mut self, event: Event) {
        let seq = self.next_seq();
        if self.replay::<bool>(seq).await.is_some() {
            return;
        }
        self.sink.emit(&event).await;
        self.commit(seq, "emit_event", &true).await;
    }

    /// Dispatch a finding notification to the configured integrations.
    ///
    /// Integration failures are logged, never propagated.
    pub async fn notify_finding(&mut self, finding: &Finding) {
        let seq = self.next_seq();
        if self.replay::<bool>(seq).await.is_some() {
            return;
        }

        let event = if finding.severity >= crate::types::Severity::High {
            IntegrationEvent::HighSeverityFinding
        } else {
            IntegrationEvent::VulnerabilityFound
        };
        let payload = serde_json::to_value(finding).unwrap_or_default();

        // Detached: integration latency and failures never block the step.
        let integrations = Arc::clone(&self.integrations);
        tokio::spawn(async move {
            integrations.dispatch_all(event, payload).await;
        });

        self.commit(seq, "notify_finding", &true).await;
    }

    /// Dispatch a scan-lifecycle notification (complete / failed).
    pub async fn notify_scan(&mut self, event: IntegrationEvent, payload: serde_json::Value) {
        let seq = self.next_seq();
        if self.replay::<bool>(seq).await.is_some() {
            return;
        }

        let integrations = Arc::clone(&self.integrations);
        tokio::spawn(async move {
            integrations.dispatch_all(event, payload).await;
        });

        self.commit(seq, "notify_scan", &true).await;
    }

    /// Upsert discovered assets into the mission's graph scope.
    ///
    /// Returns the number of nodes written; failed upserts are logged and
    /// skipped. The mission never blocks on the graph store.
    pub async fn record_assets(&mut self, kind: &str, keys: &[String]) -> usize {
        let seq = self.next_seq();
        if let Some(count) = self.replay::<usize>(seq).await {
            return count;
        }

        let mut written = 0usize;
        for key in keys {
            let node = AssetNode {
                project_id: self.mission_id.clone(),
                kind: kind.to_owned(),
                key: key.clone(),
                properties: serde_json::json!({}),
            };
            match self.graph.upsert_asset(node).await {
                Ok(()) => written = written.saturating_add(1),
                Err(e) => {
                    warn!(mission_id = %self.mission_id, key = %key, error = %e, "graph upsert failed");
                }
            }
        }

        self.commit(seq, "record_assets", &written).await;
        written
    }

    /// Link a finding to its affected asset in the mission's graph scope.
    ///
    /// Upserts the asset and finding nodes, then a `has_finding` edge
    /// between them. Graph failures are logged and skipped.
    pub async fn record_finding_edge(&mut self, finding: &Finding) {
        let seq = self.next_seq();
        if self.replay::<bool>(seq).await.is_some() {
            return;
        }

        let asset = AssetNode {
            project_id: self.mission_id.clone(),
            kind: "host".to_owned(),
            key: finding.affected_asset.clone(),
            properties: serde_json::json!({}),
        };
        let node = AssetNode {
            project_id: self.mission_id.clone(),
            kind: "finding".to_owned(),
            key: finding.id.clone(),
            properties: serde_json::json!({
                "title": finding.title,
                "severity": finding.severity.as_str(),
            }),
        };
        let edge = AssetEdge {
            project_id: self.mission_id.clone(),
            from_key: finding.affected_asset.clone(),
            to_key: finding.id.clone(),
            relation: "has_finding".to_owned(),
        };

        let result = async {
            self.graph.upsert_asset(asset).await?;
            self.graph.upsert_asset(node).await?;
            self.graph.upsert_edge(edge).await
        }
        .await;
        if let Err(e) = result {
            warn!(mission_id = %self.mission_id, finding_id = %finding.id, error = %e, "finding edge upsert failed");
        }

        self.commit(seq, "record_finding_edge", &true).await;
    }

    /// Clear the journal once the mission reaches a terminal state.
    pub async fn finalize(&self) {
        if let Err(e) = self.journal.clear(&self.mission_id).await {
            warn!(mission_id = %self.mission_id, error = %e, "journal cleanup failed");
        }
    }
}
