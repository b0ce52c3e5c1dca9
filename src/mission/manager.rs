//! Mission manager: spawns workflows, routes signals, serves queries.
//!
//! One workflow task per mission; the manager holds each mission's control
//! handle, persists terminal results, and resumes non-terminal missions on
//! process restart (their journaled activities replay).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::adapters::{GraphStore, MissionRecord, MissionStore, StoreError};
use crate::agent::{GuardrailLoop, LlmProvider};
use crate::budget::BudgetEnforcer;
use crate::events::EventSink;
use crate::integrations::IntegrationHub;
use crate::scope::{ScopeConfig, ScopeEnforcer};
use crate::tools::{ToolDispatcher, ToolRegistry, ToolRunner};
use crate::types::{Finding, MissionStatus, ScanInput};

use super::activities::Activities;
use super::journal::ActivityJournal;
use super::workflow::{MissionControl, MissionSignal, MissionWorkflow, StatusSnapshot};

/// Errors from mission management.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// No such mission.
    #[error("mission not found: {0}")]
    NotFound(String),

    /// The request was structurally invalid.
    #[error("invalid mission input: {0}")]
    InvalidInput(String),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Spawns and tracks running mission workflows.
pub struct MissionManager {
    store: MissionStore,
    journal: ActivityJournal,
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn LlmProvider>,
    runner: Arc<dyn ToolRunner>,
    sink: EventSink,
    integrations: Arc<IntegrationHub>,
    graph: Arc<dyn GraphStore>,
    missions: RwLock<HashMap<String, MissionControl>>,
}

impl std::fmt::Debug for MissionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionManager").finish_non_exhaustive()
    }
}

impl MissionManager {
    /// Create a manager over the shared collaborators.
    pub fn new(
        store: MissionStore,
        journal: ActivityJournal,
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn LlmProvider>,
        runner: Arc<dyn ToolRunner>,
        sink: EventSink,
        integrations: Arc<IntegrationHub>,
        graph: Arc<dyn GraphStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            journal,
            registry,
            provider,
            runner,
            sink,
            integrations,
            graph,
            missions: RwLock::new(HashMap::new()),
        })
    }

    /// Create, persist, and start a new mission.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidInput`] for empty objectives or
    /// target sets, or a storage error.
    pub async fn start_mission(self: &Arc<Self>, input: ScanInput) -> Result<String, ManagerError> {
        if input.objective.trim().is_empty() {
            return Err(ManagerError::InvalidInput("objective is empty".to_owned()));
        }
        if input.targets.is_empty() {
            return Err(ManagerError::InvalidInput("no targets declared".to_owned()));
        }
        if input.allowed_scope.is_empty() {
            return Err(ManagerError::InvalidInput(
                "no allowed scope declared".to_owned(),
            ));
        }

        self.store.create(&input, "agent").await?;
        self.spawn_workflow(input.clone()).await?;
        Ok(input.mission_id)
    }

    /// Spawn (or respawn) the workflow task for a persisted mission.
    async fn spawn_workflow(self: &Arc<Self>, input: ScanInput) -> Result<(), ManagerError> {
        let mission_id = input.mission_id.clone();

        let scope = ScopeEnforcer::new(ScopeConfig::from_patterns(
            &input.allowed_scope,
            &input.excluded_scope,
        ));
        let budget = BudgetEnforcer::new(input.budget.clone(), &mission_id);
        let activities = Activities::new(
            &mission_id,
            self.journal.clone(),
            GuardrailLoop::new(Arc::clone(&self.provider), Arc::clone(&self.registry)),
            ToolDispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.runner)),
            self.sink.clone(),
            Arc::clone(&self.integrations),
            Arc::clone(&self.graph),
        );

        let (workflow, control) = MissionWorkflow::new(
            input,
            scope,
            budget,
            activities,
            Arc::clone(&self.registry),
        );

        self.missions
            .write()
            .await
            .insert(mission_id.clone(), control);
        self.store
            .update_status(&mission_id, MissionStatus::Running)
            .await?;

        let manager = Arc::clone(self);
        let task_mission_id = mission_id.clone();
        tokio::spawn(async move {
            let output = workflow.run().await;
            if let Err(e) = manager.store.record_result(&output).await {
                error!(mission_id = %task_mission_id, error = %e, "failed to persist mission result");
            }
        });

        info!(mission_id = %mission_id, "mission workflow spawned");
        Ok(())
    }

    /// Resume every non-terminal mission after a process restart.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the recovery query fails; individual
    /// respawn failures are logged and skipped.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<usize, ManagerError> {
        let records = self.store.non_terminal().await?;
        let count = records.len();
        for record in records {
            info!(mission_id = %record.id, "resuming mission after restart");
            if let Err(e) = self.spawn_workflow(record.config).await {
                warn!(mission_id = %record.id, error = %e, "mission resume failed");
            }
        }
        Ok(count)
    }

    /// Send a signal to a running mission.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for unknown missions. Signals to
    /// already-terminal missions are silently dropped (the workflow is
    /// gone; terminal state is immutable anyway).
    pub async fn signal(&self, mission_id: &str, signal: MissionSignal) -> Result<(), ManagerError> {
        let missions = self.missions.read().await;
        let control = missions
            .get(mission_id)
            .ok_or_else(|| ManagerError::NotFound(mission_id.to_owned()))?;

        if control.signal_tx.send(signal).is_err() {
            warn!(mission_id = %mission_id, "signal dropped; workflow already finished");
        }
        Ok(())
    }

    /// Current status snapshot for a mission.
    ///
    /// Live missions answer from their workflow snapshot; finished or
    /// reloaded missions answer from the store.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for unknown missions or a
    /// storage error.
    pub async fn status(&self, mission_id: &str) -> Result<StatusSnapshot, ManagerError> {
        if let Some(control) = self.missions.read().await.get(mission_id) {
            return Ok(control.status_rx.borrow().clone());
        }

        let record = self
            .store
            .get(mission_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(mission_id.to_owned()))?;
        Ok(snapshot_from_record(&record))
    }

    /// Current findings for a mission.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] for unknown missions.
    pub async fn findings(&self, mission_id: &str) -> Result<Vec<Finding>, ManagerError> {
        Ok(self.status(mission_id).await?.findings)
    }

    /// List persisted missions for a tenant.
    ///
    /// # Errors
    ///
    /// Returns a storage error on query failure.
    pub async fn list(&self, tenant_id: &str) -> Result<Vec<MissionRecord>, ManagerError> {
        Ok(self.store.list(tenant_id).await?)
    }

    /// Delete a mission row. A running workflow is unaffected.
    ///
    /// # Errors
    ///
    /// Returns a storage error on delete failure.
    pub async fn delete(&self, mission_id: &str) -> Result<bool, ManagerError> {
        Ok(self.store.delete(mission_id).await?)
    }
}

/// Build a query snapshot from a persisted row (no live workflow).
fn snapshot_from_record(record: &MissionRecord) -> StatusSnapshot {
    use super::workflow::WorkflowPhase;

    let mut snapshot = StatusSnapshot::initial(&record.id);
    snapshot.status = record.status;
    snapshot.phase = match record.status {
        MissionStatus::Pending => WorkflowPhase::Pending,
        MissionStatus::Running => WorkflowPhase::Executing,
        MissionStatus::Paused => WorkflowPhase::Paused,
        MissionStatus::Completed => WorkflowPhase::Completed,
        MissionStatus::Killed => WorkflowPhase::Killed,
        MissionStatus::Exhausted => WorkflowPhase::Exhausted,
        MissionStatus::Failed => WorkflowPhase::Failed,
    };
    snapshot.is_killed = record.status == MissionStatus::Killed;
    snapshot.is_paused = record.status == MissionStatus::Paused;
    if let Some(result) = &record.result {
        snapshot.findings = result.findings.clone();
        snapshot.error_message = result.error_message.clone();
    }
    snapshot
}
