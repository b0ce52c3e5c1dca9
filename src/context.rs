//! Process-wide wiring.
//!
//! [`CoreContext`] is created once at startup and threaded explicitly
//! through the control API and workers — there is no module-level mutable
//! state.

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

use crate::adapters::{InMemoryGraph, MissionStore};
use crate::agent::ChatCompletionsProvider;
use crate::config::Config;
use crate::events::{EventBridge, EventFabric, EventSink};
use crate::integrations::IntegrationHub;
use crate::mission::{ActivityJournal, MissionManager};
use crate::tools::{SandboxLimits, SandboxRunner, ToolRegistry};
use crate::types::TenantContext;

/// Startup failures, split so the binary can map them to exit codes.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// Configuration problem (exit code 1).
    #[error("configuration error: {0}")]
    Config(String),

    /// A backend (database, Redis, Docker) could not be reached
    /// (exit code 2).
    #[error("backend connection failed: {0}")]
    Backend(String),
}

/// Everything a running process needs, wired once.
pub struct CoreContext {
    /// Loaded configuration.
    pub config: Config,
    /// In-process event multiplexer (shared with the observer channel).
    pub fabric: Arc<EventFabric>,
    /// Mission lifecycle manager.
    pub manager: Arc<MissionManager>,
}

impl std::fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreContext").finish_non_exhaustive()
    }
}

impl CoreContext {
    /// Wire the full core from configuration.
    ///
    /// Spawns the bridge inbound task when Redis is configured and resumes
    /// any missions that were non-terminal at the last shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Config`] for invalid settings and
    /// [`InitError::Backend`] when the database, Redis, or Docker daemon
    /// cannot be reached.
    pub async fn init(config: Config) -> Result<Self, InitError> {
        config
            .validate_for_serve()
            .map_err(|e| InitError::Config(e.to_string()))?;

        // Database.
        let options = SqliteConnectOptions::new()
            .filename(&config.database.path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| InitError::Backend(format!("sqlite: {e}")))?;

        let store = MissionStore::new(pool.clone())
            .await
            .map_err(|e| InitError::Backend(format!("mission store: {e}")))?;
        let journal = ActivityJournal::new(pool)
            .await
            .map_err(|e| InitError::Backend(format!("activity journal: {e}")))?;

        // Tool registry.
        let registry = ToolRegistry::new(config.tools.dir.clone().into())
            .map_err(|e| InitError::Config(format!("tool registry: {e}")))?;

        // Tenant + sandbox.
        let tenant = TenantContext {
            tenant_id: config.tenant.tenant_id.clone(),
            namespace: config.tenant.namespace.clone(),
        };
        let limits = SandboxLimits {
            memory_bytes: config.sandbox.memory_mb.saturating_mul(1024 * 1024),
            nano_cpus: nano_cpus(config.sandbox.cpus),
        };
        let runner = SandboxRunner::new(limits, tenant.clone())
            .map_err(|e| InitError::Backend(format!("docker: {e}")))?;

        // Event fabric and bridge.
        let fabric = Arc::new(EventFabric::new());
        let bridge = match &config.redis.url {
            Some(url) => {
                let bridge = EventBridge::new(url, tenant.namespace.clone())
                    .map_err(|e| InitError::Config(format!("redis url: {e}")))?;
                bridge
                    .check_connection()
                    .await
                    .map_err(|e| InitError::Backend(format!("redis: {e}")))?;
                tokio::spawn(bridge.clone().run_inbound(Arc::clone(&fabric)));
                Some(bridge)
            }
            None => {
                warn!("REDIS_URL not set; event bridge disabled, in-process delivery only");
                None
            }
        };
        let sink = EventSink::new(Arc::clone(&fabric), bridge);

        // LLM provider and integrations.
        let provider = Arc::new(ChatCompletionsProvider::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.model.clone(),
        ));
        let integrations = Arc::new(IntegrationHub::new(config.integrations.clone()));

        let manager = MissionManager::new(
            store,
            journal,
            registry,
            provider,
            Arc::new(runner),
            sink,
            integrations,
            Arc::new(InMemoryGraph::default()),
        );

        match manager.resume_incomplete().await {
            Ok(0) => {}
            Ok(count) => info!(count, "resumed missions from previous run"),
            Err(e) => warn!(error = %e, "mission resume scan failed"),
        }

        Ok(Self {
            config,
            fabric,
            manager,
        })
    }
}

/// Whole CPUs to Docker nano-CPU units.
fn nano_cpus(cpus: f64) -> i64 {
    let nanos = cpus * 1_000_000_000.0;
    if nanos <= 0.0 {
        1_000_000_000
    } else if nanos >= 9.2e18 {
        i64::MAX
    } else {
        #[allow(clippy::cast_possible_truncation)]
        {
            nanos as i64
        }
    }
}
