//! Configuration loading.
//!
//! Loads from `./config.toml` (or `$SENTRY_CONFIG_PATH`); environment
//! variables override file values, file values override defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::integrations::IntegrationConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control API settings.
    pub server: ServerConfig,
    /// Mission/journal database settings.
    pub database: DatabaseConfig,
    /// Event bridge settings.
    pub redis: RedisConfig,
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// Tool registry settings.
    pub tools: ToolsConfig,
    /// Sandbox resource limits.
    pub sandbox: SandboxConfig,
    /// Tenant identity for this deployment.
    pub tenant: TenantConfig,
    /// Knowledge upload directory (consumed by the REST layer).
    pub uploads: UploadsConfig,
    /// Outbound integration credentials.
    pub integrations: IntegrationConfig,
}

/// Control API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API binds to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_owned(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "sentryai.db".to_owned(),
        }
    }
}

/// Event bridge settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL; the bridge is disabled when absent.
    pub url: Option<String>,
}

/// LLM provider settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint base URL.
    pub base_url: String,
    /// API key.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
        }
    }
}

/// Tool registry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding one JSON schema per tool.
    pub dir: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("io", "sentryai", "sentryai")
            .map(|dirs| dirs.data_dir().join("tool_schemas"))
            .unwrap_or_else(|| PathBuf::from("./tool_schemas"));
        Self {
            dir: dir.to_string_lossy().into_owned(),
        }
    }
}

/// Sandbox resource limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container memory cap in megabytes.
    pub memory_mb: i64,
    /// Container CPU cap in whole CPUs.
    pub cpus: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            cpus: 1.0,
        }
    }
}

/// Tenant identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Namespace prefix for external resources.
    pub namespace: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_owned(),
            namespace: "sentry".to_owned(),
        }
    }
}

/// Knowledge upload directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    /// Directory uploaded documents are written to.
    pub dir: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: "./uploads".to_owned(),
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing config file cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from the TOML file only (no env overrides).
    fn load_from_file() -> Result<Self> {
        let path = std::env::var("SENTRY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: Config =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = env("REDIS_URL") {
            self.redis.url = Some(v);
        }
        if let Some(v) = env("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = env("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = env("TOOLS_DIR") {
            self.tools.dir = v;
        }
        if let Some(v) = env("UPLOAD_DIR") {
            self.uploads.dir = v;
        }
        if let Some(v) = env("SLACK_WEBHOOK_URL") {
            self.integrations.slack_webhook_url = Some(v);
        }
        if let Some(v) = env("DISCORD_WEBHOOK_URL") {
            self.integrations.discord_webhook_url = Some(v);
        }
    }

    /// Validate settings required to serve.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or invalid setting.
    pub fn validate_for_serve(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("LLM_API_KEY is not set");
        }
        if self.sandbox.memory_mb <= 0 {
            anyhow::bail!("sandbox.memory_mb must be positive");
        }
        if self.sandbox.cpus <= 0.0 {
            anyhow::bail!("sandbox.cpus must be positive");
        }
        Ok(())
    }
}
