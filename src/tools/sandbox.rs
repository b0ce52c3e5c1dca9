//! Ephemeral Docker sandbox for tool execution.
//!
//! Each invocation runs in a fresh, short-lived container: hardened host
//! config, capped memory and CPU, no retained filesystem, and a hard
//! wall-clock timeout. Output is captured into bounded buffers and the
//! container is force-removed afterwards.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::types::TenantContext;

/// Cap on captured stdout/stderr, each.
const OUTPUT_BUFFER_CAP: usize = 1024 * 1024;

/// Errors from sandboxed execution.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Docker daemon interaction failed.
    #[error("sandbox operation failed: {0}")]
    Infrastructure(String),

    /// The tool image is not present and could not be pulled.
    #[error("tool image missing: {image}")]
    ImageMissing {
        /// The image that could not be resolved.
        image: String,
    },

    /// The tool has no container image configured.
    #[error("tool {tool} has no container image and cannot be sandboxed")]
    NotSandboxable {
        /// The tool lacking an image.
        tool: String,
    },
}

/// Captured result of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Process exit code (`None` when unavailable).
    pub exit_code: Option<i64>,
    /// Captured stdout, truncated to the buffer cap.
    pub stdout: String,
    /// Captured stderr, truncated to the buffer cap.
    pub stderr: String,
    /// Whether the run hit the wall-clock timeout.
    pub timed_out: bool,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl RunOutput {
    /// Whether the run completed successfully.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs a tool argv in an isolated environment.
///
/// Abstracted behind a trait so the dispatcher can be exercised with an
/// in-process fake.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Execute `argv` inside `image` under the given timeout.
    async fn run(
        &self,
        image: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<RunOutput, SandboxError>;
}

/// Resource limits for sandbox containers.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Memory cap in bytes.
    pub memory_bytes: i64,
    /// CPU cap in units of 1e-9 CPUs.
    pub nano_cpus: i64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 512 * 1024 * 1024,
            nano_cpus: 1_000_000_000,
        }
    }
}

/// Docker-backed [`ToolRunner`].
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    docker: Docker,
    limits: SandboxLimits,
    tenant: TenantContext,
}

impl SandboxRunner {
    /// Connect to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns an error when the daemon cannot be reached.
    pub fn new(limits: SandboxLimits, tenant: TenantContext) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Infrastructure(e.to_string()))?;
        Ok(Self {
            docker,
            limits,
            tenant,
        })
    }

    /// Returns `true` if the Docker daemon answers a ping.
    pub async fn docker_available() -> bool {
        match Docker::connect_with_local_defaults() {
            Ok(docker) => docker.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    /// Make sure `image` exists locally, pulling it when absent.
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(SandboxError::Infrastructure(e.to_string())),
        }

        debug!(image = %image, "pulling tool image");
        let options = CreateImageOptions {
            from_image: image.to_owned(),
            ..Default::default()
        };
        let mut pull = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = pull.next().await {
            if let Err(e) = progress {
                warn!(image = %image, error = %e, "image pull failed");
                return Err(SandboxError::ImageMissing {
                    image: image.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Hardened container config for one invocation.
    fn container_config(&self, image: &str, argv: &[String]) -> ContainerConfig<String> {
        let mut labels = HashMap::new();
        labels.insert("sentryai.tenant".to_owned(), self.tenant.tenant_id.clone());
        labels.insert(
            "sentryai.namespace".to_owned(),
            self.tenant.namespace.clone(),
        );

        let host_config = HostConfig {
            memory: Some(self.limits.memory_bytes),
            nano_cpus: Some(self.limits.nano_cpus),
            cap_drop: Some(vec!["ALL".to_owned()]),
            security_opt: Some(vec!["no-new-privileges".to_owned()]),
            auto_remove: Some(false),
            ..Default::default()
        };

        ContainerConfig {
            image: Some(image.to_owned()),
            entrypoint: argv.first().map(|b| vec![b.clone()]),
            cmd: Some(argv.iter().skip(1).cloned().collect()),
            labels: Some(labels),
            host_config: Some(host_config),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }

    /// Collect logs after the container stopped, bounded per stream.
    async fn collect_logs(&self, name: &str) -> (String, String) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stream = self.docker.logs(name, Some(options));

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    append_bounded(&mut stdout, &message);
                }
                Ok(LogOutput::StdErr { message }) => {
                    append_bounded(&mut stderr, &message);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container = %name, error = %e, "log capture interrupted");
                    break;
                }
            }
        }

        (stdout, stderr)
    }

    /// Force-remove a container, ignoring failures.
    async fn remove(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(name, Some(options)).await {
            warn!(container = %name, error = %e, "failed to remove sandbox container");
        }
    }
}

#[async_trait]
impl ToolRunner for SandboxRunner {
    async fn run(
        &self,
        image: &str,
        argv: &[String],
        timeout: Duration,
    ) -> Result<RunOutput, SandboxError> {
        self.ensure_image(image).await?;

        let name = format!(
            "{}-tool-{}",
            self.tenant.namespace,
            uuid::Uuid::new_v4().simple()
        );
        let started = Instant::now();

        let config = self.container_config(image, argv);
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| SandboxError::Infrastructure(e.to_string()))?;

        if let Err(e) = self
            .docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
        {
            self.remove(&name).await;
            return Err(SandboxError::Infrastructure(e.to_string()));
        }

        let mut wait = self
            .docker
            .wait_container(&name, None::<WaitContainerOptions<String>>);

        let exit = tokio::time::timeout(timeout, wait.next()).await;
        let (exit_code, timed_out) = match exit {
            Ok(Some(Ok(status))) => (Some(status.status_code), false),
            // Non-zero exits surface as a wait error carrying the code.
            Ok(Some(Err(BollardError::DockerContainerWaitError { code, .. }))) => {
                (Some(code), false)
            }
            Ok(Some(Err(e))) => {
                warn!(container = %name, error = %e, "container wait failed");
                (None, false)
            }
            Ok(None) => (None, false),
            Err(_elapsed) => (None, true),
        };

        let (stdout, stderr) = self.collect_logs(&name).await;
        self.remove(&name).await;

        Ok(RunOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
            duration: started.elapsed(),
        })
    }
}

/// Append bytes to a buffer without exceeding the cap.
fn append_bounded(buffer: &mut String, bytes: &[u8]) {
    if buffer.len() >= OUTPUT_BUFFER_CAP {
        return;
    }
    let remaining = OUTPUT_BUFFER_CAP.saturating_sub(buffer.len());
    let text = String::from_utf8_lossy(bytes);
    let take: String = text.chars().take(remaining).collect();
    buffer.push_str(&take);
}
