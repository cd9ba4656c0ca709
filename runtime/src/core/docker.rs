use crate::core::stats::{StatsSample, STATS_FORMAT};
use crate::shared::error::{RuntimeError, RuntimeResult};
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, PortBinding, PortMap, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const BYTES_IN_MB: i64 = 1024 * 1024; // 1 MB in bytes
const STATS_TIMEOUT_S: u64 = 5;
/// cgroup CPU scheduling period handed to the engine; quotas scale against it.
const CPU_PERIOD_US: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DockerErrorKind {
    NotInstalled,
    DaemonNotRunning,
    ConnectionFailed,
    Unknown,
}

/// Engine health record. Mutating handlers consult this before touching the
/// engine so a dead daemon surfaces as 503 rather than a failed operation.
#[derive(Debug, Clone, Serialize)]
pub struct DockerStatus {
    pub available: bool,
    pub cli_installed: bool,
    pub engine_running: bool,
    pub version: Option<String>,
    pub error_kind: Option<DockerErrorKind>,
    pub message: String,
}

/// Parameters for running one container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub host_port: i32,
    pub container_port: i32,
    pub cpu_millicores: i32,
    pub memory_mb: i32,
    pub env: Vec<(String, String)>,
    pub restart_policy: String,
}

#[derive(Debug, Clone)]
pub struct EngineContainerState {
    pub running: bool,
    pub status: String,
}

/// Stateless adapter over the local Docker engine.
///
/// Lifecycle operations go through the engine API; the one-shot resource
/// snapshot goes through the CLI's formatted stats output so the normalized
/// unit parsing in [`crate::core::stats`] is the single source of numbers.
#[derive(Clone)]
pub struct DockerDriver {
    docker: Docker,
    cli_bin: String,
}

impl DockerDriver {
    pub fn connect(cli_bin: &str) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(format!("Failed to connect to Docker: {e}")))?;
        Ok(Self {
            docker,
            cli_bin: cli_bin.to_string(),
        })
    }

    pub fn with_docker(docker: Docker, cli_bin: &str) -> Self {
        Self {
            docker,
            cli_bin: cli_bin.to_string(),
        }
    }

    /// Probes the CLI and the daemon and reports a combined health record.
    pub async fn status(&self) -> DockerStatus {
        let mut status = DockerStatus {
            available: false,
            cli_installed: false,
            engine_running: false,
            version: None,
            error_kind: None,
            message: String::new(),
        };

        let probe = Command::new(&self.cli_bin)
            .args(["version", "--format", "{{.Client.Version}}"])
            .output()
            .await;

        match probe {
            Ok(out) if out.status.success() => {
                status.cli_installed = true;
                status.version = Some(String::from_utf8_lossy(&out.stdout).trim().to_string());
            }
            Ok(out) => {
                status.cli_installed = true;
                let stderr = String::from_utf8_lossy(&out.stderr).to_lowercase();
                if stderr.contains("cannot connect") || stderr.contains("daemon") || stderr.contains("pipe") {
                    status.error_kind = Some(DockerErrorKind::DaemonNotRunning);
                    status.message =
                        "Docker daemon is not running. Please start the Docker engine.".to_string();
                } else {
                    status.error_kind = Some(DockerErrorKind::ConnectionFailed);
                    status.message = format!("Failed to query Docker CLI: {}", stderr.trim());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                status.error_kind = Some(DockerErrorKind::NotInstalled);
                status.message =
                    "Docker is not installed or not in PATH. Please install the Docker engine."
                        .to_string();
                return status;
            }
            Err(e) => {
                status.error_kind = Some(DockerErrorKind::Unknown);
                status.message = format!("Unexpected Docker error: {e}");
                return status;
            }
        }

        match self.docker.ping().await {
            Ok(_) => {
                status.engine_running = true;
                status.available = status.cli_installed;
                if status.available {
                    status.message = format!(
                        "Docker is available (version {})",
                        status.version.as_deref().unwrap_or("unknown")
                    );
                    status.error_kind = None;
                }
            }
            Err(e) => {
                let text = e.to_string().to_lowercase();
                status.error_kind = Some(
                    if text.contains("connection refused") || text.contains("no such file") {
                        DockerErrorKind::DaemonNotRunning
                    } else if text.contains("timed out") || text.contains("timeout") {
                        DockerErrorKind::ConnectionFailed
                    } else {
                        DockerErrorKind::Unknown
                    },
                );
                if status.message.is_empty() {
                    status.message = format!("Failed to reach the Docker daemon: {e}");
                }
                warn!("Docker daemon not reachable: {e}");
            }
        }

        status
    }

    pub async fn list_local_images(&self) -> RuntimeResult<Vec<String>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to list images: {e}")))?;

        let mut names: Vec<String> = images
            .into_iter()
            .flat_map(|img| img.repo_tags)
            .filter(|tag| !tag.is_empty() && tag != "<none>:<none>")
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn image_exists_locally(&self, image: &str) -> bool {
        match self.list_local_images().await {
            Ok(images) => {
                // Bare references imply the :latest tag.
                let wanted = if image.contains(':') {
                    image.to_string()
                } else {
                    format!("{image}:latest")
                };
                let exists = images.iter().any(|tag| tag == &wanted);
                debug!("Image '{image}' {} locally", if exists { "found" } else { "not found" });
                exists
            }
            Err(e) => {
                warn!("Failed to check if image exists: {e}");
                false
            }
        }
    }

    /// Pulls an image from a registry, optionally authenticated.
    pub async fn pull_image(
        &self,
        image: &str,
        credentials: Option<(String, String)>,
    ) -> RuntimeResult<()> {
        info!("Pulling image: {image}");
        let creds = credentials.map(|(username, password)| DockerCredentials {
            username: Some(username),
            password: Some(password),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            creds,
        );

        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RuntimeError::Engine(format!("Failed to pull image {image}: {e}")))?;
        }

        info!("Successfully pulled image: {image}");
        Ok(())
    }

    /// Builds an image from a directory containing a Dockerfile. The context
    /// is tar-packed in memory and shipped to the engine.
    pub async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> RuntimeResult<String> {
        info!("Building image '{tag}' from {}", context_dir.display());

        let context = shared_utils::pack_build_context(context_dir, &[".git"])
            .map_err(|e| RuntimeError::Engine(format!("Failed to pack build context: {e}")))?;

        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream =
            self.docker
                .build_image(options, None, Some(context.into()));

        while let Some(progress) = stream.next().await {
            let info = progress
                .map_err(|e| RuntimeError::Engine(format!("Failed to build image {tag}: {e}")))?;
            if let Some(detail) = info.error {
                return Err(RuntimeError::Engine(format!(
                    "Failed to build image {tag}: {detail}"
                )));
            }
        }

        info!("Successfully built image: {tag}");
        Ok(tag.to_string())
    }

    /// Creates and starts a container, returning the engine id.
    pub async fn run_container(&self, spec: RunSpec) -> RuntimeResult<String> {
        // Set up port bindings.
        let mut port_map = PortMap::new();
        port_map.insert(
            format!("{}/tcp", spec.container_port),
            Some(vec![PortBinding {
                host_ip: Some("".to_string()),
                host_port: Some(spec.host_port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{}/tcp", spec.container_port), HashMap::new());

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                memory: Some(spec.memory_mb as i64 * BYTES_IN_MB),
                cpu_period: Some(CPU_PERIOD_US),
                cpu_quota: Some(cpu_quota_us(spec.cpu_millicores)),
                port_bindings: Some(port_map),
                restart_policy: Some(RestartPolicy {
                    name: Some(restart_policy_name(&spec.restart_policy)),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_response = self
            .docker
            .create_container::<String, String>(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                container_config,
            )
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to create container: {e}")))?;
        let container_id = create_response.id;

        self.docker
            .start_container::<String>(&container_id, None)
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to start container: {e}")))?;

        info!(
            "Container started: {} (ID: {})",
            spec.name,
            &container_id[..12.min(container_id.len())]
        );
        Ok(container_id)
    }

    pub async fn start_container(&self, engine_id: &str) -> RuntimeResult<()> {
        self.docker
            .start_container::<String>(engine_id, None)
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to start container: {e}")))
    }

    pub async fn stop_container(&self, engine_id: &str) -> RuntimeResult<()> {
        self.docker
            .stop_container(engine_id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to stop container: {e}")))
    }

    pub async fn remove_container(&self, engine_id: &str) -> RuntimeResult<()> {
        self.docker
            .remove_container(
                engine_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to remove container: {e}")))
    }

    pub async fn inspect_container(&self, engine_id: &str) -> RuntimeResult<EngineContainerState> {
        let inspect = self
            .docker
            .inspect_container(engine_id, None)
            .await
            .map_err(|e| RuntimeError::Engine(format!("Failed to inspect container: {e}")))?;

        let state = inspect.state.unwrap_or_default();
        Ok(EngineContainerState {
            running: state.running.unwrap_or(false),
            status: state
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    pub async fn container_logs(&self, engine_id: &str, tail: usize) -> RuntimeResult<Vec<String>> {
        let mut stream = self.docker.logs(
            engine_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );

        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| RuntimeError::Engine(format!("Failed to read logs: {e}")))?;
            let text = String::from_utf8_lossy(&chunk.into_bytes()).to_string();
            lines.extend(text.lines().map(str::to_string));
        }
        Ok(lines)
    }

    /// One-shot resource snapshot via the CLI's formatted stats output.
    /// Degrades to a zero-valued sample on any failure.
    pub async fn sample_stats(&self, engine_id: &str) -> StatsSample {
        let command = Command::new(&self.cli_bin)
            .args(["stats", engine_id, "--no-stream", "--format", STATS_FORMAT])
            .output();

        match tokio::time::timeout(Duration::from_secs(STATS_TIMEOUT_S), command).await {
            Ok(Ok(out)) if out.status.success() => {
                StatsSample::parse(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(Ok(out)) => {
                warn!(
                    "stats command failed for {engine_id}: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                StatsSample::default()
            }
            Ok(Err(e)) => {
                warn!("failed to spawn stats command for {engine_id}: {e}");
                StatsSample::default()
            }
            Err(_) => {
                warn!("stats command timed out for {engine_id}");
                StatsSample::default()
            }
        }
    }
}

fn restart_policy_name(name: &str) -> RestartPolicyNameEnum {
    match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::NO,
    }
}

/// CPU quota in microseconds for a millicore limit. 1000 millicores consume
/// one full [`CPU_PERIOD_US`] per period, so the quota is simply the limit
/// scaled onto the period.
fn cpu_quota_us(millicores: i32) -> i64 {
    (CPU_PERIOD_US as f64 * millicores as f64 / 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quota_scales_with_millicores() {
        // The default container limit of 500 millicores gets half a period.
        assert_eq!(cpu_quota_us(500), CPU_PERIOD_US / 2);
        // A full core consumes the whole period; beyond that it multiplies.
        assert_eq!(cpu_quota_us(1000), CPU_PERIOD_US);
        assert_eq!(cpu_quota_us(2500), CPU_PERIOD_US * 5 / 2);
        // Tiny fractional limits round to whole microseconds.
        assert_eq!(cpu_quota_us(1), 100);
        assert_eq!(cpu_quota_us(0), 0);
    }

    #[test]
    fn test_restart_policy_mapping() {
        assert_eq!(restart_policy_name("always"), RestartPolicyNameEnum::ALWAYS);
        assert_eq!(
            restart_policy_name("unless-stopped"),
            RestartPolicyNameEnum::UNLESS_STOPPED
        );
        assert_eq!(restart_policy_name("bogus"), RestartPolicyNameEnum::NO);
    }
}
