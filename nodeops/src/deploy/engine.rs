//! Container engine access
//!
//! Everything that touches the engine goes through [`ContainerEngine`], so the
//! orchestration logic can be exercised without a Docker daemon.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::OpsError;

/// Compose lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    /// `up -d`
    Up,
    /// `down`, optionally removing locally built images
    Down { remove_images: bool },
    /// `stop` (container kept)
    Stop,
    /// `start` a stopped container
    Start,
    /// `restart`
    Restart,
}

impl ComposeAction {
    fn args(&self) -> Vec<&'static str> {
        match self {
            ComposeAction::Up => vec!["up", "-d"],
            ComposeAction::Down { remove_images: false } => vec!["down"],
            ComposeAction::Down { remove_images: true } => vec!["down", "--rmi", "local"],
            ComposeAction::Stop => vec!["stop"],
            ComposeAction::Start => vec!["start"],
            ComposeAction::Restart => vec!["restart"],
        }
    }
}

/// Image build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub tags: Vec<String>,
    pub build_args: Vec<(String, String)>,
    pub no_cache: bool,
}

/// One line of `docker stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    #[serde(rename = "CPUPerc", default)]
    pub cpu_percent: String,
    #[serde(rename = "MemUsage", default)]
    pub mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    pub mem_percent: String,
    #[serde(rename = "NetIO", default)]
    pub net_io: String,
    #[serde(rename = "BlockIO", default)]
    pub block_io: String,
}

/// Operations nodeops needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Fails with `EngineUnavailable` when the engine cannot be reached
    async fn ping(&self) -> Result<(), OpsError>;

    async fn build(&self, request: &BuildRequest) -> Result<(), OpsError>;

    async fn compose(&self, compose_file: &Path, action: ComposeAction) -> Result<(), OpsError>;

    /// A missing container is reported as not running
    async fn is_running(&self, container: &str) -> Result<bool, OpsError>;

    async fn stats(&self, container: &str) -> Result<Option<ContainerStats>, OpsError>;

    /// With `follow`, output streams to the terminal and an empty string is returned
    async fn logs(&self, container: &str, tail: usize, follow: bool) -> Result<String, OpsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComposeFlavor {
    /// `docker compose`
    Plugin,
    /// standalone `docker-compose`
    Standalone,
}

/// Docker CLI backed engine
#[derive(Debug, Default)]
pub struct DockerEngine {
    flavor: OnceCell<ComposeFlavor>,
}

impl DockerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn compose_flavor(&self) -> ComposeFlavor {
        *self
            .flavor
            .get_or_init(|| async {
                let plugin = Command::new("docker")
                    .args(["compose", "version"])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await
                    .map(|s| s.success())
                    .unwrap_or(false);
                if plugin {
                    ComposeFlavor::Plugin
                } else {
                    debug!("'docker compose' unavailable, using docker-compose");
                    ComposeFlavor::Standalone
                }
            })
            .await
    }

    async fn compose_command(&self, compose_file: &Path) -> Command {
        let mut cmd = match self.compose_flavor().await {
            ComposeFlavor::Plugin => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            ComposeFlavor::Standalone => Command::new("docker-compose"),
        };
        cmd.arg("-f").arg(compose_file).kill_on_drop(true);
        if let Some(dir) = compose_file.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), OpsError> {
        let output = Command::new("docker")
            .args(["info", "--format", "{{.ServerVersion}}"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OpsError::EngineUnavailable(format!("Failed to run docker: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OpsError::EngineUnavailable(stderr.trim().to_string()));
        }

        debug!(
            "Docker server version {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> Result<(), OpsError> {
        let mut cmd = Command::new("docker");
        cmd.arg("build").arg("-f").arg(&request.dockerfile);
        for (key, value) in &request.build_args {
            cmd.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        for tag in &request.tags {
            cmd.arg("-t").arg(tag);
        }
        if request.no_cache {
            cmd.arg("--no-cache");
        }
        cmd.arg(&request.context_dir).kill_on_drop(true);

        info!("Building image {}", request.tags.join(", "));
        let status = cmd
            .status()
            .await
            .map_err(|e| OpsError::BuildError(format!("Failed to run docker build: {}", e)))?;

        if !status.success() {
            return Err(OpsError::BuildError(format!(
                "docker build exited with {}",
                status
            )));
        }
        Ok(())
    }

    async fn compose(&self, compose_file: &Path, action: ComposeAction) -> Result<(), OpsError> {
        let mut cmd = self.compose_command(compose_file).await;
        cmd.args(action.args());

        debug!("Running compose {:?} with {:?}", action, compose_file);
        let status = cmd
            .status()
            .await
            .map_err(|e| OpsError::EngineError(format!("Failed to run compose: {}", e)))?;

        if !status.success() {
            return Err(OpsError::EngineError(format!(
                "compose {} exited with {}",
                action.args().join(" "),
                status
            )));
        }
        Ok(())
    }

    async fn is_running(&self, container: &str) -> Result<bool, OpsError> {
        let output = Command::new("docker")
            .args(["inspect", "--format", "{{.State.Running}}", container])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OpsError::EngineUnavailable(format!("Failed to run docker: {}", e)))?;

        if !output.status.success() {
            debug!("Container {} not found", container);
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn stats(&self, container: &str) -> Result<Option<ContainerStats>, OpsError> {
        let output = Command::new("docker")
            .args(["stats", "--no-stream", "--format", "{{json .}}", container])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OpsError::EngineError(format!("Failed to run docker stats: {}", e)))?;

        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().find(|l| !l.trim().is_empty()) {
            Some(line) => Ok(Some(serde_json::from_str(line)?)),
            None => Ok(None),
        }
    }

    async fn logs(&self, container: &str, tail: usize, follow: bool) -> Result<String, OpsError> {
        let tail = tail.to_string();
        let mut cmd = Command::new("docker");
        cmd.args(["logs", "--tail", &tail]).kill_on_drop(true);

        if follow {
            cmd.arg("-f").arg(container);
            let status = cmd
                .status()
                .await
                .map_err(|e| OpsError::EngineError(format!("Failed to run docker logs: {}", e)))?;
            if !status.success() {
                return Err(OpsError::EngineError(format!("docker logs exited with {}", status)));
            }
            return Ok(String::new());
        }

        let output = cmd
            .arg(container)
            .output()
            .await
            .map_err(|e| OpsError::EngineError(format!("Failed to run docker logs: {}", e)))?;
        if !output.status.success() {
            return Err(OpsError::EngineError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // The daemon logs to stdout, the engine may interleave stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }
}
