//! Service lifecycle on top of the container engine

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::context::Context;
use crate::deploy::engine::{BuildRequest, ComposeAction, ContainerStats};
use crate::errors::OpsError;
use crate::filesys::file::File;
use crate::hardware::profile::DeploymentProfile;
use crate::storage::node_conf;
use crate::telemetry::free_space_at;
use crate::update::version::Version;
use crate::utils::human_bytes;

const GIB: u64 = 1024 * 1024 * 1024;

/// Point-in-time view of the managed service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub container_name: String,
    pub profile: DeploymentProfile,
    pub resource_usage: Option<ContainerStats>,
}

/// Result of a deploy request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Started,
    AlreadyRunning,
}

/// Drives build/deploy/stop for the profile detected at startup
pub struct Orchestrator<'a> {
    ctx: &'a Context,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    fn compose_file(&self) -> File {
        self.ctx.layout.compose_file(self.ctx.profile)
    }

    /// Engine reachable, artifacts present, enough disk at the data mount
    pub async fn preflight(&self) -> Result<(), OpsError> {
        self.ctx.engine.ping().await?;

        let layout = &self.ctx.layout;
        for artifact in [
            layout.dockerfile(),
            self.compose_file(),
            layout.node_config_file(),
        ] {
            if !artifact.exists().await {
                return Err(OpsError::MissingArtifact(artifact.path().to_path_buf()));
            }
        }

        self.check_disk_space()?;
        debug!("Pre-flight checks passed for profile {}", self.ctx.profile);
        Ok(())
    }

    fn check_disk_space(&self) -> Result<(), OpsError> {
        let required_gib = self.ctx.settings.min_free_disk_gib;
        if required_gib == 0 {
            return Ok(());
        }

        let data_dir = &self.ctx.layout.data_dir;
        let Some(available) = free_space_at(data_dir) else {
            warn!("Unable to determine free space at {:?}, continuing", data_dir);
            return Ok(());
        };

        if has_free_space(available, required_gib) {
            debug!("{} free at {:?}", human_bytes(available), data_dir);
            return Ok(());
        }

        warn!(
            "Only {} free at {:?}, {} GiB recommended for a full node",
            human_bytes(available),
            data_dir,
            required_gib
        );
        if self
            .ctx
            .confirm
            .confirm("Disk space is below the recommended threshold. Continue anyway?")
        {
            Ok(())
        } else {
            Err(OpsError::InsufficientDisk {
                path: data_dir.clone(),
                available_gib: available / GIB,
                required_gib,
            })
        }
    }

    /// Build the node image for `version`
    pub async fn build(&self, version: &Version, no_cache: bool) -> Result<(), OpsError> {
        let layout = &self.ctx.layout;
        let service = &self.ctx.settings.service;
        if !layout.dockerfile().exists().await {
            return Err(OpsError::MissingArtifact(layout.dockerfile().path().to_path_buf()));
        }

        let request = BuildRequest {
            context_dir: layout.base_dir.clone(),
            dockerfile: layout.dockerfile().path().to_path_buf(),
            tags: vec![
                format!("{}:{}", service.image_name, version),
                format!("{}:latest", service.image_name),
            ],
            build_args: vec![(service.version_build_arg.clone(), version.to_string())],
            no_cache,
        };

        info!("Building node image for version {}", version);
        self.ctx.engine.build(&request).await?;
        info!("Image {}:{} built", service.image_name, version);
        Ok(())
    }

    /// Start the service; a running service is left alone
    pub async fn deploy(&self) -> Result<DeployOutcome, OpsError> {
        let container = self.ctx.container();
        if self.ctx.engine.is_running(container).await? {
            info!("{} is already running", container);
            return Ok(DeployOutcome::AlreadyRunning);
        }

        self.ctx.layout.setup().await?;
        info!("Deploying {} with profile {}", container, self.ctx.profile);
        self.ctx
            .engine
            .compose(self.compose_file().path(), ComposeAction::Up)
            .await
            .map_err(|e| OpsError::DeployError(e.to_string()))?;
        Ok(DeployOutcome::Started)
    }

    /// Validate the configuration, run pre-flight checks, then deploy
    pub async fn start(&self) -> Result<DeployOutcome, OpsError> {
        node_conf::validate(
            &self.ctx.layout.node_config_file(),
            &self.ctx.settings.placeholder_marker,
            self.ctx.confirm.as_ref(),
        )
        .await?;
        self.preflight().await?;
        self.deploy().await
    }

    /// Remove the service containers (data volumes are kept)
    pub async fn stop(&self) -> Result<(), OpsError> {
        info!("Stopping {}", self.ctx.container());
        self.ctx
            .engine
            .compose(
                self.compose_file().path(),
                ComposeAction::Down {
                    remove_images: false,
                },
            )
            .await
    }

    /// Stop the container without removing it
    pub async fn pause(&self) -> Result<(), OpsError> {
        info!("Pausing {}", self.ctx.container());
        self.ctx
            .engine
            .compose(self.compose_file().path(), ComposeAction::Stop)
            .await
    }

    /// Start a container stopped by [`Orchestrator::pause`]
    pub async fn resume(&self) -> Result<(), OpsError> {
        info!("Resuming {}", self.ctx.container());
        self.ctx
            .engine
            .compose(self.compose_file().path(), ComposeAction::Start)
            .await
    }

    pub async fn restart(&self) -> Result<(), OpsError> {
        if !self.ctx.engine.is_running(self.ctx.container()).await? {
            info!("{} is not running, starting it", self.ctx.container());
            self.deploy().await?;
            return Ok(());
        }
        info!("Restarting {}", self.ctx.container());
        self.ctx
            .engine
            .compose(self.compose_file().path(), ComposeAction::Restart)
            .await
    }

    pub async fn status(&self) -> Result<ServiceStatus, OpsError> {
        let container = self.ctx.container();
        let running = self.ctx.engine.is_running(container).await?;
        let resource_usage = if running {
            self.ctx.engine.stats(container).await.unwrap_or_else(|e| {
                warn!("Unable to read container stats: {}", e);
                None
            })
        } else {
            None
        };

        Ok(ServiceStatus {
            running,
            container_name: container.to_string(),
            profile: self.ctx.profile,
            resource_usage,
        })
    }

    pub async fn logs(&self, tail: Option<usize>, follow: bool) -> Result<String, OpsError> {
        let tail = tail.unwrap_or(self.ctx.settings.service.log_tail);
        self.ctx
            .engine
            .logs(self.ctx.container(), tail, follow)
            .await
    }

    /// Remove containers and locally built images after confirmation.
    /// The data directory is never touched.
    pub async fn clean(&self) -> Result<(), OpsError> {
        if !self
            .ctx
            .confirm
            .confirm("Remove the node containers and locally built images?")
        {
            return Err(OpsError::Aborted("clean".to_string()));
        }
        info!("Cleaning containers and images for {}", self.ctx.container());
        self.ctx
            .engine
            .compose(
                self.compose_file().path(),
                ComposeAction::Down {
                    remove_images: true,
                },
            )
            .await
    }

    /// Rebuild from scratch at the installed version and redeploy
    pub async fn rebuild(&self) -> Result<(), OpsError> {
        let version = self.installed_version().await?;
        self.build(&version, true).await?;
        self.stop().await?;
        self.deploy().await?;
        Ok(())
    }

    /// Version recorded by the last successful update, else the configured baseline
    pub async fn installed_version(&self) -> Result<Version, OpsError> {
        match read_version_file(&self.ctx.layout.version_file()).await {
            Some(version) => Ok(version),
            None => self.ctx.settings.update.baseline_version.parse(),
        }
    }

    /// Version that was installed before the last update, if recorded
    pub async fn previous_version(&self) -> Option<Version> {
        read_version_file(&self.ctx.layout.previous_version_file()).await
    }

    /// Record a completed version change
    pub async fn record_version(&self, installed: &Version, previous: &Version) -> Result<(), OpsError> {
        let layout = &self.ctx.layout;
        layout
            .previous_version_file()
            .write_atomic(format!("{}\n", previous).as_bytes())
            .await?;
        layout
            .version_file()
            .write_atomic(format!("{}\n", installed).as_bytes())
            .await
    }
}

async fn read_version_file(file: &File) -> Option<Version> {
    let text = file.read_string().await.ok()?;
    Version::extract(text.trim())
}

/// Whether `available` bytes cover `required_gib`; absurd thresholds saturate
fn has_free_space(available: u64, required_gib: u64) -> bool {
    available >= required_gib.saturating_mul(GIB)
}
