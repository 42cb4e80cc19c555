//! Backup creation and restore

use std::fmt::{self, Display};
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::app::context::Context;
use crate::backup::archive::{self, Manifest, CHAINSTATE_DIR, CONFIG_DIR, MANIFEST_FILE, SYSTEM_INFO_FILE, WALLET_DIR};
use crate::backup::retention::{self, ArchiveEntry};
use crate::deploy::orchestrator::{Orchestrator, ServiceStatus};
use crate::errors::OpsError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::hardware::profile::{DeploymentProfile, HostInfo};
use crate::storage::node_conf::NodeConfig;
use crate::telemetry::{collect_metrics, os_info, OsInfo, SystemMetrics};
use crate::utils::{human_bytes, shutdown_signal};

/// Host and service facts stored with every archive
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfoSnapshot {
    pub captured_at: DateTime<Utc>,
    pub profile: DeploymentProfile,
    pub host: HostInfo,
    pub os: OsInfo,
    pub metrics: SystemMetrics,
    pub service: Option<ServiceStatus>,
    pub nodeops_version: String,
}

/// Result of a backup
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub path: PathBuf,
    pub size: u64,
    pub manifest: Manifest,
    /// Whether the service was stopped for part of the backup
    pub paused_service: bool,
    pub removed: Vec<PathBuf>,
}

/// Result of a restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub archive: PathBuf,
    pub manifest: Manifest,
    pub restored_wallet: bool,
    /// Copy of the configuration that was replaced
    pub previous_config: Option<PathBuf>,
}

/// What the wallet step should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletPlan {
    Skip,
    /// Node is down, files can be copied as they are
    CopyOffline,
    /// Node is up with a loaded wallet, stop it around the copy
    CopyPaused,
}

pub struct BackupManager<'a> {
    ctx: &'a Context,
}

impl<'a> BackupManager<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    fn prefix(&self) -> &str {
        &self.ctx.settings.backup.archive_prefix
    }

    /// Snapshot configuration and system info, plus wallet data when a wallet
    /// is in use and chain state when asked for
    pub async fn create_backup(&self, include_chainstate: bool) -> Result<BackupReport, OpsError> {
        let layout = &self.ctx.layout;
        let config_file = layout.node_config_file();
        if !config_file.exists().await {
            return Err(OpsError::MissingFile(config_file.path().to_path_buf()));
        }
        layout.backups().create().await?;

        let stem = archive::archive_stem(self.prefix(), Local::now());
        let (name, target) = archive::unique_archive_path(&layout.backup_dir, &stem);
        info!("Creating backup {}", name);

        let staging = Dir::create_temp_dir("nodeops-backup").await?;
        let result = self
            .stage_and_pack(&staging, &name, &target, &config_file, include_chainstate)
            .await;
        if let Err(e) = staging.delete().await {
            warn!("Failed to remove staging directory {:?}: {}", staging.path(), e);
        }
        let (size, manifest, paused_service) = result?;

        let removed = retention::apply_retention(
            &layout.backups(),
            self.prefix(),
            self.ctx.settings.backup.retention,
        )
        .await?;

        info!("Backup written to {:?}", target);
        Ok(BackupReport {
            path: target,
            size,
            manifest,
            paused_service,
            removed,
        })
    }

    async fn stage_and_pack(
        &self,
        staging: &Dir,
        name: &str,
        target: &Path,
        config_file: &File,
        include_chainstate: bool,
    ) -> Result<(u64, Manifest, bool), OpsError> {
        let layout = &self.ctx.layout;
        let config_bytes = config_file.read_bytes().await?;
        let config = NodeConfig::parse(&String::from_utf8_lossy(&config_bytes));
        let mut manifest = Manifest::new(name, layout.node_config_name(), &config_bytes);

        staging
            .subdir(CONFIG_DIR)
            .file(layout.node_config_name())
            .write_bytes(&config_bytes)
            .await?;

        let orchestrator = Orchestrator::new(self.ctx);
        let service = match orchestrator.status().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Unable to read service status: {}", e);
                None
            }
        };
        let running = service.as_ref().is_some_and(|s| s.running);
        manifest.node_version = orchestrator.installed_version().await.ok().map(|v| v.to_string());

        let snapshot = SystemInfoSnapshot {
            captured_at: Utc::now(),
            profile: self.ctx.profile,
            host: HostInfo::probe(&self.ctx.settings.hardware.marker_path),
            os: os_info(),
            metrics: collect_metrics(),
            service,
            nodeops_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        staging.file(SYSTEM_INFO_FILE).write_json(&snapshot).await?;

        let wallet_plan = self.wallet_plan(&config, running).await;
        let wallet_source = layout.data().subdir(&self.ctx.settings.backup.wallet_dir_name);
        let chainstate_source = layout
            .data()
            .subdir(&self.ctx.settings.backup.chainstate_dir_name);

        let needs_pause =
            running && (wallet_plan == WalletPlan::CopyPaused || include_chainstate);
        let copy_data = async {
            if wallet_plan != WalletPlan::Skip {
                manifest.includes_wallet = copy_if_present(&wallet_source, &staging.subdir(WALLET_DIR)).await?;
            }
            if include_chainstate {
                manifest.includes_chainstate =
                    copy_if_present(&chainstate_source, &staging.subdir(CHAINSTATE_DIR)).await?;
            }
            Ok(())
        };

        if needs_pause {
            self.with_service_paused(copy_data).await?;
        } else {
            copy_data.await?;
        }

        staging.file(MANIFEST_FILE).write_json(&manifest).await?;

        let source = staging.path().to_path_buf();
        let (root_name, target) = (name.to_string(), target.to_path_buf());
        let size = blocking(move || archive::pack(&source, &root_name, &target)).await?;
        Ok((size, manifest, needs_pause))
    }

    /// Decide whether wallet data goes into the archive.
    ///
    /// A wallet counts as enabled when the config does not disable it and the
    /// running node has at least one loaded wallet. Probe failures mean "no
    /// wallet", never an error.
    async fn wallet_plan(&self, config: &NodeConfig, running: bool) -> WalletPlan {
        if config.wallet_disabled() {
            debug!("Wallet disabled in configuration");
            return WalletPlan::Skip;
        }

        if !running {
            let wallets = self
                .ctx
                .layout
                .data()
                .subdir(&self.ctx.settings.backup.wallet_dir_name);
            return if wallets.exists().await {
                WalletPlan::CopyOffline
            } else {
                WalletPlan::Skip
            };
        }

        match self.ctx.rpc.call("listwallets", &[]).await {
            Ok(Value::Array(wallets)) if !wallets.is_empty() => {
                info!("{} wallet(s) loaded, wallet data will be included", wallets.len());
                WalletPlan::CopyPaused
            }
            Ok(_) => {
                debug!("No wallet loaded");
                WalletPlan::Skip
            }
            Err(e) => {
                info!("Wallet probe failed ({}), skipping wallet data", e);
                WalletPlan::Skip
            }
        }
    }

    /// Stop the service, run `work`, and start it again whatever `work` returned.
    ///
    /// SIGTERM or Ctrl+C during the pause cancels `work` and still restarts the service.
    pub async fn with_service_paused<T, F>(&self, work: F) -> Result<T, OpsError>
    where
        F: Future<Output = Result<T, OpsError>>,
    {
        self.with_service_paused_until(work, shutdown_signal()).await
    }

    /// Same as [`Self::with_service_paused`], cancelling `work` when `interrupt` resolves
    pub async fn with_service_paused_until<T, F, I>(&self, work: F, interrupt: I) -> Result<T, OpsError>
    where
        F: Future<Output = Result<T, OpsError>>,
        I: Future<Output = ()>,
    {
        let orchestrator = Orchestrator::new(self.ctx);
        orchestrator.pause().await?;

        let result = tokio::select! {
            result = work => result,
            _ = interrupt => {
                warn!("Interrupted while {} was paused, starting it again", self.ctx.container());
                Err(OpsError::Interrupted("service paused for backup".to_string()))
            }
        };
        let resumed = orchestrator.resume().await;

        match (result, resumed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(resume_error)) => {
                error!("Service could not be resumed after a failed backup: {}", resume_error);
                Err(e)
            }
        }
    }

    /// Archives in the backup directory, newest first
    pub async fn list_backups(&self) -> Result<Vec<ArchiveEntry>, OpsError> {
        retention::list_archives(&self.ctx.layout.backups(), self.prefix()).await
    }

    /// Restore configuration (and wallet data, when present) from `archive_path`
    pub async fn restore_backup(&self, archive_path: &Path) -> Result<RestoreReport, OpsError> {
        if !File::new(archive_path).exists().await {
            return Err(OpsError::ArchiveNotFound(archive_path.to_path_buf()));
        }

        if !self.ctx.confirm.confirm(&format!(
            "Restore {} and restart the node? The current configuration will be replaced.",
            archive_path.display()
        )) {
            return Err(OpsError::Aborted("restore".to_string()));
        }

        let scratch = Dir::create_temp_dir("nodeops-restore").await?;
        let result = self.restore_from(archive_path, &scratch).await;
        if let Err(e) = scratch.delete().await {
            warn!("Failed to remove scratch directory {:?}: {}", scratch.path(), e);
        }
        result
    }

    async fn restore_from(&self, archive_path: &Path, scratch: &Dir) -> Result<RestoreReport, OpsError> {
        let layout = &self.ctx.layout;

        // Nothing live is touched until the archive has been extracted and checked
        let (source, dest) = (archive_path.to_path_buf(), scratch.path().to_path_buf());
        let (root, manifest) = blocking(move || {
            let root = archive::unpack(&source, &dest)?;
            let manifest = archive::validate(&root)?;
            Ok((root, manifest))
        })
        .await?;
        info!("Restoring {} taken at {}", manifest.name, manifest.created_at);

        let orchestrator = Orchestrator::new(self.ctx);
        if self.ctx.engine.is_running(self.ctx.container()).await? {
            orchestrator.stop().await?;
        }

        let live_config = layout.node_config_file();
        let previous_config = if live_config.exists().await {
            let backup_path = live_config.path().with_extension("conf.pre-restore");
            live_config.copy_to(&backup_path).await?;
            Some(backup_path)
        } else {
            None
        };
        File::new(archive::config_path(&root, &manifest))
            .copy_to(live_config.path())
            .await?;

        let wallet_snapshot = Dir::new(root.join(WALLET_DIR));
        let restored_wallet = manifest.includes_wallet && wallet_snapshot.exists().await;
        if restored_wallet {
            let target = layout.data().subdir(&self.ctx.settings.backup.wallet_dir_name);
            let copied = wallet_snapshot.copy_to(target.path()).await?;
            info!("Restored {} wallet file(s)", copied);
        }

        orchestrator.deploy().await?;

        Ok(RestoreReport {
            archive: archive_path.to_path_buf(),
            manifest,
            restored_wallet,
            previous_config,
        })
    }
}

/// Run synchronous archive work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, OpsError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OpsError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| OpsError::Internal(format!("archive task failed: {}", e)))?
}

/// Copy `source` into `target` if it exists; returns whether anything was copied
async fn copy_if_present(source: &Dir, target: &Dir) -> Result<bool, OpsError> {
    if !source.exists().await {
        debug!("{:?} does not exist, skipping", source.path());
        return Ok(false);
    }
    let copied = source.copy_to(target.path()).await?;
    debug!("Copied {} file(s) from {:?}", copied, source.path());
    Ok(true)
}

impl Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "Backup created:".green(), self.path.display())?;
        writeln!(f, "  Size:        {}", human_bytes(self.size))?;
        writeln!(f, "  Wallet:      {}", yes_no(self.manifest.includes_wallet))?;
        writeln!(f, "  Chain state: {}", yes_no(self.manifest.includes_chainstate))?;
        if self.paused_service {
            writeln!(f, "  Service was paused during the copy")?;
        }
        for path in &self.removed {
            writeln!(f, "  Removed old backup {}", path.display())?;
        }
        Ok(())
    }
}

impl Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "Restored:".green(), self.archive.display())?;
        writeln!(f, "  Taken at:    {}", self.manifest.created_at)?;
        writeln!(f, "  Wallet:      {}", yes_no(self.restored_wallet))?;
        if let Some(previous) = &self.previous_config {
            writeln!(f, "  Previous configuration saved to {}", previous.display())?;
        }
        Ok(())
    }
}

/// Table of archives for `backup list`
pub struct ArchiveList<'a>(pub &'a [ArchiveEntry]);

impl Display for ArchiveList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No backups found");
        }
        for entry in self.0 {
            let name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(
                f,
                "{:<45} {:>10}  {}",
                name,
                human_bytes(entry.size),
                entry.modified_local().format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "included"
    } else {
        "not included"
    }
}
