//! Version check, update and rollback

use std::fmt::{self, Display};
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::app::context::Context;
use crate::backup::manager::BackupManager;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::OpsError;
use crate::monitor::health::HealthMonitor;
use crate::update::fsm::{UpdateEvent, UpdateFsm, UpdateState};
use crate::update::version::Version;

/// Where the current version came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    RunningNode,
    VersionFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionCheck {
    pub current: Version,
    pub current_source: VersionSource,
    pub latest: Version,
    pub update_available: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UpdateOutcome {
    AlreadyLatest {
        current: Version,
        latest: Version,
    },
    Updated {
        from: Version,
        to: Version,
        backup: PathBuf,
    },
    RolledBack {
        from: Version,
        to: Version,
    },
}

pub struct UpdateCoordinator<'a> {
    ctx: &'a Context,
    fsm: UpdateFsm,
}

impl<'a> UpdateCoordinator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            fsm: UpdateFsm::new(),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.fsm.state()
    }

    /// States visited so far
    pub fn history(&self) -> &[UpdateState] {
        self.fsm.history()
    }

    /// Compare the current and latest versions without changing anything
    pub async fn check(&mut self) -> Result<VersionCheck, OpsError> {
        self.fsm.process(UpdateEvent::Check)?;
        let check = match self.compare().await {
            Ok(check) => check,
            Err(e) => {
                self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
                return Err(e);
            }
        };

        if check.update_available {
            info!("Update available: {} -> {}", check.current, check.latest);
            self.fsm.process(UpdateEvent::UpdateAvailable)?;
        } else {
            info!("{} is the latest version (upstream {})", check.current, check.latest);
            self.fsm.process(UpdateEvent::UpToDate)?;
        }
        Ok(check)
    }

    async fn compare(&self) -> Result<VersionCheck, OpsError> {
        let (current, current_source) = self.current_version().await?;
        let latest = self.ctx.feed.latest_version().await?;
        Ok(VersionCheck {
            update_available: latest > current,
            current,
            current_source,
            latest,
        })
    }

    async fn current_version(&self) -> Result<(Version, VersionSource), OpsError> {
        match HealthMonitor::new(self.ctx).running_version().await {
            Ok(version) => Ok((version, VersionSource::RunningNode)),
            Err(e) => {
                info!("Running version unavailable ({}), using the recorded version", e);
                let version = Orchestrator::new(self.ctx).installed_version().await?;
                Ok((version, VersionSource::VersionFile))
            }
        }
    }

    /// Update to the latest release. `force` skips the confirmation.
    pub async fn run(&mut self, force: bool) -> Result<UpdateOutcome, OpsError> {
        let check = self.check().await?;
        if !check.update_available {
            return Ok(UpdateOutcome::AlreadyLatest {
                current: check.current,
                latest: check.latest,
            });
        }

        let prompt = format!(
            "Update the node from {} to {}? A backup is taken first.",
            check.current, check.latest
        );
        if !force && !self.ctx.confirm.confirm(&prompt) {
            self.fsm.process(UpdateEvent::Declined)?;
            return Err(OpsError::Aborted("update".to_string()));
        }
        self.fsm.process(UpdateEvent::Confirmed)?;

        let backup = match BackupManager::new(self.ctx).create_backup(false).await {
            Ok(report) => report.path,
            Err(e) => {
                self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
                return Err(OpsError::BackupPrecondition(e.to_string()));
            }
        };
        self.fsm.process(UpdateEvent::BackupCompleted)?;

        let orchestrator = Orchestrator::new(self.ctx);
        if let Err(e) = orchestrator.build(&check.latest, false).await {
            self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
            return Err(match e {
                OpsError::BuildError(_) => e,
                other => OpsError::BuildError(other.to_string()),
            });
        }
        self.fsm.process(UpdateEvent::BuildCompleted)?;

        let redeployed = async {
            orchestrator.stop().await?;
            orchestrator.deploy().await
        };
        if let Err(e) = redeployed.await {
            warn!("Redeploy failed: {}", e);
            self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
            return Err(self.roll_back(&check.current, &check.latest, e).await);
        }
        self.fsm.process(UpdateEvent::Redeployed)?;

        if let Err(e) = self.verify(&check.latest).await {
            warn!("Verification failed: {}", e);
            self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
            return Err(self.roll_back(&check.current, &check.latest, e).await);
        }
        self.fsm.process(UpdateEvent::Verified)?;

        orchestrator.record_version(&check.latest, &check.current).await?;
        info!("Node updated from {} to {}", check.current, check.latest);
        Ok(UpdateOutcome::Updated {
            from: check.current,
            to: check.latest,
            backup,
        })
    }

    /// Poll until the node reports `expected`
    async fn verify(&self, expected: &Version) -> Result<(), OpsError> {
        let settings = &self.ctx.settings.update;
        let attempts = settings.verify_attempts.max(1);
        let monitor = HealthMonitor::new(self.ctx);

        let mut last_seen = None;
        for attempt in 1..=attempts {
            match monitor.running_version().await {
                Ok(version) if &version == expected => {
                    info!("Node reports {} after {} attempt(s)", version, attempt);
                    return Ok(());
                }
                Ok(version) => {
                    info!("Node reports {}, waiting for {}", version, expected);
                    last_seen = Some(version.to_string());
                }
                Err(e) => info!("Verification attempt {}/{}: {}", attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(settings.verify_interval()).await;
            }
        }

        Err(OpsError::VersionMismatch {
            expected: expected.to_string(),
            found: last_seen.unwrap_or_else(|| "no answer".to_string()),
        })
    }

    /// Rebuild and redeploy `previous`; returns the error to surface
    async fn roll_back(&mut self, previous: &Version, failed: &Version, cause: OpsError) -> OpsError {
        warn!("Rolling back from {} to {}", failed, previous);
        match self.reinstall(previous).await {
            Ok(()) => {
                if let Err(e) = self.fsm.process(UpdateEvent::RolledBack) {
                    return e;
                }
                OpsError::RollbackCompleted(format!(
                    "update to {} failed ({}), {} is running again",
                    failed, cause, previous
                ))
            }
            Err(e) => {
                error!("Rollback to {} failed: {}", previous, e);
                if let Err(transition) = self.fsm.process(UpdateEvent::StepFailed(e.to_string())) {
                    return transition;
                }
                OpsError::RollbackFailed(format!(
                    "update to {} failed ({}), restoring {} failed ({})",
                    failed, cause, previous, e
                ))
            }
        }
    }

    async fn reinstall(&self, version: &Version) -> Result<(), OpsError> {
        let orchestrator = Orchestrator::new(self.ctx);
        orchestrator.build(version, false).await?;
        orchestrator.stop().await?;
        orchestrator.deploy().await?;
        Ok(())
    }

    /// Put back the version installed before the last update
    pub async fn rollback(&mut self) -> Result<UpdateOutcome, OpsError> {
        let orchestrator = Orchestrator::new(self.ctx);
        let previous = orchestrator.previous_version().await.ok_or_else(|| {
            OpsError::ConfigError("No previous version recorded, nothing to roll back to".to_string())
        })?;
        let installed = orchestrator.installed_version().await?;

        if !self
            .ctx
            .confirm
            .confirm(&format!("Roll the node back from {} to {}?", installed, previous))
        {
            return Err(OpsError::Aborted("rollback".to_string()));
        }

        self.fsm.process(UpdateEvent::Rollback)?;
        if let Err(e) = self.reinstall(&previous).await {
            self.fsm.process(UpdateEvent::StepFailed(e.to_string()))?;
            return Err(OpsError::RollbackFailed(format!(
                "restoring {} failed ({})",
                previous, e
            )));
        }
        self.fsm.process(UpdateEvent::RolledBack)?;

        orchestrator.record_version(&previous, &installed).await?;
        info!("Rolled back from {} to {}", installed, previous);
        Ok(UpdateOutcome::RolledBack {
            from: installed,
            to: previous,
        })
    }
}

impl Display for VersionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.current_source {
            VersionSource::RunningNode => "running node",
            VersionSource::VersionFile => "recorded",
        };
        writeln!(f, "Current version: {} ({})", self.current, source)?;
        writeln!(f, "Latest version:  {}", self.latest)?;
        if self.update_available {
            writeln!(f, "{}", "An update is available, run `nodeops update`".yellow())
        } else {
            writeln!(f, "{}", "Already on the latest version".green())
        }
    }
}

impl Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::AlreadyLatest { current, .. } => {
                writeln!(f, "{} ({})", "Already on the latest version".green(), current)
            }
            UpdateOutcome::Updated { from, to, backup } => {
                writeln!(f, "{} {} -> {}", "Updated".green(), from, to)?;
                writeln!(f, "  Pre-update backup: {}", backup.display())
            }
            UpdateOutcome::RolledBack { from, to } => {
                writeln!(f, "{} {} -> {}", "Rolled back".green(), from, to)
            }
        }
    }
}
