//! Command dispatch

use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::app::context::Context;
use crate::app::options::{BackupCommand, Command, DeployCommand, MonitorCommand, UpdateCommand};
use crate::backup::manager::{ArchiveList, BackupManager};
use crate::backup::schedule;
use crate::deploy::orchestrator::{DeployOutcome, Orchestrator};
use crate::errors::OpsError;
use crate::monitor::health::HealthMonitor;
use crate::monitor::watch;
use crate::prompt::AlwaysNo;
use crate::storage::lock::CommandLock;
use crate::update::coordinator::UpdateCoordinator;

/// Output preferences for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Emit JSON instead of text
    pub json: bool,
}

/// Run one command to completion
pub async fn run(
    ctx: &Context,
    command: Command,
    options: &RunOptions,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> Result<(), OpsError> {
    let _lock = if command.is_mutating() {
        Some(CommandLock::acquire(ctx.layout.lock_file().path())?)
    } else {
        None
    };
    debug!("Running {:?} with {:?}", command, ctx);

    let out = Output { json: options.json };
    match command {
        Command::Deploy { action } => {
            deploy(ctx, action.unwrap_or(DeployCommand::Start), &out).await
        }
        Command::Monitor { action } => {
            monitor(ctx, action.unwrap_or(MonitorCommand::Status), &out, shutdown_signal).await
        }
        Command::Backup { action } => {
            backup(ctx, action.unwrap_or(BackupCommand::Create { chainstate: false }), &out).await
        }
        Command::Update { action } => update(ctx, action, &out).await,
    }
}

async fn deploy(ctx: &Context, action: DeployCommand, out: &Output) -> Result<(), OpsError> {
    let orchestrator = Orchestrator::new(ctx);
    match action {
        DeployCommand::Start => match orchestrator.start().await? {
            DeployOutcome::Started => out.message("Node started"),
            DeployOutcome::AlreadyRunning => out.message("Node is already running"),
        },
        DeployCommand::Stop => {
            orchestrator.stop().await?;
            out.message("Node stopped");
        }
        DeployCommand::Restart => {
            orchestrator.restart().await?;
            out.message("Node restarted");
        }
        DeployCommand::Status => out.emit(&orchestrator.status().await?)?,
        DeployCommand::Build { version, no_cache } => {
            let version = match version {
                Some(v) => v.parse()?,
                None => orchestrator.installed_version().await?,
            };
            orchestrator.build(&version, no_cache).await?;
            out.message(&format!("Image built for version {}", version));
        }
        DeployCommand::Rebuild => {
            orchestrator.rebuild().await?;
            out.message("Node rebuilt and redeployed");
        }
        DeployCommand::Logs { tail, follow } => {
            print!("{}", orchestrator.logs(tail, follow).await?);
        }
        DeployCommand::Clean => {
            orchestrator.clean().await?;
            out.message("Containers and images removed, data kept");
        }
    }
    Ok(())
}

async fn monitor(
    ctx: &Context,
    action: MonitorCommand,
    out: &Output,
    shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> Result<(), OpsError> {
    let monitor = HealthMonitor::new(ctx);
    match action {
        MonitorCommand::Status => out.emit(&monitor.report().await?)?,
        MonitorCommand::Logs { tail, follow } => {
            print!("{}", Orchestrator::new(ctx).logs(tail, follow).await?);
        }
        MonitorCommand::Cli { method, params } => {
            let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
            let result = monitor.raw_call(&method, &params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        MonitorCommand::Watch { interval, count } => {
            let options = watch::Options {
                interval: Duration::from_secs(interval.max(1)),
                max_iterations: count,
            };
            let json = out.json;
            watch::run(
                &options,
                &monitor,
                |report| match report {
                    Ok(report) if json => match serde_json::to_string(&report) {
                        Ok(line) => println!("{}", line),
                        Err(e) => eprintln!("{}", e),
                    },
                    Ok(report) => {
                        // Clear the screen between renders
                        print!("\x1B[2J\x1B[H{}", report);
                    }
                    Err(e) => eprintln!("{}", e),
                },
                shutdown_signal,
            )
            .await;
        }
        MonitorCommand::Sync => out.emit(&monitor.sync_progress().await?)?,
        MonitorCommand::Network => out.emit(&monitor.network_status().await?)?,
        MonitorCommand::Mempool => out.emit(&monitor.mempool_status().await?)?,
        MonitorCommand::Peers => out.emit(&monitor.peers().await?)?,
        MonitorCommand::Debug => out.emit(&monitor.debug_report().await?)?,
    }
    Ok(())
}

async fn backup(ctx: &Context, action: BackupCommand, out: &Output) -> Result<(), OpsError> {
    match action {
        BackupCommand::Create { chainstate } => {
            out.emit(&BackupManager::new(ctx).create_backup(chainstate).await?)?
        }
        BackupCommand::List => {
            let entries = BackupManager::new(ctx).list_backups().await?;
            if out.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print!("{}", ArchiveList(&entries));
            }
        }
        BackupCommand::Restore { path } => {
            out.emit(&BackupManager::new(ctx).restore_backup(&path).await?)?
        }
        BackupCommand::Schedule => {
            let exe = std::env::current_exe()?;
            let line = schedule::cron_line(
                &ctx.settings.backup.schedule,
                &exe,
                &ctx.layout.base_dir,
            );
            schedule::install(&line).await?;
            out.message(&format!("Scheduled daily backup: {}", line));
        }
        BackupCommand::Auto => {
            // Scheduled runs never wait on a prompt
            let ctx = ctx.with_confirm(std::sync::Arc::new(AlwaysNo));
            let report = BackupManager::new(&ctx).create_backup(false).await?;
            info!("Scheduled backup written to {:?}", report.path);
            out.emit(&report)?;
        }
    }
    Ok(())
}

async fn update(ctx: &Context, action: Option<UpdateCommand>, out: &Output) -> Result<(), OpsError> {
    let mut coordinator = UpdateCoordinator::new(ctx);
    match action {
        Some(UpdateCommand::Check) => out.emit(&coordinator.check().await?)?,
        Some(UpdateCommand::Force) => out.emit(&coordinator.run(true).await?)?,
        Some(UpdateCommand::Rollback) => out.emit(&coordinator.rollback().await?)?,
        None => out.emit(&coordinator.run(false).await?)?,
    }
    Ok(())
}

/// JSON when it parses, a plain string otherwise (`0` is a number, `abc` a string)
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + Display>(&self, value: &T) -> Result<(), OpsError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            print!("{}", value);
        }
        Ok(())
    }

    fn message(&self, text: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "message": text }));
        } else {
            println!("{}", text);
        }
    }
}

/// Resolve `base_dir` to an absolute path without requiring it to exist
pub fn absolute_base_dir(base_dir: &Path) -> Result<std::path::PathBuf, OpsError> {
    match base_dir.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) if base_dir.is_absolute() => Ok(base_dir.to_path_buf()),
        Err(_) => Ok(std::env::current_dir()?.join(base_dir)),
    }
}
