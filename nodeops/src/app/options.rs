//! Command line options

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Deploy, monitor, update and back up a containerized full node
#[derive(Debug, Parser)]
#[command(name = "nodeops", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalOptions {
    /// Directory holding the Dockerfile, compose files and node configuration
    #[arg(long, global = true, env = "NODEOPS_BASE_DIR", default_value = ".")]
    pub base_dir: PathBuf,

    /// Settings file (defaults to <base-dir>/nodeops.json)
    #[arg(long, global = true, env = "NODEOPS_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true, conflicts_with = "non_interactive")]
    pub yes: bool,

    /// Never prompt; confirmations are declined
    #[arg(long, global = true)]
    pub non_interactive: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build, start and stop the node service
    Deploy {
        #[command(subcommand)]
        action: Option<DeployCommand>,
    },

    /// Inspect the running node
    Monitor {
        #[command(subcommand)]
        action: Option<MonitorCommand>,
    },

    /// Create, list and restore backups
    Backup {
        #[command(subcommand)]
        action: Option<BackupCommand>,
    },

    /// Update the node to the latest release
    Update {
        #[command(subcommand)]
        action: Option<UpdateCommand>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum DeployCommand {
    /// Validate, run pre-flight checks and start the service
    Start,
    Stop,
    Restart,
    Status,
    /// Build the node image
    Build {
        /// Version to build (defaults to the installed version)
        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        no_cache: bool,
    },
    /// Rebuild without cache and redeploy
    Rebuild,
    /// Show service logs
    Logs {
        #[arg(long)]
        tail: Option<usize>,

        #[arg(short, long)]
        follow: bool,
    },
    /// Remove containers and images (data is kept)
    Clean,
}

#[derive(Debug, Clone, Subcommand)]
pub enum MonitorCommand {
    /// Full status report
    Status,
    /// Service logs
    Logs {
        #[arg(long)]
        tail: Option<usize>,

        #[arg(short, long)]
        follow: bool,
    },
    /// Run a raw RPC method
    Cli {
        method: String,

        /// Parameters, parsed as JSON when possible
        params: Vec<String>,
    },
    /// Refresh the status report until interrupted
    Watch {
        /// Seconds between refreshes
        #[arg(long, default_value_t = 10)]
        interval: u64,

        /// Stop after this many refreshes
        #[arg(long)]
        count: Option<u64>,
    },
    /// Blockchain sync progress
    Sync,
    /// Connections, client version and P2P port reachability
    Network,
    /// Mempool size and usage
    Mempool,
    /// Connected peers
    Peers,
    /// Diagnostics bundle
    Debug,
}

#[derive(Debug, Clone, Subcommand)]
pub enum BackupCommand {
    /// Create a backup
    Create {
        /// Include the chain state (large)
        #[arg(long)]
        chainstate: bool,
    },
    /// List backups, newest first
    List,
    /// Restore a backup archive
    Restore { path: PathBuf },
    /// Install the daily backup cron entry
    Schedule,
    /// Non-interactive backup for scheduled runs
    Auto,
}

#[derive(Debug, Clone, Subcommand)]
pub enum UpdateCommand {
    /// Compare versions only
    Check,
    /// Update without asking
    Force,
    /// Go back to the previously installed version
    Rollback,
}

impl Command {
    /// Whether the command changes the service or files on disk
    pub fn is_mutating(&self) -> bool {
        match self {
            Command::Deploy { action } => !matches!(
                action,
                Some(DeployCommand::Status) | Some(DeployCommand::Logs { .. })
            ),
            Command::Monitor { .. } => false,
            Command::Backup { action } => !matches!(action, Some(BackupCommand::List)),
            Command::Update { action } => !matches!(action, Some(UpdateCommand::Check)),
        }
    }
}
