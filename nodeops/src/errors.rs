//! Error types for nodeops

use std::path::PathBuf;

use thiserror::Error;

/// Broad classes of failure, used for exit codes and operator guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable by operator action (missing files, engine down, declined prompt)
    Precondition,

    /// The service did not answer in time; retried before being surfaced
    TransientService,

    /// Data that cannot be trusted (malformed response, bad archive, wrong version)
    DataIntegrity,

    /// Rollback itself failed, manual intervention required
    FatalOperational,

    /// Engine, build or filesystem failures
    Operational,
}

impl ErrorKind {
    /// Process exit code for this class
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Operational => 1,
            ErrorKind::Precondition => 3,
            ErrorKind::TransientService => 4,
            ErrorKind::DataIntegrity => 5,
            ErrorKind::FatalOperational => 6,
        }
    }
}

/// Main error type for nodeops
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Configuration still contains the placeholder credential: {0}")]
    InsecureDefault(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Required file missing: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Insufficient disk space at {path}: {available_gib} GiB free, {required_gib} GiB required")]
    InsufficientDisk {
        path: PathBuf,
        available_gib: u64,
        required_gib: u64,
    },

    #[error("Engine command failed: {0}")]
    EngineError(String),

    #[error("Image build failed: {0}")]
    BuildError(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Service is not running: {0}")]
    ServiceUnavailable(String),

    #[error("RPC did not respond: {0}")]
    RpcTimeout(String),

    #[error("RPC warming up: {0}")]
    RpcWarmup(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("Release feed error: {0}")]
    FeedError(String),

    #[error("Version error: {0}")]
    VersionError(String),

    #[error("Version mismatch after update: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Pre-update backup failed: {0}")]
    BackupPrecondition(String),

    #[error("Backup archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Invalid backup archive: {0}")]
    InvalidArchive(String),

    #[error("Update failed and the previous version was restored: {0}")]
    RollbackCompleted(String),

    #[error("Rollback failed, manual intervention required: {0}")]
    RollbackFailed(String),

    #[error("Invalid state transition: {0}")]
    TransitionError(String),

    #[error("Aborted by operator: {0}")]
    Aborted(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Another nodeops command is running (pid {pid}, lock {})", .path.display())]
    Locked { pid: u32, path: PathBuf },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OpsError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::MissingFile(_)
            | OpsError::InsecureDefault(_)
            | OpsError::EngineUnavailable(_)
            | OpsError::MissingArtifact(_)
            | OpsError::InsufficientDisk { .. }
            | OpsError::ServiceUnavailable(_)
            | OpsError::BackupPrecondition(_)
            | OpsError::ArchiveNotFound(_)
            | OpsError::Aborted(_)
            | OpsError::Locked { .. }
            | OpsError::ConfigError(_) => ErrorKind::Precondition,

            OpsError::RpcTimeout(_) | OpsError::RpcWarmup(_) | OpsError::RpcError(_) => {
                ErrorKind::TransientService
            }

            OpsError::MalformedResponse(_)
            | OpsError::InvalidArchive(_)
            | OpsError::VersionMismatch { .. }
            | OpsError::RollbackCompleted(_) => ErrorKind::DataIntegrity,

            OpsError::RollbackFailed(_) => ErrorKind::FatalOperational,

            _ => ErrorKind::Operational,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Whether a bounded retry may help
    pub fn is_retryable(&self) -> bool {
        matches!(self, OpsError::RpcTimeout(_) | OpsError::RpcWarmup(_))
    }

    /// Operator guidance printed next to the error
    pub fn remediation(&self) -> Option<&'static str> {
        let hint = match self {
            OpsError::MissingFile(_) => {
                "Create the node configuration file (copy the example config) and retry."
            }
            OpsError::InsecureDefault(_) => {
                "Replace the placeholder rpcpassword with a strong secret before deploying."
            }
            OpsError::EngineUnavailable(_) => {
                "Start the container engine (e.g. `sudo systemctl start docker`) and check your user can reach it."
            }
            OpsError::MissingArtifact(_) => {
                "Restore the missing file from the repository checkout or pass the right --base-dir."
            }
            OpsError::InsufficientDisk { .. } => {
                "Free space on the data mount or point data_dir at a larger volume."
            }
            OpsError::BuildError(_) => "Inspect the build output above; nothing was deployed.",
            OpsError::ServiceUnavailable(_) => "Start the node with `nodeops deploy start`.",
            OpsError::RpcTimeout(_) | OpsError::RpcWarmup(_) => {
                "The node may still be starting; check `nodeops monitor logs` and retry shortly."
            }
            OpsError::RpcError(_) => "Check rpcuser/rpcpassword in the node configuration.",
            OpsError::MalformedResponse(_) => {
                "The node answered with an unexpected shape; check the node version with `nodeops monitor debug`."
            }
            OpsError::BackupPrecondition(_) => {
                "Fix the backup failure (see `nodeops backup create`) before updating."
            }
            OpsError::ArchiveNotFound(_) => "List available archives with `nodeops backup list`.",
            OpsError::InvalidArchive(_) => {
                "The archive is damaged; choose another one from `nodeops backup list`."
            }
            OpsError::VersionMismatch { .. } => {
                "Check `nodeops monitor debug` and rebuild with `nodeops deploy rebuild`."
            }
            OpsError::RollbackCompleted(_) => {
                "The previous version is running again; review the logs before retrying the update."
            }
            OpsError::RollbackFailed(_) => {
                "The node is not running. Restore manually: `nodeops deploy build`, then `nodeops deploy start`."
            }
            OpsError::Aborted(_) => "Re-run with --yes (or `update force`) to proceed without a prompt.",
            OpsError::Interrupted(_) => "The node was started again; re-run the command when ready.",
            OpsError::Locked { .. } => {
                "Wait for the other command to finish, or remove the lock file if that process is gone."
            }
            _ => return None,
        };
        Some(hint)
    }
}

impl From<anyhow::Error> for OpsError {
    fn from(err: anyhow::Error) -> Self {
        OpsError::Internal(err.to_string())
    }
}
