//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::OpsError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// nodeops settings, read from `nodeops.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Container and image naming
    #[serde(default)]
    pub service: ServiceSettings,

    /// Administrative RPC endpoint
    #[serde(default)]
    pub rpc: RpcSettings,

    /// Host detection for the production profile
    #[serde(default)]
    pub hardware: HardwareSettings,

    /// Backup behavior
    #[serde(default)]
    pub backup: BackupSettings,

    /// Update behavior
    #[serde(default)]
    pub update: UpdateSettings,

    /// Minimum free space at the data mount, in GiB (0 disables the check)
    #[serde(default = "default_min_free_disk_gib")]
    pub min_free_disk_gib: u64,

    /// Marker that must not remain in the node configuration at deploy time
    #[serde(default = "default_placeholder_marker")]
    pub placeholder_marker: String,

    /// Node configuration file name inside the base directory
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Override for the node data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Override for the backup directory
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Override for the log directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_min_free_disk_gib() -> u64 {
    600
}

fn default_placeholder_marker() -> String {
    "CHANGE_THIS_PASSWORD".to_string()
}

fn default_config_file_name() -> String {
    "bitcoin.conf".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service: ServiceSettings::default(),
            rpc: RpcSettings::default(),
            hardware: HardwareSettings::default(),
            backup: BackupSettings::default(),
            update: UpdateSettings::default(),
            min_free_disk_gib: default_min_free_disk_gib(),
            placeholder_marker: default_placeholder_marker(),
            config_file_name: default_config_file_name(),
            data_dir: None,
            backup_dir: None,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `file`, falling back to defaults when it does not exist
    pub async fn load_or_default(file: &File) -> Result<Self, OpsError> {
        if !file.exists().await {
            debug!("No settings file at {:?}, using defaults", file.path());
            return Ok(Self::default());
        }
        file.read_json::<Settings>().await.map_err(|e| {
            OpsError::ConfigError(format!("Unable to read {}: {}", file.path().display(), e))
        })
    }
}

/// Container and image naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Container name used by the compose definitions
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Image repository the build tags
    #[serde(default = "default_image_name")]
    pub image_name: String,

    /// Build argument carrying the node version
    #[serde(default = "default_version_build_arg")]
    pub version_build_arg: String,

    /// Node P2P port probed for listening status
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,

    /// Default number of log lines for `logs`
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,
}

fn default_container_name() -> String {
    "bitcoin-node".to_string()
}

fn default_image_name() -> String {
    "bitcoin-node".to_string()
}

fn default_version_build_arg() -> String {
    "NODE_VERSION".to_string()
}

fn default_p2p_port() -> u16 {
    8333
}

fn default_log_tail() -> usize {
    100
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            image_name: default_image_name(),
            version_build_arg: default_version_build_arg(),
            p2p_port: default_p2p_port(),
            log_tail: default_log_tail(),
        }
    }
}

/// RPC endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Host the RPC port is published on
    #[serde(default = "default_rpc_host")]
    pub host: String,

    /// Port used when the node configuration has no `rpcport`
    #[serde(default = "default_rpc_port")]
    pub port: u16,

    /// Per-request timeout in seconds
    #[serde(default = "default_rpc_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts before a query is reported as timed out
    #[serde(default = "default_rpc_attempts")]
    pub attempts: u32,

    /// Base backoff between attempts, in milliseconds
    #[serde(default = "default_rpc_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    8332
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_rpc_attempts() -> u32 {
    3
}

fn default_rpc_backoff_ms() -> u64 {
    500
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            host: default_rpc_host(),
            port: default_rpc_port(),
            timeout_secs: default_rpc_timeout_secs(),
            attempts: default_rpc_attempts(),
            backoff_ms: default_rpc_backoff_ms(),
        }
    }
}

impl RpcSettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Hardware settings for profile detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareSettings {
    /// Architecture the production profile targets
    #[serde(default = "default_target_arch")]
    pub target_arch: String,

    /// Kernel family the production profile targets
    #[serde(default = "default_target_os")]
    pub target_os: String,

    /// Path whose presence identifies the board
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,
}

fn default_target_arch() -> String {
    "aarch64".to_string()
}

fn default_target_os() -> String {
    "linux".to_string()
}

fn default_marker_path() -> PathBuf {
    PathBuf::from("/proc/device-tree/model")
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            target_arch: default_target_arch(),
            target_os: default_target_os(),
            marker_path: default_marker_path(),
        }
    }
}

/// Backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Number of archives kept after each backup
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Archive file name prefix
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Cron expression for the scheduled backup
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Wallet directory name inside the data directory
    #[serde(default = "default_wallet_dir_name")]
    pub wallet_dir_name: String,

    /// Chain state directory name inside the data directory
    #[serde(default = "default_chainstate_dir_name")]
    pub chainstate_dir_name: String,
}

fn default_retention() -> usize {
    7
}

fn default_archive_prefix() -> String {
    "node_backup_".to_string()
}

fn default_schedule() -> String {
    "0 3 * * *".to_string()
}

fn default_wallet_dir_name() -> String {
    "wallets".to_string()
}

fn default_chainstate_dir_name() -> String {
    "chainstate".to_string()
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            archive_prefix: default_archive_prefix(),
            schedule: default_schedule(),
            wallet_dir_name: default_wallet_dir_name(),
            chainstate_dir_name: default_chainstate_dir_name(),
        }
    }
}

/// Update settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Release feed returning the latest upstream release as JSON
    #[serde(default = "default_release_feed_url")]
    pub release_feed_url: String,

    /// Version assumed when neither the node nor the version file can tell
    #[serde(default = "default_baseline_version")]
    pub baseline_version: String,

    /// Verification attempts after redeploying
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Seconds between verification attempts
    #[serde(default = "default_verify_interval_secs")]
    pub verify_interval_secs: u64,
}

fn default_release_feed_url() -> String {
    "https://api.github.com/repos/bitcoin/bitcoin/releases/latest".to_string()
}

fn default_baseline_version() -> String {
    "26.0".to_string()
}

fn default_verify_attempts() -> u32 {
    30
}

fn default_verify_interval_secs() -> u64 {
    2
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            release_feed_url: default_release_feed_url(),
            baseline_version: default_baseline_version(),
            verify_attempts: default_verify_attempts(),
            verify_interval_secs: default_verify_interval_secs(),
        }
    }
}

impl UpdateSettings {
    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }
}
