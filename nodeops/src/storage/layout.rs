//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::OpsError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::hardware::profile::DeploymentProfile;
use crate::storage::settings::Settings;

/// On-disk layout of a node deployment
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory holding the build definition and compose files
    pub base_dir: PathBuf,

    /// Node data directory (mounted into the container)
    pub data_dir: PathBuf,

    /// Backup archive directory
    pub backup_dir: PathBuf,

    /// Log directory
    pub log_dir: PathBuf,

    config_file_name: String,
}

impl StorageLayout {
    /// Create a new storage layout with default sub-directories
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            data_dir: base_dir.join("data"),
            backup_dir: base_dir.join("backups"),
            log_dir: base_dir.join("logs"),
            config_file_name: "bitcoin.conf".to_string(),
            base_dir,
        }
    }

    /// Apply the directory overrides from `settings`
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        let base = self.base_dir.clone();
        let resolve = |path: &PathBuf| {
            if path.is_absolute() {
                path.clone()
            } else {
                base.join(path)
            }
        };
        if let Some(dir) = &settings.data_dir {
            self.data_dir = resolve(dir);
        }
        if let Some(dir) = &settings.backup_dir {
            self.backup_dir = resolve(dir);
        }
        if let Some(dir) = &settings.log_dir {
            self.log_dir = resolve(dir);
        }
        self.config_file_name = settings.config_file_name.clone();
        self
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("nodeops.json"))
    }

    /// Get the node configuration file path
    pub fn node_config_file(&self) -> File {
        File::new(self.base_dir.join(&self.config_file_name))
    }

    /// Name of the node configuration file
    pub fn node_config_name(&self) -> &str {
        &self.config_file_name
    }

    /// Get the image build definition
    pub fn dockerfile(&self) -> File {
        File::new(self.base_dir.join("Dockerfile"))
    }

    /// Get the compose definition for a profile
    pub fn compose_file(&self, profile: DeploymentProfile) -> File {
        File::new(self.base_dir.join(profile.compose_file_name()))
    }

    /// Get the file recording the deployed node version
    pub fn version_file(&self) -> File {
        File::new(self.base_dir.join(".node-version"))
    }

    /// Get the file recording the version before the last update
    pub fn previous_version_file(&self) -> File {
        File::new(self.base_dir.join(".node-version.prev"))
    }

    /// Get the advisory lock file
    pub fn lock_file(&self) -> File {
        File::new(self.base_dir.join(".nodeops.lock"))
    }

    pub fn data(&self) -> Dir {
        Dir::new(&self.data_dir)
    }

    pub fn backups(&self) -> Dir {
        Dir::new(&self.backup_dir)
    }

    pub fn logs(&self) -> Dir {
        Dir::new(&self.log_dir)
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), OpsError> {
        self.data().create().await?;
        self.backups().create().await?;
        self.logs().create().await?;
        Ok(())
    }
}
