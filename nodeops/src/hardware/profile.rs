//! Deployment profile detection

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::settings::HardwareSettings;

/// Deployment variant selected from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentProfile {
    /// Generic host
    Standard,

    /// Target single-board computer with the hardware-tuned compose file
    ProductionHardware,
}

impl DeploymentProfile {
    /// Compose definition used for this profile
    pub fn compose_file_name(&self) -> &'static str {
        match self {
            DeploymentProfile::Standard => "docker-compose.yml",
            DeploymentProfile::ProductionHardware => "docker-compose.prod.yml",
        }
    }
}

impl fmt::Display for DeploymentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentProfile::Standard => write!(f, "standard"),
            DeploymentProfile::ProductionHardware => write!(f, "production-hardware"),
        }
    }
}

/// Host facts the profile is derived from
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub arch: String,
    pub os: String,
    pub marker_present: bool,
    pub board_model: Option<String>,
}

impl HostInfo {
    /// Read the current host
    pub fn probe(marker_path: &Path) -> Self {
        let board_model = std::fs::read_to_string(marker_path)
            .ok()
            .map(|model| model.trim_matches('\0').trim().to_string())
            .filter(|model| !model.is_empty());

        Self {
            arch: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
            marker_present: marker_path.exists(),
            board_model,
        }
    }
}

/// Select the profile: production only when arch, OS and marker all match
pub fn detect_profile(host: &HostInfo, hardware: &HardwareSettings) -> DeploymentProfile {
    let arch_matches = host.arch.eq_ignore_ascii_case(&hardware.target_arch)
        || (hardware.target_arch == "aarch64" && host.arch.eq_ignore_ascii_case("arm64"));
    let os_matches = host.os.eq_ignore_ascii_case(&hardware.target_os);

    if arch_matches && os_matches && host.marker_present {
        DeploymentProfile::ProductionHardware
    } else {
        DeploymentProfile::Standard
    }
}
