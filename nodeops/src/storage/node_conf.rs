//! Node daemon configuration (`key=value` lines)

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::errors::OpsError;
use crate::filesys::file::File;
use crate::prompt::Confirm;

/// Keys whose values are never printed
const SECRET_KEYS: &[&str] = &["rpcpassword", "rpcauth"];

/// Parsed node configuration
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    raw: String,
    entries: BTreeMap<String, String>,
}

impl NodeConfig {
    /// Parse configuration text.
    ///
    /// Comments and `[section]` headers are skipped. For repeated keys the
    /// first occurrence wins, matching how the daemon reads single-valued
    /// options.
    pub fn parse(raw: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.split('#').next().unwrap_or_default().trim();
                entries
                    .entry(key.trim().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Self {
            raw: raw.to_string(),
            entries,
        }
    }

    /// Load configuration from a file
    pub async fn load(file: &File) -> Result<Self, OpsError> {
        if !file.exists().await {
            return Err(OpsError::MissingFile(file.path().to_path_buf()));
        }
        Ok(Self::parse(&file.read_string().await?))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn rpc_user(&self) -> Option<&str> {
        self.get("rpcuser")
    }

    pub fn rpc_password(&self) -> Option<&str> {
        self.get("rpcpassword")
    }

    pub fn rpc_port(&self) -> Option<u16> {
        self.get("rpcport").and_then(|p| p.parse().ok())
    }

    pub fn p2p_port(&self) -> Option<u16> {
        self.get("port").and_then(|p| p.parse().ok())
    }

    /// Whether the wallet subsystem is turned off
    pub fn wallet_disabled(&self) -> bool {
        matches!(self.get("disablewallet"), Some("1") | Some("true"))
    }

    /// Whether the placeholder marker appears anywhere in the file
    pub fn contains_placeholder(&self, marker: &str) -> bool {
        !marker.is_empty() && self.raw.contains(marker)
    }

    /// Entries with secret values masked, for diagnostics
    pub fn redacted(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| {
                let value = if SECRET_KEYS.contains(&k.as_str()) {
                    "********".to_string()
                } else {
                    v.clone()
                };
                (k.clone(), value)
            })
            .collect()
    }
}

/// Load and validate the node configuration before any deployment action
pub async fn validate(
    file: &File,
    placeholder_marker: &str,
    confirm: &dyn Confirm,
) -> Result<NodeConfig, OpsError> {
    let config = NodeConfig::load(file).await?;
    check_placeholder(&config, placeholder_marker, confirm)?;
    debug!("Node configuration {:?} validated", file.path());
    Ok(config)
}

/// Refuse a configuration that still carries the placeholder credential
/// unless the operator explicitly accepts it
pub fn check_placeholder(
    config: &NodeConfig,
    placeholder_marker: &str,
    confirm: &dyn Confirm,
) -> Result<(), OpsError> {
    if !config.contains_placeholder(placeholder_marker) {
        return Ok(());
    }

    warn!(
        "Node configuration still contains the placeholder credential '{}'",
        placeholder_marker
    );
    if confirm.confirm("The RPC password is still the placeholder. Continue anyway?") {
        warn!("Continuing with the placeholder credential at operator request");
        Ok(())
    } else {
        Err(OpsError::InsecureDefault(placeholder_marker.to_string()))
    }
}
