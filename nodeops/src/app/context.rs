//! Per-invocation context shared by every component

use std::sync::Arc;

use crate::deploy::engine::ContainerEngine;
use crate::hardware::profile::DeploymentProfile;
use crate::prompt::Confirm;
use crate::rpc::client::RpcClient;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::update::feed::ReleaseFeed;

/// Everything a command needs, resolved once at startup.
///
/// Components borrow the context; nothing reads the process working
/// directory or environment after it is built.
#[derive(Clone)]
pub struct Context {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub profile: DeploymentProfile,
    pub engine: Arc<dyn ContainerEngine>,
    pub rpc: Arc<dyn RpcClient>,
    pub feed: Arc<dyn ReleaseFeed>,
    pub confirm: Arc<dyn Confirm>,
}

impl Context {
    /// Name of the managed container
    pub fn container(&self) -> &str {
        &self.settings.service.container_name
    }

    /// Replace the confirmation strategy, keeping everything else
    pub fn with_confirm(&self, confirm: Arc<dyn Confirm>) -> Context {
        Context {
            confirm,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("layout", &self.layout)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}
