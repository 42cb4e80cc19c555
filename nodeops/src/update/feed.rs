//! Upstream release feed

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::debug;

use crate::errors::OpsError;
use crate::update::version::Version;
use crate::utils::version_info;

/// Source of the latest published node release
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn latest_version(&self) -> Result<Version, OpsError>;
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// GitHub "latest release" endpoint
pub struct GithubReleaseFeed {
    client: Client,
    url: String,
}

impl GithubReleaseFeed {
    pub fn new(url: &str) -> Result<Self, OpsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("nodeops/{}", version_info().version))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ReleaseFeed for GithubReleaseFeed {
    async fn latest_version(&self) -> Result<Version, OpsError> {
        debug!("GET {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| OpsError::FeedError(format!("{}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(OpsError::FeedError(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| OpsError::FeedError(format!("Unreadable release: {}", e)))?;

        parse_release(&release)
    }
}

fn parse_release(release: &Release) -> Result<Version, OpsError> {
    release
        .tag_name
        .as_deref()
        .and_then(Version::extract)
        .or_else(|| release.name.as_deref().and_then(Version::extract))
        .ok_or_else(|| OpsError::FeedError("Release has no version tag".to_string()))
}
