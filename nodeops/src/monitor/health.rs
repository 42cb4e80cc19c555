//! Health queries against the running node

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::app::context::Context;
use crate::deploy::engine::ContainerStats;
use crate::deploy::orchestrator::{Orchestrator, ServiceStatus};
use crate::errors::OpsError;
use crate::hardware::profile::{DeploymentProfile, HostInfo};
use crate::rpc::models::{decode, BlockchainInfo, MempoolInfo, NetworkInfo, PeerInfo};
use crate::storage::node_conf::NodeConfig;
use crate::telemetry::{collect_metrics, os_info, OsInfo, SystemMetrics};
use crate::update::version::Version;
use crate::utils::{calc_exp_backoff, CooldownOptions};

const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the node is in its initial block download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    StartingUp,
    Synchronizing,
    FullySynchronized,
}

/// Sync progress as reported by the node
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub chain: String,
    pub current_height: u64,
    pub header_height: u64,
    pub verification_progress: f64,
    pub percent: f64,
    pub remaining: u64,
    pub phase: SyncPhase,
    pub initial_block_download: bool,
    pub size_on_disk: u64,
}

impl SyncState {
    pub fn from_info(info: &BlockchainInfo) -> Self {
        let current_height = info.blocks.unwrap_or(0);
        let header_height = info.headers.unwrap_or(0);
        let verification_progress = info.verificationprogress.unwrap_or(0.0).clamp(0.0, 1.0);

        // A reply without headers can never count as a finished sync
        let phase = if current_height == 0 && header_height == 0 {
            SyncPhase::StartingUp
        } else if current_height == header_height {
            SyncPhase::FullySynchronized
        } else {
            SyncPhase::Synchronizing
        };

        Self {
            chain: info.chain.clone().unwrap_or_else(|| "unknown".to_string()),
            current_height,
            header_height,
            verification_progress,
            percent: verification_progress * 100.0,
            remaining: header_height.saturating_sub(current_height),
            phase,
            initial_block_download: info.initialblockdownload.unwrap_or(false),
            size_on_disk: info.size_on_disk.unwrap_or(0),
        }
    }
}

/// Peer connectivity
#[derive(Debug, Clone, Serialize)]
pub struct NetworkState {
    pub connections: u64,
    pub connections_in: Option<u64>,
    pub connections_out: Option<u64>,
    pub subversion: String,
    pub version: Option<Version>,
    pub p2p_port: u16,
    /// Local probe only; says nothing about reachability from the internet
    pub port_listening: bool,
}

/// Memory pool size
#[derive(Debug, Clone, Serialize)]
pub struct MempoolState {
    pub transactions: u64,
    pub bytes: u64,
    pub usage: u64,
    pub max_bytes: u64,
    pub min_fee: Option<f64>,
}

impl MempoolState {
    pub fn from_info(info: &MempoolInfo) -> Self {
        Self {
            transactions: info.size.unwrap_or(0),
            bytes: info.bytes.unwrap_or(0),
            usage: info.usage.unwrap_or(0),
            max_bytes: info.maxmempool.unwrap_or(0),
            min_fee: info.mempoolminfee,
        }
    }
}

/// Container and host resource usage
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUsage {
    pub container: Option<ContainerStats>,
    pub host: SystemMetrics,
}

/// Outcome of one report section
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "data")]
pub enum Section<T> {
    Ok(T),
    Failed(String),
}

impl<T> Section<T> {
    fn from_result(result: Result<T, OpsError>) -> Self {
        match result {
            Ok(value) => Section::Ok(value),
            Err(e) => {
                warn!("Status section failed: {}", e);
                Section::Failed(e.to_string())
            }
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Section::Ok(value) => Some(value),
            Section::Failed(_) => None,
        }
    }
}

/// Full status report
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub service: ServiceStatus,
    pub sync: Section<SyncState>,
    pub network: Section<NetworkState>,
    pub mempool: Section<MempoolState>,
    pub resources: ResourceUsage,
}

/// Peer list with totals
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub total: usize,
    pub inbound: usize,
    pub outbound: usize,
    pub peers: Vec<PeerInfo>,
}

/// Everything useful when something is wrong
#[derive(Debug, Clone, Serialize)]
pub struct DebugReport {
    pub service: ServiceStatus,
    pub profile: DeploymentProfile,
    pub host: HostInfo,
    pub os: OsInfo,
    pub metrics: SystemMetrics,
    pub config: Section<BTreeMap<String, String>>,
    pub recent_logs: Section<String>,
}

/// Read-only queries against the node
pub struct HealthMonitor<'a> {
    ctx: &'a Context,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    async fn ensure_running(&self) -> Result<(), OpsError> {
        let container = self.ctx.container();
        if self.ctx.engine.is_running(container).await? {
            Ok(())
        } else {
            Err(OpsError::ServiceUnavailable(container.to_string()))
        }
    }

    /// Call `method`, retrying timeouts and warm-up errors with backoff
    async fn query(&self, method: &str, params: &[Value]) -> Result<Value, OpsError> {
        let rpc = &self.ctx.settings.rpc;
        let attempts = rpc.attempts.max(1);
        let cooldown = CooldownOptions {
            base_delay: rpc.backoff(),
            max_delay: rpc.backoff() * 8,
            multiplier: 2.0,
        };

        let mut last_error = None;
        for attempt in 0..attempts {
            match self.ctx.rpc.call(method, params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    debug!("{} attempt {}/{} failed: {}", method, attempt + 1, attempts, e);
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(calc_exp_backoff(&cooldown, attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(OpsError::RpcTimeout(format!(
            "{} gave no answer after {} attempts ({})",
            method,
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub async fn sync_progress(&self) -> Result<SyncState, OpsError> {
        self.ensure_running().await?;
        self.query_sync().await
    }

    async fn query_sync(&self) -> Result<SyncState, OpsError> {
        let value = self.query("getblockchaininfo", &[]).await?;
        let info: BlockchainInfo = decode("getblockchaininfo", value)?;
        Ok(SyncState::from_info(&info))
    }

    pub async fn network_status(&self) -> Result<NetworkState, OpsError> {
        self.ensure_running().await?;
        self.query_network().await
    }

    async fn query_network(&self) -> Result<NetworkState, OpsError> {
        let value = self.query("getnetworkinfo", &[]).await?;
        let info: NetworkInfo = decode("getnetworkinfo", value)?;

        let p2p_port = self.p2p_port().await;
        let port_listening = probe_port(p2p_port).await;

        Ok(NetworkState {
            connections: info.connections.unwrap_or(0),
            connections_in: info.connections_in,
            connections_out: info.connections_out,
            version: info.subversion.as_deref().and_then(Version::extract),
            subversion: info.subversion.unwrap_or_else(|| "unknown".to_string()),
            p2p_port,
            port_listening,
        })
    }

    pub async fn mempool_status(&self) -> Result<MempoolState, OpsError> {
        self.ensure_running().await?;
        self.query_mempool().await
    }

    async fn query_mempool(&self) -> Result<MempoolState, OpsError> {
        let value = self.query("getmempoolinfo", &[]).await?;
        let info: MempoolInfo = decode("getmempoolinfo", value)?;
        Ok(MempoolState::from_info(&info))
    }

    pub async fn resource_usage(&self) -> Result<ResourceUsage, OpsError> {
        let container = self.ctx.container();
        let stats = if self.ctx.engine.is_running(container).await? {
            self.ctx.engine.stats(container).await.unwrap_or_else(|e| {
                warn!("Unable to read container stats: {}", e);
                None
            })
        } else {
            None
        };
        Ok(ResourceUsage {
            container: stats,
            host: collect_metrics(),
        })
    }

    /// Version reported by the running node, if it answers
    pub async fn running_version(&self) -> Result<Version, OpsError> {
        self.ensure_running().await?;
        let value = self.query("getnetworkinfo", &[]).await?;
        let info: NetworkInfo = decode("getnetworkinfo", value)?;
        info.subversion
            .as_deref()
            .and_then(Version::extract)
            .ok_or_else(|| OpsError::MalformedResponse("getnetworkinfo: no subversion".to_string()))
    }

    /// Full report; only a stopped service fails it as a whole
    pub async fn report(&self) -> Result<StatusReport, OpsError> {
        let service = Orchestrator::new(self.ctx).status().await?;
        if !service.running {
            return Err(OpsError::ServiceUnavailable(service.container_name));
        }

        let sync = Section::from_result(self.query_sync().await);
        let network = Section::from_result(self.query_network().await);
        let mempool = Section::from_result(self.query_mempool().await);

        Ok(StatusReport {
            generated_at: Utc::now(),
            resources: ResourceUsage {
                container: service.resource_usage.clone(),
                host: collect_metrics(),
            },
            service,
            sync,
            network,
            mempool,
        })
    }

    pub async fn peers(&self) -> Result<PeerSummary, OpsError> {
        self.ensure_running().await?;
        let value = self.query("getpeerinfo", &[]).await?;
        let peers: Vec<PeerInfo> = decode("getpeerinfo", value)?;
        let inbound = peers.iter().filter(|p| p.inbound == Some(true)).count();
        Ok(PeerSummary {
            total: peers.len(),
            inbound,
            outbound: peers.len() - inbound,
            peers,
        })
    }

    /// Pass an arbitrary call through to the node
    pub async fn raw_call(&self, method: &str, params: &[Value]) -> Result<Value, OpsError> {
        self.ensure_running().await?;
        self.query(method, params).await
    }

    pub async fn debug_report(&self) -> Result<DebugReport, OpsError> {
        let orchestrator = Orchestrator::new(self.ctx);
        let service = orchestrator.status().await?;

        let config = NodeConfig::load(&self.ctx.layout.node_config_file())
            .await
            .map(|c| c.redacted());
        let recent_logs = if service.running {
            orchestrator.logs(Some(20), false).await
        } else {
            Err(OpsError::ServiceUnavailable(service.container_name.clone()))
        };

        Ok(DebugReport {
            service,
            profile: self.ctx.profile,
            host: HostInfo::probe(&self.ctx.settings.hardware.marker_path),
            os: os_info(),
            metrics: collect_metrics(),
            config: Section::from_result(config),
            recent_logs: Section::from_result(recent_logs),
        })
    }

    async fn p2p_port(&self) -> u16 {
        NodeConfig::load(&self.ctx.layout.node_config_file())
            .await
            .ok()
            .and_then(|c| c.p2p_port())
            .unwrap_or(self.ctx.settings.service.p2p_port)
    }
}

/// Whether something accepts connections on the local P2P port
async fn probe_port(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}
