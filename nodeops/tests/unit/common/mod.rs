//! Shared fakes for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use nodeops::app::context::Context;
use nodeops::deploy::engine::{BuildRequest, ComposeAction, ContainerEngine, ContainerStats};
use nodeops::errors::OpsError;
use nodeops::hardware::profile::DeploymentProfile;
use nodeops::prompt::Confirm;
use nodeops::rpc::client::RpcClient;
use nodeops::storage::layout::StorageLayout;
use nodeops::storage::settings::Settings;
use nodeops::update::feed::ReleaseFeed;
use nodeops::update::version::Version;

pub const NODE_CONFIG: &str = "server=1\nrpcuser=operator\nrpcpassword=s3cret-value\n";

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Build { version: String, no_cache: bool },
    Compose(ComposeAction),
}

/// Simulated node: container state plus what its RPC interface answers
#[derive(Debug)]
pub struct NodeState {
    pub running: bool,
    /// Version of the most recent image build
    pub built: Option<String>,
    /// Version the running container reports
    pub deployed: String,
    /// Forces the reported version regardless of what is deployed
    pub reported_version: Option<String>,
    pub wallets: Vec<String>,
    /// Container runs but RPC never answers
    pub rpc_unresponsive: bool,
    pub engine_down: bool,
    /// Builds of these versions fail
    pub failing_builds: Vec<String>,
    /// Number of upcoming `compose up` calls that fail
    pub failing_ups: usize,
    /// RPC answers that replace the defaults
    pub rpc_overrides: HashMap<String, Result<Value, String>>,
    pub rpc_calls: Vec<String>,
    pub calls: Vec<EngineCall>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            running: false,
            built: None,
            deployed: "26.0".to_string(),
            reported_version: None,
            wallets: Vec::new(),
            rpc_unresponsive: false,
            engine_down: false,
            failing_builds: Vec::new(),
            failing_ups: 0,
            rpc_overrides: HashMap::new(),
            rpc_calls: Vec::new(),
            calls: Vec::new(),
        }
    }
}

pub type SharedNode = Arc<Mutex<NodeState>>;

pub struct MockEngine {
    node: SharedNode,
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<(), OpsError> {
        if self.node.lock().unwrap().engine_down {
            return Err(OpsError::EngineUnavailable("daemon not reachable".to_string()));
        }
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> Result<(), OpsError> {
        let mut node = self.node.lock().unwrap();
        let version = request
            .build_args
            .iter()
            .find(|(key, _)| key == "NODE_VERSION")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        node.calls.push(EngineCall::Build {
            version: version.clone(),
            no_cache: request.no_cache,
        });
        if node.failing_builds.contains(&version) {
            return Err(OpsError::BuildError(format!("build of {} failed", version)));
        }
        node.built = Some(version);
        Ok(())
    }

    async fn compose(&self, _compose_file: &Path, action: ComposeAction) -> Result<(), OpsError> {
        let mut node = self.node.lock().unwrap();
        node.calls.push(EngineCall::Compose(action));
        match action {
            ComposeAction::Up => {
                if node.failing_ups > 0 {
                    node.failing_ups -= 1;
                    return Err(OpsError::EngineError("compose up failed".to_string()));
                }
                if let Some(built) = node.built.clone() {
                    node.deployed = built;
                }
                node.running = true;
            }
            ComposeAction::Down { .. } | ComposeAction::Stop => node.running = false,
            ComposeAction::Start | ComposeAction::Restart => node.running = true,
        }
        Ok(())
    }

    async fn is_running(&self, _container: &str) -> Result<bool, OpsError> {
        let node = self.node.lock().unwrap();
        if node.engine_down {
            return Err(OpsError::EngineUnavailable("daemon not reachable".to_string()));
        }
        Ok(node.running)
    }

    async fn stats(&self, _container: &str) -> Result<Option<ContainerStats>, OpsError> {
        Ok(Some(ContainerStats {
            cpu_percent: "1.5%".to_string(),
            mem_usage: "512MiB / 4GiB".to_string(),
            ..Default::default()
        }))
    }

    async fn logs(&self, _container: &str, tail: usize, _follow: bool) -> Result<String, OpsError> {
        Ok(format!("last {} lines\n", tail))
    }
}

pub struct MockRpc {
    node: SharedNode,
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn call(&self, method: &str, _params: &[Value]) -> Result<Value, OpsError> {
        let mut node = self.node.lock().unwrap();
        node.rpc_calls.push(method.to_string());
        if !node.running || node.rpc_unresponsive {
            return Err(OpsError::RpcTimeout("connection refused".to_string()));
        }
        if let Some(answer) = node.rpc_overrides.get(method) {
            return answer.clone().map_err(OpsError::RpcError);
        }

        let version = node
            .reported_version
            .clone()
            .unwrap_or_else(|| node.deployed.clone());
        let answer = match method {
            "getnetworkinfo" => json!({
                "subversion": format!("/Satoshi:{}/", version),
                "connections": 8,
                "connections_in": 0,
                "connections_out": 8,
            }),
            "getblockchaininfo" => json!({
                "chain": "main",
                "blocks": 800_000,
                "headers": 840_000,
                "verificationprogress": 0.95,
            }),
            "getmempoolinfo" => json!({ "size": 1200, "bytes": 640_000 }),
            "getpeerinfo" => json!([]),
            "listwallets" => json!(node.wallets),
            other => return Err(OpsError::RpcError(format!("Method not found: {}", other))),
        };
        Ok(answer)
    }
}

pub struct MockFeed {
    pub latest: Result<String, String>,
}

#[async_trait]
impl ReleaseFeed for MockFeed {
    async fn latest_version(&self) -> Result<Version, OpsError> {
        match &self.latest {
            Ok(latest) => latest.parse(),
            Err(e) => Err(OpsError::FeedError(e.clone())),
        }
    }
}

/// Fixed answer that counts how often it was asked
pub struct CountingConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingConfirm {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: AtomicUsize::new(0),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirm for CountingConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// A base directory with the deployment artifacts and a simulated node
pub struct TestEnv {
    pub dir: TempDir,
    pub node: SharedNode,
    pub ctx: Context,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_latest("26.0")
    }

    pub fn with_latest(latest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::write(base.join("Dockerfile"), "FROM debian:bookworm-slim\n").unwrap();
        std::fs::write(base.join("docker-compose.yml"), "services: {}\n").unwrap();
        std::fs::write(base.join("docker-compose.prod.yml"), "services: {}\n").unwrap();
        std::fs::write(base.join("bitcoin.conf"), NODE_CONFIG).unwrap();

        let mut settings = Settings::default();
        settings.min_free_disk_gib = 0;
        settings.rpc.attempts = 2;
        settings.rpc.backoff_ms = 0;
        settings.update.verify_attempts = 3;
        settings.update.verify_interval_secs = 0;

        let node: SharedNode = Arc::new(Mutex::new(NodeState::default()));
        let ctx = Context {
            layout: StorageLayout::new(base).with_settings(&settings),
            settings,
            profile: DeploymentProfile::Standard,
            engine: Arc::new(MockEngine { node: node.clone() }),
            rpc: Arc::new(MockRpc { node: node.clone() }),
            feed: Arc::new(MockFeed {
                latest: Ok(latest.to_string()),
            }),
            confirm: CountingConfirm::new(true),
        };

        Self { dir, node, ctx }
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.node.lock().unwrap()
    }

    pub fn set_running(&self, running: bool) {
        self.state().running = running;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        let mut node = self.state();
        node.calls.clear();
        node.rpc_calls.clear();
    }
}
