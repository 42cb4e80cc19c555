//! JSON-RPC client for the node's administrative interface

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::errors::OpsError;
use crate::storage::node_conf::NodeConfig;
use crate::storage::settings::RpcSettings;

/// Error code the node returns while it is still loading
const RPC_IN_WARMUP: i64 = -28;

/// Single administrative RPC call
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, OpsError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// HTTP JSON-RPC 1.0 client with basic auth
pub struct HttpRpcClient {
    client: Client,
    url: Url,
    user: String,
    password: SecretString,
}

impl HttpRpcClient {
    /// Build a client from the RPC settings and the node's credentials
    pub fn new(settings: &RpcSettings, config: Option<&NodeConfig>) -> Result<Self, OpsError> {
        let port = config.and_then(NodeConfig::rpc_port).unwrap_or(settings.port);
        let url = Url::parse(&format!("http://{}:{}/", settings.host, port))
            .map_err(|e| OpsError::ConfigError(format!("Invalid RPC endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            user: config
                .and_then(NodeConfig::rpc_user)
                .unwrap_or_default()
                .to_string(),
            password: SecretString::from(
                config
                    .and_then(NodeConfig::rpc_password)
                    .unwrap_or_default()
                    .to_string(),
            ),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, OpsError> {
        debug!("RPC {} {:?}", method, params);
        let body = json!({
            "jsonrpc": "1.0",
            "id": "nodeops",
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    OpsError::RpcTimeout(format!("{}: {}", method, e))
                } else {
                    OpsError::HttpError(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OpsError::RpcError(format!(
                "{}: credentials rejected ({})",
                method, status
            )));
        }

        // The node reports RPC errors with a 500 status and a JSON body
        let text = response.text().await?;
        let parsed: RpcResponse = serde_json::from_str(&text).map_err(|e| {
            OpsError::MalformedResponse(format!("{} returned non-JSON ({}): {}", method, status, e))
        })?;

        if let Some(error) = parsed.error {
            if error.code == RPC_IN_WARMUP {
                return Err(OpsError::RpcWarmup(error.message));
            }
            return Err(OpsError::RpcError(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }
}
