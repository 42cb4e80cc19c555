//! Typed views of the RPC responses nodeops reads.
//!
//! Every field is optional: the node may omit fields across versions, and a
//! missing field must only degrade the report, never fail it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::OpsError;

/// `getblockchaininfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockchainInfo {
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub blocks: Option<u64>,
    #[serde(default)]
    pub headers: Option<u64>,
    #[serde(default)]
    pub verificationprogress: Option<f64>,
    #[serde(default)]
    pub initialblockdownload: Option<bool>,
    #[serde(default)]
    pub size_on_disk: Option<u64>,
    #[serde(default)]
    pub pruned: Option<bool>,
}

/// `getnetworkinfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub subversion: Option<String>,
    #[serde(default)]
    pub connections: Option<u64>,
    #[serde(default)]
    pub connections_in: Option<u64>,
    #[serde(default)]
    pub connections_out: Option<u64>,
}

/// `getmempoolinfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MempoolInfo {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub maxmempool: Option<u64>,
    #[serde(default)]
    pub mempoolminfee: Option<f64>,
}

/// One entry of `getpeerinfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub subver: Option<String>,
    #[serde(default)]
    pub inbound: Option<bool>,
    #[serde(default)]
    pub pingtime: Option<f64>,
    #[serde(default)]
    pub synced_blocks: Option<i64>,
}

/// Decode an RPC result into `T`, reporting shape errors as `MalformedResponse`
pub fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, OpsError> {
    serde_json::from_value(value)
        .map_err(|e| OpsError::MalformedResponse(format!("{}: {}", method, e)))
}
