//! nodeops library
//!
//! Deployment, monitoring, update and backup orchestration for a
//! containerized full node.

pub mod app;
pub mod backup;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod hardware;
pub mod logs;
pub mod monitor;
pub mod prompt;
pub mod rpc;
pub mod storage;
pub mod telemetry;
pub mod update;
pub mod utils;
