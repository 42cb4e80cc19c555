//! Administrative RPC access to the node

pub mod client;
pub mod models;
