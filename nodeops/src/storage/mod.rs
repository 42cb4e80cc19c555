//! Persisted state: layout, settings, node configuration and the command lock

pub mod layout;
pub mod lock;
pub mod node_conf;
pub mod settings;
