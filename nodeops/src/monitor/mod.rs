//! Node health monitoring

pub mod health;
pub mod report;
pub mod watch;
