//! Node version updates

pub mod coordinator;
pub mod feed;
pub mod fsm;
pub mod version;
