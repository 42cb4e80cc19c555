//! Container engine and service lifecycle

pub mod engine;
pub mod orchestrator;
