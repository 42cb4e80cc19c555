//! Application wiring: options, context and dispatch

pub mod context;
pub mod options;
pub mod run;
