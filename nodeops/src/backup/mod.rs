//! Configuration and wallet backups

pub mod archive;
pub mod manager;
pub mod retention;
pub mod schedule;
