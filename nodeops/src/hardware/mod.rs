//! Host introspection

pub mod profile;
