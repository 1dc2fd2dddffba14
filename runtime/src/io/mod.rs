//! File-backed configuration for the runtime.

pub mod config;
pub mod domain_config;
