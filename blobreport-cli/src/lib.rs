//! Command line host for the blob storage publisher.

pub mod host_config;

pub use host_config::{CoreConfig, DEFAULT_CONFIG_FILE, HostConfig, expand_env};
