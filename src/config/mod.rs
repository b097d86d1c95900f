//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for listeners, file scan
//! jobs and global settings.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::ConfigBuilder;
pub use error::ConfigError;
pub use types::{JobConfig, ListenerConfig, RetryConditionConfig, RetryConfig, ScanConfig};
pub use yaml::YamlLoader;
