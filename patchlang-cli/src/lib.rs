//! Library half of the `patchlang` binary: project configuration.

pub mod config;

pub use config::{ConfigError, ProjectConfig, CONFIG_FILE};
