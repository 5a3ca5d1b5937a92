//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - categoria.toml (default configuration)
//! - categoria.local.toml (git-ignored local overrides)
//! - Environment variables (CATEGORIA_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # categoria.toml
//! [thresholds]
//! or_opt_threshold = 2
//! and_opt_threshold = 2
//!
//! [limits]
//! max_frame_depth = 20
//! max_or_group_width = 64
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! CATEGORIA_THRESHOLDS__OR_OPT_THRESHOLD=4
//! CATEGORIA_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct: process-level defaults, merged into
/// per-`compile()`-call [`crate::engine::Options`] unless the caller
/// overrides a field explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default OR/AND-factoring thresholds (spec §6 `Options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_or_opt_threshold")]
    pub or_opt_threshold: u32,

    #[serde(default = "default_and_opt_threshold")]
    pub and_opt_threshold: u32,

    #[serde(default)]
    pub verbose: bool,
}

/// Hard limits from spec §4.5/§4.6, exposed so deployments and tests can
/// tune them without a recompile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_frame_depth")]
    pub max_frame_depth: usize,

    #[serde(default = "default_max_or_group_width")]
    pub max_or_group_width: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_or_opt_threshold() -> u32 {
    1
}
fn default_and_opt_threshold() -> u32 {
    1
}
fn default_max_frame_depth() -> usize {
    20
}
fn default_max_or_group_width() -> usize {
    64
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. categoria.toml (base configuration)
    /// 2. categoria.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (CATEGORIA_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("categoria.toml"))
            .merge(Toml::file("categoria.local.toml"))
            .merge(Env::prefixed("CATEGORIA_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CATEGORIA_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            thresholds: ThresholdsConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        ThresholdsConfig {
            or_opt_threshold: default_or_opt_threshold(),
            and_opt_threshold: default_and_opt_threshold(),
            verbose: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_frame_depth: default_max_frame_depth(),
            max_or_group_width: default_max_or_group_width(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.thresholds.or_opt_threshold, 1);
        assert_eq!(config.limits.max_frame_depth, 20);
        assert_eq!(config.limits.max_or_group_width, 64);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[thresholds]"));
        assert!(toml_str.contains("[limits]"));
        assert!(toml_str.contains("[logging]"));
    }
}
