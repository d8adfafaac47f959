//! # Engine Configuration
//!
//! Process-level defaults for the measurement engine: where reports land,
//! which bouncer to contact when no explicit option overrides it, and how
//! the engine identifies itself. Explicit per-run options always win over
//! these defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{system, verbosity};
use crate::error::{EngineError, Result};

/// Engine-level configuration with environment-aware loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bouncer queried when `bouncer_base_url` is not set per run.
    #[serde(default = "default_bouncer_base_url")]
    pub bouncer_base_url: String,

    /// Directory where derived default report paths are created.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Default verbosity for loggers created by embedding applications.
    #[serde(default = "default_log_verbosity")]
    pub log_verbosity: u32,

    /// Software name reported to the bouncer.
    #[serde(default = "default_software_name")]
    pub software_name: String,

    /// Software version reported to the bouncer.
    #[serde(default = "default_software_version")]
    pub software_version: String,
}

fn default_bouncer_base_url() -> String {
    "https://bouncer.ooni.io".to_string()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_verbosity() -> u32 {
    verbosity::INFO
}

fn default_software_name() -> String {
    system::ENGINE_NAME.to_string()
}

fn default_software_version() -> String {
    system::ENGINE_VERSION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bouncer_base_url: default_bouncer_base_url(),
            report_dir: default_report_dir(),
            log_verbosity: default_log_verbosity(),
            software_name: default_software_name(),
            software_version: default_software_version(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NETTEST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NETTEST_BOUNCER_BASE_URL") {
            config.bouncer_base_url = url;
        }

        if let Ok(dir) = std::env::var("NETTEST_REPORT_DIR") {
            config.report_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("NETTEST_LOG_VERBOSITY") {
            config.log_verbosity = level.parse().map_err(|e| {
                EngineError::Configuration(format!("Invalid log_verbosity: {e}"))
            })?;
        }

        if let Ok(name) = std::env::var("NETTEST_SOFTWARE_NAME") {
            config.software_name = name;
        }

        if let Ok(version) = std::env::var("NETTEST_SOFTWARE_VERSION") {
            config.software_version = version;
        }

        Ok(config)
    }

    /// Load configuration from a YAML file; absent keys keep defaults.
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            EngineError::Configuration(format!("Invalid config {}: {e}", path.display()))
        })
    }

    /// Environment-aware load: `NETTEST_CONFIG` names a YAML file when set,
    /// otherwise environment variables override the defaults.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var("NETTEST_CONFIG") {
            Self::from_yaml_file(&path)
                .with_context(|| format!("loading engine config from {path}"))
        } else {
            Self::from_env().context("loading engine config from environment")
        }
    }

    /// A logger at the configured default verbosity.
    pub fn build_logger(&self) -> crate::logger::Logger {
        let logger = crate::logger::Logger::new();
        logger.set_verbosity(self.log_verbosity);
        logger
    }
}
