//! Optional TOML-backed override of the adaptive-wait tuning (feature
//! `config`). The hard-coded defaults remain the zero-config path; this
//! module exists for embedders tuning for a specific platform without
//! forking the crate.

use std::time::Duration;

use serde::Deserialize;

use crate::backoff::{BackoffConfig, ADAPT_ATTEMPTS, ADAPT_SLEEP};

/// Failed to parse a [`WfdsConfig`] from TOML.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse wfds configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Serializable override of [`BackoffConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WfdsConfig {
    pub adapt_attempts: u32,
    pub adapt_sleep_ms: u64,
}

impl Default for WfdsConfig {
    fn default() -> Self {
        WfdsConfig {
            adapt_attempts: ADAPT_ATTEMPTS,
            adapt_sleep_ms: ADAPT_SLEEP.as_millis() as u64,
        }
    }
}

impl WfdsConfig {
    /// Parse configuration from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Convert to the runtime form consumed by `Wfcq::with_backoff` /
    /// `Wfs::with_backoff`.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            adapt_attempts: self.adapt_attempts,
            adapt_sleep: Duration::from_millis(self.adapt_sleep_ms),
        }
    }
}
