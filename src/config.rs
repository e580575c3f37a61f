//! Configuration management for the verifier
//!
//! The binary takes no flags. Settings come from built-in defaults, an optional
//! TOML file named by `FROST_VERIFY_CONFIG`, and a small set of environment
//! overrides applied last.

use crate::error::{ConfigError, ConfigResult};
use crate::types::SignRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "FROST_VERIFY_CONFIG";
/// Environment override for [`VerifierConfig::base_url`]
pub const BASE_URL_ENV: &str = "FROST_VERIFY_BASE_URL";
/// Environment override for [`VerifierConfig::sign_timeout_ms`]
pub const SIGN_TIMEOUT_ENV: &str = "FROST_VERIFY_SIGN_TIMEOUT_MS";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_MESSAGE: &str = "bitcoin++ Taipei 2025 - FROST-T Demo";

/// Settings for one verification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Base endpoint of the signing service, without trailing slash
    pub base_url: String,
    /// Timeout for `GET /health`
    pub health_timeout_ms: u64,
    /// Timeout for each `GET /status` poll; must be shorter than the poll interval
    pub status_timeout_ms: u64,
    /// Timeout for `POST /sign`, which spans the whole simulated transmission
    pub sign_timeout_ms: u64,
    /// Sampler tick interval
    pub poll_interval_ms: u64,
    /// Length of the baseline monitoring window
    pub baseline_window_ms: u64,
    /// Length of the monitoring window around the sign call
    pub sign_monitor_window_ms: u64,
    /// Pause between the sign response and the "after" snapshot
    pub settle_delay_ms: u64,
    /// Run the sign call and the sign monitor concurrently
    pub monitor_during_sign: bool,
    /// Message submitted to `/sign`
    pub message: String,
    /// Signer ids submitted to `/sign`
    pub signer_ids: Vec<u16>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            health_timeout_ms: 5_000,
            status_timeout_ms: 400,
            sign_timeout_ms: 30_000,
            poll_interval_ms: 500,
            baseline_window_ms: 3_000,
            sign_monitor_window_ms: 5_000,
            settle_delay_ms: 500,
            monitor_during_sign: true,
            message: DEFAULT_MESSAGE.to_string(),
            signer_ids: vec![1, 2, 3],
        }
    }
}

impl VerifierConfig {
    /// Load configuration from the environment: optional file, then overrides.
    pub fn load() -> ConfigResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;

        info!("Verifier configured for {}", config.base_url);
        Ok(config)
    }

    /// Read a TOML file; absent keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading verifier configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides through `lookup` so tests need not touch
    /// the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(SIGN_TIMEOUT_ENV) {
            self.sign_timeout_ms = raw.trim().parse().map_err(|_| ConfigError::Environment {
                variable: SIGN_TIMEOUT_ENV.to_string(),
                value: raw.clone(),
            })?;
        }

        self.base_url = self.base_url.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Check the settings for consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".to_string()));
        }
        if self.status_timeout_ms == 0 || self.status_timeout_ms >= self.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "status_timeout_ms ({}) must be positive and shorter than poll_interval_ms ({})",
                self.status_timeout_ms, self.poll_interval_ms
            )));
        }
        if self.baseline_window_ms == 0 || self.sign_monitor_window_ms == 0 {
            return Err(ConfigError::Invalid("monitoring windows must be positive".to_string()));
        }
        if self.health_timeout_ms == 0 || self.sign_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request timeouts must be positive".to_string()));
        }
        if self.signer_ids.is_empty() {
            return Err(ConfigError::Invalid("signer_ids must not be empty".to_string()));
        }
        Ok(())
    }

    /// The fixed demo request for this run
    pub fn sign_request(&self) -> SignRequest {
        SignRequest {
            message: self.message.clone(),
            signer_ids: self.signer_ids.clone(),
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn sign_timeout(&self) -> Duration {
        Duration::from_millis(self.sign_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn baseline_window(&self) -> Duration {
        Duration::from_millis(self.baseline_window_ms)
    }

    pub fn sign_monitor_window(&self) -> Duration {
        Duration::from_millis(self.sign_monitor_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
