//! Gateway configuration
//!
//! A thin json5 config reader: ports, auth token, rate ceiling, and the
//! per-command-type enable flags. Every field is defaulted so an absent
//! or partial file is fine; a present but unparsable file is an error.

use crate::model::{Capabilities, FeatureFlags, Limits};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Parse(#[from] json5::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub ws_port: u16,
    /// Absent or empty = auth disabled (fail open).
    pub auth_token: Option<String>,
    /// Commands per second, shared by all clients.
    pub rate_limit: u32,
    pub features: FeatureFlags,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: 9090,
            ws_port: 9091,
            auth_token: None,
            rate_limit: 5,
            features: FeatureFlags::default(),
        }
    }
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&raw)?;
        info!(
            http_port = config.http_port,
            ws_port = config.ws_port,
            auth = if config.auth_enabled() { "enabled" } else { "disabled" },
            rate_limit = config.rate_limit,
            "config loaded"
        );
        Ok(config)
    }

    /// Missing file is not an error: run with defaults, like an unconfigured
    /// fresh install.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// The capability descriptor advertised to clients.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            version: "1.0.0".to_string(),
            features: self.features.clone(),
            limits: Limits {
                commands_per_second: self.rate_limit,
            },
        }
    }
}
