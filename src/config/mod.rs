//! Typed configuration loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid config.
//! Values are checked once at load time and rejected with
//! [`Error::Config`] rather than clamped.

use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::DelayPolicy;
use crate::telemetry::TelemetryConfig;

/// Upper bound on the configurable leeway: one hour.
pub const MAX_LEEWAY_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub lane: LaneConfig,
    pub telemetry: TelemetrySettings,
}

/// Per-lane policy applied to work items that do not set their own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaneConfig {
    /// Readiness slack granted to delayed work items, in milliseconds.
    pub leeway_ms: u64,
    pub delay_policy: DelayPolicy,
}

impl LaneConfig {
    pub fn leeway(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.leeway_ms.min(MAX_LEEWAY_MS) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySettings {
    /// OTLP endpoint for metric export. `None` keeps telemetry local.
    pub otel_endpoint: Option<String>,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            otel_endpoint: None,
            log_level: "info".to_string(),
            service_name: "worklane".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lane.leeway_ms > MAX_LEEWAY_MS {
            return Err(Error::Config(format!(
                "lane.leeway_ms must be at most {MAX_LEEWAY_MS}, got {}",
                self.lane.leeway_ms
            )));
        }
        if self.telemetry.log_level.trim().is_empty() {
            return Err(Error::Config("telemetry.log_level is empty".to_string()));
        }
        if self.telemetry.service_name.trim().is_empty() {
            return Err(Error::Config("telemetry.service_name is empty".to_string()));
        }
        if let Some(endpoint) = &self.telemetry.otel_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(Error::Config(format!(
                    "telemetry.otel_endpoint must be an http(s) URL, got {endpoint}"
                )));
            }
        }
        Ok(())
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: self.telemetry.otel_endpoint.clone(),
            service_name: self.telemetry.service_name.clone(),
            log_level: self.telemetry.log_level.clone(),
        }
    }
}
