//! Stopwatch configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::{Format, DEFAULT_FORMAT};

pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1000;

/// Options recognized by `init`. Missing keys take their defaults and
/// unknown keys are ignored when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Tick cadence in milliseconds. Must be positive.
    pub update_interval: u64,
    /// Initial elapsed value, restored on reset.
    #[serde(alias = "startTime")]
    pub start_offset: u64,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL_MS,
            start_offset: 0,
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl Config {
    pub fn with_update_interval(mut self, interval_ms: u64) -> Self {
        self.update_interval = interval_ms;
        self
    }

    pub fn with_start_offset(mut self, offset_ms: u64) -> Self {
        self.start_offset = offset_ms;
        self
    }

    pub fn with_format(mut self, template: impl Into<String>) -> Self {
        self.format = template.into();
        self
    }

    /// Parses a JSON document such as `{"updateInterval": 100, "startTime": 1000}`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks the options and resolves the format template.
    pub fn validate(&self) -> Result<Format, ConfigError> {
        if self.update_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Format::parse(&self.format)?)
    }
}
