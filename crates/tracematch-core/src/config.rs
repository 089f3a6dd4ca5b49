//! Validator configuration.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `TRACEMATCH_TIMESTAMP_TOLERANCE_MS` | Leniency for timestamp ordering (default: 250) |
//! | `TRACEMATCH_MAX_BRANCHES` | Cap on backtracking branches (default: 100000) |
//!
//! In YAML, `max_branches: null` removes the cap.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{TraceError, TraceResult};

pub const DEFAULT_TIMESTAMP_TOLERANCE_MS: u64 = 250;
pub const DEFAULT_MAX_BRANCHES: u64 = 100_000;

pub const ENV_TIMESTAMP_TOLERANCE_MS: &str = "TRACEMATCH_TIMESTAMP_TOLERANCE_MS";
pub const ENV_MAX_BRANCHES: &str = "TRACEMATCH_MAX_BRANCHES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorConfig {
    /// A candidate may precede its `must_be_after` bound by at most this much.
    #[serde(default = "default_tolerance_ms")]
    pub timestamp_tolerance_ms: u64,

    /// Exceeding this fails with `SearchBudgetExceeded`. `None` is unlimited.
    #[serde(default = "default_max_branches")]
    pub max_branches: Option<u64>,
}

fn default_tolerance_ms() -> u64 {
    DEFAULT_TIMESTAMP_TOLERANCE_MS
}

fn default_max_branches() -> Option<u64> {
    Some(DEFAULT_MAX_BRANCHES)
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_ms: DEFAULT_TIMESTAMP_TOLERANCE_MS,
            max_branches: default_max_branches(),
        }
    }
}

impl ValidatorConfig {
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_millis(self.timestamp_tolerance_ms)
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance_ms = u64::try_from(tolerance.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_branches(mut self, max_branches: u64) -> Self {
        self.max_branches = Some(max_branches);
        self
    }

    pub fn from_yaml_str(raw: &str) -> TraceResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| TraceError::Config {
            message: format!("failed to parse yaml: {}", e),
        })
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> TraceResult<Self> {
        Self::default().apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env(self) -> TraceResult<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_env_with<F>(mut self, lookup: F) -> TraceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_TIMESTAMP_TOLERANCE_MS) {
            self.timestamp_tolerance_ms = parse_env_u64(ENV_TIMESTAMP_TOLERANCE_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_BRANCHES) {
            self.max_branches = Some(parse_env_u64(ENV_MAX_BRANCHES, &raw)?);
        }
        Ok(self)
    }
}

fn parse_env_u64(key: &str, raw: &str) -> TraceResult<u64> {
    raw.trim().parse().map_err(|_| TraceError::Config {
        message: format!("{} must be a non-negative integer, got '{}'", key, raw),
    })
}

/// Loads a config file and applies environment overrides on top of it.
pub fn load_config(path: &Path) -> TraceResult<ValidatorConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| TraceError::Config {
        message: format!("failed to read config {}: {}", path.display(), e),
    })?;
    let cfg = ValidatorConfig::from_yaml_str(&raw)?;
    tracing::debug!(path = %path.display(), ?cfg, "loaded validator config");
    cfg.apply_env()
}
