//! Governor configuration loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Governor configuration, loaded from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Optimize/apply attempts per city change before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long to wait for the server to process a request batch
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Send requests even when the city already matches (debugging)
    pub always_apply: bool,

    /// Log expected and obtained results when an apply diverges
    pub show_apply_errors: bool,

    /// Log apply statistics at every turn start
    pub show_time_stats: bool,

    /// What to do with a stored parameter that fails to decode
    pub corrupt_parameter: CorruptParameterPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptParameterPolicy {
    /// Panic: storage corruption is a programming error.
    #[default]
    Fault,
    /// Log and treat the city as not governed.
    Discard,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_ack_timeout_ms() -> u64 {
    30_000
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            ack_timeout_ms: default_ack_timeout_ms(),
            always_apply: false,
            show_apply_errors: false,
            show_time_stats: false,
            corrupt_parameter: CorruptParameterPolicy::default(),
        }
    }
}

impl GovernorConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Reject values the governor cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_attempts >= 1,
            "max_attempts must be at least 1, got {}",
            self.max_attempts
        );
        Ok(())
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
