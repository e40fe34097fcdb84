//! Configuration types for solc invocation and retry behavior

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration for contract compilation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Path to the solc binary. When unset, `$SOLC` and then `PATH` are
    /// consulted.
    pub solc: Option<PathBuf>,

    /// Version requirement the binary must satisfy, e.g. `^0.8.20`.
    /// When unset, any version is accepted.
    pub required_version: Option<semver::VersionReq>,

    /// Target EVM version passed through to solc (e.g. `shanghai`)
    pub evm_version: Option<String>,

    /// Optimizer settings passed through to solc
    pub optimizer: OptimizerConfig,

    /// Retry behavior for transient invocation failures
    pub retry: RetryConfig,
}

/// Optimizer settings, serialized in the shape solc's standard JSON expects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Whether to run the optimizer
    pub enabled: bool,

    /// How many times the deployed code is expected to run
    pub runs: u32,
}

/// Retry behavior for transient invocation failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts before giving up, counting the first one
    pub max_attempts: usize,

    /// Pause between attempts, in milliseconds
    pub backoff_ms: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: 200,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ms: 1_000,
        }
    }
}

impl RetryConfig {
    /// Pause between attempts as a [`Duration`]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl CompilerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a new builder for CompilerConfig
    pub fn builder() -> CompilerConfigBuilder {
        CompilerConfigBuilder::default()
    }
}

/// Builder for creating CompilerConfig with a fluent API
#[derive(Default)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    /// Set the path to the solc binary
    pub fn solc(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.solc = Some(path.into());
        self
    }

    /// Require the binary to satisfy a version requirement
    pub fn required_version(mut self, req: semver::VersionReq) -> Self {
        self.config.required_version = Some(req);
        self
    }

    /// Set the target EVM version
    pub fn evm_version(mut self, version: impl Into<String>) -> Self {
        self.config.evm_version = Some(version.into());
        self
    }

    /// Configure the optimizer
    pub fn optimizer(mut self, enabled: bool, runs: u32) -> Self {
        self.config.optimizer = OptimizerConfig { enabled, runs };
        self
    }

    /// Set the total number of attempts before giving up
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    /// Set the pause between attempts
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.config.retry.backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<CompilerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
