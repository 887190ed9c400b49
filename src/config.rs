//! Configuration types for the cleaning pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the cleaned table is produced from a generated transformation.
///
/// This is a deployment-level decision, not a per-request one: every run
/// under the same configuration uses the same mode, and both modes write the
/// cleaned table to the same reserved output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CleaningMode {
    /// Execute the generated script as an isolated subprocess.
    #[default]
    Script,
    /// Ask the generation service for already-cleaned records and write
    /// them directly, bypassing script execution.
    DirectRecords,
}

/// Configuration for the cleaning pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration with a
/// fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use datamend::config::{CleaningMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .store_dir("app_data")
///     .script_timeout_secs(120)
///     .cleaning_mode(CleaningMode::Script)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for the filesystem artifact store.
    /// Default: "app_data"
    pub store_dir: PathBuf,

    /// Wall-clock timeout for executing a generated script, in seconds.
    /// Default: 300
    pub script_timeout_secs: u64,

    /// Interpreter used to run generated scripts.
    /// Default: "python3"
    pub interpreter: String,

    /// How cleaned tables are produced.
    /// Default: Script
    pub cleaning_mode: CleaningMode,

    /// Number of sample values included per column in the profiling context.
    /// Default: 10
    pub sample_values: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("app_data"),
            script_timeout_secs: 300,
            interpreter: "python3".to_string(),
            cleaning_mode: CleaningMode::default(),
            sample_values: 10,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// The script execution timeout as a [`Duration`].
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.script_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout(
                self.script_timeout_secs,
            ));
        }
        if self.interpreter.trim().is_empty() {
            return Err(ConfigValidationError::EmptyInterpreter);
        }
        if self.sample_values == 0 {
            return Err(ConfigValidationError::InvalidSampleValues(
                self.sample_values,
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid script timeout: {0} (must be at least 1 second)")]
    InvalidTimeout(u64),

    #[error("Interpreter must not be empty")]
    EmptyInterpreter,

    #[error("Invalid sample value count: {0} (must be at least 1)")]
    InvalidSampleValues(usize),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    store_dir: Option<PathBuf>,
    script_timeout_secs: Option<u64>,
    interpreter: Option<String>,
    cleaning_mode: Option<CleaningMode>,
    sample_values: Option<usize>,
}

impl PipelineConfigBuilder {
    /// Set the root directory for the artifact store.
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Set the script execution timeout in seconds.
    pub fn script_timeout_secs(mut self, secs: u64) -> Self {
        self.script_timeout_secs = Some(secs);
        self
    }

    /// Set the interpreter used to run generated scripts.
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Set how cleaned tables are produced.
    pub fn cleaning_mode(mut self, mode: CleaningMode) -> Self {
        self.cleaning_mode = Some(mode);
        self
    }

    /// Set the number of sample values per column in profiling output.
    pub fn sample_values(mut self, count: usize) -> Self {
        self.sample_values = Some(count);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            store_dir: self.store_dir.unwrap_or_else(|| PathBuf::from("app_data")),
            script_timeout_secs: self.script_timeout_secs.unwrap_or(300),
            interpreter: self.interpreter.unwrap_or_else(|| "python3".to_string()),
            cleaning_mode: self.cleaning_mode.unwrap_or_default(),
            sample_values: self.sample_values.unwrap_or(10),
        };
        config.validate()?;
        Ok(config)
    }
}
