//! TOML-based analyzer configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Values here only seed the analysis parameters;
//! command-line flags override them per run.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::report::aggregate::Grouping;
use crate::report::value::DisplayUnit;
use crate::sharing::optimize::{Algorithm, OptimizeConfig};

/// Top-level analyzer configuration parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Output grouping and unit.
    pub display: DisplayConfig,
    /// Allocation-search parameters.
    pub optimizer: OptimizerConfig,
}

/// Output grouping and unit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Aggregation bucket: `"15m"`, `"1h"`, `"1d"` or `"1m"`.
    pub grouping: String,
    /// Energy unit: `"kWh"` or `"kW"` (average power per bucket).
    pub unit: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            grouping: "1d".to_string(),
            unit: "kWh".to_string(),
        }
    }
}

/// Allocation-search parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Allocation rounds per simulated interval (must be > 0).
    pub rounds: usize,
    /// Proposal rule: `"random"` or `"gradient-descend"`.
    pub algorithm: String,
    /// Consecutive non-improving proposals ending a restart (must be > 0).
    pub max_consecutive_failures: u32,
    /// Independent restarts (must be > 0).
    pub restarts: usize,
    /// Seed for the proposal stream.
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let defaults = OptimizeConfig::default();
        Self {
            rounds: defaults.rounds,
            algorithm: defaults.algorithm.to_string(),
            max_consecutive_failures: defaults.max_consecutive_failures,
            restarts: defaults.restarts,
            seed: defaults.seed,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"optimizer.rounds"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl AnalyzerConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Err(message) = self.display.grouping.parse::<Grouping>() {
            errors.push(ConfigError {
                field: "display.grouping".into(),
                message,
            });
        }
        if let Err(message) = self.display.unit.parse::<DisplayUnit>() {
            errors.push(ConfigError {
                field: "display.unit".into(),
                message,
            });
        }

        let o = &self.optimizer;
        if o.rounds == 0 {
            errors.push(ConfigError {
                field: "optimizer.rounds".into(),
                message: "must be > 0".into(),
            });
        }
        if let Err(message) = o.algorithm.parse::<Algorithm>() {
            errors.push(ConfigError {
                field: "optimizer.algorithm".into(),
                message,
            });
        }
        if o.max_consecutive_failures == 0 {
            errors.push(ConfigError {
                field: "optimizer.max_consecutive_failures".into(),
                message: "must be > 0".into(),
            });
        }
        if o.restarts == 0 {
            errors.push(ConfigError {
                field: "optimizer.restarts".into(),
                message: "must be > 0".into(),
            });
        }

        errors
    }

    /// Resolved grouping, assuming [`AnalyzerConfig::validate`] passed.
    pub fn grouping(&self) -> Result<Grouping, ConfigError> {
        self.display.grouping.parse().map_err(|message| ConfigError {
            field: "display.grouping".into(),
            message,
        })
    }

    /// Resolved display unit, assuming [`AnalyzerConfig::validate`] passed.
    pub fn unit(&self) -> Result<DisplayUnit, ConfigError> {
        self.display.unit.parse().map_err(|message| ConfigError {
            field: "display.unit".into(),
            message,
        })
    }

    /// Resolved optimizer parameters, assuming [`AnalyzerConfig::validate`]
    /// passed.
    pub fn optimize_config(&self) -> Result<OptimizeConfig, ConfigError> {
        let algorithm = self.optimizer.algorithm.parse().map_err(|message| ConfigError {
            field: "optimizer.algorithm".into(),
            message,
        })?;
        Ok(OptimizeConfig {
            rounds: self.optimizer.rounds,
            algorithm,
            max_consecutive_failures: self.optimizer.max_consecutive_failures,
            restarts: self.optimizer.restarts,
            seed: self.optimizer.seed,
        })
    }
}
