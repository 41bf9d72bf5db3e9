//! Optional TOML configuration for the `distflow` binary.
//!
//! Every table and field may be omitted. Command-line flags take precedence
//! over values read here.
//!
//! ```toml
//! [network]
//! base_kv = 11.0
//! vmin_factor = 0.8
//! vmax_factor = 1.05
//!
//! [solver]
//! backend = "interior-point"
//! max_iterations = 200
//! tolerance = 1e-6
//! timeout_seconds = 300
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{anyhow, Context, Result};
use distflow_algo::{BackendKind, SolverConfig};
use distflow_core::feeder::{DEFAULT_VMAX_FACTOR, DEFAULT_VMIN_FACTOR};
use distflow_core::{Kilovolts, VoltageLimits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cli::SolverArgs;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DistflowConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub solver: SolverSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Voltage base and operating window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Line-to-line base voltage in kV
    #[serde(default = "default_base_kv")]
    pub base_kv: f64,
    #[serde(default = "default_vmin_factor")]
    pub vmin_factor: f64,
    #[serde(default = "default_vmax_factor")]
    pub vmax_factor: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_kv: default_base_kv(),
            vmin_factor: default_vmin_factor(),
            vmax_factor: default_vmax_factor(),
        }
    }
}

impl NetworkConfig {
    pub fn limits(&self, base_kv: Option<f64>) -> Result<VoltageLimits> {
        let base_kv = base_kv.unwrap_or(self.base_kv);
        VoltageLimits::with_factors(Kilovolts(base_kv), self.vmin_factor, self.vmax_factor)
            .context("building voltage limits")
    }
}

fn default_base_kv() -> f64 {
    11.0
}

fn default_vmin_factor() -> f64 {
    DEFAULT_VMIN_FACTOR
}

fn default_vmax_factor() -> f64 {
    DEFAULT_VMAX_FACTOR
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverSection {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Wall-clock budget per solve (0 = no timeout)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SolverSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl SolverSection {
    /// Merge command-line overrides into the file settings.
    pub fn resolve(&self, args: &SolverArgs) -> (BackendKind, SolverConfig) {
        let backend = args.backend.unwrap_or(self.backend);
        let config = SolverConfig {
            max_iterations: args.max_iter.unwrap_or(self.max_iterations),
            tolerance: args.tol.unwrap_or(self.tolerance),
            timeout_seconds: self.timeout_seconds,
        };
        (backend, config)
    }
}

fn default_max_iterations() -> usize {
    SolverConfig::default().max_iterations
}

fn default_tolerance() -> f64 {
    SolverConfig::default().tolerance
}

fn default_timeout() -> u64 {
    SolverConfig::default().timeout_seconds
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| anyhow!("invalid log level '{}' in [logging]", self.level))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Read the config file, or fall back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<DistflowConfig> {
    let Some(path) = path else {
        return Ok(DistflowConfig::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config file '{}'", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config file '{}'", path.display()))
}
