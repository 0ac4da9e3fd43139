//! Run configuration loaded from JSON, with defaults for every field.
//!
//! The command-line front end starts from [`RunConfig::default`] or a file
//! and applies flag overrides on top.

use crate::domain::RelhfError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("failed to read configuration '{path}': {message}")]
    Io { path: String, message: String },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("unknown Hartree-Fock method '{0}' (expected HartreeFock, ApproxHF, Hartree, GreenPRM or TietzPRM)")]
    UnknownMethod(String),
}

impl From<ConfigError> for RelhfError {
    fn from(error: ConfigError) -> Self {
        match &error {
            ConfigError::Io { .. } => RelhfError::io_system("IO.CONFIG", error.to_string()),
            ConfigError::Parse(_) => {
                RelhfError::input_validation("INPUT.CONFIG_PARSE", error.to_string())
            }
            ConfigError::InvalidValue { .. } => {
                RelhfError::input_validation("INPUT.CONFIG_VALUE", error.to_string())
            }
            ConfigError::UnknownMethod(_) => {
                RelhfError::input_validation("INPUT.METHOD", error.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default)]
    pub nucleus: NucleusConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default = "default_core")]
    pub core: String,
    #[serde(default)]
    pub valence: String,
    #[serde(rename = "hartreeFock", default)]
    pub hartree_fock: HartreeFockSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nucleus: NucleusConfig::default(),
            grid: GridConfig::default(),
            core: default_core(),
            valence: String::new(),
            hartree_fock: HartreeFockSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(source).map_err(|error| ConfigError::Parse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::from_json_str(&source)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|error| ConfigError::Parse(error.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nucleus.z < 1 || self.nucleus.z > 137 {
            return Err(ConfigError::InvalidValue {
                field: "nucleus.z",
                message: format!("must be in 1..=137, got {}", self.nucleus.z),
            });
        }
        if let Some(mass) = self.nucleus.mass_number
            && mass <= 0.0
        {
            return Err(ConfigError::InvalidValue {
                field: "nucleus.massNumber",
                message: format!("must be > 0, got {mass}"),
            });
        }
        if !(self.grid.r0 > 0.0) || !(self.grid.rmax > self.grid.r0) {
            return Err(ConfigError::InvalidValue {
                field: "grid",
                message: format!(
                    "need 0 < r0 < rmax, got r0={} rmax={}",
                    self.grid.r0, self.grid.rmax
                ),
            });
        }
        if self.grid.points < 100 {
            return Err(ConfigError::InvalidValue {
                field: "grid.points",
                message: format!("must be >= 100, got {}", self.grid.points),
            });
        }
        if !(self.hartree_fock.alpha_scale > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "hartreeFock.alphaScale",
                message: format!("must be > 0, got {}", self.hartree_fock.alpha_scale),
            });
        }
        if !(self.hartree_fock.exchange_threshold >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "hartreeFock.exchangeThreshold",
                message: format!("must be >= 0, got {}", self.hartree_fock.exchange_threshold),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NucleusConfig {
    pub z: u32,
    /// Mass number; selects a uniformly charged sphere when present.
    #[serde(rename = "massNumber", default)]
    pub mass_number: Option<f64>,
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            z: 2,
            mass_number: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    pub r0: f64,
    pub rmax: f64,
    pub points: usize,
    /// Log-linear turnover radius; `None` or `0` gives a logarithmic grid.
    #[serde(default)]
    pub b: Option<f64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            r0: 1.0e-6,
            rmax: 60.0,
            points: 3000,
            b: Some(4.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HartreeFockSettings {
    #[serde(default = "default_method")]
    pub method: String,
    /// Convergence target: an epsilon when |value| < 1, otherwise -log10(epsilon).
    #[serde(rename = "epsHf", default = "default_eps")]
    pub eps_hf: f64,
    #[serde(rename = "explicitOrthogCore", default)]
    pub explicit_orthog_core: bool,
    #[serde(rename = "explicitOrthogValence", default = "default_true")]
    pub explicit_orthog_valence: bool,
    #[serde(rename = "exchangeThreshold", default = "default_exchange_threshold")]
    pub exchange_threshold: f64,
    #[serde(rename = "alphaScale", default = "default_alpha_scale")]
    pub alpha_scale: f64,
}

impl Default for HartreeFockSettings {
    fn default() -> Self {
        Self {
            method: default_method(),
            eps_hf: default_eps(),
            explicit_orthog_core: false,
            explicit_orthog_valence: true,
            exchange_threshold: default_exchange_threshold(),
            alpha_scale: default_alpha_scale(),
        }
    }
}

fn default_core() -> String {
    "1s2".to_string()
}

fn default_method() -> String {
    "HartreeFock".to_string()
}

fn default_eps() -> f64 {
    12.0
}

fn default_true() -> bool {
    true
}

fn default_exchange_threshold() -> f64 {
    1.0e-3
}

fn default_alpha_scale() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RunConfig};
    use std::io::Write;

    #[test]
    fn empty_object_yields_defaults() {
        let config = RunConfig::from_json_str("{}").expect("defaults should be valid");
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.hartree_fock.method, "HartreeFock");
        assert_eq!(config.grid.b, Some(4.0));
    }

    #[test]
    fn camel_case_fields_are_read() {
        let config = RunConfig::from_json_str(
            r#"{
              "nucleus": { "z": 3 },
              "core": "[He]",
              "valence": "2s,2p",
              "hartreeFock": { "method": "ApproxHF", "epsHf": 1e-9, "explicitOrthogCore": true }
            }"#,
        )
        .expect("configuration should parse");

        assert_eq!(config.nucleus.z, 3);
        assert_eq!(config.core, "[He]");
        assert_eq!(config.valence, "2s,2p");
        assert_eq!(config.hartree_fock.method, "ApproxHF");
        assert!((config.hartree_fock.eps_hf - 1.0e-9).abs() < 1.0e-24);
        assert!(config.hartree_fock.explicit_orthog_core);
        assert!(config.hartree_fock.explicit_orthog_valence);
    }

    #[test]
    fn invalid_grid_is_rejected() {
        let error = RunConfig::from_json_str(r#"{ "grid": { "r0": 1.0, "rmax": 0.5, "points": 500 } }"#)
            .expect_err("rmax below r0 should fail");
        assert!(matches!(error, ConfigError::InvalidValue { field: "grid", .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = RunConfig::from_json_str("{ nucleus: }").expect_err("should not parse");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn configuration_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile should be created");
        write!(file, r#"{{ "nucleus": {{ "z": 10 }}, "core": "[Ne]" }}"#)
            .expect("config should be written");

        let config = RunConfig::from_path(file.path()).expect("config should load");
        assert_eq!(config.nucleus.z, 10);
        assert_eq!(config.core, "[Ne]");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = RunConfig::from_path(std::path::Path::new("/nonexistent/relhf.json"))
            .expect_err("missing file should fail");
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
