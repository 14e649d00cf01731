//! Analysis configuration.
//!
//! All settings can be given in a TOML file. Every section and every key is optional;
//! omitted values take their defaults, which are computed when the file is loaded.
//!
//! ```
//! use omz_core::config::Config;
//!
//! let config = Config::from_toml_str(
//!     r#"
//!     [collector]
//!     directory = "/data/cmip6/o2"
//!     experiments = ["historical", "ssp245"]
//!
//!     [collector.chunks]
//!     time = 120
//!
//!     [diagnostics]
//!     rho_0 = 1027.0
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.collector.experiments, vec!["historical", "ssp245"]);
//! assert_eq!(config.collector.pattern, "*.nc");
//! assert_eq!(config.diagnostics.rho_0, 1027.0);
//! assert_eq!(config.diagnostics.trend.window, 86);
//! ```

use crate::collector::CollectorOptions;
use crate::diagnostics::DEFAULT_RHO_0;
use crate::errors::{OmzError, OmzResult};
use crate::filters::{LengthPolicy, RunDenylist};
use crate::region::DEFAULT_LATITUDE_BAND;
use crate::trend::TrendOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of the quality filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub length: LengthPolicy,
    pub denylist: RunDenylist,
}

/// Settings of the diagnostic indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Reference density in kg m-3 for unit conversions.
    pub rho_0: f64,
    /// Latitude bound of regional subsets, in degrees.
    pub max_lat: f64,
    pub trend: TrendOptions,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rho_0: DEFAULT_RHO_0,
            max_lat: DEFAULT_LATITUDE_BAND,
            trend: TrendOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegridConfig {
    /// Target grid resolution in degrees.
    pub resolution: f64,
}

impl Default for RegridConfig {
    fn default() -> Self {
        Self { resolution: 1.0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collector: CollectorOptions,
    pub quality: QualityConfig,
    pub diagnostics: DiagnosticsConfig,
    pub regrid: RegridConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> OmzResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> OmzResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OmzError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> OmzResult<String> {
        toml::to_string(self).map_err(|e| OmzError::Invalid(format!("Cannot serialise configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CompatPolicy;
    use crate::errors::ErrorKind;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.collector.models.len(), 14);
        assert_eq!(config.quality.denylist.models, vec!["MRI-ESM2-0"]);
        assert_eq!(config.regrid.resolution, 1.0);
    }

    #[test]
    fn quality_tables_are_replaceable() {
        let config = Config::from_toml_str(
            r#"
            [quality.length]
            density_dims = ["rho", "sigma"]

            [[quality.length.rules]]
            experiment = "historical"
            table_id = "Oyr"
            min_length = 165

            [quality.denylist]
            models = []
            "#,
        )
        .unwrap();
        let length = &config.quality.length;
        assert_eq!(length.rules.len(), 1);
        assert_eq!(length.lookup("historical", "Oyr").unwrap(), Some(165));
        assert_eq!(length.time_dim, "time");
        assert_eq!(length.density_dims, vec!["rho", "sigma"]);
        assert!(config.quality.denylist.models.is_empty());
    }

    #[test]
    fn concat_policy() {
        let config = Config::from_toml_str(
            r#"
            [collector.concat]
            compat = "equals"
            "#,
        )
        .unwrap();
        assert_eq!(config.collector.concat.compat, CompatPolicy::Equals);
    }

    #[test]
    fn invalid_config() {
        let err = Config::from_toml_str("[collector]\nmodels = 3").unwrap_err();
        assert!(matches!(err, OmzError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.collector.separator = ".".to_string();
        config.regrid.resolution = 2.0;
        write!(file, "{}", config.to_toml_string().unwrap()).unwrap();

        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);

        let missing = Config::from_file(Path::new("/nonexistent/omz.toml")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::IoFailure);
    }
}
