//! Quality filter on the length of the time axis.
//!
//! Complete CMIP6 runs have a known number of time steps per experiment and table, e.g.
//! 1980 monthly steps for `historical` (1850–2014). Shorter datasets are incomplete
//! downloads or partial uploads and are dropped. Rules are matched in order, the first
//! one matching both the experiment (a glob pattern) and the table id wins.
//!
//! | Experiment | Table | Minimum length |
//! |---|---|---|
//! | `historical` | `Omon` | 1980 |
//! | `ssp*` | `Omon` | 1032 |
//! | `*Control*` | `Omon` | 600 |
//!
//! Datasets without a matching rule are kept with a warning (a minimum length of 1).

use crate::dataset::Dataset;
use crate::errors::{OmzError, OmzResult};
use glob::Pattern;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of time steps for datasets of one experiment class and table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRule {
    /// Glob pattern matched against `experiment_id`.
    pub experiment: String,
    pub table_id: String,
    pub min_length: usize,
}

impl LengthRule {
    pub fn new(experiment: &str, table_id: &str, min_length: usize) -> Self {
        Self {
            experiment: experiment.to_string(),
            table_id: table_id.to_string(),
            min_length,
        }
    }
}

/// Policy applied by [`filter_by_length`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthPolicy {
    pub rules: Vec<LengthRule>,
    /// Datasets spanning any of these dimensions are on density levels and are dropped.
    pub density_dims: Vec<String>,
    pub time_dim: String,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                LengthRule::new("historical", "Omon", 1980),
                LengthRule::new("ssp*", "Omon", 1032),
                LengthRule::new("*Control*", "Omon", 600),
            ],
            density_dims: vec!["rho".to_string()],
            time_dim: "time".to_string(),
        }
    }
}

impl LengthPolicy {
    /// Minimum length for `experiment_id` in table `table_id`, if a rule covers it.
    pub fn lookup(&self, experiment_id: &str, table_id: &str) -> OmzResult<Option<usize>> {
        for rule in &self.rules {
            if rule.table_id == table_id && Pattern::new(&rule.experiment)?.matches(experiment_id) {
                return Ok(Some(rule.min_length));
            }
        }
        Ok(None)
    }

    /// Minimum length, falling back to 1 with a warning.
    pub fn min_length(&self, experiment_id: &str, table_id: &str) -> OmzResult<usize> {
        Ok(match self.lookup(experiment_id, table_id)? {
            Some(min) => min,
            None => {
                warn!(
                    "No length rule for experiment '{experiment_id}' in table '{table_id}'; not filtering"
                );
                1
            }
        })
    }
}

/// Reduce every dataset to its primary variable and drop incomplete ones.
///
/// The primary variable is named by the `variable_id` attribute. Datasets on density
/// levels, and datasets with fewer time steps than the policy requires, are removed.
pub fn filter_by_length(
    datasets: BTreeMap<String, Dataset>,
    policy: &LengthPolicy,
) -> OmzResult<BTreeMap<String, Dataset>> {
    let mut kept = BTreeMap::new();
    for (name, mut ds) in datasets {
        let variable_id = ds
            .attr_str("variable_id")
            .ok_or_else(|| OmzError::Invalid(format!("Dataset '{name}' has no 'variable_id' attribute")))?
            .to_string();
        ds.get(&variable_id)?;
        ds.retain_variables(|v| v == variable_id);

        if let Some(dim) = policy.density_dims.iter().find(|d| ds.has_dim(d)) {
            info!("Dropping {name}: on density levels ('{dim}')");
            continue;
        }

        let experiment_id = ds.attr_str("experiment_id").unwrap_or_default();
        let table_id = ds.attr_str("table_id").unwrap_or_default();
        let min_length = policy.min_length(experiment_id, table_id)?;
        let length = ds.dim_len(&policy.time_dim).unwrap_or(0);
        if length < min_length {
            info!("Dropping {name}: {length} time steps, expected at least {min_length}");
            continue;
        }
        kept.insert(name, ds);
    }
    Ok(kept)
}
