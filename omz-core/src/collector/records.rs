//! Parsing of file paths into model/experiment records.
//!
//! CMIP6 file names encode their metadata, e.g.
//! `o2_Omon_CanESM5_historical_r1i1p1f1_gn_185001-201412.nc`. Models are matched with the
//! separator on both sides (`_CanESM5_`), so `CanESM5` never claims the files of
//! `CanESM5-CanOE`. Experiments are matched as plain substrings of the path. That means an
//! experiment name contained in another one (`ssp585` and `ssp585-bgc`) claims the files of
//! both. Such paths are kept in every group they match and listed in
//! [`ScanReport::ambiguous`].

use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A file attributed to one model and one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub model_id: String,
    pub experiment_id: String,
}

/// A path that matched more than one model or experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub path: PathBuf,
    pub models: Vec<String>,
    pub experiments: Vec<String>,
}

/// Files that could not be attributed cleanly, each reported once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Configured models with at least one file, whatever its experiment.
    pub models_found: Vec<String>,
    /// Paths matching none of the configured models.
    pub unmatched: Vec<PathBuf>,
    /// Paths matching a model but none of the configured experiments.
    pub without_experiment: Vec<PathBuf>,
    /// Paths attributed to several groups.
    pub ambiguous: Vec<Ambiguity>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty() && self.without_experiment.is_empty() && self.ambiguous.is_empty()
    }
}

/// Token identifying `model` inside a path.
pub fn model_token(separator: &str, model: &str) -> String {
    format!("{separator}{model}{separator}")
}

fn matches_model(path: &str, separator: &str, model: &str) -> bool {
    path.contains(&model_token(separator, model))
}

fn matches_experiment(path: &str, experiment: &str) -> bool {
    path.contains(experiment)
}

/// Attribute every path to the configured models and experiments.
///
/// Records come out grouped by model, then experiment, in the order given, with paths in
/// their original order inside each group.
pub fn parse_records(
    paths: &[PathBuf],
    separator: &str,
    models: &[String],
    experiments: &[String],
) -> (Vec<FileRecord>, ScanReport) {
    let mut report = ScanReport::default();
    let mut matched: Vec<(&Path, Vec<&String>, Vec<&String>)> = Vec::with_capacity(paths.len());

    for path in paths {
        let text = path.to_string_lossy();
        let path_models: Vec<&String> = models
            .iter()
            .filter(|m| matches_model(&text, separator, m))
            .collect();
        if path_models.is_empty() {
            debug!("{} matches no configured model", path.display());
            report.unmatched.push(path.clone());
            continue;
        }
        let path_experiments: Vec<&String> = experiments
            .iter()
            .filter(|e| matches_experiment(&text, e))
            .collect();
        if path_experiments.is_empty() {
            debug!("{} matches no configured experiment", path.display());
            report.without_experiment.push(path.clone());
        }
        if path_models.len() > 1 || path_experiments.len() > 1 {
            warn!(
                "{} is claimed by models {:?} and experiments {:?}; it is counted in each group",
                path.display(),
                path_models,
                path_experiments
            );
            report.ambiguous.push(Ambiguity {
                path: path.clone(),
                models: path_models.iter().map(|s| s.to_string()).collect(),
                experiments: path_experiments.iter().map(|s| s.to_string()).collect(),
            });
        }
        matched.push((path.as_path(), path_models, path_experiments));
    }

    if !report.unmatched.is_empty() {
        warn!(
            "{} file(s) match none of the configured models",
            report.unmatched.len()
        );
    }

    report.models_found = models
        .iter()
        .filter(|model| matched.iter().any(|(_, path_models, _)| path_models.contains(model)))
        .cloned()
        .collect();

    let mut records = Vec::new();
    for model in models {
        for experiment in experiments {
            for (path, path_models, path_experiments) in &matched {
                if path_models.contains(&model) && path_experiments.contains(&experiment) {
                    records.push(FileRecord {
                        path: path.to_path_buf(),
                        model_id: model.clone(),
                        experiment_id: experiment.clone(),
                    });
                }
            }
        }
    }
    (records, report)
}
