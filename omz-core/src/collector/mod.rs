//! Discovery and harmonization of multi-model, multi-experiment CMIP6 output.
//!
//! The collector scans a directory, attributes every matching file to a model and an
//! experiment (see [`records`]), loads each group and stacks its files along the
//! [`MEMBER_DIM`] dimension. The result is a [`DatasetCollection`] keyed by
//! `model → experiment`.
//!
//! Absence of data is not an error: a model or experiment without files is left out of the
//! collection and recorded as an [`Omission`]. An empty directory yields `Ok(None)`.
//! Anything a [`DatasetReader`] fails on aborts the whole scan.
//!
//! ```no_run
//! # #[cfg(feature = "netcdf")]
//! # fn main() -> omz_core::errors::OmzResult<()> {
//! use omz_core::collector::{collect, CollectorOptions};
//! use omz_core::reader::NetcdfReader;
//!
//! let options = CollectorOptions::new("/data/cmip6/o2")
//!     .with_experiments(&["historical", "ssp585"]);
//! if let Some(collection) = collect(&NetcdfReader::new(), &options)? {
//!     for (model, experiment, ds) in collection.iter() {
//!         println!("{model} {experiment}: {:?}", ds.dims());
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "netcdf"))]
//! # fn main() {}
//! ```

pub mod records;

pub use records::{parse_records, Ambiguity, FileRecord, ScanReport};

use crate::dataset::{ConcatOptions, Dataset, MEMBER_DIM};
use crate::errors::{OmzError, OmzResult};
use crate::models::{default_experiments, default_models};
use crate::reader::{ChunkHint, DatasetReader};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameters of a directory scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOptions {
    pub directory: PathBuf,
    /// Glob pattern matched against file names inside `directory`.
    pub pattern: String,
    /// Separator placed on both sides of a model name when matching paths.
    pub separator: String,
    pub models: Vec<String>,
    pub experiments: Vec<String>,
    pub chunks: ChunkHint,
    pub concat: ConcatOptions,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            pattern: "*.nc".to_string(),
            separator: "_".to_string(),
            models: default_models(),
            experiments: default_experiments(),
            chunks: ChunkHint::cmip_default(),
            concat: ConcatOptions::default(),
        }
    }
}

impl CollectorOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = pattern.to_string();
        self
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    pub fn with_models<S: AsRef<str>>(mut self, models: &[S]) -> Self {
        self.models = models.iter().map(|m| m.as_ref().to_string()).collect();
        self
    }

    pub fn with_experiments<S: AsRef<str>>(mut self, experiments: &[S]) -> Self {
        self.experiments = experiments.iter().map(|e| e.as_ref().to_string()).collect();
        self
    }

    pub fn with_chunks(mut self, chunks: ChunkHint) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_concat(mut self, concat: ConcatOptions) -> Self {
        self.concat = concat;
        self
    }
}

/// A model or model/experiment pair for which no files were found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Omission {
    Model {
        model_id: String,
    },
    Experiment {
        model_id: String,
        experiment_id: String,
    },
}

impl Omission {
    /// The omission expressed as a recoverable error.
    pub fn to_error(&self) -> OmzError {
        match self {
            Omission::Model { model_id } => {
                OmzError::NotFound(format!("No files found for model:{model_id}"))
            }
            Omission::Experiment {
                model_id,
                experiment_id,
            } => OmzError::NotFound(format!(
                "No files found for model:{model_id} experiment:{experiment_id}"
            )),
        }
    }
}

/// Aggregated datasets keyed by model and experiment.
///
/// Iteration follows the order of the configured model and experiment lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetCollection {
    entries: BTreeMap<String, BTreeMap<String, Dataset>>,
    order: Vec<(String, String)>,
    model_order: Vec<String>,
    omissions: Vec<Omission>,
    report: ScanReport,
}

impl DatasetCollection {
    pub fn get(&self, model_id: &str, experiment_id: &str) -> Option<&Dataset> {
        self.entries.get(model_id)?.get(experiment_id)
    }

    /// All experiments of one model. A model whose files matched no experiment is present
    /// with an empty map.
    pub fn model(&self, model_id: &str) -> Option<&BTreeMap<String, Dataset>> {
        self.entries.get(model_id)
    }

    pub fn contains(&self, model_id: &str, experiment_id: &str) -> bool {
        self.get(model_id, experiment_id).is_some()
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.model_order.iter().map(String::as_str)
    }

    /// `(model, experiment, dataset)` triples in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Dataset)> {
        self.order.iter().filter_map(move |(m, e)| {
            self.get(m, e).map(|ds| (m.as_str(), e.as_str(), ds))
        })
    }

    /// Number of model/experiment datasets.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn omissions(&self) -> &[Omission] {
        &self.omissions
    }

    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    /// Compact description of the collection, suitable for printing or serialising.
    pub fn summary(&self) -> Vec<EntrySummary> {
        self.iter()
            .map(|(model, experiment, ds)| EntrySummary {
                model_id: model.to_string(),
                experiment_id: experiment.to_string(),
                members: ds.labels(MEMBER_DIM).map(<[String]>::to_vec).unwrap_or_default(),
                dims: ds.dims().clone(),
                variables: ds.data_var_names(),
            })
            .collect()
    }

    fn insert(&mut self, model_id: &str, experiment_id: &str, ds: Dataset) {
        self.entries
            .entry(model_id.to_string())
            .or_default()
            .insert(experiment_id.to_string(), ds);
        self.order
            .push((model_id.to_string(), experiment_id.to_string()));
    }

    fn add_model(&mut self, model_id: &str) {
        self.entries.entry(model_id.to_string()).or_default();
        self.model_order.push(model_id.to_string());
    }
}

/// One line of [`DatasetCollection::summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub model_id: String,
    pub experiment_id: String,
    pub members: Vec<String>,
    pub dims: BTreeMap<String, usize>,
    pub variables: Vec<String>,
}

/// Files in `directory` whose names match `pattern`, sorted.
///
/// A directory that does not exist has no files.
pub fn list_files(directory: &Path, pattern: &str) -> OmzResult<Vec<PathBuf>> {
    let directory = match std::fs::canonicalize(directory) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(OmzError::io(directory, e)),
    };
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&directory.to_string_lossy()),
        pattern
    );

    let mut files = Vec::new();
    for entry in glob::glob(&full)? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            OmzError::io(path, e.into_error())
        })?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Scan `options.directory` and build the collection.
///
/// Returns `Ok(None)` when no file matches the pattern.
pub fn collect<R: DatasetReader>(
    reader: &R,
    options: &CollectorOptions,
) -> OmzResult<Option<DatasetCollection>> {
    let files = list_files(&options.directory, &options.pattern)?;
    if files.is_empty() {
        warn!(
            "No files found for pattern:{} in {}",
            options.pattern,
            options.directory.display()
        );
        return Ok(None);
    }
    debug!("Found {} files in {}", files.len(), options.directory.display());

    let (records, report) = parse_records(
        &files,
        &options.separator,
        &options.models,
        &options.experiments,
    );

    let mut collection = DatasetCollection {
        report,
        ..DatasetCollection::default()
    };

    for model in &options.models {
        debug!("{model}");
        if !collection.report.models_found.contains(model) {
            warn!("No files found for model:{model}");
            collection.omissions.push(Omission::Model {
                model_id: model.clone(),
            });
            continue;
        }
        collection.add_model(model);

        for experiment in &options.experiments {
            let paths: Vec<&Path> = records
                .iter()
                .filter(|r| &r.model_id == model && &r.experiment_id == experiment)
                .map(|r| r.path.as_path())
                .collect();
            if paths.is_empty() {
                warn!("No files found for model:{model} experiment:{experiment}");
                collection.omissions.push(Omission::Experiment {
                    model_id: model.clone(),
                    experiment_id: experiment.clone(),
                });
                continue;
            }
            debug!("{model} {experiment}: {} files", paths.len());

            let ds = load_group(reader, &paths, model, experiment, options)?;
            collection.insert(model, experiment, ds);
        }
    }

    info!(
        "Collected {} datasets for {} models ({} omissions)",
        collection.len(),
        collection.model_order.len(),
        collection.omissions.len()
    );
    Ok(Some(collection))
}

/// Load one model/experiment group and stack its files along the member dimension.
fn load_group<R: DatasetReader>(
    reader: &R,
    paths: &[&Path],
    model: &str,
    experiment: &str,
    options: &CollectorOptions,
) -> OmzResult<Dataset> {
    let dims = reader.dimensions(paths[0])?;
    let chunks = options.chunks.restrict_to(&dims);

    let members = paths
        .iter()
        .map(|path| reader.open(path, &chunks))
        .collect::<OmzResult<Vec<_>>>()?;

    let mut ds = Dataset::concat(&members, MEMBER_DIM, &options.concat)?;
    // Upstream metadata is not reliable enough to identify the group
    ds.set_attr("source_id", model);
    ds.set_attr("experiment_id", experiment);
    Ok(ds)
}

/// Scan with explicit arguments, resolving any `None` to its default at call time.
pub fn read_files<R: DatasetReader>(
    reader: &R,
    directory: impl Into<PathBuf>,
    pattern: Option<&str>,
    separator: Option<&str>,
    models: Option<&[String]>,
    experiments: Option<&[String]>,
    chunks: Option<ChunkHint>,
) -> OmzResult<Option<DatasetCollection>> {
    let mut options = CollectorOptions::new(directory);
    if let Some(pattern) = pattern {
        options.pattern = pattern.to_string();
    }
    if let Some(separator) = separator {
        options.separator = separator.to_string();
    }
    if let Some(models) = models {
        options.models = models.to_vec();
    }
    if let Some(experiments) = experiments {
        options.experiments = experiments.to_vec();
    }
    if let Some(chunks) = chunks {
        options.chunks = chunks;
    }
    collect(reader, &options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_resolved_per_call() {
        let mut options = CollectorOptions::default();
        options.models.push("CESM2".to_string());
        assert!(!CollectorOptions::default().models.contains(&"CESM2".to_string()));
        assert_eq!(options.pattern, "*.nc");
        assert_eq!(options.separator, "_");
        assert_eq!(options.chunks, ChunkHint::cmip_default());
    }

    #[test]
    fn omission_errors_are_recoverable() {
        let omission = Omission::Experiment {
            model_id: "CanESM5".to_string(),
            experiment_id: "ssp585".to_string(),
        };
        let err = omission.to_error();
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "No data found: No files found for model:CanESM5 experiment:ssp585"
        );
    }

    #[test]
    fn missing_directory_has_no_files() {
        let files = list_files(Path::new("/definitely/not/a/real/dir"), "*.nc").unwrap();
        assert!(files.is_empty());
    }
}
