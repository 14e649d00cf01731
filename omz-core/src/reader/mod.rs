//! Access to datasets stored on disk.
//!
//! The collector never touches a file format directly. It talks to a [`DatasetReader`],
//! which answers two questions: which dimensions does a file have (cheap, header only), and
//! what does the whole file contain under a given chunking.
//!
//! With the `netcdf` feature enabled, [`NetcdfReader`] implements this for CF-convention
//! NetCDF files as published on ESGF.

#[cfg(feature = "netcdf")]
mod nc;

#[cfg(feature = "netcdf")]
pub use self::nc::NetcdfReader;

use crate::dataset::{Dataset, Dimensions};
use crate::errors::OmzResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Requested chunk size per dimension.
///
/// Chunks are a hint: dimensions a file does not have are simply ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkHint(BTreeMap<String, usize>);

impl ChunkHint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunking for monthly ocean output: 10 time steps, one member at a time.
    pub fn cmip_default() -> Self {
        [("time", 10), ("member_id", 1)].into_iter().collect()
    }

    pub fn with(mut self, dim: &str, size: usize) -> Self {
        self.0.insert(dim.to_string(), size);
        self
    }

    /// Only the entries whose dimension appears in `dims`.
    pub fn restrict_to(&self, dims: &Dimensions) -> ChunkHint {
        ChunkHint(
            self.0
                .iter()
                .filter(|(dim, _)| dims.contains_key(*dim))
                .map(|(dim, size)| (dim.clone(), *size))
                .collect(),
        )
    }

    pub fn get(&self, dim: &str) -> Option<usize> {
        self.0.get(dim).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, usize> {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<(S, usize)> for ChunkHint {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        ChunkHint(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Loads datasets from paths.
///
/// Implementations must not write to the files they read. Failures to read a file are
/// fatal to the caller and are not retried.
pub trait DatasetReader {
    /// Dimensions of the file at `path`, without loading any data.
    fn dimensions(&self, path: &Path) -> OmzResult<Dimensions>;

    /// Load the file at `path`. `chunks` only contains dimensions the file has.
    fn open(&self, path: &Path, chunks: &ChunkHint) -> OmzResult<Dataset>;
}

impl<R: DatasetReader + ?Sized> DatasetReader for &R {
    fn dimensions(&self, path: &Path) -> OmzResult<Dimensions> {
        (**self).dimensions(path)
    }

    fn open(&self, path: &Path, chunks: &ChunkHint) -> OmzResult<Dataset> {
        (**self).open(path, chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_drops_unknown_dimensions() {
        let dims: Dimensions = [("time".to_string(), 120), ("x".to_string(), 360)]
            .into_iter()
            .collect();
        let hint = ChunkHint::cmip_default().with("lev", 5);
        let restricted = hint.restrict_to(&dims);
        assert_eq!(restricted.get("time"), Some(10));
        assert_eq!(restricted.get("member_id"), None);
        assert_eq!(restricted.get("lev"), None);
        assert_eq!(restricted.as_map().len(), 1);
    }

    #[test]
    fn restrict_to_nothing() {
        let restricted = ChunkHint::cmip_default().restrict_to(&Dimensions::new());
        assert!(restricted.is_empty());
    }
}
