//! Self-describing, multi-variable datasets.
//!
//! A [`Dataset`] mirrors the layout of a CF-convention NetCDF file as used by CMIP6:
//!
//! - a table of named dimensions and their lengths
//! - data variables (for example `o2`, `omz_thickness`, `psi`)
//! - numeric coordinate variables (`lat`, `lon`, `lev`, `time`, ...)
//! - string labels along a dimension (for example the `member_id` of each ensemble member)
//! - global attributes (`source_id`, `experiment_id`, `variant_label`, `table_id`, ...)
//!
//! # Example
//!
//! ```
//! use ndarray::Array;
//! use omz_core::dataset::{Dataset, Variable};
//!
//! let mut ds = Dataset::new();
//! let o2 = Variable::new(vec!["time", "y", "x"], Array::zeros((12, 2, 3)).into_dyn()).unwrap();
//! ds.insert_variable("o2", o2).unwrap();
//! ds.set_attr("source_id", "CanESM5");
//!
//! assert_eq!(ds.dim_len("time"), Some(12));
//! assert_eq!(ds.attr_str("source_id"), Some("CanESM5"));
//! ```

pub mod concat;
mod variable;

pub use concat::{CompatPolicy, ConcatOptions, CoordsPolicy};
pub use variable::{nanmax, nanmean, nanmin, nanstd, nansum, Variable};

use crate::errors::{OmzError, OmzResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the dimension along which ensemble members are stacked.
pub const MEMBER_DIM: &str = "member_id";

/// Dimension names mapped to their lengths.
pub type Dimensions = BTreeMap<String, usize>;

/// Attribute names mapped to their values.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Value of a dataset or variable attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Floats(v) if v.len() == 1 => Some(v[0]),
            AttrValue::Ints(v) if v.len() == 1 => Some(v[0] as f64),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{s}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Ints(v) => write!(f, "{v:?}"),
            AttrValue::Floats(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

/// A collection of labeled variables sharing a set of dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    dims: Dimensions,
    data_vars: BTreeMap<String, Variable>,
    coords: BTreeMap<String, Variable>,
    labels: BTreeMap<String, Vec<String>>,
    attrs: Attributes,
    chunks: BTreeMap<String, usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the dimensions of `var`, failing if a length disagrees with an existing one.
    fn register_dims(&mut self, name: &str, var: &Variable) -> OmzResult<()> {
        for (dim, &len) in var.dims().iter().zip(var.shape()) {
            match self.dims.get(dim) {
                Some(&existing) if existing != len => {
                    return Err(OmzError::Invalid(format!(
                        "Variable '{name}' has length {len} along '{dim}', dataset has {existing}"
                    )))
                }
                _ => {
                    self.dims.insert(dim.clone(), len);
                }
            }
        }
        Ok(())
    }

    /// Add or replace a data variable.
    pub fn insert_variable(&mut self, name: &str, var: Variable) -> OmzResult<()> {
        self.register_dims(name, &var)?;
        self.data_vars.insert(name.to_string(), var);
        Ok(())
    }

    /// Add or replace a numeric coordinate variable.
    pub fn insert_coord(&mut self, name: &str, var: Variable) -> OmzResult<()> {
        self.register_dims(name, &var)?;
        self.coords.insert(name.to_string(), var);
        Ok(())
    }

    /// Attach string labels along `dim`.
    pub fn set_labels(&mut self, dim: &str, labels: Vec<String>) -> OmzResult<()> {
        match self.dims.get(dim) {
            Some(&len) if len != labels.len() => {
                return Err(OmzError::Invalid(format!(
                    "{} labels given for dimension '{dim}' of length {len}",
                    labels.len()
                )))
            }
            Some(_) => {}
            None => {
                self.dims.insert(dim.to_string(), labels.len());
            }
        }
        self.labels.insert(dim.to_string(), labels);
        Ok(())
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.contains_key(dim)
    }

    pub fn data_vars(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.data_vars.iter()
    }

    pub fn data_var_names(&self) -> Vec<String> {
        self.data_vars.keys().cloned().collect()
    }

    pub fn coords(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.coords.iter()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name)
    }

    pub fn coord(&self, name: &str) -> Option<&Variable> {
        self.coords.get(name)
    }

    /// Look up a data variable or, failing that, a coordinate.
    pub fn get(&self, name: &str) -> OmzResult<&Variable> {
        self.data_vars
            .get(name)
            .or_else(|| self.coords.get(name))
            .ok_or_else(|| OmzError::MissingVariable(name.to_string()))
    }

    pub fn labels(&self, dim: &str) -> Option<&[String]> {
        self.labels.get(dim).map(Vec::as_slice)
    }

    /// Every label set with the dimension it belongs to.
    pub fn label_sets(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.labels.iter()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.attrs.insert(key.to_string(), value.into());
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<AttrValue> {
        self.attrs.remove(key)
    }

    /// Chunk sizes this dataset was opened with.
    pub fn chunks(&self) -> &BTreeMap<String, usize> {
        &self.chunks
    }

    pub fn set_chunks(&mut self, chunks: BTreeMap<String, usize>) {
        self.chunks = chunks;
    }

    /// Keep only the data variables for which `keep` returns true.
    ///
    /// Dimensions no longer used by any variable, coordinate or label are removed.
    pub fn retain_variables<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.data_vars.retain(|name, _| keep(name));
        self.prune_dims();
    }

    /// Drop dimensions no longer used by any variable, coordinate or label set.
    pub(crate) fn prune_dims(&mut self) {
        let used: Vec<String> = self
            .data_vars
            .values()
            .chain(self.coords.values())
            .flat_map(|v| v.dims().iter().cloned())
            .chain(self.labels.keys().cloned())
            .collect();
        self.dims.retain(|d, _| used.contains(d));
    }

    /// Apply `f` to every data variable, keeping coordinates and attributes.
    pub fn map_variables<F>(&self, mut f: F) -> OmzResult<Dataset>
    where
        F: FnMut(&str, &Variable) -> OmzResult<Variable>,
    {
        let mut out = self.empty_like();
        for (name, coord) in &self.coords {
            out.insert_coord(name, coord.clone())?;
        }
        for (dim, labels) in &self.labels {
            out.set_labels(dim, labels.clone())?;
        }
        for (name, var) in &self.data_vars {
            out.insert_variable(name, f(name, var)?)?;
        }
        Ok(out)
    }

    /// Pick `indices` along `dim` in every variable, coordinate and label set.
    pub fn isel(&self, dim: &str, indices: &[usize]) -> OmzResult<Dataset> {
        if !self.has_dim(dim) {
            return Err(OmzError::DimensionMismatch {
                dim: dim.to_string(),
                context: "dataset".to_string(),
            });
        }
        let mut out = self.empty_like();
        for (name, coord) in &self.coords {
            let coord = if coord.has_dim(dim) {
                coord.select(dim, indices)?
            } else {
                coord.clone()
            };
            out.insert_coord(name, coord)?;
        }
        for (name, var) in &self.data_vars {
            let var = if var.has_dim(dim) {
                var.select(dim, indices)?
            } else {
                var.clone()
            };
            out.insert_variable(name, var)?;
        }
        for (label_dim, labels) in &self.labels {
            let labels = if label_dim == dim {
                indices.iter().map(|&i| labels[i].clone()).collect()
            } else {
                labels.clone()
            };
            out.set_labels(label_dim, labels)?;
        }
        out.dims.insert(dim.to_string(), indices.len());
        Ok(out)
    }

    /// A dataset with the same attributes and chunking but no variables.
    pub(crate) fn empty_like(&self) -> Dataset {
        Dataset {
            attrs: self.attrs.clone(),
            chunks: self.chunks.clone(),
            ..Dataset::default()
        }
    }

    pub(crate) fn remove_labels(&mut self, dim: &str) -> Option<Vec<String>> {
        self.labels.remove(dim)
    }

    pub(crate) fn remove_coord(&mut self, name: &str) -> Option<Variable> {
        let removed = self.coords.remove(name);
        self.prune_dims();
        removed
    }
}
