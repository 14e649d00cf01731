//! Labeled n-dimensional arrays.
//!
//! A [`Variable`] pairs an [`ArrayD<f64>`] with the names of its dimensions and a set of
//! attributes. Missing values are represented by `NaN` throughout, and all reductions
//! skip them the way CMIP6 analysis code conventionally does.

use crate::dataset::{AttrValue, Attributes};
use crate::errors::{OmzError, OmzResult};
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// A named-dimension array with attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    dims: Vec<String>,
    data: ArrayD<f64>,
    #[serde(default)]
    attrs: Attributes,
}

impl Variable {
    /// Create a variable, checking that one dimension name is given per array axis.
    pub fn new<S: Into<String>>(dims: Vec<S>, data: ArrayD<f64>) -> OmzResult<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.ndim() {
            return Err(OmzError::Invalid(format!(
                "{} dimension names given for an array with {} axes",
                dims.len(),
                data.ndim()
            )));
        }
        for (i, d) in dims.iter().enumerate() {
            if dims[..i].contains(d) {
                return Err(OmzError::Invalid(format!("Duplicate dimension '{d}'")));
            }
        }
        Ok(Self {
            dims,
            data,
            attrs: Attributes::new(),
        })
    }

    /// One-dimensional variable, typically a coordinate.
    pub fn from_vec(dim: &str, values: Vec<f64>) -> Self {
        Self {
            dims: vec![dim.to_string()],
            data: Array1::from(values).into_dyn(),
            attrs: Attributes::new(),
        }
    }

    /// Zero-dimensional variable.
    pub fn scalar(value: f64) -> Self {
        Self {
            dims: Vec::new(),
            data: ArrayD::from_elem(IxDyn(&[]), value),
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }

    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn len_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|ax| self.data.len_of(Axis(ax)))
    }

    /// Values of a one-dimensional variable as a plain vector.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    fn require_axis(&self, dim: &str) -> OmzResult<usize> {
        self.axis_of(dim).ok_or_else(|| OmzError::DimensionMismatch {
            dim: dim.to_string(),
            context: format!("variable with dimensions {:?}", self.dims),
        })
    }

    /// Apply `f` element-wise, keeping dimensions and attributes.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Variable {
        Variable {
            dims: self.dims.clone(),
            data: self.data.mapv(f),
            attrs: self.attrs.clone(),
        }
    }

    /// Set every element for which `predicate` is false to `NaN`.
    pub fn where_values<F: Fn(f64) -> bool>(&self, predicate: F) -> Variable {
        self.map(|v| if predicate(v) { v } else { f64::NAN })
    }

    /// Pick `indices` along `dim`.
    pub fn select(&self, dim: &str, indices: &[usize]) -> OmzResult<Variable> {
        let ax = self.require_axis(dim)?;
        let len = self.data.len_of(Axis(ax));
        if let Some(bad) = indices.iter().find(|&&i| i >= len) {
            return Err(OmzError::Invalid(format!(
                "Index {bad} out of bounds for dimension '{dim}' of length {len}"
            )));
        }
        Ok(Variable {
            dims: self.dims.clone(),
            data: self.data.select(Axis(ax), indices),
            attrs: self.attrs.clone(),
        })
    }

    /// Truncate or `NaN`-pad along `dim` so that it has exactly `len` elements.
    pub fn resize_along(&self, dim: &str, len: usize) -> OmzResult<Variable> {
        let ax = self.require_axis(dim)?;
        let current = self.data.len_of(Axis(ax));
        let data = if current >= len {
            self.data
                .slice_axis(Axis(ax), Slice::from(0..len))
                .to_owned()
        } else {
            let mut shape = self.data.shape().to_vec();
            shape[ax] = len;
            let mut padded = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
            padded
                .slice_axis_mut(Axis(ax), Slice::from(0..current))
                .assign(&self.data);
            padded
        };
        Ok(Variable {
            dims: self.dims.clone(),
            data,
            attrs: self.attrs.clone(),
        })
    }

    /// Insert a new dimension of length one at `position`.
    pub fn expand_dim(&self, dim: &str, position: usize) -> OmzResult<Variable> {
        if self.has_dim(dim) {
            return Err(OmzError::Invalid(format!(
                "Dimension '{dim}' already present"
            )));
        }
        let position = position.min(self.dims.len());
        let mut dims = self.dims.clone();
        dims.insert(position, dim.to_string());
        Ok(Variable {
            dims,
            data: self.data.clone().insert_axis(Axis(position)),
            attrs: self.attrs.clone(),
        })
    }

    /// Element-wise product with `other`, broadcasting `other` over the dimensions it lacks.
    ///
    /// The dimensions of `other` must be a subset of the dimensions of `self` with matching
    /// lengths; the result has the dimension order of `self`.
    pub fn broadcast_mul(&self, other: &Variable) -> OmzResult<Variable> {
        let mut positions = other
            .dims
            .iter()
            .enumerate()
            .map(|(i, d)| self.require_axis(d).map(|p| (p, i)))
            .collect::<OmzResult<Vec<_>>>()?;
        positions.sort_unstable();
        let order: Vec<usize> = positions.iter().map(|(_, i)| *i).collect();

        let mut view = other.data.view().permuted_axes(order.as_slice());
        for (ax, dim) in self.dims.iter().enumerate() {
            if !other.has_dim(dim) {
                view = view.insert_axis(Axis(ax));
            }
        }
        let broadcast = view.broadcast(self.data.raw_dim()).ok_or_else(|| {
            OmzError::Invalid(format!(
                "Cannot broadcast shape {:?} {:?} onto {:?} {:?}",
                other.dims,
                other.shape(),
                self.dims,
                self.shape()
            ))
        })?;

        Ok(Variable {
            dims: self.dims.clone(),
            data: &self.data * &broadcast,
            attrs: Attributes::new(),
        })
    }

    /// Collapse `dims` with `reducer`, which receives every value of one output cell.
    pub fn reduce<F>(&self, dims: &[&str], reducer: F) -> OmzResult<Variable>
    where
        F: Fn(&[f64]) -> f64,
    {
        let mut reduced = Vec::with_capacity(dims.len());
        for dim in dims {
            let ax = self.require_axis(dim)?;
            if !reduced.contains(&ax) {
                reduced.push(ax);
            }
        }
        let kept: Vec<usize> = (0..self.ndim()).filter(|a| !reduced.contains(a)).collect();
        let order: Vec<usize> = kept.iter().chain(reduced.iter()).copied().collect();

        let shape = self.data.shape();
        let kept_shape: Vec<usize> = kept.iter().map(|&a| shape[a]).collect();
        let outer: usize = kept_shape.iter().product();
        let inner: usize = reduced.iter().map(|&a| shape[a]).product();

        let values: Vec<f64> = self
            .data
            .view()
            .permuted_axes(order.as_slice())
            .iter()
            .copied()
            .collect();
        let out: Vec<f64> = if inner == 0 {
            vec![reducer(&[]); outer]
        } else {
            values.chunks(inner).map(&reducer).collect()
        };

        let data = ArrayD::from_shape_vec(IxDyn(&kept_shape), out)
            .map_err(|e| OmzError::Invalid(format!("Reduction produced a bad shape: {e}")))?;
        Ok(Variable {
            dims: kept.iter().map(|&a| self.dims[a].clone()).collect(),
            data,
            attrs: Attributes::new(),
        })
    }

    pub fn nansum(&self, dims: &[&str]) -> OmzResult<Variable> {
        self.reduce(dims, nansum)
    }

    pub fn nanmean(&self, dims: &[&str]) -> OmzResult<Variable> {
        self.reduce(dims, nanmean)
    }

    pub fn nanmax(&self, dims: &[&str]) -> OmzResult<Variable> {
        self.reduce(dims, nanmax)
    }

    pub fn nanmin(&self, dims: &[&str]) -> OmzResult<Variable> {
        self.reduce(dims, nanmin)
    }

    /// Element-wise difference of two variables with identical dimensions.
    pub fn subtract(&self, other: &Variable) -> OmzResult<Variable> {
        if self.dims != other.dims || self.shape() != other.shape() {
            return Err(OmzError::Invalid(format!(
                "Cannot subtract {:?} {:?} from {:?} {:?}",
                other.dims,
                other.shape(),
                self.dims,
                self.shape()
            )));
        }
        Ok(Variable {
            dims: self.dims.clone(),
            data: &self.data - &other.data,
            attrs: Attributes::new(),
        })
    }

    /// Borrowed view of the data, e.g. to stack several variables.
    pub fn view(&self) -> ArrayViewD<'_, f64> {
        self.data.view()
    }

    pub(crate) fn from_parts(dims: Vec<String>, data: ArrayD<f64>, attrs: Attributes) -> Self {
        Self { dims, data, attrs }
    }
}

/// Sum ignoring `NaN`; an all-missing input sums to zero.
pub fn nansum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Mean ignoring `NaN`; `NaN` when nothing is valid.
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation ignoring `NaN`.
pub fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / valid.len() as f64;
    var.sqrt()
}

pub fn nanmax(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

pub fn nanmin(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}
