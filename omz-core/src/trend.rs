//! Linear trends of annual time series.
//!
//! The slope is an ordinary least-squares fit of the trailing `window` points of a series
//! against their index (one point per year):
//!
//! $$ y_i = a + b\, t_i + \varepsilon_i $$
//!
//! reported per century ($100 b$) together with the two-sided p-value of the Student-t
//! test of $b = 0$ with $n - 2$ degrees of freedom. Missing values are left out of the fit.
//!
//! Series must have between 96 and 299 points (both inclusive). Anything else is taken to
//! be monthly or otherwise non-annual input and rejected.
//!
//! ```
//! use omz_core::trend::{trend_slope, TrendOptions};
//!
//! let series: Vec<f64> = (0..150).map(|i| 2.0 + 0.01 * i as f64).collect();
//! let trend = trend_slope(&series, &TrendOptions::default()).unwrap();
//! assert!((trend.slope_per_century - 1.0).abs() < 1e-9);
//! assert!(trend.p_value < 1e-6);
//!
//! assert!(trend_slope(&series[..50], &TrendOptions::default()).is_err());
//! ```

use crate::dataset::Variable;
use crate::errors::{OmzError, OmzResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Options of [`trend_slope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendOptions {
    /// Number of trailing points used for the fit.
    pub window: usize,
    /// Shortest accepted series.
    pub min_length: usize,
    /// Longest accepted series.
    pub max_length: usize,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            window: 86,
            min_length: 96,
            max_length: 299,
        }
    }
}

impl TrendOptions {
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Fail with [`OmzError::SeriesLength`] unless `len` is within the accepted range.
    pub fn check_length(&self, len: usize) -> OmzResult<()> {
        if len < self.min_length || len > self.max_length {
            return Err(OmzError::SeriesLength {
                len,
                min: self.min_length,
                max: self.max_length,
            });
        }
        Ok(())
    }
}

/// Result of a trend fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub slope_per_century: f64,
    pub p_value: f64,
    pub intercept: f64,
    /// Number of points that entered the fit.
    pub samples: usize,
}

/// Linear trend of the trailing `options.window` points of an annual series.
pub fn trend_slope(series: &[f64], options: &TrendOptions) -> OmzResult<Trend> {
    options.check_length(series.len())?;
    let start = series.len().saturating_sub(options.window);
    let (t, y): (Vec<f64>, Vec<f64>) = series[start..]
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, &v)| (i as f64, v))
        .unzip();
    fit(&t, &y)
}

fn fit(t: &[f64], y: &[f64]) -> OmzResult<Trend> {
    let n = t.len();
    if n < 3 {
        return Err(OmzError::Invalid(format!(
            "A trend needs at least 3 valid points, got {n}"
        )));
    }

    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { t[i] });
    let observed = DVector::from_column_slice(y);
    let normal = design.transpose() * &design;
    let inverse = normal
        .try_inverse()
        .ok_or_else(|| OmzError::Invalid("Singular design matrix in trend fit".to_string()))?;
    let beta = &inverse * design.transpose() * &observed;

    let residuals = &observed - &design * &beta;
    let dof = (n - 2) as f64;
    let sigma2 = residuals.dot(&residuals) / dof;
    let stderr = (sigma2 * inverse[(1, 1)]).sqrt();
    let p_value = if stderr == 0.0 {
        if beta[1] == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        two_sided_p(beta[1] / stderr, dof)?
    };

    Ok(Trend {
        slope_per_century: beta[1] * 100.0,
        p_value,
        intercept: beta[0],
        samples: n,
    })
}

/// Two-sided p-value of the Student-t statistic `t`.
fn two_sided_p(t: f64, dof: f64) -> OmzResult<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| OmzError::Invalid(format!("No t distribution with {dof} dof: {e}")))?;
    Ok(2.0 * dist.cdf(-t.abs()))
}

/// Trend of every series of `var` along `dim`.
///
/// Returns the slope per century and the p-value, both without `dim`. Cells with too few
/// valid points become `NaN`. The length check applies to `dim` as a whole.
pub fn trend_map(var: &Variable, dim: &str, options: &TrendOptions) -> OmzResult<(Variable, Variable)> {
    let len = var.len_of(dim).ok_or_else(|| OmzError::DimensionMismatch {
        dim: dim.to_string(),
        context: format!("trend over variable with dimensions {:?}", var.dims()),
    })?;
    options.check_length(len)?;

    let slope = var.reduce(&[dim], |s| {
        trend_slope(s, options).map_or(f64::NAN, |t| t.slope_per_century)
    })?;
    let p_value = var.reduce(&[dim], |s| {
        trend_slope(s, options).map_or(f64::NAN, |t| t.p_value)
    })?;
    Ok((slope.with_attr("units", "per century"), p_value))
}
