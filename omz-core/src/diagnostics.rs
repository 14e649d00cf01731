//! Diagnostic indices of the oxygen minimum zone analysis.
//!
//! All reductions skip missing values. Attributes of the inputs are not carried over,
//! except where a unit is explicitly assigned.
//!
//! ```
//! use omz_core::dataset::Variable;
//! use omz_core::diagnostics::{convert_mol_m3_to_umol_kg, DEFAULT_RHO_0};
//!
//! let o2 = Variable::from_vec("time", vec![0.1025, 0.205]);
//! let converted = convert_mol_m3_to_umol_kg(&o2, DEFAULT_RHO_0);
//! for (value, expected) in converted.to_vec().into_iter().zip([100.0, 200.0]) {
//!     assert!((value - expected).abs() < 1e-9);
//! }
//! assert_eq!(converted.attrs()["units"].as_str(), Some("$\\mu mol/kg$"));
//! ```

use crate::dataset::{nanmean, nanstd, Dataset, Variable};
use crate::errors::{OmzError, OmzResult};
use log::debug;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Reference density of sea water in kg m-3.
pub const DEFAULT_RHO_0: f64 = 1025.0;

/// Units assigned by [`convert_mol_m3_to_umol_kg`].
pub const UMOL_KG_UNITS: &str = "$\\mu mol/kg$";

/// Units assigned by [`convert_umol_kg_to_mol_m3`].
pub const MOL_M3_UNITS: &str = "mol m-3";

/// Default number of missing models tolerated by [`multi_model_coverage`].
pub const DEFAULT_MAX_MISSING: f64 = 4.5;

/// Total OMZ volume in m^3.
///
/// Multiplies `omz_thickness` by the cell area `areacello` and sums over `x` and `y`.
/// Some members report zero everywhere instead of missing values, so volumes that are not
/// strictly positive are set to `NaN`.
pub fn omz_volume(ds: &Dataset) -> OmzResult<Variable> {
    let thickness = ds.get("omz_thickness")?;
    let area = ds.get("areacello")?;
    let volume = thickness
        .broadcast_mul(area)?
        .nansum(&["x", "y"])?
        .where_values(|v| v > 0.0);
    Ok(volume.with_attr("units", "m^3"))
}

/// Convert an oxygen concentration from mol m-3 to µmol kg-1.
pub fn convert_mol_m3_to_umol_kg(o2: &Variable, rho_0: f64) -> Variable {
    o2.map(|v| v / rho_0 * 1e6).with_attr("units", UMOL_KG_UNITS)
}

/// Inverse of [`convert_mol_m3_to_umol_kg`].
pub fn convert_umol_kg_to_mol_m3(o2: &Variable, rho_0: f64) -> Variable {
    o2.map(|v| v * rho_0 / 1e6).with_attr("units", MOL_M3_UNITS)
}

/// Window of the overturning streamfunction used by [`stci_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StciWindow {
    /// Depth range in m, inclusive.
    pub depth: (f64, f64),
    /// Latitude range in degrees north, inclusive.
    pub latitude: (f64, f64),
}

impl Default for StciWindow {
    fn default() -> Self {
        Self {
            depth: (0.0, 250.0),
            latitude: (-10.0, 10.0),
        }
    }
}

/// Subtropical Cell Index after Duteil et al. (2014).
///
/// The range (maximum minus minimum) of the meridional overturning streamfunction `psi`
/// in the upper 250 m between 10°S and 10°N.
pub fn stci(ds: &Dataset) -> OmzResult<Variable> {
    stci_with(ds, &StciWindow::default())
}

/// [`stci`] over a custom window.
pub fn stci_with(ds: &Dataset, window: &StciWindow) -> OmzResult<Variable> {
    let psi = ds.get("psi")?;
    let psi = select_range(ds, psi, "lev_outer", window.depth)?;
    let psi = select_range(ds, &psi, "y", window.latitude)?;
    let dims = ["y", "lev_outer"];
    psi.nanmax(&dims)?.subtract(&psi.nanmin(&dims)?)
}

/// Indices of `var` along `dim` whose coordinate value lies in `range`.
fn select_range(ds: &Dataset, var: &Variable, dim: &str, range: (f64, f64)) -> OmzResult<Variable> {
    let coord = ds.coord(dim).ok_or_else(|| OmzError::MissingVariable(dim.to_string()))?;
    if coord.dims() != [dim.to_string()] {
        return Err(OmzError::Invalid(format!(
            "Coordinate '{dim}' must be one-dimensional along '{dim}', has {:?}",
            coord.dims()
        )));
    }
    let (lo, hi) = range;
    let indices: Vec<usize> = coord
        .data()
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= lo && v <= hi)
        .map(|(i, _)| i)
        .collect();
    debug!("{} of {} '{dim}' values within {lo}..={hi}", indices.len(), coord.data().len());
    var.select(dim, &indices)
}

/// Points where enough models have data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub dims: Vec<String>,
    pub mask: ArrayD<bool>,
}

impl Coverage {
    /// Number of covered points.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Set every uncovered point of `var` to `NaN`.
    ///
    /// `var` must have the same dimensions as the mask, in the same order.
    pub fn apply(&self, var: &Variable) -> OmzResult<Variable> {
        if var.dims() != self.dims.as_slice() || var.shape() != self.mask.shape() {
            return Err(OmzError::Invalid(format!(
                "Coverage over {:?} {:?} cannot mask {:?} {:?}",
                self.dims,
                self.mask.shape(),
                var.dims(),
                var.shape()
            )));
        }
        let mut out = var.clone();
        ndarray::Zip::from(out.data_mut())
            .and(&self.mask)
            .for_each(|v, &keep| {
                if !keep {
                    *v = f64::NAN;
                }
            });
        Ok(out)
    }
}

/// Points at which fewer than `max_missing` entries along `dim` are missing.
///
/// `dim` usually stacks the models of a multi-model ensemble.
pub fn multi_model_coverage(var: &Variable, dim: &str, max_missing: f64) -> OmzResult<Coverage> {
    let missing = var.reduce(&[dim], |values| {
        values.iter().filter(|v| v.is_nan()).count() as f64
    })?;
    Ok(Coverage {
        dims: missing.dims().to_vec(),
        mask: missing.data().mapv(|n| n < max_missing),
    })
}

/// Spread of one model's ensemble members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpread {
    pub model_id: String,
    pub mean: f64,
    pub std: f64,
    pub members: usize,
}

/// Member mean and standard deviation of each model, in input order.
///
/// Every value of a model's variable counts as one member, whatever its shape.
pub fn model_spread<'a, I>(models: I) -> Vec<ModelSpread>
where
    I: IntoIterator<Item = (&'a str, &'a Variable)>,
{
    models
        .into_iter()
        .map(|(model_id, var)| {
            let values = var.to_vec();
            ModelSpread {
                model_id: model_id.to_string(),
                mean: nanmean(&values),
                std: nanstd(&values),
                members: values.len(),
            }
        })
        .collect()
}

/// The member-averaged value of every model.
pub fn member_averaged(spread: &[ModelSpread]) -> Vec<f64> {
    spread.iter().map(|s| s.mean).collect()
}
