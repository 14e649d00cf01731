//! Ocean basin masks and regional subsets.
//!
//! Basin membership comes from a precomputed mask on the dataset's native `(y, x)` grid,
//! holding the Natural Earth 50m ocean-basin region numbers (as produced by `regionmask`)
//! and `NaN` for cells outside any basin. The region numbers combine into basins as
//! follows:
//!
//! | Basin | Region numbers |
//! |---|---|
//! | Pacific | 2, 3 |
//! | Atlantic | 0, 1 |
//! | Indian | 5 (without the Maritime Continent) |
//! | Global | any |
//!
//! ```
//! use ndarray::array;
//! use omz_core::region::{Basin, BasinMask};
//!
//! let mask = BasinMask::new(array![[2.0, 0.0], [5.0, f64::NAN]]);
//! let pacific = mask.select(Basin::Pacific);
//! assert_eq!(pacific, array![[true, false], [false, false]]);
//! assert_eq!("Indian".parse::<Basin>().unwrap(), Basin::Indian);
//! assert!("Arctic".parse::<Basin>().is_err());
//! ```

use crate::dataset::{Dataset, Variable};
use crate::errors::{OmzError, OmzResult};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default latitude bound of [`region`], in degrees.
pub const DEFAULT_LATITUDE_BAND: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basin {
    Pacific,
    Atlantic,
    Indian,
    Global,
}

impl Basin {
    /// Whether a mask cell with region number `code` belongs to this basin.
    pub fn contains(&self, code: f64) -> bool {
        if code.is_nan() {
            return false;
        }
        match self {
            Basin::Pacific => code == 2.0 || code == 3.0,
            Basin::Atlantic => code == 0.0 || code == 1.0,
            Basin::Indian => code == 5.0,
            Basin::Global => code >= 0.0,
        }
    }
}

impl FromStr for Basin {
    type Err = OmzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pacific" => Ok(Basin::Pacific),
            "Atlantic" => Ok(Basin::Atlantic),
            "Indian" => Ok(Basin::Indian),
            "Global" => Ok(Basin::Global),
            other => Err(OmzError::UnknownBasin(other.to_string())),
        }
    }
}

impl fmt::Display for Basin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Basin::Pacific => "Pacific",
            Basin::Atlantic => "Atlantic",
            Basin::Indian => "Indian",
            Basin::Global => "Global",
        };
        write!(f, "{name}")
    }
}

/// Ocean-basin region numbers on a `(y, x)` grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinMask {
    codes: Array2<f64>,
}

impl BasinMask {
    pub fn new(codes: Array2<f64>) -> Self {
        Self { codes }
    }

    /// Read the mask from variable `name` of `ds`, which must span `(y, x)`.
    pub fn from_dataset(ds: &Dataset, name: &str) -> OmzResult<Self> {
        let var = ds.get(name)?;
        let (Some(ya), Some(xa)) = (var.axis_of("y"), var.axis_of("x")) else {
            return Err(OmzError::Invalid(format!(
                "Basin mask '{name}' must have dimensions (y, x), has {:?}",
                var.dims()
            )));
        };
        if var.ndim() != 2 {
            return Err(OmzError::Invalid(format!(
                "Basin mask '{name}' must be two-dimensional, has {:?}",
                var.dims()
            )));
        }
        let codes = var
            .data()
            .view()
            .permuted_axes(vec![ya, xa])
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|e| OmzError::Invalid(format!("Basin mask '{name}': {e}")))?
            .to_owned();
        Ok(Self { codes })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    /// Cells that belong to `basin`.
    pub fn select(&self, basin: Basin) -> Array2<bool> {
        self.codes.mapv(|c| basin.contains(c))
    }
}

/// Set every cell of every `(y, x)` data variable outside `keep` to `NaN`.
///
/// With `drop`, rows and columns that contain no kept cell are removed from the dataset.
/// Coordinates are not masked, only subset.
pub fn where_horizontal(ds: &Dataset, keep: &Array2<bool>, drop: bool) -> OmzResult<Dataset> {
    let (ny, nx) = keep.dim();
    for (dim, expected) in [("y", ny), ("x", nx)] {
        match ds.dim_len(dim) {
            Some(len) if len == expected => {}
            Some(len) => {
                return Err(OmzError::Invalid(format!(
                    "Mask has length {expected} along '{dim}', dataset has {len}"
                )))
            }
            None => {
                return Err(OmzError::DimensionMismatch {
                    dim: dim.to_string(),
                    context: "dataset to be masked".to_string(),
                })
            }
        }
    }

    let masked = ds.map_variables(|_, var| Ok(mask_variable(var, keep)))?;
    if !drop {
        return Ok(masked);
    }

    let rows: Vec<usize> = keep
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&k| k))
        .map(|(j, _)| j)
        .collect();
    let cols: Vec<usize> = keep
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, col)| col.iter().any(|&k| k))
        .map(|(i, _)| i)
        .collect();
    masked.isel("y", &rows)?.isel("x", &cols)
}

fn mask_variable(var: &Variable, keep: &Array2<bool>) -> Variable {
    let (Some(ya), Some(xa)) = (var.axis_of("y"), var.axis_of("x")) else {
        return var.clone();
    };
    let mut out = var.clone();
    for (idx, value) in out.data_mut().indexed_iter_mut() {
        if !keep[[idx[ya], idx[xa]]] {
            *value = f64::NAN;
        }
    }
    out
}

/// Restrict `ds` to one ocean basin.
pub fn mask_basin(ds: &Dataset, basin: Basin, mask: &BasinMask, drop: bool) -> OmzResult<Dataset> {
    where_horizontal(ds, &mask.select(basin), drop)
}

/// Restrict `ds` to one ocean basin between `-max_lat` and `max_lat`.
///
/// Latitude is read from the `lat` coordinate, either 2-D over `(y, x)` or 1-D over `y`.
pub fn region(ds: &Dataset, basin: Basin, mask: &BasinMask, max_lat: f64) -> OmzResult<Dataset> {
    let ds = mask_basin(ds, basin, mask, true)?;
    let lat = ds.get("lat")?;
    let (ny, nx) = match (ds.dim_len("y"), ds.dim_len("x")) {
        (Some(ny), Some(nx)) => (ny, nx),
        _ => {
            return Err(OmzError::DimensionMismatch {
                dim: "y/x".to_string(),
                context: "basin subset".to_string(),
            })
        }
    };

    let keep = match (lat.axis_of("y"), lat.axis_of("x"), lat.ndim()) {
        (Some(ya), Some(xa), 2) => Array2::from_shape_fn((ny, nx), |(j, i)| {
            let mut idx = [0usize; 2];
            idx[ya] = j;
            idx[xa] = i;
            lat.data()[&idx[..]].abs() <= max_lat
        }),
        (Some(_), None, 1) => {
            let values = lat.to_vec();
            Array2::from_shape_fn((ny, nx), |(j, _)| values[j].abs() <= max_lat)
        }
        _ => {
            return Err(OmzError::Invalid(format!(
                "Latitude must span (y, x) or y, has {:?}",
                lat.dims()
            )))
        }
    };
    where_horizontal(&ds, &keep, true)
}
