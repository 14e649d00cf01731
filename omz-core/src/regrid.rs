//! Regridding onto a common global grid.
//!
//! Model output comes on each model's native ocean grid. For multi-model maps every field
//! is interpolated bilinearly onto a uniform global grid of cell centres:
//! latitudes `-90 + r/2, ..., 90 - r/2` and longitudes `-180 + r/2, ..., 180 - r/2` for a
//! resolution `r` in degrees.
//!
//! Source grids must be rectilinear: latitude depends only on `y` and longitude only on
//! `x` (either as 1-D coordinates or as 2-D coordinates that are constant along the other
//! axis). Interpolation is periodic in longitude. Target cells outside the latitude range
//! of the source, and cells whose neighbours are missing, are `NaN`.
//!
//! ```
//! use omz_core::regrid::TargetGrid;
//!
//! let grid = TargetGrid::uniform(30.0).unwrap();
//! assert_eq!(grid.lat(), &[-75.0, -45.0, -15.0, 15.0, 45.0, 75.0]);
//! assert_eq!(grid.lon().len(), 12);
//! assert!(TargetGrid::uniform(7.0).is_err());
//! ```

use crate::dataset::{Dataset, Variable};
use crate::errors::{OmzError, OmzResult};
use log::debug;
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

const TOLERANCE: f64 = 1e-9;

/// A regular latitude/longitude grid of cell centres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGrid {
    lat: Vec<f64>,
    lon: Vec<f64>,
}

impl TargetGrid {
    /// Global grid with cells of `resolution` degrees, which must divide 180.
    pub fn uniform(resolution: f64) -> OmzResult<Self> {
        let cells = 180.0 / resolution;
        if resolution.is_nan() || resolution <= 0.0 || (cells - cells.round()).abs() > TOLERANCE {
            return Err(OmzError::Invalid(format!(
                "Grid resolution must be a positive divisor of 180 degrees, got {resolution}"
            )));
        }
        let nlat = cells.round() as usize;
        let centres = |start: f64, n: usize| -> Vec<f64> {
            (0..n)
                .map(|i| start + resolution * (i as f64 + 0.5))
                .collect()
        };
        Ok(Self {
            lat: centres(-90.0, nlat),
            lon: centres(-180.0, 2 * nlat),
        })
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }
}

/// Four source cells and their weights for one target cell.
type Stencil = [(usize, f64); 4];

/// Precomputed bilinear weights from a source grid to a [`TargetGrid`].
#[derive(Debug, Clone)]
pub struct Regridder {
    source_shape: (usize, usize),
    target: TargetGrid,
    stencils: Vec<Option<Stencil>>,
}

impl Regridder {
    /// Build the operator for the rectilinear source axes `lat` (along `y`) and `lon`
    /// (along `x`).
    pub fn new(lat: &[f64], lon: &[f64], target: TargetGrid) -> OmzResult<Self> {
        if lat.is_empty() || lon.is_empty() {
            return Err(OmzError::Invalid("Source grid is empty".to_string()));
        }
        let nx = lon.len();
        let lat_axis = SortedAxis::new(lat.iter().copied());
        let lon_axis = SortedAxis::new(lon.iter().map(|v| v.rem_euclid(360.0)));
        let mut stencils = Vec::with_capacity(target.lat.len() * target.lon.len());
        for &tlat in &target.lat {
            let ys = bracket_latitude(&lat_axis, tlat);
            for &tlon in &target.lon {
                let stencil = ys.and_then(|(j0, j1, wy)| {
                    let (i0, i1, wx) = bracket_longitude(&lon_axis, tlon)?;
                    Some([
                        (j0 * nx + i0, (1.0 - wy) * (1.0 - wx)),
                        (j0 * nx + i1, (1.0 - wy) * wx),
                        (j1 * nx + i0, wy * (1.0 - wx)),
                        (j1 * nx + i1, wy * wx),
                    ])
                });
                stencils.push(stencil);
            }
        }
        let mapped = stencils.iter().filter(|s| s.is_some()).count();
        debug!(
            "Regridding {}x{} cells onto {}x{}; {mapped} target cells mapped",
            lat.len(),
            nx,
            target.lat.len(),
            target.lon.len()
        );
        Ok(Self {
            source_shape: (lat.len(), nx),
            target,
            stencils,
        })
    }

    pub fn target(&self) -> &TargetGrid {
        &self.target
    }

    fn apply_plane(&self, plane: &[f64], out: &mut Vec<f64>) {
        for stencil in &self.stencils {
            let value = match stencil {
                None => f64::NAN,
                Some(points) => points
                    .iter()
                    .filter(|(_, w)| *w != 0.0)
                    .map(|&(idx, w)| w * plane[idx])
                    .sum(),
            };
            out.push(value);
        }
    }

    /// Interpolate every `(y, x)` plane of `var`.
    ///
    /// The result keeps the dimension order of `var`, with the lengths of `y` and `x`
    /// replaced by those of the target grid.
    pub fn apply(&self, var: &Variable) -> OmzResult<Variable> {
        let (Some(ya), Some(xa)) = (var.axis_of("y"), var.axis_of("x")) else {
            return Err(OmzError::DimensionMismatch {
                dim: "y/x".to_string(),
                context: format!("regridding variable with dimensions {:?}", var.dims()),
            });
        };
        let shape = var.shape();
        if (shape[ya], shape[xa]) != self.source_shape {
            return Err(OmzError::Invalid(format!(
                "Variable has a ({}, {}) grid, the regridder was built for {:?}",
                shape[ya], shape[xa], self.source_shape
            )));
        }

        let order: Vec<usize> = (0..var.ndim())
            .filter(|&a| a != ya && a != xa)
            .chain([ya, xa])
            .collect();
        let values: Vec<f64> = var
            .data()
            .view()
            .permuted_axes(order.as_slice())
            .iter()
            .copied()
            .collect();

        let (nty, ntx) = self.target.shape();
        let plane = self.source_shape.0 * self.source_shape.1;
        let mut out = Vec::with_capacity(values.len() / plane.max(1) * nty * ntx);
        for chunk in values.chunks(plane) {
            self.apply_plane(chunk, &mut out);
        }

        let mut out_shape: Vec<usize> = order[..order.len() - 2].iter().map(|&a| shape[a]).collect();
        out_shape.extend([nty, ntx]);
        let stacked = ArrayD::from_shape_vec(IxDyn(&out_shape), out)
            .map_err(|e| OmzError::Invalid(format!("Regridding produced a bad shape: {e}")))?;

        let mut inverse = vec![0; order.len()];
        for (k, &a) in order.iter().enumerate() {
            inverse[a] = k;
        }
        let data = stacked.permuted_axes(inverse.as_slice()).as_standard_layout().into_owned();
        Ok(Variable::from_parts(var.dims().to_vec(), data, var.attrs().clone()))
    }
}

/// Axis values in ascending order, with their positions in the source axis.
struct SortedAxis {
    order: Vec<usize>,
    values: Vec<f64>,
}

impl SortedAxis {
    fn new(values: impl Iterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.collect();
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let values = order.iter().map(|&i| values[i]).collect();
        Self { order, values }
    }
}

/// Neighbouring source rows of `target` and the weight of the upper one.
fn bracket_latitude(axis: &SortedAxis, target: f64) -> Option<(usize, usize, f64)> {
    let (order, sorted) = (&axis.order, &axis.values);
    let last = sorted.len() - 1;
    if target < sorted[0] - TOLERANCE || target > sorted[last] + TOLERANCE {
        return None;
    }
    if last == 0 {
        return Some((order[0], order[0], 0.0));
    }
    let k = sorted[..last]
        .iter()
        .rposition(|&v| v <= target + TOLERANCE)
        .unwrap_or(0);
    let span = sorted[k + 1] - sorted[k];
    let w = if span > 0.0 {
        ((target - sorted[k]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Some((order[k], order[k + 1], w))
}

/// Neighbouring source columns of `target`, wrapping around the dateline.
///
/// `axis` holds longitudes already wrapped into `[0, 360)`.
fn bracket_longitude(axis: &SortedAxis, target: f64) -> Option<(usize, usize, f64)> {
    let (order, sorted) = (&axis.order, &axis.values);
    let target = target.rem_euclid(360.0);

    let last = sorted.len() - 1;
    if last == 0 {
        return Some((order[0], order[0], 0.0));
    }
    match sorted.iter().rposition(|&v| v <= target) {
        Some(k) if k < last => {
            let span = sorted[k + 1] - sorted[k];
            let w = if span > 0.0 { (target - sorted[k]) / span } else { 0.0 };
            Some((order[k], order[k + 1], w))
        }
        _ => {
            // between the last and the first source column, across 0/360
            let span = sorted[0] + 360.0 - sorted[last];
            let w = (target - sorted[last]).rem_euclid(360.0) / span;
            Some((order[last], order[0], w))
        }
    }
}

/// Values of a coordinate that must depend on `dim` only.
fn rectilinear_axis(coord: &Variable, name: &str, dim: &str) -> OmzResult<Vec<f64>> {
    if coord.dims() == [dim.to_string()] {
        return Ok(coord.to_vec());
    }
    let (Some(along), 2) = (coord.axis_of(dim), coord.ndim()) else {
        return Err(OmzError::Invalid(format!(
            "Coordinate '{name}' must span '{dim}', has {:?}",
            coord.dims()
        )));
    };
    let across = 1 - along;
    let first = coord.data().index_axis(Axis(across), 0);
    for lane in coord.data().axis_iter(Axis(across)) {
        let differs = lane
            .iter()
            .zip(first.iter())
            .any(|(a, b)| (a - b).abs() > TOLERANCE);
        if differs {
            return Err(OmzError::Invalid(format!(
                "Coordinate '{name}' varies along more than '{dim}'; curvilinear grids cannot be regridded"
            )));
        }
    }
    Ok(first.iter().copied().collect())
}

/// Interpolate every horizontal field of `ds` onto a uniform grid of `resolution` degrees.
///
/// Data variables without both `y` and `x` are kept unchanged. Coordinates spanning `y` or
/// `x` are replaced by 1-D `lat` (along `y`) and `lon` (along `x`) axes of the target grid,
/// and the `grid_label` attribute is removed.
pub fn regrid(ds: &Dataset, resolution: f64) -> OmzResult<Dataset> {
    let lat = rectilinear_axis(ds.get("lat")?, "lat", "y")?;
    let lon = rectilinear_axis(ds.get("lon")?, "lon", "x")?;
    let regridder = Regridder::new(&lat, &lon, TargetGrid::uniform(resolution)?)?;
    regrid_with(ds, &regridder)
}

/// [`regrid`] with a prebuilt operator, e.g. to reuse it across experiments of one model.
pub fn regrid_with(ds: &Dataset, regridder: &Regridder) -> OmzResult<Dataset> {
    let mut out = ds.empty_like();
    for (name, coord) in ds.coords() {
        if !coord.has_dim("y") && !coord.has_dim("x") {
            out.insert_coord(name, coord.clone())?;
        }
    }
    let target = regridder.target();
    out.insert_coord("lat", Variable::from_vec("y", target.lat().to_vec()))?;
    out.insert_coord("lon", Variable::from_vec("x", target.lon().to_vec()))?;

    for (name, var) in ds.data_vars() {
        if var.has_dim("y") && var.has_dim("x") {
            out.insert_variable(name, regridder.apply(var)?)?;
        } else {
            out.insert_variable(name, var.clone())?;
        }
    }
    for (dim, labels) in ds.label_sets() {
        if dim != "y" && dim != "x" {
            out.set_labels(dim, labels.to_vec())?;
        }
    }
    out.remove_attr("grid_label");
    Ok(out)
}
