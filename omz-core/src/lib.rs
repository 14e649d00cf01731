//! Dataset collection and diagnostics for CMIP6 ocean-oxygen analyses.
//!
//! The entry point is the [`collector`], which scans a directory of model output and
//! groups it into one ensemble [`dataset::Dataset`] per model and experiment. The remaining
//! modules are independent transforms applied to those datasets: basin masks
//! ([`region`]), oxygen minimum zone and circulation indices ([`diagnostics`]), trends
//! ([`trend`]), regridding ([`regrid`]), member averaging ([`ensemble`]) and quality
//! filters ([`filters`]).
//!
//! Reading NetCDF files requires the `netcdf` feature.

pub mod collector;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod ensemble;
pub mod errors;
pub mod filters;
pub mod models;
pub mod reader;
pub mod region;
pub mod regrid;
pub mod time;
pub mod trend;

pub use collector::{collect, read_files, CollectorOptions, DatasetCollection};
pub use dataset::{Dataset, Variable};
pub use errors::{OmzError, OmzResult};
