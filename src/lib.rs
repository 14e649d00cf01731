//! Harmonized CMIP6 ocean-oxygen datasets and diagnostics.
//!
//! This crate re-exports [`omz_core`] and, with the `python` feature, builds the
//! `omz._lib` extension module.

pub use omz_core::*;

#[cfg(feature = "python")]
pub mod python;
