//! Quality filters applied before datasets enter the analysis.
//!
//! Both filters take their tables as values ([`LengthPolicy`], [`RunDenylist`]) so that
//! they can be configured or replaced in tests.

pub mod denylist;
pub mod length;

pub use denylist::{is_usable, DeniedRun, RunDenylist};
pub use length::{filter_by_length, LengthPolicy, LengthRule};
