//! Default CMIP6 source and experiment identifiers.
//!
//! These are the Earth system models that publish dissolved oxygen (`o2`) on the ocean grid
//! for the historical and SSP5-8.5 experiments. They are returned by functions rather than
//! stored in statics so that callers always receive a fresh list evaluated at call time.
//!
//! ```
//! use omz_core::models::{default_experiments, default_models};
//!
//! assert!(default_models().iter().any(|m| m == "GFDL-ESM4"));
//! assert_eq!(default_experiments(), vec!["historical", "ssp585"]);
//! ```

/// Models with oxygen output used in the multi-model analysis.
pub fn default_models() -> Vec<String> {
    [
        "CanESM5-CanOE",
        "CanESM5",
        "CNRM-ESM2-1",
        "ACCESS-ESM1-5",
        "IPSL-CM6A-LR",
        "MIROC-ES2L",
        "UKESM1-0-LL",
        "MPI-ESM1-2-HR",
        "MPI-ESM1-2-LR",
        "MRI-ESM2-0",
        "NorESM2-LM",
        "NorESM2-MM",
        "GFDL-CM4",
        "GFDL-ESM4",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub fn default_experiments() -> Vec<String> {
    vec!["historical".to_string(), "ssp585".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_are_unique() {
        let models = default_models();
        let mut sorted = models.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), models.len());
    }

    #[test]
    fn fresh_list_per_call() {
        let mut first = default_models();
        first.clear();
        assert_eq!(default_models().len(), 14);
    }
}
