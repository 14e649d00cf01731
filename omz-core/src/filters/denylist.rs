//! Runs known to be unusable.
//!
//! Some published runs have broken oxygen fields. They are listed either as individual
//! `(source_id, variant_label)` pairs or, when every run of a model is affected, by model.

use crate::dataset::Attributes;
use serde::{Deserialize, Serialize};

/// A single excluded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedRun {
    pub source_id: String,
    pub variant_label: String,
}

/// Runs and models excluded from the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDenylist {
    pub runs: Vec<DeniedRun>,
    /// Models excluded with all of their variants.
    pub models: Vec<String>,
}

/// Only the whole-model exclusion of `MRI-ESM2-0` is known. Further runs are added through
/// the `[quality.denylist]` configuration table.
impl Default for RunDenylist {
    fn default() -> Self {
        Self {
            runs: Vec::new(),
            models: vec!["MRI-ESM2-0".to_string()],
        }
    }
}

impl RunDenylist {
    pub fn empty() -> Self {
        Self {
            runs: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn with_run(mut self, source_id: &str, variant_label: &str) -> Self {
        self.runs.push(DeniedRun {
            source_id: source_id.to_string(),
            variant_label: variant_label.to_string(),
        });
        self
    }

    pub fn with_model(mut self, source_id: &str) -> Self {
        self.models.push(source_id.to_string());
        self
    }

    pub fn contains(&self, source_id: &str, variant_label: Option<&str>) -> bool {
        self.models.iter().any(|m| m == source_id)
            || variant_label.is_some_and(|variant| {
                self.runs
                    .iter()
                    .any(|r| r.source_id == source_id && r.variant_label == variant)
            })
    }
}

/// Whether the run described by `attrs` may be used.
///
/// Identity comes from the `source_id` and `variant_label` attributes. Datasets without a
/// `source_id` cannot match and are usable.
pub fn is_usable(attrs: &Attributes, denylist: &RunDenylist) -> bool {
    let Some(source_id) = attrs.get("source_id").and_then(|v| v.as_str()) else {
        return true;
    };
    let variant_label = attrs.get("variant_label").and_then(|v| v.as_str());
    !denylist.contains(source_id, variant_label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::AttrValue;

    fn attrs(source_id: &str, variant_label: &str) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("source_id".to_string(), AttrValue::from(source_id));
        attrs.insert("variant_label".to_string(), AttrValue::from(variant_label));
        attrs
    }

    #[test]
    fn whole_model_is_excluded() {
        let denylist = RunDenylist::default();
        for variant in ["r1i1p1f1", "r2i1p1f1", "r1i2p1f1"] {
            assert!(!is_usable(&attrs("MRI-ESM2-0", variant), &denylist));
        }
    }

    #[test]
    fn unlisted_run_is_usable() {
        assert!(is_usable(
            &attrs("MPI-ESM1-2-LR", "r1i1p1f1"),
            &RunDenylist::default()
        ));
        assert!(is_usable(&Attributes::new(), &RunDenylist::default()));
    }

    #[test]
    fn individual_runs() {
        let denylist = RunDenylist::empty().with_run("CanESM5", "r3i1p2f1");
        assert!(!is_usable(&attrs("CanESM5", "r3i1p2f1"), &denylist));
        assert!(is_usable(&attrs("CanESM5", "r1i1p2f1"), &denylist));
        assert!(is_usable(&attrs("MRI-ESM2-0", "r1i1p1f1"), &denylist));
    }

    #[test]
    fn default_table() {
        let denylist = RunDenylist::default();
        assert!(denylist.runs.is_empty());
        assert_eq!(denylist.models, vec!["MRI-ESM2-0"]);
    }

    #[test]
    fn runs_from_toml_keep_default_models() {
        let denylist: RunDenylist = toml::from_str(
            r#"
            [[runs]]
            source_id = "UKESM1-0-LL"
            variant_label = "r4i1p1f2"
            "#,
        )
        .unwrap();
        assert!(!is_usable(&attrs("UKESM1-0-LL", "r4i1p1f2"), &denylist));
        assert!(is_usable(&attrs("UKESM1-0-LL", "r1i1p1f2"), &denylist));
        assert!(!is_usable(&attrs("MRI-ESM2-0", "r1i1p1f1"), &denylist));
    }

    #[test]
    fn deserializes_from_toml() {
        let denylist: RunDenylist = toml::from_str(
            r#"
            models = ["MRI-ESM2-0", "GFDL-CM4"]

            [[runs]]
            source_id = "CanESM5"
            variant_label = "r3i1p2f1"
            "#,
        )
        .unwrap();
        assert!(denylist.contains("GFDL-CM4", None));
        assert!(denylist.contains("CanESM5", Some("r3i1p2f1")));
    }
}
