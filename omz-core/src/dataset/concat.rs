//! Concatenation of ensemble members along a new dimension.
//!
//! CMIP6 archives store one realization per file. Combining them into one dataset needs two
//! decisions that [`ConcatOptions`] makes explicit:
//!
//! - [`CompatPolicy`]: what to do when members disagree about the length of a shared
//!   dimension. With [`CompatPolicy::Override`] the first member wins: longer members are
//!   truncated and shorter members padded with `NaN`. [`CompatPolicy::Equals`] rejects any
//!   disagreement.
//! - [`CoordsPolicy`]: which coordinates survive. [`CoordsPolicy::Minimal`] keeps only the
//!   coordinates present in every member, with the values of the first member.
//!   [`CoordsPolicy::Different`] additionally stacks coordinates whose values differ between
//!   members along the new dimension.
//!
//! Data variables are always stacked. A data variable missing from any member (or laid out
//! over different dimensions) cannot be stacked and is dropped with a warning.

use super::{Dataset, Variable};
use crate::errors::{OmzError, OmzResult};
use log::{debug, warn};
use ndarray::{concatenate, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatPolicy {
    /// Dimension lengths and coordinate values of the first member win.
    #[default]
    Override,
    /// All members must agree exactly.
    Equals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordsPolicy {
    /// Only coordinates common to all members, taken from the first member.
    #[default]
    Minimal,
    /// Common coordinates whose values differ between members are stacked as well.
    Different,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConcatOptions {
    #[serde(default)]
    pub compat: CompatPolicy,
    #[serde(default)]
    pub coords: CoordsPolicy,
}

/// Label of member `index` when it carries no labels of its own.
fn member_label(member: &Dataset, index: usize) -> String {
    ["variant_label", "member_id"]
        .iter()
        .find_map(|key| member.attr_str(key))
        .map(str::to_string)
        .unwrap_or_else(|| format!("member{index}"))
}

impl Dataset {
    /// Stack `members` along `dim`.
    ///
    /// Members that already have `dim` are concatenated along it; all others gain it as their
    /// leading dimension. Attributes and chunking come from the first member.
    pub fn concat(members: &[Dataset], dim: &str, options: &ConcatOptions) -> OmzResult<Dataset> {
        let first = members
            .first()
            .ok_or_else(|| OmzError::Invalid("Cannot concatenate zero datasets".to_string()))?;

        if options.compat == CompatPolicy::Equals {
            check_equal_dims(members, dim)?;
        }

        let mut out = first.empty_like();

        let mut labels = Vec::new();
        for (i, member) in members.iter().enumerate() {
            match (member.labels(dim), member.dim_len(dim)) {
                (Some(own), _) => labels.extend(own.iter().cloned()),
                (None, Some(n)) => labels.extend((0..n).map(|k| format!("member{i}_{k}"))),
                (None, None) => labels.push(member_label(member, i)),
            }
        }

        for (name, coord) in first.coords() {
            let mut parts = Vec::with_capacity(members.len());
            for member in members {
                match member.coord(name) {
                    Some(c) if c.dims() == coord.dims() => parts.push(conform(c, first, dim)?),
                    _ => break,
                }
            }
            if parts.len() != members.len() {
                debug!("Dropping coordinate '{name}' which is not shared by all members");
                continue;
            }
            let merged = if coord.has_dim(dim) {
                stack(&parts, dim)?
            } else if options.coords == CoordsPolicy::Different
                && parts.iter().any(|p| !same_values(p, &parts[0]))
            {
                if options.compat == CompatPolicy::Equals {
                    return Err(OmzError::Invalid(format!(
                        "Coordinate '{name}' differs between members"
                    )));
                }
                stack(&parts, dim)?
            } else {
                parts.swap_remove(0)
            };
            out.insert_coord(name, merged)?;
        }

        for (name, var) in first.data_vars() {
            let template = leading(var, dim)?;
            let mut parts = Vec::with_capacity(members.len());
            for member in members {
                let Some(v) = member.variable(name) else {
                    break;
                };
                let v = leading(v, dim)?;
                if v.dims() != template.dims() {
                    break;
                }
                parts.push(conform(&v, first, dim)?);
            }
            if parts.len() != members.len() {
                warn!("Dropping variable '{name}' which cannot be aligned across all members");
                continue;
            }
            out.insert_variable(name, stack(&parts, dim)?)?;
        }

        for (label_dim, own) in &first.labels {
            if label_dim != dim {
                out.set_labels(label_dim, own.clone())?;
            }
        }
        out.set_labels(dim, labels)?;
        Ok(out)
    }
}

/// `var` with `dim` present, prepending it when missing.
fn leading(var: &Variable, dim: &str) -> OmzResult<Variable> {
    if var.has_dim(dim) {
        Ok(var.clone())
    } else {
        var.expand_dim(dim, 0)
    }
}

/// Resize every dimension except `dim` to the length it has in `first`.
fn conform(var: &Variable, first: &Dataset, dim: &str) -> OmzResult<Variable> {
    let mut out = var.clone();
    for d in var.dims() {
        if d == dim {
            continue;
        }
        if let Some(target) = first.dim_len(d) {
            if out.len_of(d) != Some(target) {
                out = out.resize_along(d, target)?;
            }
        }
    }
    Ok(out)
}

/// Concatenate `parts` along `dim`, adding it as the leading dimension where absent.
fn stack(parts: &[Variable], dim: &str) -> OmzResult<Variable> {
    let parts = parts
        .iter()
        .map(|p| leading(p, dim))
        .collect::<OmzResult<Vec<_>>>()?;
    let axis = parts[0]
        .axis_of(dim)
        .ok_or_else(|| OmzError::Invalid(format!("Dimension '{dim}' was not added")))?;
    let views: Vec<ArrayViewD<'_, f64>> = parts.iter().map(Variable::view).collect();
    let data = concatenate(Axis(axis), &views)
        .map_err(|e| OmzError::Invalid(format!("Cannot concatenate along '{dim}': {e}")))?;
    Ok(Variable::from_parts(
        parts[0].dims().to_vec(),
        data,
        parts[0].attrs().clone(),
    ))
}

fn same_values(a: &Variable, b: &Variable) -> bool {
    a.shape() == b.shape()
        && a
            .data()
            .iter()
            .zip(b.data().iter())
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

fn check_equal_dims(members: &[Dataset], dim: &str) -> OmzResult<()> {
    let first = &members[0];
    for member in &members[1..] {
        for (name, &len) in member.dims() {
            if name == dim {
                continue;
            }
            if let Some(expected) = first.dim_len(name) {
                if expected != len {
                    return Err(OmzError::DimensionMismatch {
                        dim: name.clone(),
                        context: format!("member with length {len}, expected {expected}"),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MEMBER_DIM;
    use ndarray::Array;

    fn member(variant: &str, time: usize, offset: f64) -> Dataset {
        let mut ds = Dataset::new();
        let values: Vec<f64> = (0..time * 2).map(|i| i as f64 + offset).collect();
        ds.insert_variable(
            "o2",
            Variable::new(
                vec!["time", "x"],
                Array::from_shape_vec((time, 2), values).unwrap().into_dyn(),
            )
            .unwrap(),
        )
        .unwrap();
        ds.insert_coord(
            "time",
            Variable::from_vec("time", (0..time).map(|t| t as f64 + offset).collect()),
        )
        .unwrap();
        ds.insert_coord("x", Variable::from_vec("x", vec![0.5, 1.5]))
            .unwrap();
        ds.set_attr("variant_label", variant);
        ds.set_attr("source_id", "wrong-upstream-name");
        ds
    }

    #[test]
    fn stacks_members_on_a_new_leading_dimension() {
        let members = vec![member("r1i1p1f1", 3, 0.0), member("r2i1p1f1", 3, 100.0)];
        let ds = Dataset::concat(&members, MEMBER_DIM, &ConcatOptions::default()).unwrap();

        let o2 = ds.variable("o2").unwrap();
        assert_eq!(o2.dims(), &["member_id", "time", "x"]);
        assert_eq!(o2.shape(), &[2, 3, 2]);
        assert_eq!(o2.data()[[1, 0, 0]], 100.0);
        assert_eq!(
            ds.labels(MEMBER_DIM).unwrap(),
            &["r1i1p1f1".to_string(), "r2i1p1f1".to_string()]
        );
        assert_eq!(ds.attr_str("variant_label"), Some("r1i1p1f1"));
    }

    /// Two members with differing time lengths: the first member's length and coordinate
    /// values win, the shorter member is padded with NaN, the longer one truncated.
    #[test]
    fn override_uses_first_member_layout() {
        let short_first = vec![member("r1i1p1f1", 2, 0.0), member("r2i1p1f1", 4, 100.0)];
        let ds = Dataset::concat(&short_first, MEMBER_DIM, &ConcatOptions::default()).unwrap();
        assert_eq!(ds.dim_len("time"), Some(2));
        assert_eq!(ds.coord("time").unwrap().to_vec(), vec![0.0, 1.0]);
        assert_eq!(ds.variable("o2").unwrap().shape(), &[2, 2, 2]);

        let long_first = vec![member("r1i1p1f1", 4, 0.0), member("r2i1p1f1", 2, 100.0)];
        let ds = Dataset::concat(&long_first, MEMBER_DIM, &ConcatOptions::default()).unwrap();
        let o2 = ds.variable("o2").unwrap();
        assert_eq!(o2.shape(), &[2, 4, 2]);
        assert_eq!(o2.data()[[1, 1, 1]], 103.0);
        assert!(o2.data()[[1, 2, 0]].is_nan());
        assert!(o2.data()[[1, 3, 1]].is_nan());
    }

    #[test]
    fn equals_rejects_mismatched_lengths() {
        let members = vec![member("a", 2, 0.0), member("b", 3, 0.0)];
        let options = ConcatOptions {
            compat: CompatPolicy::Equals,
            coords: CoordsPolicy::Minimal,
        };
        assert!(Dataset::concat(&members, MEMBER_DIM, &options).is_err());
    }

    #[test]
    fn minimal_keeps_only_shared_coordinates_and_variables() {
        let mut a = member("a", 2, 0.0);
        a.insert_coord("lev", Variable::from_vec("lev", vec![5.0]))
            .unwrap();
        a.insert_variable("thetao", Variable::from_vec("x", vec![1.0, 2.0]))
            .unwrap();
        let b = member("b", 2, 50.0);

        let ds = Dataset::concat(&[a, b], MEMBER_DIM, &ConcatOptions::default()).unwrap();
        assert!(ds.coord("lev").is_none());
        assert!(ds.variable("thetao").is_none());
        // time differs between members but the first member's values are kept
        assert_eq!(ds.coord("time").unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn different_stacks_diverging_coordinates() {
        let members = vec![member("a", 2, 0.0), member("b", 2, 50.0)];
        let options = ConcatOptions {
            compat: CompatPolicy::Override,
            coords: CoordsPolicy::Different,
        };
        let ds = Dataset::concat(&members, MEMBER_DIM, &options).unwrap();
        assert_eq!(ds.coord("time").unwrap().dims(), &["member_id", "time"]);
        assert_eq!(ds.coord("x").unwrap().dims(), &["x"]);
    }

    #[test]
    fn unlabeled_members_get_positional_labels() {
        let mut a = member("a", 1, 0.0);
        a.remove_attr("variant_label");
        let b = a.clone();
        let ds = Dataset::concat(&[a, b], MEMBER_DIM, &ConcatOptions::default()).unwrap();
        assert_eq!(
            ds.labels(MEMBER_DIM).unwrap(),
            &["member0".to_string(), "member1".to_string()]
        );
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(Dataset::concat(&[], MEMBER_DIM, &ConcatOptions::default()).is_err());
    }
}
