//! Ensemble-member averaging.

use crate::dataset::{Dataset, MEMBER_DIM};
use crate::errors::OmzResult;
use log::debug;

/// Average `ds` over its ensemble members.
///
/// Returns the averaged dataset, the number of members that went into it and their ids.
/// A dataset without a `member_id` dimension is treated as a single member, identified by
/// its `variant_label` attribute (or `member0` without one). Missing values are skipped;
/// variables without the member dimension are kept unchanged.
pub fn average_members(ds: &Dataset) -> OmzResult<(Dataset, usize, Vec<String>)> {
    let stacked;
    let ds = if ds.has_dim(MEMBER_DIM) {
        ds
    } else {
        stacked = single_member(ds)?;
        &stacked
    };

    let count = ds.dim_len(MEMBER_DIM).unwrap_or(1);
    let ids: Vec<String> = match ds.labels(MEMBER_DIM) {
        Some(labels) => labels.to_vec(),
        None => (0..count).map(|i| format!("member{i}")).collect(),
    };
    debug!("Averaging {count} member(s): {ids:?}");

    let mut averaged = ds.map_variables(|_, var| {
        if var.has_dim(MEMBER_DIM) {
            let mut mean = var.nanmean(&[MEMBER_DIM])?;
            *mean.attrs_mut() = var.attrs().clone();
            Ok(mean)
        } else {
            Ok(var.clone())
        }
    })?;
    averaged.remove_labels(MEMBER_DIM);
    let member_coords: Vec<String> = averaged
        .coords()
        .filter(|(_, c)| c.has_dim(MEMBER_DIM))
        .map(|(name, _)| name.clone())
        .collect();
    for name in member_coords {
        averaged.remove_coord(&name);
    }
    averaged.prune_dims();
    Ok((averaged, count, ids))
}

/// Give every data variable a leading `member_id` dimension of length one.
fn single_member(ds: &Dataset) -> OmzResult<Dataset> {
    let mut out = ds.map_variables(|_, var| var.expand_dim(MEMBER_DIM, 0))?;
    let id = ds.attr_str("variant_label").unwrap_or("member0").to_string();
    out.set_labels(MEMBER_DIM, vec![id])?;
    Ok(out)
}
