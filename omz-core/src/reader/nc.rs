use super::{ChunkHint, DatasetReader};
use crate::dataset::{AttrValue, Attributes, Dataset, Dimensions, Variable};
use crate::errors::{OmzError, OmzResult};
use log::debug;
use ndarray::{ArrayD, IxDyn};
use netcdf::types::NcVariableType;
use netcdf::AttributeValue;
use std::collections::BTreeSet;
use std::path::Path;

/// Reads CF-convention NetCDF files.
///
/// Numeric variables are loaded eagerly as `f64`, with `_FillValue`/`missing_value`
/// replaced by `NaN`. A variable is treated as a coordinate when it has a single dimension
/// of the same name, or when another variable lists it in its `coordinates` attribute.
/// Character and compound variables are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfReader;

impl NetcdfReader {
    pub fn new() -> Self {
        Self
    }
}

fn read_error(path: &Path, err: netcdf::Error) -> OmzError {
    OmzError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn convert_attr(value: AttributeValue) -> Option<AttrValue> {
    let converted = match value {
        AttributeValue::Str(s) => AttrValue::Str(s),
        AttributeValue::Strs(v) => AttrValue::Str(v.join(" ")),
        AttributeValue::Double(v) => AttrValue::Float(v),
        AttributeValue::Float(v) => AttrValue::Float(v.into()),
        AttributeValue::Doubles(v) => AttrValue::Floats(v),
        AttributeValue::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
        AttributeValue::Short(v) => AttrValue::Int(v.into()),
        AttributeValue::Int(v) => AttrValue::Int(v.into()),
        AttributeValue::Longlong(v) => AttrValue::Int(v),
        AttributeValue::Ints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Longlongs(v) => AttrValue::Ints(v),
        _ => return None,
    };
    Some(converted)
}

fn collect_attributes<'a>(
    path: &Path,
    attrs: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> OmzResult<Attributes> {
    let mut out = Attributes::new();
    for attr in attrs {
        let value = attr.value().map_err(|e| read_error(path, e))?;
        if let Some(value) = convert_attr(value) {
            out.insert(attr.name().to_string(), value);
        }
    }
    Ok(out)
}

impl DatasetReader for NetcdfReader {
    fn dimensions(&self, path: &Path) -> OmzResult<Dimensions> {
        let file = netcdf::open(path).map_err(|e| read_error(path, e))?;
        Ok(file
            .dimensions()
            .map(|d| (d.name().to_string(), d.len()))
            .collect())
    }

    fn open(&self, path: &Path, chunks: &ChunkHint) -> OmzResult<Dataset> {
        let file = netcdf::open(path).map_err(|e| read_error(path, e))?;
        let mut ds = Dataset::new();

        let mut coord_names = BTreeSet::new();
        for var in file.variables() {
            if let Some(attr) = var.attribute("coordinates") {
                if let Ok(AttributeValue::Str(names)) = attr.value() {
                    coord_names.extend(names.split_whitespace().map(str::to_string));
                }
            }
        }

        for var in file.variables() {
            let name = var.name().to_string();
            if !matches!(
                var.vartype(),
                NcVariableType::Int(_) | NcVariableType::Float(_)
            ) {
                debug!("Skipping non-numeric variable '{name}' in {}", path.display());
                continue;
            }

            let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let mut values = var
                .get_values::<f64, _>(..)
                .map_err(|e| read_error(path, e))?;

            let attrs = collect_attributes(path, var.attributes())?;
            let fill: Vec<f64> = ["_FillValue", "missing_value"]
                .iter()
                .filter_map(|key| attrs.get(*key).and_then(AttrValue::as_f64))
                .collect();
            for v in values.iter_mut() {
                if fill.contains(v) {
                    *v = f64::NAN;
                }
            }

            let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
                OmzError::Read {
                    path: path.to_path_buf(),
                    message: format!("variable '{name}': {e}"),
                }
            })?;
            let mut variable = Variable::new(dims.clone(), data)?;
            *variable.attrs_mut() = attrs;

            let is_coord = (dims.len() == 1 && dims[0] == name) || coord_names.contains(&name);
            if is_coord {
                ds.insert_coord(&name, variable)?;
            } else {
                ds.insert_variable(&name, variable)?;
            }
        }

        for (key, value) in collect_attributes(path, file.attributes())? {
            ds.set_attr(&key, value);
        }
        ds.set_chunks(chunks.as_map().clone());
        debug!(
            "Opened {} with {} variables, chunks {:?}",
            path.display(),
            ds.data_var_names().len(),
            chunks.as_map()
        );
        Ok(ds)
    }
}
