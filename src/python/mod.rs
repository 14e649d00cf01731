use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn};
use omz_core::collector;
use omz_core::dataset::{Dataset, Variable};
use omz_core::diagnostics;
use omz_core::errors::{ErrorKind, OmzError};
use omz_core::filters::RunDenylist;
use omz_core::models;
use omz_core::reader::{ChunkHint, NetcdfReader};
use omz_core::trend::{self, TrendOptions};
use pyo3::exceptions::{PyFileNotFoundError, PyIOError, PyValueError};
use pyo3::prelude::*;
use std::collections::BTreeMap;

fn to_py_err(err: OmzError) -> PyErr {
    match err.kind() {
        ErrorKind::NotFound => PyFileNotFoundError::new_err(err.to_string()),
        ErrorKind::IoFailure => PyIOError::new_err(err.to_string()),
        ErrorKind::Invalid => PyValueError::new_err(err.to_string()),
    }
}

fn to_python<T: serde::Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    pythonize::pythonize(py, value).map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Dimension names `dim_0, dim_1, ...` for a bare array.
fn anonymous(values: PyReadonlyArrayDyn<'_, f64>) -> PyResult<Variable> {
    let data = values.as_array().to_owned();
    let dims: Vec<String> = (0..data.ndim()).map(|i| format!("dim_{i}")).collect();
    Variable::new(dims, data).map_err(to_py_err)
}

/// A model/experiment ensemble read from disk
#[pyclass(name = "Dataset")]
#[derive(Clone)]
pub struct PyDataset(pub Dataset);

#[pymethods]
impl PyDataset {
    #[getter]
    fn dims(&self) -> BTreeMap<String, usize> {
        self.0.dims().clone()
    }

    #[getter]
    fn attrs(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_python(py, self.0.attrs())
    }

    #[getter]
    fn data_vars(&self) -> Vec<String> {
        self.0.data_var_names()
    }

    #[getter]
    fn members(&self) -> Option<Vec<String>> {
        self.0.labels(omz_core::dataset::MEMBER_DIM).map(<[String]>::to_vec)
    }

    /// Dimension names of variable or coordinate `name`
    fn dims_of(&self, name: &str) -> PyResult<Vec<String>> {
        Ok(self.0.get(name).map_err(to_py_err)?.dims().to_vec())
    }

    /// Values of variable or coordinate `name` as a NumPy array
    fn values<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
        let var = self.0.get(name).map_err(to_py_err)?;
        Ok(var.data().clone().into_pyarray_bound(py))
    }

    /// OMZ volume per remaining dimension (m^3)
    fn omz_volume<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
        let volume = diagnostics::omz_volume(&self.0).map_err(to_py_err)?;
        Ok(volume.into_data().into_pyarray_bound(py))
    }

    fn __repr__(&self) -> String {
        let dims: Vec<String> = self
            .0
            .dims()
            .iter()
            .map(|(d, n)| format!("{d}: {n}"))
            .collect();
        format!(
            "<omz.Dataset ({}) variables: {:?}>",
            dims.join(", "),
            self.0.data_var_names()
        )
    }
}

/// Scan `ddir` and load every model/experiment ensemble found
#[pyfunction]
#[pyo3(signature = (ddir, pattern=None, sep=None, models=None, experiments=None, read_chunks=None))]
fn read_files(
    ddir: std::path::PathBuf,
    pattern: Option<&str>,
    sep: Option<&str>,
    models: Option<Vec<String>>,
    experiments: Option<Vec<String>>,
    read_chunks: Option<BTreeMap<String, usize>>,
) -> PyResult<Option<BTreeMap<String, BTreeMap<String, PyDataset>>>> {
    let collection = collector::read_files(
        &NetcdfReader::new(),
        ddir,
        pattern,
        sep,
        models.as_deref(),
        experiments.as_deref(),
        read_chunks.map(|c| c.into_iter().collect::<ChunkHint>()),
    )
    .map_err(to_py_err)?;

    Ok(collection.map(|collection| {
        let mut out: BTreeMap<String, BTreeMap<String, PyDataset>> = collection
            .models()
            .map(|m| (m.to_string(), BTreeMap::new()))
            .collect();
        for (model, experiment, ds) in collection.iter() {
            out.entry(model.to_string())
                .or_default()
                .insert(experiment.to_string(), PyDataset(ds.clone()));
        }
        out
    }))
}

/// Convert oxygen from mol m-3 to µmol kg-1
#[pyfunction]
#[pyo3(signature = (o2, rho_0=diagnostics::DEFAULT_RHO_0))]
fn convert_mol_m3_mymol_kg<'py>(
    py: Python<'py>,
    o2: PyReadonlyArrayDyn<'py, f64>,
    rho_0: f64,
) -> PyResult<Bound<'py, PyArrayDyn<f64>>> {
    let converted = diagnostics::convert_mol_m3_to_umol_kg(&anonymous(o2)?, rho_0);
    Ok(converted.into_data().into_pyarray_bound(py))
}

/// Trend of an annual series as (slope per century, p-value)
#[pyfunction]
#[pyo3(signature = (series, window=86))]
fn trend_slope(series: Vec<f64>, window: usize) -> PyResult<(f64, f64)> {
    let options = TrendOptions::default().with_window(window);
    let trend = trend::trend_slope(&series, &options).map_err(to_py_err)?;
    Ok((trend.slope_per_century, trend.p_value))
}

/// Whether a run is usable, given an optional custom denylist
#[pyfunction]
#[pyo3(signature = (source_id, variant_label=None, models=None, runs=None))]
fn is_usable(
    source_id: &str,
    variant_label: Option<&str>,
    models: Option<Vec<String>>,
    runs: Option<Vec<(String, String)>>,
) -> bool {
    let mut denylist = match (&models, &runs) {
        (None, None) => RunDenylist::default(),
        _ => RunDenylist::empty(),
    };
    for model in models.unwrap_or_default() {
        denylist = denylist.with_model(&model);
    }
    for (model, variant) in runs.unwrap_or_default() {
        denylist = denylist.with_run(&model, &variant);
    }
    !denylist.contains(source_id, variant_label)
}

/// Models with oxygen output
#[pyfunction]
fn default_models() -> Vec<String> {
    models::default_models()
}

#[pymodule]
#[pyo3(name = "_lib")]
fn omz(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_class::<PyDataset>()?;
    m.add_function(wrap_pyfunction!(read_files, m)?)?;
    m.add_function(wrap_pyfunction!(convert_mol_m3_mymol_kg, m)?)?;
    m.add_function(wrap_pyfunction!(trend_slope, m)?)?;
    m.add_function(wrap_pyfunction!(is_usable, m)?)?;
    m.add_function(wrap_pyfunction!(default_models, m)?)?;
    Ok(())
}
