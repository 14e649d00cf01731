use ndarray::Array;
use omz_core::collector::{collect, read_files, CollectorOptions, Omission};
use omz_core::dataset::{Dataset, Dimensions, Variable};
use omz_core::errors::{ErrorKind, OmzError, OmzResult};
use omz_core::reader::{ChunkHint, DatasetReader};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builds datasets from file names of the form
/// `o2_Omon_<model>_<experiment>_<variant>_gn_<steps>.nc` and counts every access.
#[derive(Default)]
struct FakeReader {
    opens: RefCell<BTreeMap<PathBuf, usize>>,
    introspections: RefCell<usize>,
    chunks: RefCell<Vec<ChunkHint>>,
    fail_on: Option<String>,
}

impl FakeReader {
    fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    fn parts(path: &Path) -> (String, usize) {
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        let tokens: Vec<&str> = stem.split('_').collect();
        let variant = tokens[4].to_string();
        let steps = tokens[6].parse().unwrap();
        (variant, steps)
    }

    fn total_opens(&self) -> usize {
        self.opens.borrow().values().sum()
    }
}

impl DatasetReader for FakeReader {
    fn dimensions(&self, path: &Path) -> OmzResult<Dimensions> {
        *self.introspections.borrow_mut() += 1;
        let (_, steps) = Self::parts(path);
        Ok([("time".to_string(), steps), ("x".to_string(), 2)]
            .into_iter()
            .collect())
    }

    fn open(&self, path: &Path, chunks: &ChunkHint) -> OmzResult<Dataset> {
        *self.opens.borrow_mut().entry(path.to_path_buf()).or_default() += 1;
        self.chunks.borrow_mut().push(chunks.clone());
        if let Some(name) = &self.fail_on {
            if path.to_string_lossy().contains(name.as_str()) {
                return Err(OmzError::Read {
                    path: path.to_path_buf(),
                    message: "corrupt header".to_string(),
                });
            }
        }

        let (variant, steps) = Self::parts(path);
        let mut ds = Dataset::new();
        let o2 = Array::from_shape_fn((steps, 2), |(t, x)| (t * 2 + x) as f64);
        ds.insert_variable("o2", Variable::new(vec!["time", "x"], o2.into_dyn())?)?;
        ds.insert_coord(
            "time",
            Variable::from_vec("time", (0..steps).map(|t| t as f64).collect()),
        )?;
        ds.set_attr("source_id", "upstream-model");
        ds.set_attr("experiment_id", "upstream-experiment");
        ds.set_attr("variant_label", variant);
        ds.set_chunks(chunks.as_map().clone());
        Ok(ds)
    }
}

fn data_dir(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in files {
        File::create(dir.path().join(name)).unwrap();
    }
    dir
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn empty_directory_yields_none() {
    let dir = data_dir(&[]);
    let reader = FakeReader::default();
    let result = collect(&reader, &CollectorOptions::new(dir.path())).unwrap();
    assert!(result.is_none());
    assert_eq!(reader.total_opens(), 0);

    let other_files = data_dir(&["README.txt"]);
    assert!(collect(&reader, &CollectorOptions::new(other_files.path()))
        .unwrap()
        .is_none());

    let missing = collect(&reader, &CollectorOptions::new("/no/such/directory")).unwrap();
    assert!(missing.is_none());
}

#[test]
fn absent_pairs_have_no_key() {
    let dir = data_dir(&["o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc"]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5", "GFDL-ESM4"])
        .with_experiments(&["historical", "ssp585"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();

    assert!(collection.contains("CanESM5", "historical"));
    assert!(!collection.contains("CanESM5", "ssp585"));
    assert!(collection.model("GFDL-ESM4").is_none());
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.models().collect::<Vec<_>>(), vec!["CanESM5"]);
    assert_eq!(
        collection.omissions(),
        &[
            Omission::Experiment {
                model_id: "CanESM5".to_string(),
                experiment_id: "ssp585".to_string(),
            },
            Omission::Model {
                model_id: "GFDL-ESM4".to_string(),
            },
        ]
    );
    assert!(collection.omissions().iter().all(|o| o.to_error().is_recoverable()));
}

#[test]
fn model_without_matching_experiment_is_empty() {
    let dir = data_dir(&["o2_Omon_CanESM5_piControl_r1i1p1f1_gn_12.nc"]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5"])
        .with_experiments(&["historical"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();
    assert!(collection.model("CanESM5").unwrap().is_empty());
    assert!(collection.is_empty());
    assert_eq!(collection.models().collect::<Vec<_>>(), vec!["CanESM5"]);
    assert_eq!(collection.report().without_experiment.len(), 1);
    assert_eq!(
        collection.omissions(),
        &[Omission::Experiment {
            model_id: "CanESM5".to_string(),
            experiment_id: "historical".to_string(),
        }]
    );
}

#[test]
fn model_names_match_between_separators() {
    let dir = data_dir(&[
        "o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc",
        "o2_Omon_CanESM5_historical_r2i1p1f1_gn_12.nc",
        "o2_Omon_CanESM5-CanOE_historical_r1i1p2f1_gn_12.nc",
    ]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5-CanOE", "CanESM5"])
        .with_experiments(&["historical"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();

    let canoe = collection.get("CanESM5-CanOE", "historical").unwrap();
    assert_eq!(canoe.dim_len("member_id"), Some(1));
    assert_eq!(canoe.labels("member_id").unwrap(), &["r1i1p2f1".to_string()]);

    let canesm = collection.get("CanESM5", "historical").unwrap();
    assert_eq!(canesm.dim_len("member_id"), Some(2));
    assert_eq!(
        canesm.labels("member_id").unwrap(),
        &strings(&["r1i1p1f1", "r2i1p1f1"])
    );
    assert!(collection.report().is_clean());
}

#[test]
fn members_of_different_length_are_aligned_to_the_first() {
    // sorted order puts r1 (24 steps) before r2 (18 steps)
    let dir = data_dir(&[
        "o2_Omon_GFDL-ESM4_ssp585_r1i1p1f1_gn_24.nc",
        "o2_Omon_GFDL-ESM4_ssp585_r2i1p1f1_gn_18.nc",
    ]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["GFDL-ESM4"])
        .with_experiments(&["ssp585"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();
    let ds = collection.get("GFDL-ESM4", "ssp585").unwrap();

    assert_eq!(ds.dim_len("time"), Some(24));
    let o2 = ds.variable("o2").unwrap();
    assert_eq!(o2.dims(), &strings(&["member_id", "time", "x"]));
    assert_eq!(o2.data()[[1, 17, 1]], 35.0);
    assert!(o2.data()[[1, 18, 0]].is_nan());
    assert_eq!(ds.coord("time").unwrap().len_of("time"), Some(24));
}

#[test]
fn attributes_identify_the_group() {
    let dir = data_dir(&["o2_Omon_MIROC-ES2L_historical_r1i1p1f2_gn_12.nc"]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["MIROC-ES2L"])
        .with_experiments(&["historical"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();
    let ds = collection.get("MIROC-ES2L", "historical").unwrap();
    assert_eq!(ds.attr_str("source_id"), Some("MIROC-ES2L"));
    assert_eq!(ds.attr_str("experiment_id"), Some("historical"));
}

#[test]
fn each_file_is_opened_once() {
    let files = [
        "o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc",
        "o2_Omon_CanESM5_historical_r2i1p1f1_gn_12.nc",
        "o2_Omon_CanESM5_ssp585_r1i1p1f1_gn_12.nc",
        "o2_Omon_GFDL-ESM4_historical_r1i1p1f1_gn_12.nc",
    ];
    let dir = data_dir(&files);
    let reader = FakeReader::default();
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5", "GFDL-ESM4"])
        .with_experiments(&["historical", "ssp585"]);
    let collection = collect(&reader, &options).unwrap().unwrap();

    assert_eq!(collection.len(), 3);
    assert_eq!(reader.total_opens(), files.len());
    assert!(reader.opens.borrow().values().all(|&n| n == 1));
    // one header read per model/experiment group
    assert_eq!(*reader.introspections.borrow(), 3);
}

#[test]
fn chunks_are_restricted_to_file_dimensions() {
    let dir = data_dir(&["o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc"]);
    let reader = FakeReader::default();
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5"])
        .with_experiments(&["historical"])
        .with_chunks(ChunkHint::cmip_default().with("lev", 5));
    let collection = collect(&reader, &options).unwrap().unwrap();

    let expected = ChunkHint::new().with("time", 10);
    assert_eq!(reader.chunks.borrow().as_slice(), &[expected.clone()]);
    let ds = collection.get("CanESM5", "historical").unwrap();
    assert_eq!(ds.chunks(), expected.as_map());
}

#[test]
fn scanning_twice_gives_the_same_collection() {
    // GFDL-ESM4 members differ in length, so its aggregate is NaN-padded
    let dir = data_dir(&[
        "o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc",
        "o2_Omon_CanESM5_historical_r2i1p1f1_gn_12.nc",
        "o2_Omon_GFDL-ESM4_ssp585_r1i1p1f1_gn_24.nc",
        "o2_Omon_GFDL-ESM4_ssp585_r2i1p1f1_gn_18.nc",
        "o2_Omon_NorESM2-LM_ssp585_r1i1p1f1_gn_12.nc",
    ]);
    let reader = FakeReader::default();
    let options = CollectorOptions::new(dir.path());
    let first = collect(&reader, &options).unwrap().unwrap();
    let second = collect(&reader, &options).unwrap().unwrap();

    assert_eq!(first.summary(), second.summary());
    assert_eq!(first.summary().len(), 3);
    assert_eq!(first.models().collect::<Vec<_>>(), second.models().collect::<Vec<_>>());
    assert_eq!(first.omissions(), second.omissions());
    let padded = first.get("GFDL-ESM4", "ssp585").unwrap();
    assert!(padded.variable("o2").unwrap().data().iter().any(|v| v.is_nan()));
    assert_eq!(padded.dims(), second.get("GFDL-ESM4", "ssp585").unwrap().dims());
}

#[test]
fn reader_failures_abort_the_scan() {
    let dir = data_dir(&[
        "o2_Omon_CanESM5_historical_r1i1p1f1_gn_12.nc",
        "o2_Omon_GFDL-ESM4_historical_r1i1p1f1_gn_12.nc",
    ]);
    let reader = FakeReader::failing_on("GFDL-ESM4");
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5", "GFDL-ESM4"])
        .with_experiments(&["historical"]);
    let err = collect(&reader, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailure);
    assert!(!err.is_recoverable());
}

#[test]
fn overlapping_experiment_names_are_reported() {
    let dir = data_dir(&["o2_Omon_CanESM5_ssp585-bgc_r1i1p1f1_gn_12.nc"]);
    let options = CollectorOptions::new(dir.path())
        .with_models(&["CanESM5"])
        .with_experiments(&["ssp585", "ssp585-bgc"]);
    let collection = collect(&FakeReader::default(), &options).unwrap().unwrap();
    assert!(collection.contains("CanESM5", "ssp585"));
    assert!(collection.contains("CanESM5", "ssp585-bgc"));
    assert_eq!(collection.report().ambiguous.len(), 1);
}

#[test]
fn read_files_resolves_defaults() {
    let dir = data_dir(&[
        "o2_Omon_ACCESS-ESM1-5_historical_r1i1p1f1_gn_12.nc",
        "o2.Omon.ACCESS-ESM1-5.ssp585.r1i1p1f1.gn.12.zarr",
    ]);
    let collection = read_files(&FakeReader::default(), dir.path(), None, None, None, None, None)
        .unwrap()
        .unwrap();
    assert_eq!(collection.models().collect::<Vec<_>>(), vec!["ACCESS-ESM1-5"]);
    assert!(collection.contains("ACCESS-ESM1-5", "historical"));
    assert!(!collection.contains("ACCESS-ESM1-5", "ssp585"));
    assert_eq!(collection.omissions().len(), 13 + 1);

    let experiments = strings(&["historical"]);
    let narrowed = read_files(
        &FakeReader::default(),
        dir.path(),
        Some("*.nc"),
        Some("_"),
        Some(&strings(&["ACCESS-ESM1-5"])),
        Some(&experiments),
        Some(ChunkHint::new()),
    )
    .unwrap()
    .unwrap();
    assert!(narrowed.omissions().is_empty());
}
