//! High-level library API: load the configured inputs, run the whole
//! classification pipeline, write its products, and re-check a validation
//! table. Prefer these entrypoints over the low-level stage modules when
//! integrating covermap.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::classify::accuracy::{AccuracySummary, ErrorMatrix};
use crate::core::classify::reference::{CLASSIFICATION_COLUMN, ReferenceSet};
use crate::core::collection::ImageCollection;
use crate::core::params::PipelineConfig;
use crate::core::processing::pipeline::{self, PipelineOutputs};
use crate::core::processing::render::confidence_counts;
use crate::core::processing::save::{
    ExportRecord, ExportRequest, export_grid, export_u8, write_class_quicklook, write_probability_quicklook,
};
use crate::core::raster::{Grid, Image};
use crate::core::region::RegionOfInterest;
use crate::error::{Error, Result};
use crate::io::catalog::Catalog;
use crate::io::reference::{read_reference_csv, write_reference_csv};
use crate::io::region::read_region;
use crate::io::writers::metadata::write_json_atomic;
use crate::io::writers::tiff::write_tiff_f32;
use crate::types::{ConfidenceBand, ExportKind};

/// Everything read from storage before processing starts.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub region: RegionOfInterest,
    pub optical: ImageCollection,
    pub radar: ImageCollection,
    pub reference: ReferenceSet,
}

/// Read the region, both catalogs (only scenes inside each sensor's date
/// range are opened) and the reference table.
pub fn load_inputs(config: &PipelineConfig) -> Result<Inputs> {
    let storage = &config.storage;
    let region = read_region(&storage.region)?;
    let optical = Catalog::load(&storage.optical_catalog)?.collection(Some(config.optical.dates))?;
    let radar = Catalog::load(&storage.radar_catalog)?.collection(Some(config.radar.dates))?;
    let reference = read_reference_csv(&config.reference_path())?;
    Ok(Inputs {
        region,
        optical,
        radar,
        reference,
    })
}

/// Build the feature stack from the configured catalogs and region.
pub fn build_composite(config: &PipelineConfig) -> Result<Image> {
    config.validate()?;
    let region = read_region(&config.storage.region)?;
    let optical = Catalog::load(&config.storage.optical_catalog)?.collection(Some(config.optical.dates))?;
    let radar = Catalog::load(&config.storage.radar_catalog)?.collection(Some(config.radar.dates))?;
    pipeline::build_feature_stack(optical, radar, &region, config)
}

/// Write each band of `image` as a float GeoTIFF `<dir>/<band>.tif`.
pub fn write_image_bands(image: &Image, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    image
        .bands()
        .iter()
        .map(|b| {
            let path = dir.join(format!("{}.tif", b.name));
            write_tiff_f32(&path, &b.data, &image.grid)?;
            Ok(path)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub trees: usize,
    pub classes: Vec<i64>,
    pub oob_error: Option<f64>,
    pub accuracy: AccuracySummary,
}

/// Summary of one pipeline run, written as `report_<date>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: String,
    pub feature_bands: Vec<String>,
    pub grid: Grid,
    pub optical_scenes: usize,
    pub radar_scenes: usize,
    pub reference_points: usize,
    pub training_points: usize,
    pub validation_points: usize,
    pub classification: ModelReport,
    pub probability: ModelReport,
    pub confidence: BTreeMap<ConfidenceBand, u64>,
    pub validation_table: PathBuf,
    pub exports: Vec<ExportRecord>,
}

impl RunReport {
    pub fn path(config: &PipelineConfig) -> PathBuf {
        config
            .storage
            .prefix
            .join(format!("report_{}.json", config.storage.date_tag))
    }
}

fn export_requests(config: &PipelineConfig) -> [ExportRequest; 2] {
    let ex = &config.export;
    [
        (ExportKind::Classification, config.classification_path()),
        (ExportKind::Probability, config.probability_path()),
    ]
    .map(|(kind, destination)| ExportRequest {
        description: kind.to_string(),
        destination,
        kind,
        scale: ex.scale,
        max_pixels: ex.max_pixels,
        nodata: ex.nodata,
    })
}

/// Write the validation table, both raster products (with quicklooks when
/// configured) and return the export records. Both exports are checked
/// against the pixel ceiling before anything is written.
pub fn write_products(outputs: &PipelineOutputs, config: &PipelineConfig) -> Result<(PathBuf, Vec<ExportRecord>)> {
    let rasters = &outputs.rasters;
    let requests = export_requests(config);
    for request in &requests {
        export_grid(&rasters.grid, request)?;
    }

    let validation_path = config.validation_path();
    write_reference_csv(&validation_path, &outputs.validation.table)?;

    let nodata = config.export.nodata;
    let mut records = Vec::with_capacity(requests.len());
    for request in &requests {
        let data = match request.kind {
            ExportKind::Classification => &rasters.classes,
            ExportKind::Probability => &rasters.percent,
        };
        let mut record = export_u8(data, &rasters.grid, request)?;
        if config.write_quicklooks {
            let quicklook = match request.kind {
                ExportKind::Classification => {
                    write_class_quicklook(&request.destination, data, &rasters.grid, &config.legend, nodata)?
                }
                ExportKind::Probability => {
                    write_probability_quicklook(&request.destination, data, &rasters.grid, &config.legend, nodata)?
                }
            };
            record.quicklook = Some(quicklook);
        }
        records.push(record);
    }
    Ok((validation_path, records))
}

/// Run the full pipeline on `inputs` and write every product plus the run report.
pub fn run_with_inputs(inputs: Inputs, config: &PipelineConfig) -> Result<RunReport> {
    let optical_scenes = inputs.optical.len();
    let radar_scenes = inputs.radar.len();
    let reference_points = inputs.reference.len();

    let outputs = pipeline::execute(inputs.optical, inputs.radar, &inputs.region, inputs.reference, config)?;
    let (validation_table, exports) = write_products(&outputs, config)?;

    let models = &outputs.models;
    let report = RunReport {
        generated_at: chrono::Utc::now().to_rfc3339(),
        feature_bands: config.feature_bands.clone(),
        grid: outputs.stack.grid.clone(),
        optical_scenes,
        radar_scenes,
        reference_points,
        training_points: models.classes.training.len(),
        validation_points: models.classes.validation.len(),
        classification: ModelReport {
            trees: models.classifier.tree_count(),
            classes: models.classifier.classes().to_vec(),
            oob_error: models.classifier.oob_error(),
            accuracy: outputs.validation.matrix.summary(),
        },
        probability: ModelReport {
            trees: models.probability.tree_count(),
            classes: models.probability.classes().to_vec(),
            oob_error: models.probability.oob_error(),
            accuracy: outputs.validation.binary_matrix.summary(),
        },
        confidence: confidence_counts(&outputs.rasters.percent, &config.legend.confidence, config.export.nodata),
        validation_table,
        exports,
    };
    let report_path = RunReport::path(config);
    write_json_atomic(&report_path, &report)?;
    info!("Run report written to {:?}", report_path);
    Ok(report)
}

/// Load the configured inputs and run the full pipeline.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunReport> {
    config.validate()?;
    let inputs = load_inputs(config)?;
    run_with_inputs(inputs, config)
}

/// Recompute the error matrix of a previously exported validation table
/// (`label` column against `classification`).
pub fn validate_table(path: &Path, label: &str, class_count: usize) -> Result<AccuracySummary> {
    let table = read_reference_csv(path)?;
    let pairs: Vec<(i64, i64)> = table
        .points
        .iter()
        .filter_map(|p| Some((p.label(label)?, p.label(CLASSIFICATION_COLUMN)?)))
        .collect();
    if pairs.is_empty() {
        return Err(Error::EmptyInput(format!(
            "{} has no rows with both `{}` and `{}`",
            path.display(),
            label,
            CLASSIFICATION_COLUMN
        )));
    }
    Ok(ErrorMatrix::from_pairs(pairs, class_count)?.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{ForestParams, RemapTable};
    use crate::core::raster::GeoTransform;
    use crate::io::geotiff::read_band;
    use ndarray::Array2;
    use serde_json::{Value, json};

    const SIZE: usize = 8;

    fn grid() -> Grid {
        let mut grid = Grid::new(SIZE, SIZE, GeoTransform::new(0.0, 80.0, 10.0, -10.0));
        grid.crs = Some("EPSG:32748".to_string());
        grid
    }

    /// Left half of the grid is class 0, right half class 1.
    fn halves(left: f32, right: f32) -> Array2<f32> {
        Array2::from_shape_fn((SIZE, SIZE), |(_, col)| if col < SIZE / 2 { left } else { right })
    }

    fn write_scene(dir: &Path, id: &str, bands: &[(&str, Array2<f32>)]) -> Value {
        let mut entries = serde_json::Map::new();
        for (name, data) in bands {
            let file = format!("{id}_{name}.tif");
            write_tiff_f32(&dir.join(&file), data, &grid()).unwrap();
            entries.insert(name.to_string(), json!(file));
        }
        json!({
            "id": id,
            "date": "2018-06-01",
            "crs": "EPSG:32748",
            "properties": {
                "instrumentMode": "IW",
                "transmitterReceiverPolarisation": ["VV", "VH"]
            },
            "bands": entries
        })
    }

    fn write_catalog(path: &Path, name: &str, scene: Value) {
        let manifest = json!({"name": name, "scenes": [scene]});
        std::fs::write(path, manifest.to_string()).unwrap();
    }

    fn fixture(dir: &Path) -> PipelineConfig {
        let optical = write_scene(
            dir,
            "s2",
            &[
                ("QA60", halves(0.0, 0.0)),
                ("B2", halves(900.0, 600.0)),
                ("B3", halves(1100.0, 800.0)),
                ("B4", halves(800.0, 500.0)),
                ("B5", halves(700.0, 1300.0)),
                ("B8", halves(500.0, 3000.0)),
                ("B9", halves(300.0, 400.0)),
                ("B11", halves(200.0, 1800.0)),
                ("B12", halves(150.0, 900.0)),
            ],
        );
        let radar = write_scene(
            dir,
            "s1",
            &[
                ("VV", halves(-20.0, -8.0)),
                ("VH", halves(-25.0, -14.0)),
                ("angle", halves(35.0, 35.0)),
            ],
        );
        write_catalog(&dir.join("s2.json"), "S2_SR", optical);
        write_catalog(&dir.join("s1.json"), "S1_GRD", radar);

        let region = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [80.0, 0.0], [80.0, 80.0], [0.0, 80.0], [0.0, 0.0]]]
                }
            }]
        });
        std::fs::write(dir.join("roi.geojson"), region.to_string()).unwrap();

        let prefix = dir.join("out");
        std::fs::create_dir_all(prefix.join("reference")).unwrap();
        let mut csv = String::from("x,y,class\n");
        for row in 0..SIZE {
            for col in 0..SIZE {
                let (x, y) = grid().transform.pixel_center(col, row);
                csv.push_str(&format!("{x},{y},{}\n", usize::from(col >= SIZE / 2)));
            }
        }
        std::fs::write(prefix.join("reference/points.csv"), csv).unwrap();

        let mut config = PipelineConfig::default();
        config.storage.optical_catalog = dir.join("s2.json");
        config.storage.radar_catalog = dir.join("s1.json");
        config.storage.region = dir.join("roi.geojson");
        config.storage.prefix = prefix;
        config.storage.reference = "reference/points".to_string();
        config.storage.date_tag = "test".to_string();
        config.class_count = 2;
        config.remap = RemapTable {
            lookup_in: vec![0, 1],
            lookup_out: vec![0, 1],
        };
        config.legend.palette.truncate(2);
        config.legend.names.truncate(2);
        config.split_seed = Some(7);
        config.classifier = ForestParams {
            number_of_trees: 25,
            variables_per_split: Some(2),
            seed: Some(7),
            ..ForestParams::default()
        };
        config.probability_classifier = ForestParams {
            number_of_trees: 25,
            seed: Some(8),
            ..ForestParams::default()
        };
        config
    }

    #[test]
    fn pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let report = run_pipeline(&config).unwrap();

        assert_eq!(report.optical_scenes, 1);
        assert_eq!(report.radar_scenes, 1);
        assert_eq!(report.reference_points, SIZE * SIZE);
        assert_eq!(report.training_points + report.validation_points, SIZE * SIZE);
        assert_eq!(report.classification.accuracy.overall_accuracy, 1.0);
        assert_eq!(report.classification.classes, vec![0, 1]);
        assert_eq!(report.probability.accuracy.overall_accuracy, 1.0);
        assert_eq!(report.exports.len(), 2);

        let classes = read_band(&config.classification_path()).unwrap();
        assert_eq!(classes.data.dim(), (SIZE, SIZE));
        assert_eq!(classes.data[[0, 0]], 0.0);
        assert_eq!(classes.data[[SIZE - 1, SIZE - 1]], 1.0);

        let percent = read_band(&config.probability_path()).unwrap();
        assert!(percent.data[[0, 0]] < 50.0);
        assert!(percent.data[[0, SIZE - 1]] >= 50.0);

        for record in &report.exports {
            assert!(record.sidecar.exists());
            assert!(record.quicklook.as_ref().is_some_and(|q| q.exists()));
        }
        assert!(report.validation_table.exists());

        let confidence: u64 = report.confidence.values().sum();
        assert_eq!(confidence, (SIZE * SIZE) as u64);

        let text = std::fs::read_to_string(RunReport::path(&config)).unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["classification"]["accuracy"]["overall_accuracy"], json!(1.0));
        assert_eq!(json["feature_bands"].as_array().map(Vec::len), Some(8));
    }

    #[test]
    fn validation_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let report = run_pipeline(&config).unwrap();
        let summary = validate_table(&report.validation_table, &config.label_column, config.class_count).unwrap();
        assert_eq!(summary.matrix, report.classification.accuracy.matrix);
        assert_eq!(summary.right as usize, report.validation_points);
    }

    #[test]
    fn validation_table_without_predictions_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.csv");
        std::fs::write(&path, "x,y,class\n1,2,0\n").unwrap();
        assert!(matches!(
            validate_table(&path, "class", 2),
            Err(Error::EmptyInput(_))
        ));
    }

    #[test]
    fn validation_table_with_out_of_range_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.csv");
        std::fs::write(&path, "x,y,class,classification\n1,2,2305843009213693952,0\n").unwrap();
        assert!(matches!(
            validate_table(&path, "class", 14),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn over_ceiling_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.export.max_pixels = 10.0;
        assert!(matches!(
            run_pipeline(&config),
            Err(Error::ExportTooLarge { .. })
        ));
        assert!(!config.validation_path().exists());
        assert!(!config.classification_path().exists());
        assert!(!config.probability_path().exists());
        assert!(!RunReport::path(&config).exists());
    }

    #[test]
    fn composite_bands_are_written_per_feature() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let stack = build_composite(&config).unwrap();
        let written = write_image_bands(&stack, &dir.path().join("stack")).unwrap();
        assert_eq!(written.len(), config.feature_bands.len());
        let ndvi = read_band(&dir.path().join("stack/NDVI.tif")).unwrap();
        assert!(ndvi.data[[0, 0]] < 0.0);
        assert!(ndvi.data[[0, SIZE - 1]] > 0.5);
    }
}
