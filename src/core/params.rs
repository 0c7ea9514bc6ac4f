use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::legend::Legend;
use crate::error::{Error, Result};
use crate::types::Reducer;

/// Brightness threshold on a raw digital-number band: clear only if `value < below`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandThreshold {
    pub band: String,
    pub below: f32,
}

/// Optical cloud/quality mask parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskParams {
    pub qa_band: String,
    pub cloud_bit: u32,
    pub cirrus_bit: u32,
    /// Empirically tuned for one region/sensor epoch; revisit per deployment.
    pub thresholds: Vec<BandThreshold>,
    /// Digital numbers are divided by this to give reflectance.
    pub scale_divisor: f32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            qa_band: "QA60".to_string(),
            cloud_bit: 10,
            cirrus_bit: 11,
            thresholds: vec![
                BandThreshold { band: "B3".to_string(), below: 2000.0 },
                BandThreshold { band: "B9".to_string(), below: 900.0 },
                BandThreshold { band: "B2".to_string(), below: 1550.0 },
            ],
            scale_divisor: 10000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    /// Exclusive.
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpticalParams {
    pub dates: DateRange,
    pub reducer: Reducer,
    pub mask: MaskParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarParams {
    pub dates: DateRange,
    pub angle_band: String,
    /// Strict lower bound (degrees): keep `angle > min_angle`.
    pub min_angle: f32,
    /// Strict upper bound (degrees): keep `angle < max_angle`.
    pub max_angle: f32,
    pub polarisation_property: String,
    pub required_polarisations: Vec<String>,
    pub mode_property: String,
    pub instrument_mode: String,
    /// Also derive `VV_variance` / `VH_variance` from the masked series.
    pub variance_bands: bool,
}

/// Random forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub number_of_trees: usize,
    /// `None` uses the square root of the feature count.
    pub variables_per_split: Option<usize>,
    pub min_leaf_population: usize,
    pub bag_fraction: f64,
    pub max_nodes: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            number_of_trees: 500,
            variables_per_split: None,
            min_leaf_population: 1,
            bag_fraction: 0.5,
            max_nodes: None,
            seed: None,
        }
    }
}

/// Lookup used to collapse the land-cover classes into a binary label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemapTable {
    pub lookup_in: Vec<i64>,
    pub lookup_out: Vec<i64>,
}

impl Default for RemapTable {
    fn default() -> Self {
        Self {
            lookup_in: (0..14).collect(),
            lookup_out: vec![0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportParams {
    pub scale: f64,
    pub max_pixels: f64,
    pub nodata: u8,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            scale: 10.0,
            max_pixels: 1e12,
            nodata: 255,
        }
    }
}

/// Storage layout for inputs and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageParams {
    pub optical_catalog: PathBuf,
    pub radar_catalog: PathBuf,
    pub region: PathBuf,
    /// Root under which every product is written.
    pub prefix: PathBuf,
    /// Reference dataset id relative to `prefix`, without extension.
    pub reference: String,
    /// Tag appended to raster product names.
    pub date_tag: String,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            optical_catalog: PathBuf::from("catalog/s2.json"),
            radar_catalog: PathBuf::from("catalog/s1.json"),
            region: PathBuf::from("roi.geojson"),
            prefix: PathBuf::from("jambi"),
            reference: "reference/reference_20190618".to_string(),
            date_tag: "20190618".to_string(),
        }
    }
}

/// Pipeline configuration suitable for config files. Every stage receives the
/// part it needs; nothing is read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub feature_bands: Vec<String>,
    pub optical: OpticalParams,
    pub radar: RadarParams,
    pub classifier: ForestParams,
    pub probability_classifier: ForestParams,
    pub label_column: String,
    pub split: f64,
    /// Seed for the partition key; `None` draws from entropy.
    pub split_seed: Option<u64>,
    pub remap: RemapTable,
    pub class_count: usize,
    pub export: ExportParams,
    pub storage: StorageParams,
    pub legend: Legend,
    pub write_quicklooks: bool,
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let dates = DateRange::new(ymd(2018, 1, 1), ymd(2019, 12, 31));
        Self {
            feature_bands: ["B5", "B11", "B12", "NDVI", "NBRI", "VV", "VH", "VV_VH"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            optical: OpticalParams {
                dates,
                reducer: Reducer::Mean,
                mask: MaskParams::default(),
            },
            radar: RadarParams {
                dates,
                angle_band: "angle".to_string(),
                min_angle: 30.63993,
                max_angle: 45.53993,
                polarisation_property: "transmitterReceiverPolarisation".to_string(),
                required_polarisations: vec!["VH".to_string(), "VV".to_string()],
                mode_property: "instrumentMode".to_string(),
                instrument_mode: "IW".to_string(),
                variance_bands: false,
            },
            classifier: ForestParams {
                variables_per_split: Some(2),
                ..ForestParams::default()
            },
            probability_classifier: ForestParams::default(),
            label_column: "class".to_string(),
            split: 0.7,
            split_seed: None,
            remap: RemapTable::default(),
            class_count: 14,
            export: ExportParams::default(),
            storage: StorageParams::default(),
            legend: Legend::default(),
            write_quicklooks: true,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject configurations that would only fail deep inside a stage.
    pub fn validate(&self) -> Result<()> {
        if self.feature_bands.is_empty() {
            return Err(Error::InvalidConfig("feature_bands is empty".to_string()));
        }
        if !(self.split > 0.0 && self.split < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "split must be in (0, 1), got {}",
                self.split
            )));
        }
        if self.remap.lookup_in.len() != self.remap.lookup_out.len() {
            return Err(Error::InvalidConfig(format!(
                "remap lookup_in has {} entries but lookup_out has {}",
                self.remap.lookup_in.len(),
                self.remap.lookup_out.len()
            )));
        }
        for class in 0..self.class_count as i64 {
            if !self.remap.lookup_in.contains(&class) {
                return Err(Error::InvalidConfig(format!(
                    "remap lookup does not cover class {}",
                    class
                )));
            }
        }
        if let Some(bad) = self.remap.lookup_out.iter().find(|v| !matches!(v, 0 | 1)) {
            return Err(Error::InvalidConfig(format!(
                "remap lookup_out must be binary, found {}",
                bad
            )));
        }
        for (name, forest) in [
            ("classifier", &self.classifier),
            ("probability_classifier", &self.probability_classifier),
        ] {
            if forest.number_of_trees == 0 {
                return Err(Error::InvalidConfig(format!("{name}.number_of_trees is 0")));
            }
            if !(forest.bag_fraction > 0.0 && forest.bag_fraction <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name}.bag_fraction must be in (0, 1], got {}",
                    forest.bag_fraction
                )));
            }
            if forest.min_leaf_population == 0 {
                return Err(Error::InvalidConfig(format!("{name}.min_leaf_population is 0")));
            }
        }
        if self.optical.dates.start >= self.optical.dates.end
            || self.radar.dates.start >= self.radar.dates.end
        {
            return Err(Error::InvalidConfig("date range start must precede end".to_string()));
        }
        let mask = &self.optical.mask;
        if mask.cloud_bit > 31 || mask.cirrus_bit > 31 {
            return Err(Error::InvalidConfig(format!(
                "mask bits must be in 0..=31, got cloud {} and cirrus {}",
                mask.cloud_bit, mask.cirrus_bit
            )));
        }
        if self.optical.reducer == Reducer::Variance {
            return Err(Error::InvalidConfig(
                "optical.reducer cannot be variance: spectral indices need the reflectance bands".to_string(),
            ));
        }
        if self.optical.mask.scale_divisor == 0.0 {
            return Err(Error::InvalidConfig("mask.scale_divisor is 0".to_string()));
        }
        if self.export.scale <= 0.0 || self.export.max_pixels <= 0.0 {
            return Err(Error::InvalidConfig(
                "export scale and max_pixels must be positive".to_string(),
            ));
        }
        if self.class_count == 0 || self.class_count > 255 {
            return Err(Error::InvalidConfig(format!(
                "class_count must be in 1..=255, got {}",
                self.class_count
            )));
        }
        self.legend.validate(self.class_count)?;
        Ok(())
    }

    pub fn reference_path(&self) -> PathBuf {
        self.storage.prefix.join(format!("{}.csv", self.storage.reference))
    }

    /// `validation/validation_<reference file name>`.
    pub fn validation_path(&self) -> PathBuf {
        let stem = Path::new(&self.storage.reference)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.storage.reference.clone());
        self.storage
            .prefix
            .join("validation")
            .join(format!("validation_{}.csv", stem))
    }

    pub fn classification_path(&self) -> PathBuf {
        self.storage
            .prefix
            .join("classification")
            .join(format!("classification_{}.tif", self.storage.date_tag))
    }

    pub fn probability_path(&self) -> PathBuf {
        self.storage
            .prefix
            .join("classification")
            .join(format!("oilpalm_probability_{}.tif", self.storage.date_tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.classifier.variables_per_split, Some(2));
        assert_eq!(cfg.probability_classifier.variables_per_split, None);
        assert_eq!(cfg.export.max_pixels, 1e12);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = PipelineConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.feature_bands, cfg.feature_bands);
        assert_eq!(back.radar.min_angle, cfg.radar.min_angle);
    }

    #[test]
    fn remap_must_cover_every_class() {
        let mut cfg = PipelineConfig::default();
        cfg.remap.lookup_in.pop();
        cfg.remap.lookup_out.pop();
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn split_out_of_range_rejected() {
        let cfg = PipelineConfig {
            split: 1.0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn qa_bits_beyond_u32_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.optical.mask.cloud_bit = 32;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        cfg.optical.mask.cloud_bit = 31;
        cfg.validate().unwrap();
    }

    #[test]
    fn variance_is_not_an_optical_reducer() {
        let mut cfg = PipelineConfig::default();
        cfg.optical.reducer = Reducer::Variance;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        cfg.optical.reducer = Reducer::Median;
        cfg.validate().unwrap();
    }

    #[test]
    fn product_paths_follow_layout() {
        let cfg = PipelineConfig::default();
        assert_eq!(
            cfg.validation_path(),
            PathBuf::from("jambi/validation/validation_reference_20190618.csv")
        );
        assert_eq!(
            cfg.classification_path(),
            PathBuf::from("jambi/classification/classification_20190618.tif")
        );
    }
}
