//! Scene catalogs: a JSON manifest listing scenes, their metadata and one
//! GeoTIFF per band. Band paths are relative to the manifest.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::collection::ImageCollection;
use crate::core::params::DateRange;
use crate::core::raster::{GeoTransform, Grid, Image};
use crate::error::{Error, Result};
use crate::io::geotiff::read_band;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// GDAL-order transform; read from the band files when absent.
    #[serde(default)]
    pub geotransform: Option<[f64; 6]>,
    #[serde(default)]
    pub crs: Option<String>,
    /// Band name to GeoTIFF path. Bands are read in name order.
    pub bands: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub scenes: Vec<SceneEntry>,
    #[serde(skip)]
    pub root: PathBuf,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("catalog {}: {}", path.display(), e),
            ))
        })?;
        let mut catalog: Catalog = serde_json::from_str(&text)?;
        catalog.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!(
            "Catalog `{}`: {} scenes from {}",
            catalog.name,
            catalog.scenes.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Read one scene's bands into an image. All bands must share a grid.
    pub fn read_scene(&self, entry: &SceneEntry) -> Result<Image> {
        let mut image: Option<Image> = None;
        for (band, rel) in &entry.bands {
            let read = read_band(&self.root.join(rel))?;
            let img = match image.as_mut() {
                Some(img) => img,
                None => {
                    let transform = entry
                        .geotransform
                        .map(GeoTransform::from_gdal)
                        .or(read.transform)
                        .unwrap_or_default();
                    let (rows, cols) = read.data.dim();
                    let mut grid = Grid::new(rows, cols, transform);
                    grid.crs = entry.crs.clone();
                    let mut img = Image::new(entry.id.clone(), grid).with_date(entry.date);
                    img.properties = entry.properties.clone();
                    image.insert(img)
                }
            };
            img.add_band(band.clone(), read.data)?;
        }
        image.ok_or_else(|| Error::EmptyInput(format!("scene `{}` lists no bands", entry.id)))
    }

    /// Read the scenes acquired within `dates` (end exclusive), or all scenes.
    /// Scenes outside the range are never opened.
    pub fn collection(&self, dates: Option<DateRange>) -> Result<ImageCollection> {
        let mut images = Vec::new();
        let mut skipped = 0usize;
        for entry in &self.scenes {
            if let Some(r) = dates {
                if entry.date < r.start || entry.date >= r.end {
                    skipped += 1;
                    continue;
                }
            }
            images.push(self.read_scene(entry)?);
        }
        if skipped > 0 {
            info!("Catalog `{}`: {} scenes outside the date range not read", self.name, skipped);
        }
        if images.is_empty() {
            warn!("Catalog `{}` yielded no scenes", self.name);
        }
        Ok(ImageCollection::new(self.name.clone(), images))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writers::tiff::write_tiff_f32;
    use ndarray::array;
    use serde_json::json;

    fn write_catalog(dir: &Path) -> PathBuf {
        let grid = Grid::new(1, 2, GeoTransform::new(0.0, 10.0, 10.0, -10.0));
        write_tiff_f32(&dir.join("a_VV.tif"), &array![[-10.0, -11.0]], &grid).unwrap();
        write_tiff_f32(&dir.join("a_VH.tif"), &array![[-15.0, -16.0]], &grid).unwrap();
        let manifest = json!({
            "name": "S1_GRD",
            "scenes": [
                {
                    "id": "a",
                    "date": "2018-05-01",
                    "properties": {"instrumentMode": "IW"},
                    "crs": "EPSG:32748",
                    "bands": {"VV": "a_VV.tif", "VH": "a_VH.tif"}
                },
                {
                    "id": "b",
                    "date": "2020-01-01",
                    "bands": {"VV": "missing.tif"}
                }
            ]
        });
        let path = dir.join("s1.json");
        std::fs::write(&path, manifest.to_string()).unwrap();
        path
    }

    #[test]
    fn loads_scenes_within_date_range() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&write_catalog(dir.path())).unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        );
        let col = catalog.collection(Some(range)).unwrap();
        assert_eq!(col.len(), 1);
        let img = &col.images()[0];
        assert_eq!(img.band("VH").unwrap()[[0, 1]], -16.0);
        assert_eq!(img.grid.transform.origin_y, 10.0);
        assert_eq!(img.grid.crs.as_deref(), Some("EPSG:32748"));
        assert_eq!(img.properties["instrumentMode"], json!("IW"));
    }

    #[test]
    fn missing_band_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&write_catalog(dir.path())).unwrap();
        assert!(catalog.collection(None).is_err());
    }
}
