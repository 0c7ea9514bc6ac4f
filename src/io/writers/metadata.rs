use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::raster::Grid;
use crate::error::{Error, Result};
use crate::types::ExportKind;

/// Export parameters and provenance stored next to each raster product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub description: String,
    pub destination: PathBuf,
    pub kind: ExportKind,
    pub scale: f64,
    pub max_pixels: f64,
    pub nodata: u8,
    pub rows: usize,
    pub cols: usize,
    pub geotransform: [f64; 6],
    pub crs: Option<String>,
    pub conversion_tool: String,
    pub conversion_version: String,
    pub conversion_timestamp: String,
}

impl ExportMetadata {
    pub fn new(
        description: &str,
        destination: &Path,
        kind: ExportKind,
        grid: &Grid,
        scale: f64,
        max_pixels: f64,
        nodata: u8,
    ) -> Self {
        Self {
            description: description.to_string(),
            destination: destination.to_path_buf(),
            kind,
            scale,
            max_pixels,
            nodata,
            rows: grid.rows,
            cols: grid.cols,
            geotransform: grid.transform.to_gdal(),
            crs: grid.crs.clone(),
            conversion_tool: env!("CARGO_PKG_NAME").to_string(),
            conversion_version: env!("CARGO_PKG_VERSION").to_string(),
            conversion_timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Serialize `value` as pretty JSON to `path` through a temporary file in the
/// same directory, so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".covermap")
        .suffix(".json")
        .tempfile_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Create the JSON sidecar (`<output>.json`) for a raster product.
pub fn write_metadata_sidecar(output_path: &Path, meta: &ExportMetadata) -> Result<PathBuf> {
    let sidecar_path = output_path.with_extension("json");
    write_json_atomic(&sidecar_path, meta)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(sidecar_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::GeoTransform;

    #[test]
    fn sidecar_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("classification_20190618.tif");
        let grid = Grid::new(3, 4, GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        let meta = ExportMetadata::new("classification", &tif, ExportKind::Classification, &grid, 10.0, 1e12, 255);
        let path = write_metadata_sidecar(&tif, &meta).unwrap();
        let back: ExportMetadata = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back.description, "classification");
        assert_eq!((back.rows, back.cols), (3, 4));
        assert_eq!(back.kind, ExportKind::Classification);
        assert_eq!(back.max_pixels, 1e12);
    }
}
