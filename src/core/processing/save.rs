use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::legend::Legend;
use crate::core::processing::render::{render_classes, render_probability};
use crate::core::processing::resize::{calculate_resize_dimensions, grid_at_scale, is_at_scale, resize_nearest_u8};
use crate::core::raster::{GeoTransform, Grid};
use crate::error::{Error, Result};
use crate::io::writers::jpeg::{write_gray_jpeg, write_rgb_jpeg};
use crate::io::writers::metadata::{ExportMetadata, write_metadata_sidecar};
use crate::io::writers::tiff::write_tiff_u8;
use crate::io::writers::worldfile::{write_prj_file, write_world_file};
use crate::types::ExportKind;

/// Long side of quicklook JPEGs.
pub const QUICKLOOK_SIZE: usize = 2048;

/// One raster export job.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub description: String,
    pub destination: PathBuf,
    pub kind: ExportKind,
    pub scale: f64,
    pub max_pixels: f64,
    pub nodata: u8,
}

/// What an export wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub description: String,
    pub kind: ExportKind,
    pub destination: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub sidecar: PathBuf,
    pub quicklook: Option<PathBuf>,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Output grid of `request` on `grid`, or `ExportTooLarge` when it exceeds the
/// pixel ceiling. Nothing is allocated or written.
pub fn export_grid(grid: &Grid, request: &ExportRequest) -> Result<Grid> {
    let target = if is_at_scale(grid, request.scale) {
        grid.clone()
    } else {
        grid_at_scale(grid, request.scale)?
    };
    let pixels = target.pixel_count();
    if pixels as f64 > request.max_pixels {
        return Err(Error::ExportTooLarge {
            description: request.description.clone(),
            pixels,
            max_pixels: request.max_pixels as u64,
        });
    }
    Ok(target)
}

/// Export an 8-bit raster as GeoTIFF with world file, optional `.prj` and a
/// JSON sidecar. The raster is nearest-neighbour resampled when the export
/// scale differs from the grid's pixel size; the pixel ceiling is checked on
/// the resampled size before any resampling happens.
pub fn export_u8(data: &Array2<u8>, grid: &Grid, request: &ExportRequest) -> Result<ExportRecord> {
    let target = export_grid(grid, request)?;
    let resampled = resize_nearest_u8(data, target.cols, target.rows)?;

    ensure_parent(&request.destination)?;
    write_tiff_u8(&request.destination, &resampled, &target, request.nodata)?;
    write_world_file(&request.destination, &target.transform)?;
    if let Some(crs) = &target.crs {
        write_prj_file(&request.destination, crs)?;
    }
    let meta = ExportMetadata::new(
        &request.description,
        &request.destination,
        request.kind,
        &target,
        request.scale,
        request.max_pixels,
        request.nodata,
    );
    let sidecar = write_metadata_sidecar(&request.destination, &meta)?;
    info!(
        "Exported {} ({}x{}) to {:?}",
        request.description, target.cols, target.rows, request.destination
    );

    Ok(ExportRecord {
        description: request.description.clone(),
        kind: request.kind,
        destination: request.destination.clone(),
        rows: target.rows,
        cols: target.cols,
        sidecar,
        quicklook: None,
    })
}

fn quicklook_input(data: &Array2<u8>, grid: &Grid) -> Result<(Grid, Array2<u8>)> {
    let (rows, cols) = data.dim();
    let (qc, qr) = calculate_resize_dimensions(cols, rows, QUICKLOOK_SIZE);
    let t = grid.transform;
    let mut small = grid.clone();
    small.rows = qr;
    small.cols = qc;
    small.transform = GeoTransform::new(
        t.origin_x,
        t.origin_y,
        t.pixel_width * cols as f64 / qc as f64,
        t.pixel_height * rows as f64 / qr as f64,
    );
    Ok((small, resize_nearest_u8(data, qc, qr)?))
}

/// Palette JPEG of a class raster, written next to the product.
pub fn write_class_quicklook(output: &Path, classes: &Array2<u8>, grid: &Grid, legend: &Legend, nodata: u8) -> Result<PathBuf> {
    let path = output.with_extension("jpg");
    let (small_grid, small) = quicklook_input(classes, grid)?;
    let rgb = render_classes(&small, legend, nodata)?;
    ensure_parent(&path)?;
    write_rgb_jpeg(&path, small_grid.cols, small_grid.rows, &rgb)?;
    write_world_file(&path, &small_grid.transform)?;
    info!("Quicklook saved: {:?}", path);
    Ok(path)
}

/// Grayscale JPEG of a percent raster with white confidence overlays.
pub fn write_probability_quicklook(
    output: &Path,
    percent: &Array2<u8>,
    grid: &Grid,
    legend: &Legend,
    nodata: u8,
) -> Result<PathBuf> {
    let path = output.with_extension("jpg");
    let (small_grid, small) = quicklook_input(percent, grid)?;
    let gray = render_probability(&small, &legend.confidence, nodata);
    ensure_parent(&path)?;
    write_gray_jpeg(&path, small_grid.cols, small_grid.rows, &gray)?;
    write_world_file(&path, &small_grid.transform)?;
    info!("Quicklook saved: {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn request(dir: &Path, scale: f64, max_pixels: f64) -> ExportRequest {
        ExportRequest {
            description: "classification".to_string(),
            destination: dir.join("classification").join("classification_20190618.tif"),
            kind: ExportKind::Classification,
            scale,
            max_pixels,
            nodata: 255,
        }
    }

    #[test]
    fn export_writes_tiff_worldfile_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        grid.crs = Some("EPSG:32748".to_string());
        let rec = export_u8(&array![[0u8, 3], [4, 255]], &grid, &request(dir.path(), 10.0, 1e12)).unwrap();
        assert!(rec.destination.exists());
        assert!(rec.destination.with_extension("tfw").exists());
        assert!(rec.destination.with_extension("prj").exists());
        assert!(rec.sidecar.exists());
        assert_eq!((rec.rows, rec.cols), (2, 2));
    }

    #[test]
    fn export_resamples_to_scale() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        let rec = export_u8(&array![[1u8, 2], [3, 4]], &grid, &request(dir.path(), 5.0, 1e12)).unwrap();
        assert_eq!((rec.rows, rec.cols), (4, 4));
    }

    #[test]
    fn export_over_ceiling_fails() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        let err = export_u8(&array![[1u8, 2], [3, 4]], &grid, &request(dir.path(), 10.0, 3.0)).unwrap_err();
        assert!(matches!(err, Error::ExportTooLarge { pixels: 4, max_pixels: 3, .. }));
        assert!(!dir.path().join("classification").exists());
    }

    #[test]
    fn quicklooks_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("p.tif");
        let legend = Legend::default();
        let grid = Grid::new(2, 2, GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        let q1 = write_class_quicklook(&out, &array![[0u8, 13], [255, 4]], &grid, &legend, 255).unwrap();
        assert!(q1.exists());
        assert!(q1.with_extension("jgw").exists());
        let other = dir.path().join("q.tif");
        let q2 = write_probability_quicklook(&other, &array![[0u8, 50], [255, 100]], &grid, &legend, 255).unwrap();
        assert!(q2.exists());
    }
}
