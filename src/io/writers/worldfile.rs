use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::raster::GeoTransform;
use crate::error::Result;

/// World-file path for a raster: `.tfw` for TIFF, `.jgw` for JPEG, `.wld` otherwise.
pub fn world_file_path(output_image: &Path) -> PathBuf {
    let ext = output_image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let world_ext = match ext.as_str() {
        "jpg" | "jpeg" => "jgw",
        "png" => "pgw",
        "tif" | "tiff" => "tfw",
        _ => "wld",
    };
    output_image.with_extension(world_ext)
}

/// Write a world file next to the raster image.
/// The world file stores the transform in pixel-center convention.
pub fn write_world_file(output_image: &Path, transform: &GeoTransform) -> Result<PathBuf> {
    let world_path = world_file_path(output_image);

    // A: pixel size in X, D: rotation about Y, B: rotation about X, E: pixel size Y
    // C, F: center of upper-left pixel
    let a = transform.pixel_width;
    let d = transform.col_rotation;
    let b = transform.row_rotation;
    let e = transform.pixel_height;
    let (c, f) = transform.pixel_center(0, 0);

    let mut file = File::create(&world_path)?;
    for v in [a, d, b, e, c, f] {
        writeln!(file, "{:.12}", v)?;
    }
    Ok(world_path)
}

/// Write a .prj file with the provided projection (WKT or EPSG:XXXX).
pub fn write_prj_file(output_image: &Path, projection: &str) -> Result<PathBuf> {
    let prj_path = output_image.with_extension("prj");
    std::fs::write(&prj_path, projection.as_bytes())?;
    Ok(prj_path)
}
