use fast_image_resize::{PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use ndarray::Array2;
use tracing::{debug, info};

use crate::core::raster::{GeoTransform, Grid};
use crate::error::{Error, Result};

/// Grid of `grid` resampled to square pixels of `scale` map units.
/// The origin stays fixed; the extent is rounded to whole pixels.
pub fn grid_at_scale(grid: &Grid, scale: f64) -> Result<Grid> {
    if !(scale > 0.0) {
        return Err(Error::InvalidArgument {
            arg: "scale",
            value: scale.to_string(),
        });
    }
    let t = grid.transform;
    let width = t.pixel_width.abs() * grid.cols as f64;
    let height = t.pixel_height.abs() * grid.rows as f64;
    let cols = ((width / scale).round() as usize).max(1);
    let rows = ((height / scale).round() as usize).max(1);
    let transform = GeoTransform::new(
        t.origin_x,
        t.origin_y,
        scale.copysign(t.pixel_width),
        scale.copysign(t.pixel_height),
    );
    Ok(Grid {
        rows,
        cols,
        transform,
        crs: grid.crs.clone(),
    })
}

/// True when the grid already has pixels of `scale` map units.
pub fn is_at_scale(grid: &Grid, scale: f64) -> bool {
    let t = grid.transform;
    (t.pixel_width.abs() - scale).abs() < 1e-9 && (t.pixel_height.abs() - scale).abs() < 1e-9
}

/// Nearest-neighbour resize of a single-band u8 raster. Nearest keeps class
/// labels and the no-data value intact.
pub fn resize_nearest_u8(data: &Array2<u8>, target_cols: usize, target_rows: usize) -> Result<Array2<u8>> {
    let (rows, cols) = data.dim();
    if rows == target_rows && cols == target_cols {
        return Ok(data.clone());
    }
    info!(
        "Original size: {}x{}, New size: {}x{}",
        cols, rows, target_cols, target_rows
    );
    let resize_options = ResizeOptions::new().resize_alg(ResizeAlg::Nearest);
    let mut resizer = Resizer::new();

    let src_image = Image::from_vec_u8(
        cols as u32,
        rows as u32,
        data.iter().copied().collect(),
        PixelType::U8,
    )
    .map_err(Error::external)?;
    let mut dst_image = Image::new(target_cols as u32, target_rows as u32, PixelType::U8);
    resizer
        .resize(&src_image, &mut dst_image, &resize_options)
        .map_err(Error::external)?;

    debug!("Resized with nearest neighbour");
    Array2::from_shape_vec((target_rows, target_cols), dst_image.into_vec())
        .map_err(|e| Error::Processing(e.to_string()))
}

/// Long-side fitting used for quicklooks: never upscales.
pub fn calculate_resize_dimensions(original_cols: usize, original_rows: usize, target_size: usize) -> (usize, usize) {
    let long_side = original_rows.max(original_cols);
    if target_size >= long_side || long_side == 0 {
        return (original_cols, original_rows);
    }
    let scale_factor = target_size as f64 / long_side as f64;
    let fit = |side: usize| ((side as f64 * scale_factor).round() as usize).max(1);
    (fit(original_cols), fit(original_rows))
}
