//! Feature stack assembly: optical composite (with indices) ++ radar composite,
//! narrowed to the configured feature list.
use tracing::info;

use crate::core::processing::ops::add_indices;
use crate::core::raster::Image;
use crate::error::Result;

/// Derive indices on the optical composite, concatenate with the radar
/// composite and select `feature_bands` in the given order.
pub fn feature_stack(optical: Image, radar: &Image, feature_bands: &[String]) -> Result<Image> {
    let optical = add_indices(optical)?;
    let stacked = Image::concat("composite", &[&optical, radar])?;
    let stack = stacked.select(feature_bands)?;
    info!(
        "Feature stack: {} ({} valid pixels of {})",
        feature_bands.join(","),
        stack.valid_pixel_count(),
        stack.grid.pixel_count()
    );
    Ok(stack)
}
