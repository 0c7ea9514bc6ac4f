//! Temporal compositing of the optical and radar collections.
use ndarray::{Array2, Zip};
use tracing::info;

use crate::core::collection::{ImageCollection, MetadataFilter};
use crate::core::params::{OpticalParams, RadarParams};
use crate::core::processing::mask::mask_clouds;
use crate::core::processing::ops::add_radar_ratio;
use crate::core::raster::Image;
use crate::core::region::RegionOfInterest;
use crate::error::{Error, Result};
use crate::types::Reducer;

fn ensure_not_empty(collection: &ImageCollection) -> Result<()> {
    if collection.is_empty() {
        return Err(Error::EmptyCollection {
            collection: collection.name.clone(),
        });
    }
    Ok(())
}

/// Cloud-free optical composite: date/bounds filter, per-scene mask and
/// rescale, temporal reduction, clip.
pub fn optical_composite(
    collection: ImageCollection,
    region: &RegionOfInterest,
    params: &OpticalParams,
) -> Result<Image> {
    let filtered = collection
        .filter_date(params.dates.start, params.dates.end)
        .filter_bounds(region);
    ensure_not_empty(&filtered)?;
    info!(
        "Optical composite from {} scenes of `{}` ({} to {})",
        filtered.len(),
        filtered.name,
        params.dates.start,
        params.dates.end
    );

    let masked = filtered.map(|img| mask_clouds(img, &params.mask))?;
    let reduced = masked.reduce(params.reducer)?;
    region.clip(reduced)
}

/// Keep pixels with `min_angle < angle < max_angle`.
pub fn angle_mask(image: &Image, params: &RadarParams) -> Result<Array2<bool>> {
    let angle = image.band(&params.angle_band)?;
    let (lo, hi) = (params.min_angle, params.max_angle);
    let mut mask = Array2::from_elem(image.grid.shape(), false);
    Zip::from(&mut mask)
        .and(angle)
        .par_for_each(|m, &a| *m = a > lo && a < hi);
    Ok(mask)
}

/// Radar filters for dual polarisation and acquisition mode.
pub fn radar_filters(params: &RadarParams) -> Vec<MetadataFilter> {
    let mut filters: Vec<MetadataFilter> = params
        .required_polarisations
        .iter()
        .map(|p| MetadataFilter::list_contains(&params.polarisation_property, p.as_str()))
        .collect();
    filters.push(MetadataFilter::eq(
        &params.mode_property,
        params.instrument_mode.as_str(),
    ));
    filters
}

/// Mean backscatter composite with the `VV_VH` ratio band, clipped to the region.
/// Incidence-angle masking happens per scene, before the temporal mean.
pub fn radar_composite(
    collection: ImageCollection,
    region: &RegionOfInterest,
    params: &RadarParams,
) -> Result<Image> {
    let mut filtered = collection
        .filter_date(params.dates.start, params.dates.end)
        .filter_bounds(region);
    for f in radar_filters(params) {
        filtered = filtered.filter(&f);
    }
    ensure_not_empty(&filtered)?;
    info!(
        "Radar composite from {} scenes of `{}` ({} to {})",
        filtered.len(),
        filtered.name,
        params.dates.start,
        params.dates.end
    );

    let masked = filtered.map(|mut img| {
        let mask = angle_mask(&img, params)?;
        img.update_mask(&mask)?;
        Ok(img)
    })?;

    let mut composite = add_radar_ratio(masked.reduce(Reducer::Mean)?)?;
    if params.variance_bands {
        let variance = masked.reduce(Reducer::Variance)?;
        for name in ["VV_variance", "VH_variance"] {
            composite.add_band(name, variance.band(name)?.clone())?;
        }
    }
    region.clip(composite)
}
