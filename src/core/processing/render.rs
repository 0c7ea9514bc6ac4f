//! Quicklook rendering of 8-bit products.
//!
//! Both renderers avoid per-pixel work beyond a table lookup:
//! - class maps go through a 256-entry RGB palette LUT (unknown classes and
//!   no-data render black);
//! - probability maps go through a 256-entry gray LUT in which medium and low
//!   confidence values are already blended towards white.
use std::collections::BTreeMap;

use ndarray::Array2;

use crate::core::legend::{ConfidenceThresholds, Legend};
use crate::error::Result;
use crate::types::ConfidenceBand;

/// White overlay opacity per confidence band.
pub fn overlay_opacity(band: ConfidenceBand) -> f32 {
    match band {
        ConfidenceBand::High => 0.0,
        ConfidenceBand::Medium => 0.5,
        ConfidenceBand::Low => 0.75,
    }
}

fn palette_lut(legend: &Legend) -> Result<[[u8; 3]; 256]> {
    let mut lut = [[0u8; 3]; 256];
    for (i, rgb) in legend.rgb()?.into_iter().enumerate().take(256) {
        lut[i] = rgb;
    }
    Ok(lut)
}

/// Class raster to interleaved RGB using the legend palette.
pub fn render_classes(classes: &Array2<u8>, legend: &Legend, nodata: u8) -> Result<Vec<u8>> {
    let mut lut = palette_lut(legend)?;
    lut[nodata as usize] = [0, 0, 0];
    let mut rgb = Vec::with_capacity(classes.len() * 3);
    for &c in classes.iter() {
        rgb.extend_from_slice(&lut[c as usize]);
    }
    Ok(rgb)
}

fn probability_lut(thresholds: &ConfidenceThresholds, nodata: u8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for p in 0u16..=100 {
        let gray = p as f32 * 255.0 / 100.0;
        let alpha = overlay_opacity(thresholds.band(p as f32));
        lut[p as usize] = (gray * (1.0 - alpha) + 255.0 * alpha).round().clamp(0.0, 255.0) as u8;
    }
    lut[nodata as usize] = 0;
    lut
}

/// Percent raster (0..=100) to grayscale with white confidence overlays.
pub fn render_probability(percent: &Array2<u8>, thresholds: &ConfidenceThresholds, nodata: u8) -> Vec<u8> {
    let lut = probability_lut(thresholds, nodata);
    percent.iter().map(|&p| lut[p as usize]).collect()
}

/// Pixel count per confidence band, no-data excluded.
pub fn confidence_counts(
    percent: &Array2<u8>,
    thresholds: &ConfidenceThresholds,
    nodata: u8,
) -> BTreeMap<ConfidenceBand, u64> {
    let mut hist = [0u64; 256];
    for &p in percent.iter() {
        hist[p as usize] += 1;
    }
    let mut counts = BTreeMap::new();
    for (p, &n) in hist.iter().enumerate() {
        if n == 0 || p == nodata as usize || p > 100 {
            continue;
        }
        *counts.entry(thresholds.band(p as f32)).or_insert(0) += n;
    }
    counts
}
