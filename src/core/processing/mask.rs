//! Per-image cloud/quality masking of optical scenes.
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::params::MaskParams;
use crate::core::raster::Image;
use crate::error::Result;

/// True where both the cloud and cirrus bits of a QA value are clear.
#[inline]
pub fn qa_is_clear(qa: f32, cloud_bit: u32, cirrus_bit: u32) -> bool {
    if qa.is_nan() || qa < 0.0 {
        return false;
    }
    let bits = qa as u32;
    let unset = |bit: u32| 1u32.checked_shl(bit).is_none_or(|flag| bits & flag == 0);
    unset(cloud_bit) && unset(cirrus_bit)
}

/// Clear-pixel mask: QA flags clear AND every threshold band strictly below
/// its threshold. Computed on raw digital numbers.
pub fn clear_mask(image: &Image, params: &MaskParams) -> Result<Array2<bool>> {
    let qa = image.band(&params.qa_band)?;
    let mut mask = Array2::from_elem(image.grid.shape(), true);
    Zip::from(&mut mask)
        .and(qa)
        .par_for_each(|m, &q| *m = qa_is_clear(q, params.cloud_bit, params.cirrus_bit));

    for threshold in &params.thresholds {
        let band = image.band(&threshold.band)?;
        let below = threshold.below;
        Zip::from(&mut mask)
            .and(band)
            .par_for_each(|m, &v| *m = *m && v < below);
    }
    Ok(mask)
}

/// Mask clouds and bright pixels, then rescale digital numbers to reflectance.
/// The QA band is masked but kept in its bit-field units.
pub fn mask_clouds(mut image: Image, params: &MaskParams) -> Result<Image> {
    let mask = clear_mask(&image, params)?;
    let clear = mask.iter().filter(|&&m| m).count();
    debug!(
        "{}: {} of {} pixels clear",
        image.id,
        clear,
        mask.len()
    );
    image.update_mask(&mask)?;
    let divisor = params.scale_divisor;
    image.map_values(&[params.qa_band.as_str()], |v| v / divisor);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, Grid};
    use approx::assert_relative_eq;

    fn scene(qa: f32, b2: f32, b3: f32, b9: f32) -> Image {
        let grid = Grid::new(1, 1, GeoTransform::default());
        let mut img = Image::new("s2", grid);
        for (name, v) in [("QA60", qa), ("B2", b2), ("B3", b3), ("B9", b9), ("B8", 3000.0)] {
            img.add_band(name, Array2::from_elem((1, 1), v)).unwrap();
        }
        img
    }

    fn is_clear(img: &Image) -> bool {
        clear_mask(img, &MaskParams::default()).unwrap()[[0, 0]]
    }

    #[test]
    fn clear_when_bits_unset_and_dark() {
        assert!(is_clear(&scene(0.0, 1000.0, 1000.0, 500.0)));
    }

    #[test]
    fn cloud_or_cirrus_bit_masks() {
        assert!(!is_clear(&scene(1024.0, 1000.0, 1000.0, 500.0)));
        assert!(!is_clear(&scene(2048.0, 1000.0, 1000.0, 500.0)));
        assert!(!is_clear(&scene(3072.0, 1000.0, 1000.0, 500.0)));
        // Unrelated bits do not matter.
        assert!(is_clear(&scene(512.0, 1000.0, 1000.0, 500.0)));
    }

    #[test]
    fn thresholds_are_strict() {
        assert!(!is_clear(&scene(0.0, 1550.0, 1000.0, 500.0)));
        assert!(is_clear(&scene(0.0, 1549.0, 1000.0, 500.0)));
        assert!(!is_clear(&scene(0.0, 1000.0, 2000.0, 500.0)));
        assert!(!is_clear(&scene(0.0, 1000.0, 1000.0, 900.0)));
    }

    #[test]
    fn bits_past_u32_are_never_set() {
        assert!(qa_is_clear(4096.0, 32, 11));
        assert!(!qa_is_clear(2048.0, 32, 11));
    }

    #[test]
    fn nan_qa_is_not_clear() {
        assert!(!is_clear(&scene(f32::NAN, 1000.0, 1000.0, 500.0)));
    }

    #[test]
    fn mask_clouds_rescales_reflectance() {
        let img = mask_clouds(scene(0.0, 1000.0, 1000.0, 500.0), &MaskParams::default()).unwrap();
        let b8 = img.band("B8").unwrap()[[0, 0]];
        assert_relative_eq!(b8, 0.3, epsilon = 1e-7);
        assert_relative_eq!(b8 * 10000.0, 3000.0, epsilon = 1e-3);
        assert_eq!(img.band("QA60").unwrap()[[0, 0]], 0.0);
    }

    #[test]
    fn cloudy_pixel_becomes_nodata() {
        let img = mask_clouds(scene(1024.0, 1000.0, 1000.0, 500.0), &MaskParams::default()).unwrap();
        assert!(img.band("B8").unwrap()[[0, 0]].is_nan());
        assert!(img.band("QA60").unwrap()[[0, 0]].is_nan());
    }
}
