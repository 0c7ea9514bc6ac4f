use ndarray::{Array2, Zip};

use crate::core::raster::Image;
use crate::error::Result;

/// Soil brightness correction factor used by SAVI.
pub const SAVI_L: f32 = 0.5;

/// Normalized difference of two values: (a - b) / (a + b), NaN when undefined.
#[inline]
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    let sum = a + b;
    if a.is_nan() || b.is_nan() || sum == 0.0 {
        f32::NAN
    } else {
        (a - b) / sum
    }
}

/// Soil adjusted vegetation index: ((nir - red) / (nir + red + l)) * (1 + l)
#[inline]
pub fn savi(nir: f32, red: f32, l: f32) -> f32 {
    let denom = nir + red + l;
    if nir.is_nan() || red.is_nan() || denom == 0.0 {
        f32::NAN
    } else {
        ((nir - red) / denom) * (1.0 + l)
    }
}

/// Element-wise normalized difference of two arrays.
pub fn normalized_diff_arrays(a: &Array2<f32>, b: &Array2<f32>) -> Array2<f32> {
    let mut result = Array2::zeros(a.dim());
    Zip::from(a)
        .and(b)
        .and(&mut result)
        .par_for_each(|&a_val, &b_val, res| *res = normalized_difference(a_val, b_val));
    result
}

/// Element-wise SAVI of two arrays.
pub fn savi_arrays(nir: &Array2<f32>, red: &Array2<f32>, l: f32) -> Array2<f32> {
    let mut result = Array2::zeros(nir.dim());
    Zip::from(nir)
        .and(red)
        .and(&mut result)
        .par_for_each(|&n, &r, res| *res = savi(n, r, l));
    result
}

/// Spectral indices appended to the optical composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectralIndex {
    /// Vegetation: (B8 - B4) / (B8 + B4)
    Ndvi,
    /// Water: (B3 - B8) / (B3 + B8)
    Ndwi,
    /// Burn: (B8 - B12) / (B8 + B12)
    Nbri,
    /// Moisture: (B8 - B11) / (B8 + B11)
    Ndmi,
    /// Soil adjusted vegetation, L = 0.5
    Savi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Ndwi,
        SpectralIndex::Nbri,
        SpectralIndex::Ndmi,
        SpectralIndex::Savi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndwi => "NDWI",
            SpectralIndex::Nbri => "NBRI",
            SpectralIndex::Ndmi => "NDMI",
            SpectralIndex::Savi => "SAVI",
        }
    }

    /// Band pair (a, b) the index is computed from.
    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            SpectralIndex::Ndvi => ("B8", "B4"),
            SpectralIndex::Ndwi => ("B3", "B8"),
            SpectralIndex::Nbri => ("B8", "B12"),
            SpectralIndex::Ndmi => ("B8", "B11"),
            SpectralIndex::Savi => ("B8", "B4"),
        }
    }

    pub fn compute(&self, image: &Image) -> Result<Array2<f32>> {
        let (a, b) = self.bands();
        let (a, b) = (image.band(a)?, image.band(b)?);
        Ok(match self {
            SpectralIndex::Savi => savi_arrays(a, b, SAVI_L),
            _ => normalized_diff_arrays(a, b),
        })
    }
}

/// Append every spectral index to the optical composite.
pub fn add_indices(mut image: Image) -> Result<Image> {
    for index in SpectralIndex::ALL {
        let data = index.compute(&image)?;
        image.add_band(index.name(), data)?;
    }
    Ok(image)
}

/// Append the VV/VH normalized ratio band `VV_VH`.
pub fn add_radar_ratio(mut image: Image) -> Result<Image> {
    let ratio = normalized_diff_arrays(image.band("VV")?, image.band("VH")?);
    image.add_band("VV_VH", ratio)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, Grid};
    use approx::assert_relative_eq;

    #[test]
    fn normalized_difference_exact() {
        assert_relative_eq!(normalized_difference(0.6, 0.2), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn savi_reference_value() {
        let expected = (0.4f32 / 1.1) * 1.5;
        assert_relative_eq!(savi(0.5, 0.1, SAVI_L), expected, epsilon = 1e-6);
        assert_relative_eq!(savi(0.5, 0.1, SAVI_L), 0.545, epsilon = 1e-3);
    }

    #[test]
    fn radar_ratio_of_negative_db() {
        assert_relative_eq!(normalized_difference(-10.0, -15.0), -0.2, epsilon = 1e-6);
    }

    #[test]
    fn zero_denominator_is_nodata() {
        assert!(normalized_difference(0.0, 0.0).is_nan());
        assert!(normalized_difference(f32::NAN, 0.3).is_nan());
    }

    #[test]
    fn add_indices_appends_named_bands() {
        let grid = Grid::new(1, 1, GeoTransform::default());
        let mut img = Image::new("s2", grid);
        for (name, v) in [("B3", 0.1), ("B4", 0.2), ("B8", 0.6), ("B11", 0.3), ("B12", 0.2)] {
            img.add_band(name, Array2::from_elem((1, 1), v)).unwrap();
        }
        let img = add_indices(img).unwrap();
        assert_eq!(
            img.band_names(),
            vec!["B3", "B4", "B8", "B11", "B12", "NDVI", "NDWI", "NBRI", "NDMI", "SAVI"]
        );
        assert_relative_eq!(img.band("NDVI").unwrap()[[0, 0]], 0.5, epsilon = 1e-6);
        assert_relative_eq!(img.band("NBRI").unwrap()[[0, 0]], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn index_without_source_band_fails() {
        let img = Image::new("s2", Grid::new(1, 1, GeoTransform::default()));
        assert!(SpectralIndex::Ndvi.compute(&img).is_err());
    }
}
