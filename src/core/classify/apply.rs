//! Per-pixel application of a trained model to a feature stack, and the
//! conversions of the result to 8-bit product rasters.
use ndarray::{Array2, Zip};
use tracing::info;

use super::Model;
use crate::core::raster::Image;
use crate::error::Result;
use crate::types::OutputMode;

/// Classify every pixel of `stack`. The model's feature bands are selected
/// by name, so extra bands in the stack are ignored and a missing one fails.
/// Pixels with any no-data input are no-data in the output.
pub fn classify_image<M: Model + Sync>(model: &M, stack: &Image) -> Result<Image> {
    let features = stack.select(model.feature_names())?;
    let bands: Vec<&Array2<f32>> = features.bands().iter().map(|b| &b.data).collect();
    let (rows, cols) = stack.grid.shape();
    let mut out = Array2::<f32>::from_elem((rows, cols), f32::NAN);

    Zip::indexed(&mut out).par_for_each(|(r, c), v| {
        let row: Vec<f32> = bands.iter().map(|b| b[[r, c]]).collect();
        *v = model.predict(&row);
    });

    let name = match model.output_mode() {
        OutputMode::Raw => "classification",
        OutputMode::Probability => "probability",
    };
    let classified = out.iter().filter(|v| !v.is_nan()).count();
    info!(
        "Classified {} of {} pixels ({} mode)",
        classified,
        rows * cols,
        model.output_mode()
    );
    Image::new(format!("{}_{}", stack.id, name), stack.grid.clone()).with_band(name, out)
}

/// Class labels to u8; no-data and out-of-range labels become `nodata`.
pub fn to_class_u8(data: &Array2<f32>, nodata: u8) -> Array2<u8> {
    data.mapv(|v| {
        if v.is_nan() || v < 0.0 || v > 254.0 || v as u8 == nodata {
            nodata
        } else {
            v.round() as u8
        }
    })
}

/// Probability in [0, 1] to a whole percentage in 0..=100, truncated like an
/// integer cast. No-data becomes `nodata`.
pub fn to_percent_u8(data: &Array2<f32>, nodata: u8) -> Array2<u8> {
    data.mapv(|v| {
        if v.is_nan() {
            nodata
        } else {
            // Tolerance absorbs f32 error in vote fractions such as 0.7.
            (v.clamp(0.0, 1.0) as f64 * 100.0 + 1e-4).floor() as u8
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, Grid};
    use ndarray::array;

    struct Threshold {
        features: Vec<String>,
    }

    impl Model for Threshold {
        fn output_mode(&self) -> OutputMode {
            OutputMode::Raw
        }
        fn feature_names(&self) -> &[String] {
            &self.features
        }
        fn predict(&self, row: &[f32]) -> f32 {
            if row[0].is_nan() {
                f32::NAN
            } else if row[0] > 0.5 {
                4.0
            } else {
                1.0
            }
        }
    }

    #[test]
    fn classifies_selected_band_per_pixel() {
        let stack = Image::new("stack", Grid::new(2, 2, GeoTransform::default()))
            .with_band("B5", array![[9.0, 9.0], [9.0, 9.0]])
            .unwrap()
            .with_band("NDVI", array![[0.9, 0.1], [f32::NAN, 0.7]])
            .unwrap();
        let model = Threshold {
            features: vec!["NDVI".to_string()],
        };
        let out = classify_image(&model, &stack).unwrap();
        let data = out.band("classification").unwrap();
        assert_eq!(data[[0, 0]], 4.0);
        assert_eq!(data[[0, 1]], 1.0);
        assert!(data[[1, 0]].is_nan());
        assert_eq!(to_class_u8(data, 255), array![[4, 1], [255, 4]]);
    }

    #[test]
    fn missing_model_feature_fails() {
        let stack = Image::new("stack", Grid::new(1, 1, GeoTransform::default()))
            .with_band("B5", array![[1.0]])
            .unwrap();
        let model = Threshold {
            features: vec!["NDVI".to_string()],
        };
        assert!(classify_image(&model, &stack).is_err());
    }

    #[test]
    fn probability_becomes_percent() {
        let p = array![[0.0, 0.456], [1.0, f32::NAN]];
        assert_eq!(to_percent_u8(&p, 255), array![[0, 45], [100, 255]]);
        assert_eq!(to_percent_u8(&array![[0.7f32, 7.0 / 500.0]], 255), array![[70, 1]]);
    }
}
