//! Ordered, filterable image collections and their temporal reduction.
use chrono::NaiveDate;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::raster::Image;
use crate::core::region::RegionOfInterest;
use crate::error::{Error, Result};
use crate::types::Reducer;

/// Metadata predicate evaluated against image properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// Property equals value.
    Eq { property: String, value: Value },
    /// Property is a list that contains value.
    ListContains { property: String, value: Value },
}

impl MetadataFilter {
    pub fn eq(property: &str, value: impl Into<Value>) -> Self {
        MetadataFilter::Eq {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn list_contains(property: &str, value: impl Into<Value>) -> Self {
        MetadataFilter::ListContains {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, image: &Image) -> bool {
        match self {
            MetadataFilter::Eq { property, value } => image.properties.get(property) == Some(value),
            MetadataFilter::ListContains { property, value } => image
                .properties
                .get(property)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    pub name: String,
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn new(name: impl Into<String>, images: Vec<Image>) -> Self {
        Self {
            name: name.into(),
            images,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    fn retain<F: Fn(&Image) -> bool>(self, what: &str, keep: F) -> Self {
        let before = self.images.len();
        let images: Vec<Image> = self.images.into_iter().filter(|img| keep(img)).collect();
        debug!(
            "{}: {} kept {} of {} images",
            self.name,
            what,
            images.len(),
            before
        );
        Self {
            name: self.name,
            images,
        }
    }

    /// Keep images acquired in `[start, end)`. Undated images are dropped.
    pub fn filter_date(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.retain("filter_date", |img| {
            img.date.is_some_and(|d| d >= start && d < end)
        })
    }

    /// Keep images whose footprint intersects the region's bounding box.
    pub fn filter_bounds(self, region: &RegionOfInterest) -> Self {
        let roi = region.bounds();
        self.retain("filter_bounds", |img| img.grid.bounds().intersects(&roi))
    }

    pub fn filter(self, predicate: &MetadataFilter) -> Self {
        self.retain("filter", |img| predicate.matches(img))
    }

    /// Element-wise transformation; the first failure aborts.
    pub fn map<F>(self, f: F) -> Result<Self>
    where
        F: Fn(Image) -> Result<Image>,
    {
        let images = self.images.into_iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: self.name,
            images,
        })
    }

    /// Reduce across the time axis, band by band. NaN observations are
    /// ignored per pixel; a pixel without observations stays NaN. Band names
    /// come from the first image and must exist in every image.
    pub fn reduce(&self, reducer: Reducer) -> Result<Image> {
        let first = self.images.first().ok_or_else(|| Error::EmptyCollection {
            collection: self.name.clone(),
        })?;
        for img in &self.images[1..] {
            first.grid.ensure_same(&img.grid)?;
        }
        info!(
            "Reducing {} images of `{}` with {}",
            self.images.len(),
            self.name,
            reducer
        );

        let mut out = Image::new(format!("{}_{}", self.name, reducer).to_lowercase(), first.grid.clone());
        for name in first.band_names() {
            let layers = self
                .images
                .iter()
                .map(|img| img.band(name))
                .collect::<Result<Vec<&Array2<f32>>>>()?;
            let reduced = reduce_layers(&layers, reducer, first.grid.shape());
            let out_name = match reducer.band_suffix() {
                Some(suffix) => format!("{}{}", name, suffix),
                None => name.to_string(),
            };
            out.add_band(out_name, reduced)?;
        }
        Ok(out)
    }
}

fn reduce_layers(layers: &[&Array2<f32>], reducer: Reducer, shape: (usize, usize)) -> Array2<f32> {
    let mut out = Array2::from_elem(shape, f32::NAN);
    Zip::indexed(&mut out).par_for_each(|idx, o| {
        let mut values: Vec<f32> = layers
            .iter()
            .map(|l| l[idx])
            .filter(|v| !v.is_nan())
            .collect();
        *o = reduce_values(&mut values, reducer);
    });
    out
}

/// Reduce one pixel's observations. Empty input yields NaN.
pub(crate) fn reduce_values(values: &mut [f32], reducer: Reducer) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let n = values.len() as f64;
    match reducer {
        Reducer::Mean => (values.iter().map(|&v| v as f64).sum::<f64>() / n) as f32,
        Reducer::Median => {
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                ((values[mid - 1] as f64 + values[mid] as f64) / 2.0) as f32
            } else {
                values[mid]
            }
        }
        Reducer::Variance => {
            let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
            (values
                .iter()
                .map(|&v| (v as f64 - mean).powi(2))
                .sum::<f64>()
                / n) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, Grid};
    use serde_json::json;

    fn scene(id: &str, date: &str, value: f32) -> Image {
        Image::new(id, Grid::new(2, 2, GeoTransform::new(0.0, 2.0, 1.0, -1.0)))
            .with_date(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap())
            .with_band("B2", Array2::from_elem((2, 2), value))
            .unwrap()
    }

    #[test]
    fn date_filter_is_end_exclusive() {
        let col = ImageCollection::new(
            "s2",
            vec![scene("a", "2018-01-01", 1.0), scene("b", "2019-12-31", 2.0)],
        );
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();
        let kept = col.filter_date(start, end);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.images()[0].id, "a");
    }

    #[test]
    fn metadata_filters() {
        let img = scene("a", "2018-01-01", 1.0)
            .with_property("instrumentMode", json!("IW"))
            .with_property("transmitterReceiverPolarisation", json!(["VV", "VH"]));
        assert!(MetadataFilter::eq("instrumentMode", "IW").matches(&img));
        assert!(!MetadataFilter::eq("instrumentMode", "EW").matches(&img));
        assert!(MetadataFilter::list_contains("transmitterReceiverPolarisation", "VH").matches(&img));
        assert!(!MetadataFilter::list_contains("transmitterReceiverPolarisation", "HH").matches(&img));
        assert!(!MetadataFilter::list_contains("missing", "VV").matches(&img));
    }

    #[test]
    fn mean_and_median_ignore_nan() {
        let mut a = scene("a", "2018-01-01", 1.0);
        let b = scene("b", "2018-02-01", 3.0);
        let c = scene("c", "2018-03-01", 8.0);
        let mut mask = Array2::from_elem((2, 2), true);
        mask[[0, 0]] = false;
        a.update_mask(&mask).unwrap();
        let col = ImageCollection::new("s2", vec![a, b, c]);

        let mean = col.reduce(Reducer::Mean).unwrap();
        let m = mean.band("B2").unwrap();
        assert!((m[[0, 0]] - 5.5).abs() < 1e-6);
        assert!((m[[1, 1]] - 4.0).abs() < 1e-6);

        let median = col.reduce(Reducer::Median).unwrap();
        assert!((median.band("B2").unwrap()[[1, 1]] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn variance_renames_band() {
        let col = ImageCollection::new(
            "s1",
            vec![scene("a", "2018-01-01", 1.0), scene("b", "2018-01-02", 3.0)],
        );
        let var = col.reduce(Reducer::Variance).unwrap();
        assert_eq!(var.band_names(), vec!["B2_variance"]);
        assert!((var.band("B2_variance").unwrap()[[0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_collection_fails() {
        let col = ImageCollection::new("s2", vec![]);
        assert!(matches!(col.reduce(Reducer::Mean), Err(Error::EmptyCollection { .. })));
    }

    #[test]
    fn all_masked_pixel_stays_nan() {
        let mut values: Vec<f32> = vec![];
        assert!(reduce_values(&mut values, Reducer::Median).is_nan());
    }
}
