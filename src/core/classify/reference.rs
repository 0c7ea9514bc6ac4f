//! Labeled reference points: random partition key, train/validation split,
//! binary remap and feature sampling from the stack.
use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::core::params::RemapTable;
use crate::core::raster::Image;
use crate::error::{Error, Result};

/// Name of the partition-key column.
pub const RANDOM_COLUMN: &str = "random";
/// Column holding the predicted class of a classified point.
pub const CLASSIFICATION_COLUMN: &str = "classification";

#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub x: f64,
    pub y: f64,
    pub class: i64,
    pub random: Option<f64>,
    /// Numeric attributes: sampled features and any extra columns.
    pub properties: BTreeMap<String, f64>,
}

impl ReferencePoint {
    pub fn new(x: f64, y: f64, class: i64) -> Self {
        Self {
            x,
            y,
            class,
            random: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Integer label from `class` or a numeric property column.
    pub fn label(&self, column: &str) -> Option<i64> {
        if column == "class" {
            Some(self.class)
        } else {
            self.properties
                .get(column)
                .filter(|v| v.is_finite())
                .map(|v| v.round() as i64)
        }
    }

    /// Feature vector in `features` order; `None` if any value is missing.
    pub fn feature_row(&self, features: &[String]) -> Option<Vec<f32>> {
        features
            .iter()
            .map(|f| {
                self.properties
                    .get(f)
                    .filter(|v| v.is_finite())
                    .map(|&v| v as f32)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSet {
    pub points: Vec<ReferencePoint>,
}

impl ReferenceSet {
    pub fn new(points: Vec<ReferencePoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Property columns in first-seen order.
    pub fn property_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = Vec::new();
        for p in &self.points {
            for key in p.properties.keys() {
                if !cols.contains(key) {
                    cols.push(key.clone());
                }
            }
        }
        cols
    }

    /// True if every point carries every feature column.
    pub fn has_features(&self, features: &[String]) -> bool {
        self.points
            .iter()
            .all(|p| features.iter().all(|f| p.properties.contains_key(f)))
    }

    /// Distinct labels in ascending order.
    pub fn classes(&self) -> Vec<i64> {
        let mut classes: Vec<i64> = self.points.iter().map(|p| p.class).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Assign each point an independent uniform partition key in [0, 1).
    /// `seed` makes the assignment reproducible; `None` draws from entropy.
    pub fn random_column(mut self, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        for p in &mut self.points {
            p.random = Some(rng.r#gen::<f64>());
        }
        self
    }

    /// Split on the partition key: `random < split` trains, the rest validates.
    pub fn partition(&self, split: f64) -> Result<(ReferenceSet, ReferenceSet)> {
        let mut training = Vec::new();
        let mut validation = Vec::new();
        for p in &self.points {
            let r = p.random.ok_or_else(|| {
                Error::Processing(format!(
                    "reference point ({}, {}) has no `{}` column",
                    p.x, p.y, RANDOM_COLUMN
                ))
            })?;
            if r < split {
                training.push(p.clone());
            } else {
                validation.push(p.clone());
            }
        }
        info!(
            "Partitioned {} points at {}: {} training, {} validation",
            self.points.len(),
            split,
            training.len(),
            validation.len()
        );
        Ok((ReferenceSet::new(training), ReferenceSet::new(validation)))
    }

    /// Replace every class through the lookup table. The partition key is kept,
    /// so a remapped set splits exactly like its source.
    pub fn remap(&self, table: &RemapTable) -> Result<ReferenceSet> {
        let points = self
            .points
            .iter()
            .map(|p| {
                let idx = table
                    .lookup_in
                    .iter()
                    .position(|&c| c == p.class)
                    .ok_or(Error::UnmappedClass { class: p.class })?;
                let class = *table
                    .lookup_out
                    .get(idx)
                    .ok_or(Error::UnmappedClass { class: p.class })?;
                Ok(ReferencePoint {
                    class,
                    ..p.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReferenceSet::new(points))
    }

    /// Attach the stack's band values at each point location. Points off the
    /// grid or on no-data are dropped.
    pub fn sample(&self, stack: &Image) -> ReferenceSet {
        let names: Vec<String> = stack.band_names().iter().map(|s| s.to_string()).collect();
        let mut dropped = 0usize;
        let points: Vec<ReferencePoint> = self
            .points
            .iter()
            .filter_map(|p| {
                let sampled = stack.grid.locate(p.x, p.y).and_then(|(row, col)| {
                    let values = stack.pixel(row, col);
                    if values.iter().any(|v| v.is_nan()) {
                        return None;
                    }
                    let mut out = p.clone();
                    for (name, v) in names.iter().zip(values) {
                        out.properties.insert(name.clone(), v as f64);
                    }
                    Some(out)
                });
                if sampled.is_none() {
                    dropped += 1;
                }
                sampled
            })
            .collect();
        if dropped > 0 {
            warn!(
                "Dropped {} of {} reference points outside the stack or on no-data",
                dropped,
                self.points.len()
            );
        }
        ReferenceSet::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::{GeoTransform, Grid};
    use ndarray::Array2;

    fn points(n: usize) -> ReferenceSet {
        ReferenceSet::new(
            (0..n)
                .map(|i| ReferencePoint::new(i as f64, 0.0, (i % 14) as i64))
                .collect(),
        )
    }

    #[test]
    fn split_is_disjoint_exhaustive_and_near_ratio() {
        let set = points(1000).random_column(Some(42));
        assert!(set.points.iter().all(|p| {
            let r = p.random.unwrap();
            (0.0..1.0).contains(&r)
        }));
        let (train, val) = set.partition(0.7).unwrap();
        assert_eq!(train.len() + val.len(), 1000);
        // Three standard deviations of a Binomial(1000, 0.7) is about 43.
        assert!((657..=743).contains(&train.len()), "training size {}", train.len());
        for p in &train.points {
            assert!(!val.points.iter().any(|q| q.x == p.x));
        }
    }

    #[test]
    fn seeded_random_column_is_reproducible() {
        let a = points(50).random_column(Some(7));
        let b = points(50).random_column(Some(7));
        assert_eq!(a, b);
    }

    #[test]
    fn partition_requires_random_column() {
        assert!(points(3).partition(0.7).is_err());
    }

    #[test]
    fn binary_remap_is_exhaustive() {
        let set = points(14);
        let remapped = set.remap(&RemapTable::default()).unwrap();
        for (src, dst) in set.points.iter().zip(&remapped.points) {
            let expected = if src.class == 3 || src.class == 4 { 1 } else { 0 };
            assert_eq!(dst.class, expected, "class {}", src.class);
        }
    }

    #[test]
    fn remap_keeps_partition_key() {
        let set = points(20).random_column(Some(1));
        let remapped = set.remap(&RemapTable::default()).unwrap();
        let (a, _) = set.partition(0.7).unwrap();
        let (b, _) = remapped.partition(0.7).unwrap();
        assert_eq!(
            a.points.iter().map(|p| p.x).collect::<Vec<_>>(),
            b.points.iter().map(|p| p.x).collect::<Vec<_>>()
        );
    }

    #[test]
    fn unmapped_class_is_an_error() {
        let set = ReferenceSet::new(vec![ReferencePoint::new(0.0, 0.0, 14)]);
        assert!(matches!(
            set.remap(&RemapTable::default()),
            Err(Error::UnmappedClass { class: 14 })
        ));
    }

    #[test]
    fn sample_attaches_band_values() {
        let grid = Grid::new(2, 2, GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        let mut ndvi = Array2::from_elem((2, 2), 0.5);
        ndvi[[1, 1]] = f32::NAN;
        let stack = Image::new("stack", grid).with_band("NDVI", ndvi).unwrap();
        let set = ReferenceSet::new(vec![
            ReferencePoint::new(0.5, 1.5, 1),
            ReferencePoint::new(1.5, 0.5, 2),
            ReferencePoint::new(5.0, 5.0, 3),
        ]);
        let sampled = set.sample(&stack);
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled.points[0].properties["NDVI"], 0.5);
        assert!(sampled.has_features(&["NDVI".to_string()]));
    }
}
