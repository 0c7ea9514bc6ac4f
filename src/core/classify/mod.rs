//! Supervised classification: reference data handling, the random forest,
//! per-pixel application and accuracy assessment.
pub mod accuracy;
pub mod apply;
pub mod forest;
pub mod reference;

use crate::error::Result;
use crate::types::OutputMode;
use reference::{CLASSIFICATION_COLUMN, ReferenceSet};

/// A trained model: maps one feature row to a class label or a probability.
pub trait Model {
    fn output_mode(&self) -> OutputMode;

    /// Feature names in the order `predict` expects them.
    fn feature_names(&self) -> &[String];

    /// NaN when any input is NaN.
    fn predict(&self, row: &[f32]) -> f32;
}

/// A trainer producing a [`Model`] from labelled feature rows.
pub trait Classifier {
    type Model: Model;

    fn train(&self, data: &ReferenceSet, label: &str, features: &[String]) -> Result<Self::Model>;
}

/// Classify a table of sampled points, adding the `classification` column.
/// Points with missing features get no column.
pub fn classify_points<M: Model>(model: &M, points: &ReferenceSet) -> ReferenceSet {
    let mut out = points.clone();
    for p in &mut out.points {
        if let Some(row) = p.feature_row(model.feature_names()) {
            let v = model.predict(&row);
            if !v.is_nan() {
                p.properties.insert(CLASSIFICATION_COLUMN.to_string(), v as f64);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::forest::RandomForest;
    use super::reference::ReferencePoint;
    use super::*;
    use crate::core::params::ForestParams;

    #[test]
    fn classify_points_adds_column() {
        let train = ReferenceSet::new(
            (0..10)
                .map(|i| {
                    let class = (i % 2) as i64;
                    ReferencePoint::new(i as f64, 0.0, class).with_property("f", class as f64)
                })
                .collect(),
        );
        let model = RandomForest::new(ForestParams {
            number_of_trees: 10,
            seed: Some(3),
            bag_fraction: 1.0,
            ..ForestParams::default()
        })
        .train(&train, "class", &["f".to_string()])
        .unwrap();

        let table = ReferenceSet::new(vec![
            ReferencePoint::new(0.0, 0.0, 1).with_property("f", 1.0),
            ReferencePoint::new(1.0, 0.0, 0),
        ]);
        let out = classify_points(&model, &table);
        assert_eq!(out.points[0].label(CLASSIFICATION_COLUMN), Some(1));
        assert_eq!(out.points[1].label(CLASSIFICATION_COLUMN), None);
    }
}
