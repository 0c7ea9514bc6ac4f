//! Confusion (error) matrix and the accuracy figures derived from it.
//!
//! Rows index the reference (actual) class and columns the predicted class,
//! so producer's accuracy is the diagonal over the row sum and consumer's
//! accuracy the diagonal over the column sum.
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMatrix {
    counts: Vec<Vec<u64>>,
}

/// Labels at or above this are rejected unless `min_size` asks for more.
/// Class products are u8, so larger labels cannot come from a raster.
pub const MAX_CLASSES: usize = 256;

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { f64::NAN } else { num as f64 / den as f64 }
}

impl ErrorMatrix {
    /// Build from `(actual, predicted)` pairs. The matrix is square with side
    /// `max(min_size, largest label + 1)`. Negative labels and labels at or
    /// above `max(min_size, MAX_CLASSES)` are an `InvalidArgument`.
    pub fn from_pairs<I>(pairs: I, min_size: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let limit = min_size.max(MAX_CLASSES) as i64;
        let pairs: Vec<(usize, usize)> = pairs
            .into_iter()
            .map(|(a, p)| {
                if a < 0 || p < 0 {
                    Err(Error::InvalidArgument {
                        arg: "class",
                        value: format!("negative label in pair ({a}, {p})"),
                    })
                } else if a >= limit || p >= limit {
                    Err(Error::InvalidArgument {
                        arg: "class",
                        value: format!("label in pair ({a}, {p}) exceeds {}", limit - 1),
                    })
                } else {
                    Ok((a as usize, p as usize))
                }
            })
            .collect::<Result<_>>()?;
        let size = pairs
            .iter()
            .map(|&(a, p)| a.max(p) + 1)
            .max()
            .unwrap_or(0)
            .max(min_size);
        let mut counts = vec![vec![0u64; size]; size];
        for (a, p) in pairs {
            counts[a][p] += 1;
        }
        Ok(Self { counts })
    }

    pub fn size(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Correctly classified samples (the diagonal).
    pub fn correct(&self) -> u64 {
        (0..self.size()).map(|i| self.counts[i][i]).sum()
    }

    fn row_sum(&self, i: usize) -> u64 {
        self.counts[i].iter().sum()
    }

    fn col_sum(&self, j: usize) -> u64 {
        self.counts.iter().map(|row| row[j]).sum()
    }

    pub fn overall_accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Per class: fraction of reference samples predicted correctly.
    pub fn producers_accuracy(&self) -> Vec<f64> {
        (0..self.size())
            .map(|i| ratio(self.counts[i][i], self.row_sum(i)))
            .collect()
    }

    /// Per class: fraction of predictions that match the reference.
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        (0..self.size())
            .map(|j| ratio(self.counts[j][j], self.col_sum(j)))
            .collect()
    }

    /// Cohen's kappa.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return f64::NAN;
        }
        let n = total as f64;
        let observed = self.correct() as f64 / n;
        let expected: f64 = (0..self.size())
            .map(|i| self.row_sum(i) as f64 * self.col_sum(i) as f64)
            .sum::<f64>()
            / (n * n);
        if (1.0 - expected).abs() < f64::EPSILON {
            return if observed >= 1.0 { 1.0 } else { f64::NAN };
        }
        (observed - expected) / (1.0 - expected)
    }

    pub fn summary(&self) -> AccuracySummary {
        let total = self.total();
        let correct = self.correct();
        AccuracySummary {
            matrix: self.counts.clone(),
            overall_accuracy: self.overall_accuracy(),
            producers_accuracy: self.producers_accuracy(),
            consumers_accuracy: self.consumers_accuracy(),
            kappa: self.kappa(),
            right: correct,
            wrong: total - correct,
        }
    }
}

/// Serializable snapshot of an error matrix and its derived figures.
/// Undefined ratios serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub matrix: Vec<Vec<u64>>,
    pub overall_accuracy: f64,
    pub producers_accuracy: Vec<f64>,
    pub consumers_accuracy: Vec<f64>,
    pub kappa: f64,
    pub right: u64,
    pub wrong: u64,
}
