//! Shared types and enums used across covermap.
//! Includes the temporal `Reducer`, classifier `OutputMode`, probability
//! `ConfidenceBand`, and the `ExportKind` of a raster product.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Temporal reduction applied when compositing a collection into one image.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Median,
    Variance,
}

impl Reducer {
    /// Suffix appended to band names by this reducer when the band keeps
    /// a separate identity (only variance renames its output).
    pub fn band_suffix(&self) -> Option<&'static str> {
        match self {
            Reducer::Mean | Reducer::Median => None,
            Reducer::Variance => Some("_variance"),
        }
    }
}

impl std::fmt::Display for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Reducer::Mean => "Mean",
            Reducer::Median => "Median",
            Reducer::Variance => "Variance",
        };
        write!(f, "{}", s)
    }
}

/// Output mode of a trained classifier.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Discrete class label (majority vote).
    Raw,
    /// Probability of the positive class (label 1) in [0, 1].
    Probability,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Raw => write!(f, "RAW"),
            OutputMode::Probability => write!(f, "PROBABILITY"),
        }
    }
}

/// Confidence band of a probability value expressed in percent.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceBand::High => write!(f, "High"),
            ConfidenceBand::Medium => write!(f, "Medium"),
            ConfidenceBand::Low => write!(f, "Low"),
        }
    }
}

/// Raster products written by the pipeline.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum ExportKind {
    Classification,
    Probability,
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportKind::Classification => write!(f, "Classification"),
            ExportKind::Probability => write!(f, "Probability"),
        }
    }
}
