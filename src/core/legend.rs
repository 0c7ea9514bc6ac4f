//! Land-cover legend: class palette, class names and probability confidence bands.
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ConfidenceBand;

pub const LEGEND_TITLE: &str = "Land Cover Classification";

const PALETTE: [&str; 14] = [
    "66ccff", "1D591D", "309330", "CEA0CE", "FFD1FF", "B5D27D", "11B38E", "fbedd9", "FB4C4C",
    "1196B3", "e6e06a", "67739d", "adff99", "ffcc99",
];

const NAMES: [&str; 14] = [
    "0 - Water",
    "1 - Primary Forest",
    "2 - Secondary Forest",
    "3 - Mature Oil Palm",
    "4 - Immature Oil palm",
    "5 - Shrub/orchard",
    "6 - Plantation Forest",
    "7 - Bare soil/ground",
    "8 - Built-up area",
    "9 - Rubber",
    "10 - Coconut plantation",
    "11 - Rice field",
    "12 - Tea plantation",
    "13 - Dryland agriculture",
];

/// Symmetric cut points (percent) of the confidence bands around 50.
/// A value is High when within `high` of either end, Medium when within
/// `medium`, Low otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: f32,
    pub medium: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 20.0,
            medium: 40.0,
        }
    }
}

impl ConfidenceThresholds {
    pub fn band(&self, percent: f32) -> ConfidenceBand {
        if percent <= self.high || percent >= 100.0 - self.high {
            ConfidenceBand::High
        } else if percent <= self.medium || percent >= 100.0 - self.medium {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Confidence band of a probability percentage with the default cut points.
pub fn confidence_band(percent: f32) -> ConfidenceBand {
    ConfidenceThresholds::default().band(percent)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub title: String,
    /// Hex colours, one per class index.
    pub palette: Vec<String>,
    pub names: Vec<String>,
    pub confidence: ConfidenceThresholds,
}

impl Default for Legend {
    fn default() -> Self {
        Self {
            title: LEGEND_TITLE.to_string(),
            palette: PALETTE.iter().map(|s| s.to_string()).collect(),
            names: NAMES.iter().map(|s| s.to_string()).collect(),
            confidence: ConfidenceThresholds::default(),
        }
    }
}

/// Parse `rrggbb` (case-insensitive, optional leading `#`).
pub fn parse_hex(color: &str) -> Result<[u8; 3]> {
    let hex = color.trim_start_matches('#');
    let bad = || Error::InvalidArgument {
        arg: "color",
        value: color.to_string(),
    };
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(bad());
    }
    let mut rgb = [0u8; 3];
    for (i, c) in rgb.iter_mut().enumerate() {
        *c = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| bad())?;
    }
    Ok(rgb)
}

impl Legend {
    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn validate(&self, class_count: usize) -> Result<()> {
        if self.palette.len() != class_count || self.names.len() != class_count {
            return Err(Error::InvalidConfig(format!(
                "legend has {} colours and {} names for {} classes",
                self.palette.len(),
                self.names.len(),
                class_count
            )));
        }
        self.rgb().map(|_| ())?;
        let c = self.confidence;
        if !(0.0 <= c.high && c.high <= c.medium && c.medium <= 50.0) {
            return Err(Error::InvalidConfig(format!(
                "confidence thresholds must satisfy 0 <= high <= medium <= 50, got {} / {}",
                c.high, c.medium
            )));
        }
        Ok(())
    }

    /// Palette as RGB triples.
    pub fn rgb(&self) -> Result<Vec<[u8; 3]>> {
        self.palette.iter().map(|c| parse_hex(c)).collect()
    }

    /// Printable legend table.
    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n", self.title);
        for (name, color) in self.names.iter().zip(&self.palette) {
            out.push_str(&format!("  #{:<8}{}\n", color.to_ascii_lowercase(), name));
        }
        out.push_str(&format!(
            "Confidence: High <= {h} or >= {hh}; Medium <= {m} or >= {mm}; Low otherwise\n\
             Cut points belong to the more confident band, so {mm} is Medium and {hh} is High\n",
            h = self.confidence.high,
            hh = 100.0 - self.confidence.high,
            m = self.confidence.medium,
            mm = 100.0 - self.confidence.medium,
        ));
        out
    }
}
