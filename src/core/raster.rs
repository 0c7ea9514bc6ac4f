//! In-memory raster model: affine `GeoTransform`, shared `Grid` geometry and
//! the multi-band `Image` every stage consumes and produces.
//!
//! No-data is represented as `NaN` in every band.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

const TRANSFORM_TOLERANCE: f64 = 1e-9;

/// Affine transformation between pixel (col, row) and map (x, y) coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// From GDAL ordering `[origin_x, pixel_width, row_rot, origin_y, col_rot, pixel_height]`.
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates (col, row) of a map coordinate.
    /// Returns `None` for a degenerate transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (self.pixel_width * dy - self.col_rotation * dx) / det;
        Some((col, row))
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= TRANSFORM_TOLERANCE)
    }
}

/// Axis-aligned bounding box in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// Shared raster geometry: dimensions, transform and CRS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    #[serde(default)]
    pub crs: Option<String>,
}

impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform)
    }
}

impl std::fmt::Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ ({}, {}) px {}x{}",
            self.cols,
            self.rows,
            self.transform.origin_x,
            self.transform.origin_y,
            self.transform.pixel_width,
            self.transform.pixel_height
        )?;
        if let Some(crs) = &self.crs {
            write!(f, " {}", crs)?;
        }
        Ok(())
    }
}

impl Grid {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Self {
            rows,
            cols,
            transform,
            crs: None,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// Extent covered by the grid's four corners.
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        let (w, h) = (self.cols as f64, self.rows as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
        let mut b = Bounds {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (c, r) in corners {
            let x = t.origin_x + c * t.pixel_width + r * t.row_rotation;
            let y = t.origin_y + c * t.col_rotation + r * t.pixel_height;
            b.min_x = b.min_x.min(x);
            b.max_x = b.max_x.max(x);
            b.min_y = b.min_y.min(y);
            b.max_y = b.max_y.max(y);
        }
        b
    }

    /// Pixel (row, col) that contains the map coordinate, if inside the grid.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.transform.geo_to_pixel(x, y)?;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    pub(crate) fn ensure_same(&self, other: &Grid) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::GridMismatch {
                expected: self.to_string(),
                actual: other.to_string(),
            })
        }
    }
}

/// A named band of an image.
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub data: Array2<f32>,
}

/// Multi-band raster image on a single grid.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub grid: Grid,
    bands: Vec<Band>,
    pub properties: BTreeMap<String, Value>,
}

impl Image {
    pub fn new(id: impl Into<String>, grid: Grid) -> Self {
        Self {
            id: id.into(),
            date: None,
            grid,
            bands: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    /// Look up a band; fails with `MissingFeature` naming the band.
    pub fn band(&self, name: &str) -> Result<&Array2<f32>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.data)
            .ok_or_else(|| Error::MissingFeature {
                band: name.to_string(),
                available: self.band_names().join(","),
            })
    }

    /// Append a band. Shape must match the grid and the name must be new.
    pub fn add_band(&mut self, name: impl Into<String>, data: Array2<f32>) -> Result<()> {
        let name = name.into();
        if data.dim() != self.grid.shape() {
            let (rows, cols) = data.dim();
            return Err(Error::GridMismatch {
                expected: self.grid.to_string(),
                actual: format!("band `{}` of {}x{}", name, cols, rows),
            });
        }
        if self.has_band(&name) {
            return Err(Error::DuplicateBand { band: name });
        }
        self.bands.push(Band { name, data });
        Ok(())
    }

    /// Builder form of [`Image::add_band`].
    pub fn with_band(mut self, name: impl Into<String>, data: Array2<f32>) -> Result<Self> {
        self.add_band(name, data)?;
        Ok(self)
    }

    /// New image holding only `names`, in that order. Fails fast on the first
    /// missing name instead of returning a truncated stack.
    pub fn select(&self, names: &[String]) -> Result<Image> {
        let mut out = Image {
            id: self.id.clone(),
            date: self.date,
            grid: self.grid.clone(),
            bands: Vec::with_capacity(names.len()),
            properties: self.properties.clone(),
        };
        for name in names {
            let data = self.band(name)?.clone();
            out.add_band(name.clone(), data)?;
        }
        Ok(out)
    }

    /// Concatenate the bands of `images` into one image. All grids must match
    /// and band names must be unique across inputs.
    pub fn concat(id: impl Into<String>, images: &[&Image]) -> Result<Image> {
        let first = images
            .first()
            .ok_or_else(|| Error::EmptyInput("no images to concatenate".to_string()))?;
        let mut out = Image::new(id, first.grid.clone());
        for img in images {
            first.grid.ensure_same(&img.grid)?;
            for band in &img.bands {
                out.add_band(band.name.clone(), band.data.clone())?;
            }
        }
        Ok(out)
    }

    /// Set every band to NaN where `mask` is false.
    pub fn update_mask(&mut self, mask: &Array2<bool>) -> Result<()> {
        if mask.dim() != self.grid.shape() {
            let (rows, cols) = mask.dim();
            return Err(Error::GridMismatch {
                expected: self.grid.to_string(),
                actual: format!("mask of {}x{}", cols, rows),
            });
        }
        for band in &mut self.bands {
            Zip::from(&mut band.data).and(mask).par_for_each(|v, &keep| {
                if !keep {
                    *v = f32::NAN;
                }
            });
        }
        Ok(())
    }

    /// Apply `f` to every band except those listed in `skip`. NaN is preserved.
    pub fn map_values<F>(&mut self, skip: &[&str], f: F)
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        for band in self.bands.iter_mut().filter(|b| !skip.contains(&b.name.as_str())) {
            band.data.par_mapv_inplace(|v| if v.is_nan() { v } else { f(v) });
        }
    }

    /// Values of every band at (row, col), in band order.
    pub fn pixel(&self, row: usize, col: usize) -> Vec<f32> {
        self.bands.iter().map(|b| b.data[[row, col]]).collect()
    }

    /// Number of pixels that hold a value in every band.
    pub fn valid_pixel_count(&self) -> usize {
        let (rows, cols) = self.grid.shape();
        (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .filter(|&(r, c)| self.bands.iter().all(|b| !b.data[[r, c]].is_nan()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(4, 5, GeoTransform::new(100.0, 200.0, 10.0, -10.0))
    }

    #[test]
    fn pixel_center_and_locate_agree() {
        let g = grid();
        let (x, y) = g.transform.pixel_center(3, 2);
        assert_eq!((x, y), (135.0, 175.0));
        assert_eq!(g.locate(x, y), Some((2, 3)));
        assert_eq!(g.locate(99.0, 190.0), None);
        assert_eq!(g.locate(151.0, 190.0), None);
    }

    #[test]
    fn bounds_cover_full_extent() {
        let b = grid().bounds();
        assert_eq!((b.min_x, b.max_x, b.min_y, b.max_y), (100.0, 150.0, 160.0, 200.0));
    }

    #[test]
    fn select_keeps_requested_order() {
        let img = Image::new("a", grid())
            .with_band("B2", Array2::from_elem((4, 5), 1.0))
            .unwrap()
            .with_band("B3", Array2::from_elem((4, 5), 2.0))
            .unwrap();
        let sel = img.select(&["B3".to_string(), "B2".to_string()]).unwrap();
        assert_eq!(sel.band_names(), vec!["B3", "B2"]);
    }

    #[test]
    fn select_missing_band_fails_fast() {
        let img = Image::new("a", grid())
            .with_band("B2", Array2::zeros((4, 5)))
            .unwrap();
        let err = img.select(&["B2".to_string(), "NDVI".to_string()]).unwrap_err();
        match err {
            Error::MissingFeature { band, .. } => assert_eq!(band, "NDVI"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_band_rejected() {
        let mut img = Image::new("a", grid());
        img.add_band("VV", Array2::zeros((4, 5))).unwrap();
        assert!(matches!(
            img.add_band("VV", Array2::zeros((4, 5))),
            Err(Error::DuplicateBand { .. })
        ));
    }

    #[test]
    fn concat_requires_matching_grids() {
        let a = Image::new("a", grid()).with_band("B2", Array2::zeros((4, 5))).unwrap();
        let mut other = grid();
        other.transform.origin_x = 0.0;
        let b = Image::new("b", other).with_band("VV", Array2::zeros((4, 5))).unwrap();
        assert!(matches!(Image::concat("c", &[&a, &b]), Err(Error::GridMismatch { .. })));
    }

    #[test]
    fn update_mask_sets_nan() {
        let mut img = Image::new("a", grid())
            .with_band("B2", Array2::from_elem((4, 5), 3.0))
            .unwrap();
        let mut mask = Array2::from_elem((4, 5), true);
        mask[[1, 1]] = false;
        img.update_mask(&mask).unwrap();
        assert!(img.band("B2").unwrap()[[1, 1]].is_nan());
        assert_eq!(img.band("B2").unwrap()[[0, 0]], 3.0);
        assert_eq!(img.valid_pixel_count(), 19);
    }
}
