//! Region of interest: polygons used to filter collections by bounds and to
//! clip composites to the study area.
use geo::{BoundingRect, Intersects, LineString, MultiPolygon, Point, Polygon};
use ndarray::{Array2, Zip};

use crate::core::raster::{Bounds, Image};
use crate::error::{Error, Result};

/// Immutable study-area geometry.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    shape: MultiPolygon<f64>,
    bounds: Bounds,
}

impl RegionOfInterest {
    /// Every polygon needs an exterior ring with at least three distinct vertices.
    pub fn new(polygons: Vec<Polygon<f64>>) -> Result<Self> {
        // geo closes rings, so three vertices become four coordinates.
        if polygons.iter().any(|p| p.exterior().0.len() < 4) {
            return Err(Error::EmptyInput(
                "region of interest polygon has fewer than three vertices".to_string(),
            ));
        }
        let shape = MultiPolygon::new(polygons);
        let rect = shape.bounding_rect().ok_or_else(|| {
            Error::EmptyInput("region of interest needs at least one polygon".to_string())
        })?;
        let bounds = Bounds {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        };
        Ok(Self { shape, bounds })
    }

    /// Rectangle region, handy for tests and whole-scene runs.
    pub fn from_bounds(bounds: Bounds) -> Self {
        let ring = LineString::from(vec![
            (bounds.min_x, bounds.min_y),
            (bounds.max_x, bounds.min_y),
            (bounds.max_x, bounds.max_y),
            (bounds.min_x, bounds.max_y),
        ]);
        Self {
            shape: MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
            bounds,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.shape.0
    }

    /// Points on a polygon boundary count as inside; points in holes do not.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.bounds.min_x
            && x <= self.bounds.max_x
            && y >= self.bounds.min_y
            && y <= self.bounds.max_y
            && self.shape.intersects(&Point::new(x, y))
    }

    /// Pixel-centre membership mask on the image grid.
    pub fn mask_for(&self, image: &Image) -> Array2<bool> {
        let transform = image.grid.transform;
        let mut mask = Array2::from_elem(image.grid.shape(), false);
        Zip::indexed(&mut mask).par_for_each(|(row, col), m| {
            let (x, y) = transform.pixel_center(col, row);
            *m = self.contains(x, y);
        });
        mask
    }

    /// Mask every band outside the region.
    pub fn clip(&self, mut image: Image) -> Result<Image> {
        let mask = self.mask_for(&image);
        image.update_mask(&mask)?;
        Ok(image)
    }
}
