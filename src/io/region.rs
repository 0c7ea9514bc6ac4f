//! GeoJSON region reader. Accepts a FeatureCollection, a Feature or a bare
//! geometry of type Polygon or MultiPolygon; other geometry types are skipped.
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use geo::{Coord, LineString, Polygon};

use crate::core::region::RegionOfInterest;
use crate::error::{Error, Result};

fn ring(value: &Value) -> Result<LineString<f64>> {
    let coords = value
        .as_array()
        .ok_or_else(|| Error::Processing("GeoJSON ring is not an array".to_string()))?;
    coords
        .iter()
        .map(|c| match c.as_array().map(|a| a.as_slice()) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(Error::Processing(format!("non-numeric coordinate {c}"))),
            },
            _ => Err(Error::Processing(format!("malformed coordinate {c}"))),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &Value) -> Result<Polygon<f64>> {
    let rings = rings
        .as_array()
        .ok_or_else(|| Error::Processing("GeoJSON polygon is not an array of rings".to_string()))?;
    let mut iter = rings.iter();
    let exterior = ring(
        iter.next()
            .ok_or_else(|| Error::Processing("GeoJSON polygon has no rings".to_string()))?,
    )?;
    let holes = iter.map(ring).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn collect_geometry(geometry: &Value, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    let coords = &geometry["coordinates"];
    match geometry["type"].as_str() {
        Some("Polygon") => out.push(polygon(coords)?),
        Some("MultiPolygon") => {
            for p in coords.as_array().into_iter().flatten() {
                out.push(polygon(p)?);
            }
        }
        Some("GeometryCollection") => {
            for g in geometry["geometries"].as_array().into_iter().flatten() {
                collect_geometry(g, out)?;
            }
        }
        other => warn!("Skipping unsupported region geometry {:?}", other),
    }
    Ok(())
}

pub fn parse_region(geojson: &Value) -> Result<RegionOfInterest> {
    let mut polygons = Vec::new();
    match geojson["type"].as_str() {
        Some("FeatureCollection") => {
            for f in geojson["features"].as_array().into_iter().flatten() {
                collect_geometry(&f["geometry"], &mut polygons)?;
            }
        }
        Some("Feature") => collect_geometry(&geojson["geometry"], &mut polygons)?,
        _ => collect_geometry(geojson, &mut polygons)?,
    }
    RegionOfInterest::new(polygons)
}

pub fn read_region(path: &Path) -> Result<RegionOfInterest> {
    let text = std::fs::read_to_string(path)?;
    let region = parse_region(&serde_json::from_str(&text)?)?;
    info!(
        "Region {}: {} polygon(s), bounds {:?}",
        path.display(),
        region.polygons().len(),
        region.bounds()
    );
    Ok(region)
}
