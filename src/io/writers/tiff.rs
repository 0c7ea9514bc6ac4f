use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use ndarray::Array2;
use tiff::encoder::colortype::{Gray8, Gray32Float};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

use crate::core::raster::Grid;
use crate::error::Result;

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GDAL_NODATA: u16 = 42113;

/// GeoTIFF georeferencing tags: pixel scale, tiepoint of the upper-left
/// corner and a minimal key directory (projected model, pixel-is-area).
fn write_geo_tags<W, C, K>(image: &mut ImageEncoder<'_, W, C, K>, grid: &Grid, nodata: Option<&str>) -> Result<()>
where
    W: Write + Seek,
    C: tiff::encoder::colortype::ColorType,
    K: TiffKind,
{
    let t = grid.transform;
    let scale = [t.pixel_width, t.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])?;
    if let Some(nodata) = nodata {
        image.encoder().write_tag(Tag::Unknown(GDAL_NODATA), nodata)?;
    }
    Ok(())
}

/// Single-band 8-bit GeoTIFF with a GDAL no-data tag.
pub fn write_tiff_u8(output: &Path, data: &Array2<u8>, grid: &Grid, nodata: u8) -> Result<()> {
    let (rows, cols) = data.dim();
    let file = File::create(output)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<Gray8>(cols as u32, rows as u32)?;
    let nodata = nodata.to_string();
    write_geo_tags(&mut image, grid, Some(nodata.as_str()))?;
    let buf: Vec<u8> = data.iter().copied().collect();
    image.write_data(&buf)?;
    Ok(())
}

/// Single-band float GeoTIFF; no-data stays NaN.
pub fn write_tiff_f32(output: &Path, data: &Array2<f32>, grid: &Grid) -> Result<()> {
    let (rows, cols) = data.dim();
    let file = File::create(output)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
    write_geo_tags(&mut image, grid, Some("nan"))?;
    let buf: Vec<f32> = data.iter().copied().collect();
    image.write_data(&buf)?;
    Ok(())
}
