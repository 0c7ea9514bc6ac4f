//! Pure-Rust single-band GeoTIFF reader.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::core::raster::GeoTransform;
use crate::error::{Error, Result};
use crate::io::writers::tiff::{GDAL_NODATA, MODEL_PIXEL_SCALE, MODEL_TIEPOINT};

/// Band samples as f32 with the file's no-data value mapped to NaN, plus the
/// georeferencing found in the file (if any).
#[derive(Debug, Clone)]
pub struct BandRead {
    pub data: Array2<f32>,
    pub transform: Option<GeoTransform>,
}

fn to_f32(result: DecodingResult) -> Result<Vec<f32>> {
    Ok(match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(Error::Processing("unsupported TIFF sample format".to_string())),
    })
}

fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

pub fn read_band(path: &Path) -> Result<BandRead> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);

    let nodata: Option<f32> = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok());
    let transform = read_transform(&mut decoder);

    let mut data = to_f32(decoder.read_image()?)?;
    if data.len() != rows * cols {
        return Err(Error::Processing(format!(
            "{}: expected {} samples for {}x{}, found {} (multi-band files are not supported)",
            path.display(),
            rows * cols,
            cols,
            rows,
            data.len()
        )));
    }
    if let Some(nd) = nodata.filter(|v| !v.is_nan()) {
        for v in &mut data {
            if *v == nd {
                *v = f32::NAN;
            }
        }
    }
    debug!("Read {} ({}x{}, nodata {:?})", path.display(), cols, rows, nodata);
    let data = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Processing(e.to_string()))?;
    Ok(BandRead { data, transform })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::raster::Grid;
    use crate::io::writers::tiff::{write_tiff_f32, write_tiff_u8};
    use ndarray::array;

    #[test]
    fn float_band_keeps_values_and_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.tif");
        let grid = Grid::new(2, 2, GeoTransform::new(500.0, 1000.0, 10.0, -10.0));
        write_tiff_f32(&path, &array![[1.5, f32::NAN], [-2.0, 3.0]], &grid).unwrap();
        let read = read_band(&path).unwrap();
        assert_eq!(read.data[[0, 0]], 1.5);
        assert!(read.data[[0, 1]].is_nan());
        assert_eq!(read.transform, Some(grid.transform));
    }

    #[test]
    fn u8_nodata_becomes_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tif");
        let grid = Grid::new(1, 2, GeoTransform::default());
        write_tiff_u8(&path, &array![[7u8, 255]], &grid, 255).unwrap();
        let read = read_band(&path).unwrap();
        assert_eq!(read.data[[0, 0]], 7.0);
        assert!(read.data[[0, 1]].is_nan());
    }
}
