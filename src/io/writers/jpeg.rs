use jpeg_encoder::{ColorType, Encoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};

fn check_dims(cols: usize, rows: usize) -> Result<()> {
    if cols == 0 || rows == 0 || cols > u16::MAX as usize || rows > u16::MAX as usize {
        return Err(Error::InvalidArgument {
            arg: "jpeg dimensions",
            value: format!("{}x{}", cols, rows),
        });
    }
    Ok(())
}

pub fn write_gray_jpeg(output: &Path, cols: usize, rows: usize, data: &[u8]) -> Result<()> {
    check_dims(cols, rows)?;
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, 100);
    encoder
        .encode(data, cols as u16, rows as u16, ColorType::Luma)
        .map_err(Error::external)?;
    Ok(())
}

pub fn write_rgb_jpeg(output: &Path, cols: usize, rows: usize, rgb_data: &[u8]) -> Result<()> {
    check_dims(cols, rows)?;
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let encoder = Encoder::new(&mut writer, 100);
    encoder
        .encode(rgb_data, cols as u16, rows as u16, ColorType::Rgb)
        .map_err(Error::external)?;
    Ok(())
}
