use std::io::Write;
use anyhow::{Context, Result};

use crate::raster::Raster;

const MAGIC_NUMBER: &[u8] = b"BM";
const FILE_HEADER_SIZE: u32 = 14;
const INFO_HEADER_SIZE: u32 = 40;
const BITS_PER_PIXEL: u16 = 24;
// 72 dpi
const PIXELS_PER_METER: i32 = 2835;

/// Bytes per pixel row, rows are padded to a multiple of four.
fn row_stride(width: usize) -> usize {
    (width * 3 + 3) & !3
}

/// Writes `raster` as an uncompressed 24-bit BMP and returns the number of
/// bytes written.
pub fn write_bmp<W: Write>(writer: &mut W, raster: &Raster) -> Result<u64> {
    let stride = row_stride(raster.width());
    let image_size = u32::try_from(stride * raster.height()).context("image is too large for a BMP file")?;
    let width = i32::try_from(raster.width()).context("image is too wide for a BMP file")?;
    let height = i32::try_from(raster.height()).context("image is too tall for a BMP file")?;
    let pixel_offset = FILE_HEADER_SIZE + INFO_HEADER_SIZE;
    let file_size = pixel_offset
        .checked_add(image_size)
        .context("image is too large for a BMP file")?;

    // file header
    writer.write_all(MAGIC_NUMBER)?;
    writer.write_all(&file_size.to_le_bytes())?;
    writer.write_all(&[0; 4])?;
    writer.write_all(&pixel_offset.to_le_bytes())?;

    // BITMAPINFOHEADER, positive height stores rows bottom-up
    writer.write_all(&INFO_HEADER_SIZE.to_le_bytes())?;
    writer.write_all(&width.to_le_bytes())?;
    writer.write_all(&height.to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?;
    writer.write_all(&BITS_PER_PIXEL.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&image_size.to_le_bytes())?;
    writer.write_all(&PIXELS_PER_METER.to_le_bytes())?;
    writer.write_all(&PIXELS_PER_METER.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;

    let mut row_buffer = Vec::with_capacity(stride);
    for row in raster.rows().rev() {
        row_buffer.clear();
        for pixel in row {
            row_buffer.extend_from_slice(&[pixel.blue, pixel.green, pixel.red]);
        }
        row_buffer.resize(stride, 0);
        writer.write_all(&row_buffer)?;
    }

    Ok(file_size.into())
}
