use super::error::DecodeError;
use crate::raster::{Raster, Region, Rgb};

/// Writes decoded color indices into a region of a raster, left to right and
/// top to bottom.
pub(crate) struct PixelSink<'a> {
    raster: &'a mut Raster,
    palette: &'a [Rgb],
    transparent_index: Option<u8>,
    region: Region,
    column: usize,
    row: usize,
}

impl<'a> PixelSink<'a> {
    /// The sink starts out covering the whole raster.
    pub(crate) fn new(raster: &'a mut Raster, palette: &'a [Rgb]) -> Self {
        let region = Region {
            left: 0,
            top: 0,
            width: raster.width(),
            height: raster.height(),
        };

        Self {
            raster,
            palette,
            transparent_index: None,
            region,
            column: 0,
            row: 0,
        }
    }

    /// Pixels with this index leave the raster untouched.
    pub(crate) fn with_transparent_index(mut self, index: Option<u8>) -> Self {
        self.transparent_index = index;
        self
    }

    pub(crate) fn configure(&mut self, left: usize, top: usize, width: usize, height: usize) -> Result<(), DecodeError> {
        let region = Region { left, top, width, height };
        if !self.raster.contains(&region) {
            return Err(DecodeError::malformed(format!(
                "image region {region:?} does not fit into a {}x{} raster",
                self.raster.width(),
                self.raster.height()
            )));
        }

        self.region = region;
        self.column = left;
        self.row = top;
        Ok(())
    }

    pub(crate) fn write(&mut self, index: u8) -> Result<(), DecodeError> {
        let color = *self.palette.get(usize::from(index)).ok_or_else(|| {
            DecodeError::malformed(format!(
                "color index {index} is outside a color table of {} entries",
                self.palette.len()
            ))
        })?;

        if self.transparent_index != Some(index) {
            self.raster.set(self.column, self.row, color);
        }
        self.advance();
        Ok(())
    }

    pub(crate) fn advance(&mut self) {
        let Region { left, top, width, height } = self.region;

        self.column += 1;
        if self.column == left + width {
            self.column = left;
            self.row += 1;
            if self.row == top + height {
                self.row = top;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> (usize, usize) {
        (self.column, self.row)
    }
}
