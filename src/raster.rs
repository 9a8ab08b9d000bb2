use anyhow::{Context, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Rgb {
    pub(crate) const BLACK: Rgb = Rgb { red: 0, green: 0, blue: 0 };

    pub(crate) fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Splits a GIF color table (packed RGB triples) into colors.
    pub(crate) fn from_table(table: &[u8]) -> Box<[Rgb]> {
        table
            .chunks_exact(3)
            .map(|triple| Rgb::new(triple[0], triple[1], triple[2]))
            .collect()
    }
}

/// A rectangle inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) left: usize,
    pub(crate) top: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl Region {
    pub(crate) fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Row-major RGB pixel buffer, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Raster {
    /// Fails instead of aborting when the buffer can not be allocated.
    pub(crate) fn new(width: usize, height: usize, fill: Rgb) -> Result<Self> {
        let len = width
            .checked_mul(height)
            .with_context(|| format!("a {width}x{height} raster has too many pixels"))?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .with_context(|| format!("can not allocate a {width}x{height} raster"))?;
        pixels.resize(len, fill);

        Ok(Self { width, height, pixels })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn contains(&self, region: &Region) -> bool {
        region.left + region.width <= self.width && region.top + region.height <= self.height
    }

    #[cfg(test)]
    pub(crate) fn get(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * self.width + x]
    }

    pub(crate) fn set(&mut self, x: usize, y: usize, color: Rgb) {
        self.pixels[y * self.width + x] = color;
    }

    pub(crate) fn fill(&mut self, region: &Region, color: Rgb) {
        debug_assert!(self.contains(region));
        for y in region.top..region.top + region.height {
            let start = y * self.width + region.left;
            self.pixels[start..start + region.width].fill(color);
        }
    }

    /// Rows from top to bottom.
    pub(crate) fn rows(&self) -> impl DoubleEndedIterator<Item = &[Rgb]> {
        // chunks_exact panics on zero, an empty raster has no rows anyway
        self.pixels.chunks_exact(self.width.max(1))
    }

    #[cfg(test)]
    pub(crate) fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}
