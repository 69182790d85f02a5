//! Quantized raster types

/// Number of gray levels a page format can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Levels {
    /// Black and white
    Two,
    /// Black, dark gray, light gray, white
    Four,
}

impl Levels {
    pub fn count(&self) -> u8 {
        match self {
            Levels::Two => 2,
            Levels::Four => 4,
        }
    }

    pub fn max_level(&self) -> u8 {
        self.count() - 1
    }
}

/// Raster reduced to a page format's level count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedRaster {
    /// Width of the raster in pixels
    pub width: usize,
    /// Height of the raster in pixels
    pub height: usize,
    /// Level count every entry of `data` is drawn from
    pub levels: Levels,
    /// Row-major levels, 0 = black up to `levels.max_level()` = white
    pub data: Vec<u8>,
}

impl QuantizedRaster {
    pub fn new(width: usize, height: usize, levels: Levels, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            levels,
            data,
        }
    }

    /// True when the buffer length matches the geometry and every entry is a
    /// valid level.
    pub fn is_well_formed(&self) -> bool {
        let max = self.levels.max_level();
        self.data.len() == self.width * self.height && self.data.iter().all(|&l| l <= max)
    }
}
