//! Raster frame types

/// One page of 8-bit grayscale pixels as delivered by the capture side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    /// Width of the frame in pixels
    pub width: usize,
    /// Height of the frame in pixels
    pub height: usize,
    /// Row-major luminance, 0 = black, 255 = white, one byte per pixel
    pub data: Vec<u8>,
}

impl RasterFrame {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// A frame with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self::new(width, height, vec![value; width * height])
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width * self.height
    }
}
