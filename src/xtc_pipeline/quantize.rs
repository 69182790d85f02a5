//! Quantization module
//!
//! Reduces 8-bit grayscale frames to the two or four levels a page format
//! can show.

mod dither;
pub mod types;

pub use dither::{MAX_DITHER_STRENGTH, Quantizer, level_to_gray, quantize};
pub use types::{Levels, QuantizedRaster};
