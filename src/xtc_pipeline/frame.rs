//! Page frame input module
//!
//! Raster frames as delivered by the capture side, the validator that guards
//! the pipeline entrance, and a TIFF-backed frame source.

mod reader;
mod tiff_reader;
mod validator;
pub mod types;

pub use reader::FrameSource;
pub use tiff_reader::TiffFrameReader;
pub use types::RasterFrame;
pub use validator::FrameValidator;
