//! Frame source backed by the `tiff` crate.
//!
//! Captured pages usually reach the CLI as single-page grayscale TIFF files.
//! This reader turns them into [`RasterFrame`]s, reducing 16-bit gray and
//! 8-bit RGB input to 8-bit luminance so the rest of the pipeline only ever
//! sees one pixel format.

use std::io::Cursor;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::debug;

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::frame::reader::FrameSource;
use crate::xtc_pipeline::frame::types::RasterFrame;

/// Reads 8/16-bit grayscale or 8-bit RGB TIFF images.
pub struct TiffFrameReader;

impl FrameSource for TiffFrameReader {
    fn read_frame(&self, data: &[u8]) -> Result<RasterFrame> {
        debug!("Decoding TIFF frame, {} bytes", data.len());

        let mut decoder =
            Decoder::new(Cursor::new(data)).map_err(|e| XtcError::DecodeError(e.to_string()))?;
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| XtcError::DecodeError(e.to_string()))?;
        let color = decoder
            .colortype()
            .map_err(|e| XtcError::DecodeError(e.to_string()))?;
        let image = decoder
            .read_image()
            .map_err(|e| XtcError::DecodeError(e.to_string()))?;

        let pixels: Vec<u8> = match (color, image) {
            (ColorType::Gray(8), DecodingResult::U8(values)) => values,
            // Keep the high byte of each 16-bit sample
            (ColorType::Gray(16), DecodingResult::U16(values)) => {
                values.iter().map(|&v| (v >> 8) as u8).collect()
            }
            // Integer Rec.601 luma, weights sum to 256
            (ColorType::RGB(8), DecodingResult::U8(values)) => values
                .chunks_exact(3)
                .map(|px| ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8) as u8)
                .collect(),
            (other, _) => {
                return Err(XtcError::UnsupportedFormat(format!(
                    "TIFF color type {:?} is not supported for page frames",
                    other
                )));
            }
        };

        debug!("Decoded frame: {}x{}", width, height);

        Ok(RasterFrame::new(width as usize, height as usize, pixels))
    }
}
