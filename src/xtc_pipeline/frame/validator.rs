use tracing::warn;

use crate::xtc_pipeline::common::{DevicePreset, Result, XtcError};
use crate::xtc_pipeline::frame::types::RasterFrame;

/// Rejects frames that must not enter the pipeline. Holds no mutable state.
#[derive(Debug, Clone, Copy)]
pub struct FrameValidator {
    preset: DevicePreset,
}

impl FrameValidator {
    pub fn new(preset: DevicePreset) -> Self {
        Self { preset }
    }

    /// Checks `frame` against the preset and `page_index` against the next
    /// index the session expects.
    pub fn validate(&self, expected_index: usize, page_index: usize, frame: &RasterFrame) -> Result<()> {
        let (width, height) = self.preset.dimensions();

        if frame.width != width || frame.height != height || !frame.is_well_formed() {
            warn!(
                page = page_index,
                width = frame.width,
                height = frame.height,
                bytes = frame.data.len(),
                "Rejecting frame with wrong geometry"
            );
            return Err(XtcError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: frame.width,
                actual_height: frame.height,
            });
        }

        if page_index != expected_index {
            warn!(expected = expected_index, got = page_index, "Rejecting out-of-order page");
            return Err(XtcError::OutOfOrderPage {
                expected: expected_index,
                got: page_index,
            });
        }

        Ok(())
    }
}
