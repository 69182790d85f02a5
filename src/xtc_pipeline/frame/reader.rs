use crate::xtc_pipeline::common::error::Result;
use crate::xtc_pipeline::frame::types::RasterFrame;

pub trait FrameSource {
    fn read_frame(&self, data: &[u8]) -> Result<RasterFrame>;
}
