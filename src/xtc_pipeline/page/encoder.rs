use crate::xtc_pipeline::common::error::Result;
use crate::xtc_pipeline::page::types::{EncodedPage, PageFormat};
use crate::xtc_pipeline::quantize::QuantizedRaster;

pub trait PageEncoder {
    fn encode(&self, raster: &QuantizedRaster, format: PageFormat) -> Result<EncodedPage>;
    fn decode(&self, page: &EncodedPage) -> Result<QuantizedRaster>;
}
