//! Page encoder for the XTG and XTH codecs.
//!
//! The bit and byte ordering of each codec lives in its own module; this
//! encoder only checks the raster against the format, builds the header and
//! verifies that the packed payload has exactly the declared size.

use tracing::{debug, error};

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::page::encoder::PageEncoder;
use crate::xtc_pipeline::page::types::{EncodedPage, PageFormat, PageHeader, payload_checksum};
use crate::xtc_pipeline::page::{xtg, xth};
use crate::xtc_pipeline::quantize::QuantizedRaster;

/// Page dimensions are stored as u16.
const MAX_PAGE_DIMENSION: usize = u16::MAX as usize;

pub struct XtPageEncoder;

impl PageEncoder for XtPageEncoder {
    fn encode(&self, raster: &QuantizedRaster, format: PageFormat) -> Result<EncodedPage> {
        debug!(
            width = raster.width,
            height = raster.height,
            format = ?format,
            "Encoding page"
        );

        if raster.levels != format.levels() {
            return Err(XtcError::UnsupportedFormat(format!(
                "{:?} pages need {} levels, raster has {}",
                format,
                format.levels().count(),
                raster.levels.count()
            )));
        }
        if raster.width == 0
            || raster.height == 0
            || raster.width > MAX_PAGE_DIMENSION
            || raster.height > MAX_PAGE_DIMENSION
            || !raster.is_well_formed()
        {
            return Err(XtcError::InvalidOption(format!(
                "cannot encode a {}x{} raster with {} samples",
                raster.width,
                raster.height,
                raster.data.len()
            )));
        }

        let payload = match format {
            PageFormat::Mono => xtg::pack(raster.width, raster.height, &raster.data),
            PageFormat::Gray4 => xth::pack(raster.width, raster.height, &raster.data),
        };

        let declared = format.payload_size(raster.width, raster.height);
        if payload.len() != declared {
            error!(declared, actual = payload.len(), "Packed payload size disagrees with header");
            return Err(XtcError::PayloadSizeMismatch {
                declared,
                actual: payload.len(),
            });
        }

        let header = PageHeader {
            format,
            width: raster.width as u16,
            height: raster.height as u16,
            color_mode: 0,
            compression: 0,
            payload_size: declared as u32,
            checksum: payload_checksum(&payload),
        };

        Ok(EncodedPage { header, payload })
    }

    fn decode(&self, page: &EncodedPage) -> Result<QuantizedRaster> {
        let header = &page.header;
        let width = header.width as usize;
        let height = header.height as usize;
        let expected = header.expected_payload_size();

        if header.payload_size as usize != expected || page.payload.len() != expected {
            return Err(XtcError::PayloadSizeMismatch {
                declared: header.payload_size as usize,
                actual: page.payload.len(),
            });
        }

        let data = match header.format {
            PageFormat::Mono => xtg::unpack(width, height, &page.payload),
            PageFormat::Gray4 => xth::unpack(width, height, &page.payload),
        };

        Ok(QuantizedRaster::new(width, height, header.format.levels(), data))
    }
}
