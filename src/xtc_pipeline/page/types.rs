//! Page codec types and the 22-byte page header

use std::io::Write;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::quantize::Levels;

/// Size of the header in front of every page payload.
pub const PAGE_HEADER_SIZE: usize = 22;

/// `XTG\0` little-endian.
pub const XTG_MAGIC: u32 = 0x0047_5458;
/// `XTH\0` little-endian.
pub const XTH_MAGIC: u32 = 0x0048_5458;

/// Bitmap codec of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    /// XTG: 1 bit per pixel, row-major
    Mono,
    /// XTH: 2 bits per pixel in two column-major bit planes
    Gray4,
}

impl PageFormat {
    pub fn tag(&self) -> u32 {
        match self {
            PageFormat::Mono => XTG_MAGIC,
            PageFormat::Gray4 => XTH_MAGIC,
        }
    }

    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            XTG_MAGIC => Ok(PageFormat::Mono),
            XTH_MAGIC => Ok(PageFormat::Gray4),
            other => Err(XtcError::UnsupportedFormat(format!(
                "page format tag {:#010x}",
                other
            ))),
        }
    }

    pub fn levels(&self) -> Levels {
        match self {
            PageFormat::Mono => Levels::Two,
            PageFormat::Gray4 => Levels::Four,
        }
    }

    /// Payload bytes for a page of the given size.
    pub fn payload_size(&self, width: usize, height: usize) -> usize {
        match self {
            PageFormat::Mono => width.div_ceil(8) * height,
            PageFormat::Gray4 => 2 * width * height.div_ceil(8),
        }
    }
}

/// Fixed header in front of every page payload. All fields little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub format: PageFormat,
    pub width: u16,
    pub height: u16,
    pub color_mode: u8,
    pub compression: u8,
    pub payload_size: u32,
    /// Leading 8 bytes of the payload's MD5 digest
    pub checksum: [u8; 8],
}

impl PageHeader {
    pub fn to_bytes(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut out = [0u8; PAGE_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.format.tag().to_le_bytes());
        out[4..6].copy_from_slice(&self.width.to_le_bytes());
        out[6..8].copy_from_slice(&self.height.to_le_bytes());
        out[8] = self.color_mode;
        out[9] = self.compression;
        out[10..14].copy_from_slice(&self.payload_size.to_le_bytes());
        out[14..22].copy_from_slice(&self.checksum);
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(XtcError::CorruptContainer(format!(
                "page header needs {} bytes, got {}",
                PAGE_HEADER_SIZE,
                data.len()
            )));
        }

        let format = PageFormat::from_tag(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))?;
        let mut checksum = [0u8; 8];
        checksum.copy_from_slice(&data[14..22]);

        Ok(Self {
            format,
            width: u16::from_le_bytes([data[4], data[5]]),
            height: u16::from_le_bytes([data[6], data[7]]),
            color_mode: data[8],
            compression: data[9],
            payload_size: u32::from_le_bytes([data[10], data[11], data[12], data[13]]),
            checksum,
        })
    }

    /// Payload size implied by the format and dimensions.
    pub fn expected_payload_size(&self) -> usize {
        self.format
            .payload_size(self.width as usize, self.height as usize)
    }
}

/// Truncated MD5 stored in page headers.
pub fn payload_checksum(payload: &[u8]) -> [u8; 8] {
    let digest = Md5::digest(payload);
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// A page header followed by its packed bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    pub header: PageHeader,
    pub payload: Vec<u8>,
}

impl EncodedPage {
    /// Total bytes on disk, header included.
    pub fn len(&self) -> usize {
        PAGE_HEADER_SIZE + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn format(&self) -> PageFormat {
        self.header.format
    }

    pub fn write_to<W: Write + ?Sized>(&self, output: &mut W) -> Result<()> {
        output.write_all(&self.header.to_bytes())?;
        output.write_all(&self.payload)?;
        Ok(())
    }
}
