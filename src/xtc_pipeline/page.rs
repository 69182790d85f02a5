//! Page codec module
//!
//! Packs quantized rasters into XTG (monochrome) and XTH (four-level) page
//! bitmaps and unpacks them again.

mod encoder;
mod xt_page_encoder;
mod xtg;
mod xth;
pub mod types;

pub use encoder::PageEncoder;
pub use types::{
    EncodedPage, PAGE_HEADER_SIZE, PageFormat, PageHeader, XTG_MAGIC, XTH_MAGIC, payload_checksum,
};
pub use xt_page_encoder::XtPageEncoder;
pub use xth::{DEVICE_TO_LEVEL, LEVEL_TO_DEVICE};
