//! JSON book manifest read by the command line tool.
//!
//! ```json
//! {
//!   "metadata": { "title": "T", "author": "A" },
//!   "chapters": [ { "title": "Ch1", "start_page": 0 } ],
//!   "device": "x4",
//!   "format": "gray4",
//!   "dither": 50
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::xtc_pipeline::common::DevicePreset;
use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::{ChapterEntry, MetadataRecord, ReadDirection};
use crate::xtc_pipeline::page::PageFormat;
use crate::xtc_pipeline::session::types::ConversionConfigBuilder;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookManifest {
    pub metadata: MetadataRecord,
    pub chapters: Vec<ChapterEntry>,
    pub device: Option<DevicePreset>,
    pub format: Option<PageFormat>,
    pub dither: Option<u8>,
    pub invert: Option<bool>,
    pub read_direction: Option<ReadDirection>,
}

impl BookManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| XtcError::InvalidManifest(e.to_string()))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            XtcError::InputReadError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Applies the options the manifest sets, leaving the rest untouched.
    pub fn apply(&self, mut builder: ConversionConfigBuilder) -> ConversionConfigBuilder {
        if let Some(device) = self.device {
            builder = builder.preset(device);
        }
        if let Some(format) = self.format {
            builder = builder.format(format);
        }
        if let Some(dither) = self.dither {
            builder = builder.dither_strength(dither);
        }
        if let Some(invert) = self.invert {
            builder = builder.invert(invert);
        }
        if let Some(direction) = self.read_direction {
            builder = builder.read_direction(direction);
        }
        builder
    }
}
