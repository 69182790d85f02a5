//! Target device screen geometries

use serde::{Deserialize, Serialize};

use crate::xtc_pipeline::common::error::{Result, XtcError};

/// A fixed screen resolution that every page of a session is encoded for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
    /// Xteink X4, 480x800 portrait.
    #[default]
    X4,
    /// Xteink X3, 528x792 portrait.
    X3,
    /// Any other portrait or landscape geometry.
    Custom { width: u16, height: u16 },
}

impl DevicePreset {
    pub fn width(&self) -> usize {
        match self {
            DevicePreset::X4 => 480,
            DevicePreset::X3 => 528,
            DevicePreset::Custom { width, .. } => *width as usize,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            DevicePreset::X4 => 800,
            DevicePreset::X3 => 792,
            DevicePreset::Custom { height, .. } => *height as usize,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Rejects zero-sized custom presets.
    pub fn check(&self) -> Result<()> {
        if self.width() == 0 || self.height() == 0 {
            return Err(XtcError::InvalidOption(format!(
                "device preset must have non-zero dimensions, got {}x{}",
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }
}
