//! Conversion session configuration and bookkeeping types

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::xtc_pipeline::common::DevicePreset;
use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::container::ReadDirection;
use crate::xtc_pipeline::page::PageFormat;
use crate::xtc_pipeline::quantize::MAX_DITHER_STRENGTH;

/// Identifies one book's conversion. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session lifecycle. `Closed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no page push attempted yet
    Open,
    /// Accepting pages
    Receiving,
    /// Writing the container
    Finalizing,
    /// Container written
    Closed,
    /// Given up; any partial output removed
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

/// Shared flag another thread can raise to abort a session between pushes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters exposed for tests and progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub pages_received: usize,
    pub bytes_written: u64,
}

/// Configuration for converting one book
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Screen geometry every page must match
    pub preset: DevicePreset,
    /// Page codec for the whole book
    pub format: PageFormat,
    /// Error diffusion strength, 0 (plain threshold) to 100
    pub dither_strength: u8,
    /// Invert the tone curve before quantizing (dark mode)
    pub invert: bool,
    /// Page turn direction stored in the container header
    pub read_direction: ReadDirection,
    /// Number of pages the caller intends to send, if known
    pub expected_pages: Option<usize>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preset: DevicePreset::X4,
            format: PageFormat::Mono,
            dither_strength: 50,
            invert: false,
            read_direction: ReadDirection::LeftToRight,
            expected_pages: None,
        }
    }
}

impl ConversionConfig {
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.preset.check()?;
        if self.dither_strength > MAX_DITHER_STRENGTH {
            return Err(XtcError::InvalidOption(format!(
                "dither strength must be 0-100%, got {}%",
                self.dither_strength
            )));
        }
        Ok(())
    }
}

/// Builder for ConversionConfig
#[derive(Default)]
pub struct ConversionConfigBuilder {
    preset: Option<DevicePreset>,
    format: Option<PageFormat>,
    dither_strength: Option<u8>,
    invert: Option<bool>,
    read_direction: Option<ReadDirection>,
    expected_pages: Option<Option<usize>>,
}

impl ConversionConfigBuilder {
    pub fn preset(mut self, preset: DevicePreset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn format(mut self, format: PageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn dither_strength(mut self, percent: u8) -> Self {
        self.dither_strength = Some(percent);
        self
    }

    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    pub fn read_direction(mut self, direction: ReadDirection) -> Self {
        self.read_direction = Some(direction);
        self
    }

    pub fn expected_pages(mut self, pages: Option<usize>) -> Self {
        self.expected_pages = Some(pages);
        self
    }

    pub fn build(self) -> ConversionConfig {
        let default = ConversionConfig::default();
        ConversionConfig {
            preset: self.preset.unwrap_or(default.preset),
            format: self.format.unwrap_or(default.format),
            dither_strength: self.dither_strength.unwrap_or(default.dither_strength),
            invert: self.invert.unwrap_or(default.invert),
            read_direction: self.read_direction.unwrap_or(default.read_direction),
            expected_pages: self.expected_pages.unwrap_or(default.expected_pages),
        }
    }
}
