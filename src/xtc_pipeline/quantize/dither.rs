//! Deterministic error-diffusion quantizer.
//!
//! Floyd-Steinberg diffusion in integer fixed point. Pixels are tracked in
//! sixteenths of an 8-bit gray step so that every intermediate value is an
//! exact integer and the output never depends on floating point behaviour.
//! Only the current and next row of diffused error are kept, so memory is
//! proportional to the frame width.
//!
//! Level selection picks the nearest level to the working value. A value that
//! sits exactly halfway between two levels resolves to the lighter one.

use tracing::debug;

use crate::xtc_pipeline::common::error::{Result, XtcError};
use crate::xtc_pipeline::frame::RasterFrame;
use crate::xtc_pipeline::quantize::types::{Levels, QuantizedRaster};

/// Fixed-point units per 8-bit gray step.
const SCALE: i32 = 16;

/// Working value of pure white.
const WHITE: i32 = 255 * SCALE;

/// Upper bound of the dither strength percentage.
pub const MAX_DITHER_STRENGTH: u8 = 100;

/// Reduces 8-bit frames to a fixed number of gray levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantizer {
    levels: Levels,
    strength: u8,
    invert: bool,
}

impl Quantizer {
    pub fn new(levels: Levels, dither_strength: u8, invert: bool) -> Result<Self> {
        if dither_strength > MAX_DITHER_STRENGTH {
            return Err(XtcError::InvalidOption(format!(
                "dither strength must be 0-100%, got {}%",
                dither_strength
            )));
        }
        Ok(Self {
            levels,
            strength: dither_strength,
            invert,
        })
    }

    pub fn levels(&self) -> Levels {
        self.levels
    }

    pub fn quantize(&self, frame: &RasterFrame) -> QuantizedRaster {
        debug!(
            width = frame.width,
            height = frame.height,
            levels = self.levels.count(),
            strength = self.strength,
            invert = self.invert,
            "Quantizing frame"
        );

        let width = frame.width;
        let strength = self.strength as i32;
        let mut data = Vec::with_capacity(frame.data.len());

        // One guard cell on each side absorbs error pushed off the edges
        let mut current = vec![0i32; width + 2];
        let mut next = vec![0i32; width + 2];

        for row in frame.data.chunks_exact(width.max(1)).take(frame.height) {
            for (x, &pixel) in row.iter().enumerate() {
                let luminance = if self.invert { 255 - pixel } else { pixel };
                let working = (luminance as i32 * SCALE + current[x + 1]).clamp(0, WHITE);
                let level = nearest_level(working, self.levels);
                data.push(level);

                if strength == 0 {
                    continue;
                }

                let error = (working - level_value(level, self.levels)) * strength / 100;
                let right = error * 7 / 16;
                let down_left = error * 3 / 16;
                let down = error * 5 / 16;
                let down_right = error - right - down_left - down;

                current[x + 2] += right;
                next[x] += down_left;
                next[x + 1] += down;
                next[x + 2] += down_right;
            }

            std::mem::swap(&mut current, &mut next);
            next.fill(0);
        }

        QuantizedRaster::new(frame.width, frame.height, self.levels, data)
    }
}

/// Convenience wrapper around [`Quantizer`].
pub fn quantize(frame: &RasterFrame, levels: Levels, dither_strength: u8, invert: bool) -> Result<QuantizedRaster> {
    Ok(Quantizer::new(levels, dither_strength, invert)?.quantize(frame))
}

/// Working value represented by `level`.
pub(crate) fn level_value(level: u8, levels: Levels) -> i32 {
    level as i32 * WHITE / levels.max_level() as i32
}

/// Nearest level to a working value in `0..=WHITE`; midpoints round up.
pub(crate) fn nearest_level(working: i32, levels: Levels) -> u8 {
    let steps = levels.max_level() as i32;
    ((2 * working * steps + WHITE) / (2 * WHITE)) as u8
}

/// Nearest 8-bit gray for a level, used to turn decoded pages back into
/// viewable rasters.
pub fn level_to_gray(level: u8, levels: Levels) -> u8 {
    (level_value(level, levels) / SCALE) as u8
}
