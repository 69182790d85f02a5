//! XTH four-level packing.
//!
//! The panel scans vertically: pixels are stored column by column starting
//! from the rightmost column, eight vertically adjacent pixels per byte with
//! the topmost pixel in the MSB. Each pixel's device value is split across
//! two bit planes of `width * ceil(height / 8)` bytes; the first plane holds
//! the high bit, the second the low bit.
//!
//! Device values do not run linearly from white to black: 0 is white, 1 dark
//! gray, 2 light gray and 3 black.

/// Logical level (0 black .. 3 white) to device value.
pub const LEVEL_TO_DEVICE: [u8; 4] = [3, 1, 2, 0];

/// Device value to logical level.
pub const DEVICE_TO_LEVEL: [u8; 4] = [3, 1, 2, 0];

fn column_bytes(height: usize) -> usize {
    height.div_ceil(8)
}

/// Byte index within a plane and bit mask for pixel (x, y).
fn locate(width: usize, height: usize, x: usize, y: usize) -> (usize, u8) {
    let column = width - 1 - x;
    (column * column_bytes(height) + y / 8, 0x80 >> (y % 8))
}

pub(crate) fn pack(width: usize, height: usize, levels: &[u8]) -> Vec<u8> {
    let plane_size = width * column_bytes(height);
    let mut out = vec![0u8; plane_size * 2];
    let (high, low) = out.split_at_mut(plane_size);

    for (y, row) in levels.chunks_exact(width.max(1)).take(height).enumerate() {
        for (x, &level) in row.iter().enumerate() {
            let device = LEVEL_TO_DEVICE[(level & 0b11) as usize];
            let (index, mask) = locate(width, height, x, y);
            if device & 0b10 != 0 {
                high[index] |= mask;
            }
            if device & 0b01 != 0 {
                low[index] |= mask;
            }
        }
    }

    out
}

pub(crate) fn unpack(width: usize, height: usize, payload: &[u8]) -> Vec<u8> {
    let plane_size = width * column_bytes(height);
    let (high, low) = payload.split_at(plane_size);
    let mut out = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let (index, mask) = locate(width, height, x, y);
            let hi = (high[index] & mask != 0) as usize;
            let lo = (low[index] & mask != 0) as usize;
            out.push(DEVICE_TO_LEVEL[(hi << 1) | lo]);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_swaps_middle_levels() {
        // A naive mapping would be [3, 2, 1, 0]
        assert_eq!(LEVEL_TO_DEVICE[0], 3);
        assert_eq!(LEVEL_TO_DEVICE[1], 1);
        assert_eq!(LEVEL_TO_DEVICE[2], 2);
        assert_eq!(LEVEL_TO_DEVICE[3], 0);
        for level in 0..4u8 {
            assert_eq!(DEVICE_TO_LEVEL[LEVEL_TO_DEVICE[level as usize] as usize], level);
        }
    }

    #[test]
    fn test_columns_run_right_to_left() {
        // 2x8 page: left column black, right column white
        let mut levels = Vec::new();
        for _ in 0..8 {
            levels.extend_from_slice(&[0, 3]);
        }
        let packed = pack(2, 8, &levels);
        // Byte 0 of each plane is the rightmost column (white = device 0),
        // byte 1 the leftmost (black = device 3)
        assert_eq!(packed, vec![0x00, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn test_topmost_pixel_is_msb_and_planes_split_bits() {
        // 1x2 page: top pixel dark gray (device 1), bottom light gray (device 2)
        let packed = pack(1, 2, &[1, 2]);
        assert_eq!(packed, vec![0b0100_0000, 0b1000_0000]);
    }

    #[test]
    fn test_unpack_inverts_pack() {
        let levels: Vec<u8> = (0..5 * 11).map(|i| (i * 7 % 4) as u8).collect();
        let packed = pack(5, 11, &levels);
        assert_eq!(packed.len(), 2 * 5 * 2);
        assert_eq!(unpack(5, 11, &packed), levels);
    }
}
