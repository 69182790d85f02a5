//! XTG monochrome packing: row-major, MSB = leftmost pixel, 1 = white.

/// Packs 0/1 levels. Rows end on a byte boundary; spare bits stay zero.
pub(crate) fn pack(width: usize, height: usize, levels: &[u8]) -> Vec<u8> {
    let row_bytes = width.div_ceil(8);
    let mut out = vec![0u8; row_bytes * height];

    for (y, row) in levels.chunks_exact(width.max(1)).take(height).enumerate() {
        let base = y * row_bytes;
        for (x, &level) in row.iter().enumerate() {
            if level != 0 {
                out[base + x / 8] |= 0x80 >> (x % 8);
            }
        }
    }

    out
}

pub(crate) fn unpack(width: usize, height: usize, payload: &[u8]) -> Vec<u8> {
    let row_bytes = width.div_ceil(8);
    let mut out = Vec::with_capacity(width * height);

    for y in 0..height {
        let row = &payload[y * row_bytes..(y + 1) * row_bytes];
        for x in 0..width {
            out.push((row[x / 8] >> (7 - x % 8)) & 1);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_is_leftmost_pixel() {
        let levels = [1, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(pack(8, 1, &levels), vec![0b1000_0001]);
    }

    #[test]
    fn test_partial_row_is_zero_padded() {
        // 10 pixels wide: second byte keeps only its two top bits
        let levels = [1u8; 20];
        assert_eq!(pack(10, 2, &levels), vec![0xFF, 0xC0, 0xFF, 0xC0]);
    }

    #[test]
    fn test_unpack_inverts_pack() {
        let levels: Vec<u8> = (0..33).map(|i| (i % 3 == 0) as u8).collect();
        let packed = pack(11, 3, &levels);
        assert_eq!(unpack(11, 3, &packed), levels);
    }
}
