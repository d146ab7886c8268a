// SPDX-License-Identifier: MIT

//! Bitmap operations on byte slices used as allocation maps.

/// Extension trait for bitmap operations on byte slices.
///
/// Bits are numbered MSB-first within each byte, the order used by the
/// OS-9 allocation map:
/// - Bit 0 is the MSB of byte 0
/// - Bit 7 is the LSB of byte 0
/// - Bit 8 is the MSB of byte 1, etc.
pub trait BitmapOps {
    /// Sets or clears a bit at the given position.
    ///
    /// Does nothing if `bit` is out of bounds.
    fn set_bit(&mut self, bit: usize, value: bool);

    /// Returns `false` if `bit` is out of bounds.
    fn get_bit(&self, bit: usize) -> bool;

    /// Counts the number of set bits in `[start, end)`.
    fn count_ones_in_range(&self, start: usize, end: usize) -> usize;

    /// Finds the first zero bit in `[start, end)`.
    fn find_first_zero(&self, start: usize, end: usize) -> Option<usize>;

    /// Sets or clears `count` bits starting at `start`.
    fn set_range(&mut self, start: usize, count: usize, value: bool) {
        for bit in start..start + count {
            self.set_bit(bit, value);
        }
    }
}

#[inline(always)]
const fn mask(bit: usize) -> u8 {
    0x80 >> (bit % 8)
}

impl BitmapOps for [u8] {
    #[inline]
    fn set_bit(&mut self, bit: usize, value: bool) {
        if let Some(byte) = self.get_mut(bit / 8) {
            if value {
                *byte |= mask(bit);
            } else {
                *byte &= !mask(bit);
            }
        }
    }

    #[inline]
    fn get_bit(&self, bit: usize) -> bool {
        self.get(bit / 8).is_some_and(|b| b & mask(bit) != 0)
    }

    fn count_ones_in_range(&self, start: usize, end: usize) -> usize {
        (start..end).filter(|&i| self.get_bit(i)).count()
    }

    fn find_first_zero(&self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.len() * 8);
        let mut bit = start;
        while bit < end {
            let byte = self[bit / 8];
            // whole byte in use, jump to the next boundary
            if byte == 0xFF && bit % 8 == 0 {
                bit += 8;
                continue;
            }
            if byte & mask(bit) == 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_bit() {
        let mut bitmap = [0u8; 4];

        bitmap.set_bit(0, true);
        assert!(bitmap.get_bit(0));
        assert_eq!(bitmap[0], 0b1000_0000);

        bitmap.set_bit(7, true);
        assert_eq!(bitmap[0], 0b1000_0001);

        bitmap.set_bit(8, true);
        assert_eq!(bitmap[1], 0b1000_0000);

        bitmap.set_bit(0, false);
        assert!(!bitmap.get_bit(0));
        assert_eq!(bitmap[0], 0b0000_0001);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut bitmap = [0u8; 2];
        bitmap.set_bit(100, true);
        assert_eq!(bitmap, [0, 0]);
        assert!(!bitmap.get_bit(100));
    }

    #[test]
    fn test_find_first_zero() {
        let bitmap = [0xFFu8, 0b1111_1110, 0x00];
        assert_eq!(bitmap.find_first_zero(0, 24), Some(15));
        assert_eq!(bitmap.find_first_zero(16, 24), Some(16));
        assert_eq!(bitmap.find_first_zero(0, 15), None);

        let full = [0xFFu8; 4];
        assert_eq!(full.find_first_zero(0, 32), None);
    }

    #[test]
    fn test_range_ops() {
        let mut bitmap = [0u8; 3];
        bitmap.set_range(4, 8, true);
        assert_eq!(bitmap, [0x0F, 0xF0, 0x00]);
        assert_eq!(bitmap.count_ones_in_range(0, 24), 8);
        assert_eq!(bitmap.count_ones_in_range(0, 6), 2);
    }
}
