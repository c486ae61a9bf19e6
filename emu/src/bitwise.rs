use std::ops::RangeInclusive;

/// Bit and byte helpers shared by every register decoder.
///
/// Indices count from the least significant bit, ranges are inclusive on
/// both ends (`0..=3` selects the low nibble).
pub trait Bits: Copy {
    const BITS_COUNT: u8;

    fn get_bit(self, bit_idx: u8) -> bool;

    fn set_bit(&mut self, bit_idx: u8, value: bool);

    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    fn set_bits(&mut self, bits_range: RangeInclusive<u8>, value: Self);

    fn get_byte(self, byte_nth: u8) -> u8;

    fn set_byte(&mut self, byte_nth: u8, value: u8);

    /// Sign-extends the lowest `number_of_bits` bits to the full width.
    fn sign_extended(self, number_of_bits: u8) -> Self;

    fn set_bit_on(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, true);
    }

    fn set_bit_off(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, false);
    }
}

macro_rules! impl_bits {
    ($($t:ty),*) => {$(
        impl Bits for $t {
            const BITS_COUNT: u8 = <$t>::BITS as u8;

            #[inline]
            fn get_bit(self, bit_idx: u8) -> bool {
                debug_assert!(bit_idx < Self::BITS_COUNT);
                (self >> bit_idx) & 1 == 1
            }

            #[inline]
            fn set_bit(&mut self, bit_idx: u8, value: bool) {
                debug_assert!(bit_idx < Self::BITS_COUNT);
                let mask: $t = 1 << bit_idx;
                if value {
                    *self |= mask;
                } else {
                    *self &= !mask;
                }
            }

            #[inline]
            fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                let (start, end) = (*bits_range.start(), *bits_range.end());
                debug_assert!(start <= end && end < Self::BITS_COUNT);
                let length = end - start + 1;
                let shifted = self >> start;
                if length == Self::BITS_COUNT {
                    shifted
                } else {
                    shifted & ((1 << length) - 1)
                }
            }

            #[inline]
            fn set_bits(&mut self, bits_range: RangeInclusive<u8>, value: Self) {
                let (start, end) = (*bits_range.start(), *bits_range.end());
                debug_assert!(start <= end && end < Self::BITS_COUNT);
                let length = end - start + 1;
                let mask: $t = if length == Self::BITS_COUNT {
                    <$t>::MAX
                } else {
                    ((1 << length) - 1) << start
                };
                *self = (*self & !mask) | ((value << start) & mask);
            }

            #[inline]
            fn get_byte(self, byte_nth: u8) -> u8 {
                debug_assert!(byte_nth < Self::BITS_COUNT / 8);
                (self >> (byte_nth * 8)) as u8
            }

            #[inline]
            fn set_byte(&mut self, byte_nth: u8, value: u8) {
                debug_assert!(byte_nth < Self::BITS_COUNT / 8);
                let shift = byte_nth * 8;
                let mask: $t = 0xFF << shift;
                *self = (*self & !mask) | (<$t>::from(value) << shift);
            }

            #[inline]
            fn sign_extended(self, number_of_bits: u8) -> Self {
                debug_assert!(number_of_bits > 0 && number_of_bits <= Self::BITS_COUNT);
                let width = u32::from(Self::BITS_COUNT);
                let unused = u32::from(Self::BITS_COUNT - number_of_bits);
                // Park the sign bit at bit 127, then let the arithmetic shift replicate it.
                let top_aligned = i128::from(self << unused) << (128 - width);
                (top_aligned >> (128 - width + unused)) as $t
            }
        }
    )*};
}

impl_bits!(u8, u16, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_get_bit() {
        let b = 0b1_1001_1101_u32;
        assert!(b.get_bit(0));
        assert!(!b.get_bit(1));
        assert!(b.get_bit(2));
        assert!(b.get_bit(8));
        assert!(!b.get_bit(31));
    }

    #[test]
    fn check_set_bit() {
        let mut b = 0b110_0110_u32;
        b.set_bit(0, true);
        b.set_bit(1, true);
        b.set_bit(2, false);
        b.set_bit_off(5);
        b.set_bit_on(31);
        assert_eq!(b, 0x8000_0043);
    }

    #[test]
    fn check_toggle_every_bit_is_not() {
        let original = rand::random::<u32>();
        let mut fin = original;
        for i in 0..32 {
            let bit = fin.get_bit(i);
            fin.set_bit(i, !bit);
        }

        assert_eq!(!original, fin);
    }

    #[test]
    fn check_get_bits() {
        let b = 0b10_1100_1110_u32;
        assert_eq!(b.get_bits(0..=3), 0b1110);
        assert_eq!(b.get_bits(1..=1), 0b1);
        assert_eq!(b.get_bits(4..=7), 0b1100);
        assert_eq!(b.get_bits(8..=9), 0b10);
        assert_eq!(b.get_bits(0..=31), 0b10_1100_1110);
        assert_eq!(b.get_bits(28..=31), 0b0);
        assert_eq!(0xABCD_u16.get_bits(12..=15), 0xA);
    }

    #[test]
    fn check_set_bits() {
        let mut b = 0xFFFF_FFFF_u32;
        b.set_bits(4..=7, 0);
        assert_eq!(b, 0xFFFF_FF0F);
        b.set_bits(0..=31, 0x1234_5678);
        assert_eq!(b, 0x1234_5678);
        let mut h = 0_u16;
        h.set_bits(8..=12, 0xFF);
        assert_eq!(h, 0x1F00);
    }

    #[test]
    fn check_bytes() {
        let mut b: u32 = 0x0122_0448;

        assert_eq!(b.get_byte(0), 0x48);
        assert_eq!(b.get_byte(1), 0x04);
        assert_eq!(b.get_byte(2), 0x22);
        assert_eq!(b.get_byte(3), 0x01);

        b.set_byte(2, 0xAA);
        assert_eq!(b, 0x01AA_0448);
    }

    #[test]
    #[should_panic]
    fn get_byte_out_of_range_panics() {
        0_u16.get_byte(2);
    }

    #[test]
    fn check_sign_extended() {
        assert_eq!(0b1001_u32.sign_extended(4) as i32, -7);
        assert_eq!(0b0111_u32.sign_extended(4), 7);
        assert_eq!(0x80_u16.sign_extended(8), 0xFF80);
        assert_eq!(0x00FF_FFFE_u32.sign_extended(24), 0xFFFF_FFFE);
        assert_eq!(0x8000_0000_u32.sign_extended(32), 0x8000_0000);
    }
}
