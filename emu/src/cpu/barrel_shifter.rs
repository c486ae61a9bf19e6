//! # Barrel shifter
//!
//! Computes the shifted second operand of ARM data processing and
//! addressing modes, and Thumb shift instructions.
//!
//! Amounts of zero have special meanings when they come from the
//! instruction itself (`immediate == true`):
//!
//! | Kind | `#0` means                      |
//! |------|---------------------------------|
//! | LSL  | no shift, carry unchanged       |
//! | LSR  | `LSR #32`                       |
//! | ASR  | `ASR #32`                       |
//! | ROR  | `RRX` (rotate through carry)    |
//!
//! A register-specified amount of zero leaves both value and carry untouched.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl From<u32> for ShiftKind {
    fn from(op_code: u32) -> Self {
        match op_code & 0b11 {
            0b00 => Self::Lsl,
            0b01 => Self::Lsr,
            0b10 => Self::Asr,
            _ => Self::Ror,
        }
    }
}

impl std::fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lsl => "LSL",
            Self::Lsr => "LSR",
            Self::Asr => "ASR",
            Self::Ror => "ROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftResult {
    pub value: u32,
    pub carry: bool,
}

/// Shifts `value` by `amount` (only the low 8 bits are significant).
#[must_use]
pub fn shift(
    kind: ShiftKind,
    amount: u32,
    value: u32,
    carry_in: bool,
    immediate: bool,
) -> ShiftResult {
    let amount = amount & 0xFF;

    if amount == 0 && !immediate {
        return ShiftResult {
            value,
            carry: carry_in,
        };
    }

    match kind {
        ShiftKind::Lsl => match amount {
            0 => ShiftResult {
                value,
                carry: carry_in,
            },
            1..=31 => ShiftResult {
                value: value << amount,
                carry: value.get_bit((32 - amount) as u8),
            },
            32 => ShiftResult {
                value: 0,
                carry: value.get_bit(0),
            },
            _ => ShiftResult {
                value: 0,
                carry: false,
            },
        },
        ShiftKind::Lsr => match amount {
            // LSR#0 encodes LSR#32.
            0 | 32 => ShiftResult {
                value: 0,
                carry: value.get_bit(31),
            },
            1..=31 => ShiftResult {
                value: value >> amount,
                carry: value.get_bit((amount - 1) as u8),
            },
            _ => ShiftResult {
                value: 0,
                carry: false,
            },
        },
        ShiftKind::Asr => match amount {
            1..=31 => ShiftResult {
                value: ((value as i32) >> amount) as u32,
                carry: value.get_bit((amount - 1) as u8),
            },
            // ASR#0 encodes ASR#32, larger amounts clamp to 32.
            _ => ShiftResult {
                value: ((value as i32) >> 31) as u32,
                carry: value.get_bit(31),
            },
        },
        ShiftKind::Ror => {
            if amount == 0 {
                // RRX
                return ShiftResult {
                    value: (value >> 1) | (u32::from(carry_in) << 31),
                    carry: value.get_bit(0),
                };
            }

            let rotation = amount & 0x1F;
            if rotation == 0 {
                ShiftResult {
                    value,
                    carry: value.get_bit(31),
                }
            } else {
                ShiftResult {
                    value: value.rotate_right(rotation),
                    carry: value.get_bit((rotation - 1) as u8),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(value: u32, carry: bool) -> ShiftResult {
        ShiftResult { value, carry }
    }

    #[test]
    fn check_lsl() {
        assert_eq!(shift(ShiftKind::Lsl, 0, 0x8000_0001, true, true), r(0x8000_0001, true));
        assert_eq!(shift(ShiftKind::Lsl, 1, 0x8000_0001, false, true), r(0x2, true));
        assert_eq!(shift(ShiftKind::Lsl, 4, 0x0F00_0000, true, true), r(0xF000_0000, false));
        assert_eq!(shift(ShiftKind::Lsl, 32, 0x1, false, false), r(0, true));
        assert_eq!(shift(ShiftKind::Lsl, 33, 0xFFFF_FFFF, true, false), r(0, false));
    }

    #[test]
    fn check_lsr() {
        // Immediate #0 is #32.
        assert_eq!(shift(ShiftKind::Lsr, 0, 0x8000_0000, false, true), r(0, true));
        assert_eq!(shift(ShiftKind::Lsr, 1, 0x3, false, true), r(0x1, true));
        assert_eq!(shift(ShiftKind::Lsr, 32, 0x7FFF_FFFF, true, false), r(0, false));
        assert_eq!(shift(ShiftKind::Lsr, 40, 0xFFFF_FFFF, true, false), r(0, false));
    }

    #[test]
    fn check_asr() {
        assert_eq!(shift(ShiftKind::Asr, 0, 0x8000_0000, false, true), r(0xFFFF_FFFF, true));
        assert_eq!(shift(ShiftKind::Asr, 0, 0x7FFF_FFFF, true, true), r(0, false));
        assert_eq!(shift(ShiftKind::Asr, 4, 0x8000_0010, false, true), r(0xF800_0001, false));
        assert_eq!(shift(ShiftKind::Asr, 100, 0x8000_0000, false, false), r(0xFFFF_FFFF, true));
    }

    #[test]
    fn check_ror_and_rrx() {
        // ROR #0 is RRX: old carry enters bit 31, bit 0 leaves as carry.
        assert_eq!(shift(ShiftKind::Ror, 0, 0x0000_0003, true, true), r(0x8000_0001, true));
        assert_eq!(shift(ShiftKind::Ror, 0, 0x0000_0002, false, true), r(0x0000_0001, false));
        assert_eq!(shift(ShiftKind::Ror, 8, 0x0000_00FF, false, true), r(0xFF00_0000, true));
        assert_eq!(shift(ShiftKind::Ror, 32, 0x8000_0000, false, false), r(0x8000_0000, true));
        assert_eq!(shift(ShiftKind::Ror, 36, 0x0000_00F0, false, false), r(0x0000_000F, false));
    }

    #[test]
    fn check_register_amount_zero_passes_through() {
        for kind in [ShiftKind::Lsl, ShiftKind::Lsr, ShiftKind::Asr, ShiftKind::Ror] {
            assert_eq!(shift(kind, 0, 0xDEAD_BEEF, true, false), r(0xDEAD_BEEF, true));
            assert_eq!(shift(kind, 0x100, 0xDEAD_BEEF, false, false), r(0xDEAD_BEEF, false));
        }
    }

    #[test]
    fn check_random_amounts_match_reference() {
        for _ in 0..256 {
            let value = rand::random::<u32>();
            let amount = rand::random::<u32>() % 31 + 1;
            assert_eq!(shift(ShiftKind::Lsl, amount, value, false, true).value, value << amount);
            assert_eq!(shift(ShiftKind::Lsr, amount, value, false, true).value, value >> amount);
            assert_eq!(
                shift(ShiftKind::Asr, amount, value, false, true).value,
                ((value as i32) >> amount) as u32
            );
            assert_eq!(
                shift(ShiftKind::Ror, amount, value, false, true).value,
                value.rotate_right(amount)
            );
        }
    }
}
