//! # Conditional execution
//!
//! Every ARM instruction carries a condition in bits 31-28; Thumb only on
//! conditional branches (bits 11-8). The instruction runs when the CPSR flags
//! satisfy it, otherwise it retires as a no-op.
//!
//! | Code | Suffix | Flags tested     |
//! |------|--------|------------------|
//! | 0000 | EQ     | Z=1              |
//! | 0001 | NE     | Z=0              |
//! | 0010 | CS     | C=1              |
//! | 0011 | CC     | C=0              |
//! | 0100 | MI     | N=1              |
//! | 0101 | PL     | N=0              |
//! | 0110 | VS     | V=1              |
//! | 0111 | VC     | V=0              |
//! | 1000 | HI     | C=1 and Z=0      |
//! | 1001 | LS     | C=0 or Z=1       |
//! | 1010 | GE     | N=V              |
//! | 1011 | LT     | N!=V             |
//! | 1100 | GT     | Z=0 and N=V      |
//! | 1101 | LE     | Z=1 or N!=V      |
//! | 1110 | AL     | always           |
//! | 1111 | NV     | never (reserved) |

use serde::{Deserialize, Serialize};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum Condition {
    EQ = 0x0,
    NE = 0x1,
    /// Also known as HS.
    CS = 0x2,
    /// Also known as LO.
    CC = 0x3,
    MI = 0x4,
    PL = 0x5,
    VS = 0x6,
    VC = 0x7,
    HI = 0x8,
    LS = 0x9,
    GE = 0xA,
    LT = 0xB,
    GT = 0xC,
    LE = 0xD,
    AL = 0xE,
    NV = 0xF,
}

impl From<u8> for Condition {
    fn from(item: u8) -> Self {
        const TABLE: [Condition; 16] = [
            Condition::EQ,
            Condition::NE,
            Condition::CS,
            Condition::CC,
            Condition::MI,
            Condition::PL,
            Condition::VS,
            Condition::VC,
            Condition::HI,
            Condition::LS,
            Condition::GE,
            Condition::LT,
            Condition::GT,
            Condition::LE,
            Condition::AL,
            Condition::NV,
        ];
        TABLE[usize::from(item & 0xF)]
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AL => Ok(()),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_from_nibble() {
        assert_eq!(Condition::from(0x0), Condition::EQ);
        assert_eq!(Condition::from(0xD), Condition::LE);
        assert_eq!(Condition::from(0xE), Condition::AL);
        // Only the low nibble is significant.
        assert_eq!(Condition::from(0xF1), Condition::NE);
    }

    #[test]
    fn check_display() {
        assert_eq!(Condition::GT.to_string(), "GT");
        assert_eq!(Condition::AL.to_string(), "");
    }
}
