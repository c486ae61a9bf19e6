//! # Processor modes
//!
//! | Mode       | Bits    | Banked registers      | SPSR |
//! |------------|---------|-----------------------|------|
//! | User       | `10000` | -                     | no   |
//! | FIQ        | `10001` | R8-R14                | yes  |
//! | IRQ        | `10010` | R13-R14               | yes  |
//! | Supervisor | `10011` | R13-R14               | yes  |
//! | Abort      | `10111` | R13-R14               | yes  |
//! | Undefined  | `11011` | R13-R14               | yes  |
//! | System     | `11111` | shares User registers | no   |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// The normal ARM program execution state.
    User = 0b10000,

    /// Fast interrupt, banks R8-R14.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Entered on reset and software interrupts.
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed.
    Undefined = 0b11011,

    /// A privileged mode sharing the User registers.
    System = 0b11111,
}

impl Mode {
    /// Index of the register bank used by this mode.
    /// User and System share bank 0.
    #[must_use]
    pub const fn bank_index(self) -> usize {
        match self {
            Self::User | Self::System => 0,
            Self::Fiq => 1,
            Self::Supervisor => 2,
            Self::Abort => 3,
            Self::Irq => 4,
            Self::Undefined => 5,
        }
    }

    /// Whether the mode owns a saved status register.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(format!("unexpected mode bits 0b{n:05b}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_user_and_system_share_bank() {
        assert_eq!(Mode::User.bank_index(), Mode::System.bank_index());
        assert!(!Mode::System.has_spsr());
        assert!(Mode::Irq.has_spsr());
    }

    #[test]
    fn check_invalid_mode_bits() {
        assert!(Mode::try_from(0).is_err());
        assert_eq!(Mode::try_from(0b10011), Ok(Mode::Supervisor));
    }
}
