//! # Banked registers
//!
//! Registers swapped out of the live file on a mode change. Bank 0 belongs
//! to User/System, banks 1-5 to FIQ, Supervisor, Abort, IRQ and Undefined
//! (see [`Mode::bank_index`]). FIQ additionally banks R8-R12.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

pub const BANKS_COUNT: usize = 6;

#[derive(Default, Serialize, Deserialize)]
pub struct RegisterBank {
    /// R13 (SP) for each bank.
    pub r13: [u32; BANKS_COUNT],

    /// R14 (LR) for each bank.
    pub r14: [u32; BANKS_COUNT],

    /// R8-R12 of every non-FIQ mode, parked while FIQ is active.
    pub r8_r12_user: [u32; 5],

    /// R8-R12 of FIQ mode, parked while any other mode is active.
    pub r8_r12_fiq: [u32; 5],

    /// Saved status register per bank. Slot 0 is never used.
    pub spsr: [Psr; BANKS_COUNT],
}

impl RegisterBank {
    #[must_use]
    pub fn spsr(&self, mode: Mode) -> Option<Psr> {
        mode.has_spsr().then(|| self.spsr[mode.bank_index()])
    }

    /// Ignored for modes without an SPSR.
    pub fn set_spsr(&mut self, mode: Mode, value: Psr) {
        if mode.has_spsr() {
            self.spsr[mode.bank_index()] = value;
        }
    }
}
