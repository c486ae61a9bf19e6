//! # ARM7TDMI register file
//!
//! - **R0-R12**: general purpose
//! - **R13 (SP)**: stack pointer
//! - **R14 (LR)**: link register
//! - **R15 (PC)**: program counter; reads as +8 (ARM) or +4 (Thumb) while an
//!   instruction executes
//!
//! Banking is handled by [`register_bank`](super::register_bank).

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 0xD;

/// Link Register index.
pub const REG_LR: usize = 0xE;

/// Program Counter register index.
pub const REG_PROGRAM_COUNTER: usize = 0xF;

/// The 16 registers visible in the current mode.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PROGRAM_COUNTER]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PROGRAM_COUNTER] = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.0[REG_PROGRAM_COUNTER] = self.0[REG_PROGRAM_COUNTER].wrapping_add(bytes);
    }

    pub const fn set_register_at(&mut self, reg: usize, new_value: u32) {
        self.0[reg & 0xF] = new_value;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg & 0xF]
    }

    #[must_use]
    pub const fn as_array(&self) -> &[u32; 16] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_program_counter_wraps() {
        let mut regs = Registers::default();
        regs.set_program_counter(0xFFFF_FFFE);
        regs.advance_program_counter(4);
        assert_eq!(regs.program_counter(), 2);
        assert_eq!(regs.register_at(REG_PROGRAM_COUNTER), 2);
    }

    #[test]
    fn check_set_register() {
        let mut regs = Registers::default();
        regs.set_register_at(REG_LR, 0x0800_0004);
        regs.set_register_at(REG_SP, 0x0300_7F00);
        assert_eq!(regs.register_at(14), 0x0800_0004);
        assert_eq!(regs.as_array()[13], 0x0300_7F00);
    }
}
