//! # Program Status Registers (CPSR and SPSR)
//!
//! ```text
//! 31 30 29 28 27        8 7 6 5 4   0
//! ┌──┬──┬──┬──┬──────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │ Reserved │I│F│T│Mode │
//! └──┴──┴──┴──┴──────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by [`condition`](super::condition)
//! - **I/F bits (7-6)**: IRQ/FIQ disable
//! - **T bit (5)**: ARM (0) or Thumb (1) state
//! - **Mode (0-4)**: see [`cpu_modes`](super::cpu_modes)

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register, used both for CPSR and the banked SPSRs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => false,
        }
    }

    /// N => Bit 31
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=THUMB)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0
    ///
    /// Software is allowed to park garbage in an SPSR (the BIOS writes 0), so an
    /// invalid pattern falls back to Supervisor instead of failing.
    #[must_use]
    pub fn mode(self) -> Mode {
        let mode_bits = self.0 & 0b11111;
        Mode::try_from(mode_bits).unwrap_or_else(|e| {
            tracing::debug!("{e} in PSR=0x{:08X}, defaulting to Supervisor", self.0);
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Sets N, Z, C and V from an arithmetic result.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_sign_flag(op_result.sign);
        self.set_zero_flag(op_result.zero);
        self.set_carry_flag(op_result.carry);
        self.set_overflow_flag(op_result.overflow);
    }

    /// Sets N and Z from `result`, leaving C and V alone.
    pub fn set_logical_flags(&mut self, result: u32) {
        self.set_sign_flag(result.get_bit(31));
        self.set_zero_flag(result == 0);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// Writes the mode bits without validating them.
    pub const fn set_mode_raw(&mut self, m: u32) {
        self.0 = (self.0 & !0b1_1111) | (m & 0b1_1111);
    }

    /// Only rewrites the mode field: swapping banks is the CPU's job,
    /// see `Arm7tdmi::set_mode`.
    pub const fn set_mode(&mut self, m: Mode) {
        self.set_mode_raw(m as u32);
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }

    /// Replaces the bits selected by `mask` with those of `value`.
    pub const fn write_masked(&mut self, value: u32, mask: u32) {
        self.0 = (self.0 & !mask) | (value & mask);
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);
        s.set_mode(m);
        s
    }
}

impl From<u32> for Psr {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state selected by the T bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// 16-bit instructions.
    Thumb,
    /// 32-bit instructions.
    Arm,
}

impl CpuState {
    /// Size in bytes of one instruction in this state.
    #[must_use]
    pub const fn instruction_size(self) -> u32 {
        match self {
            Self::Thumb => 2,
            Self::Arm => 4,
        }
    }
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_flags() {
        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        cpsr.set_carry_flag(true);
        assert!(cpsr.sign_flag());
        assert!(!cpsr.zero_flag());
        assert!(cpsr.carry_flag());
        assert!(!cpsr.overflow_flag());
        assert_eq!(u32::from(cpsr), 0xA000_0000);
    }

    #[test]
    fn check_control_bits() {
        let mut cpsr = Psr(0);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        cpsr.set_cpu_state(CpuState::Thumb);
        assert!(cpsr.irq_disable());
        assert!(cpsr.fiq_disable());
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
        assert_eq!(u32::from(cpsr), 0b1110_0000);
    }

    #[test]
    fn check_mode_round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            let mut cpsr = Psr(0xF000_00E0);
            cpsr.set_mode(mode);
            assert_eq!(cpsr.mode(), mode);
            assert_eq!(u32::from(cpsr) & 0xFFFF_FFE0, 0xF000_00E0);
        }
    }

    #[test]
    fn check_invalid_mode_falls_back_to_supervisor() {
        assert_eq!(Psr(0).mode(), Mode::Supervisor);
    }

    #[test]
    fn check_conditions() {
        let mut cpsr = Psr(0);
        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(!cpsr.can_execute(Condition::NE));
        assert!(cpsr.can_execute(Condition::LS));
        assert!(cpsr.can_execute(Condition::LE));
        assert!(!cpsr.can_execute(Condition::GT));
        assert!(!cpsr.can_execute(Condition::NV));

        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        assert!(cpsr.can_execute(Condition::LT));
        cpsr.set_overflow_flag(true);
        assert!(cpsr.can_execute(Condition::GE));
        assert!(cpsr.can_execute(Condition::GT));
        cpsr.set_carry_flag(true);
        assert!(cpsr.can_execute(Condition::HI));
    }

    #[test]
    fn check_write_masked() {
        let mut psr = Psr(0x0000_001F);
        psr.write_masked(0xF000_0010, 0xFF00_0000);
        assert_eq!(u32::from(psr), 0xF000_001F);
    }
}
