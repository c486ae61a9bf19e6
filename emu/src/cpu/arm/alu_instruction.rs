use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Opcode field (bits 21-24) of a data processing instruction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl Display for ArmModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Eor => f.write_str("EOR"),
            Self::Sub => f.write_str("SUB"),
            Self::Rsb => f.write_str("RSB"),
            Self::Add => f.write_str("ADD"),
            Self::Adc => f.write_str("ADC"),
            Self::Sbc => f.write_str("SBC"),
            Self::Rsc => f.write_str("RSC"),
            Self::Tst => f.write_str("TST"),
            Self::Teq => f.write_str("TEQ"),
            Self::Cmp => f.write_str("CMP"),
            Self::Cmn => f.write_str("CMN"),
            Self::Orr => f.write_str("ORR"),
            Self::Mov => f.write_str("MOV"),
            Self::Bic => f.write_str("BIC"),
            Self::Mvn => f.write_str("MVN"),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AluInstructionKind {
    Logical,
    Arithmetic,
}

impl ArmModeAluInstruction {
    /// Logical operations take C from the barrel shifter, arithmetic ones from the adder.
    #[must_use]
    pub const fn kind(self) -> AluInstructionKind {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match self {
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => AluInstructionKind::Logical,
            Sub | Rsb | Add | Adc | Sbc | Rsc | Cmp | Cmn => AluInstructionKind::Arithmetic,
        }
    }

    /// TST, TEQ, CMP and CMN only update the flags.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

impl From<u32> for ArmModeAluInstruction {
    fn from(alu_op_code: u32) -> Self {
        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        match alu_op_code & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Sub,
            0x3 => Rsb,
            0x4 => Add,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Rsc,
            0x8 => Tst,
            0x9 => Teq,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mov,
            0xE => Bic,
            _ => Mvn,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

/// `first_op + second_op + carry_in` computed on 64 bits.
///
/// Every add-shaped and subtract-shaped operation goes through here:
/// `a - b` is `a + !b + 1` and `a - b - !c` is `a + !b + c`, so C comes out as
/// "no borrow" for subtractions.
#[must_use]
pub fn add_with_carry(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first_op) + u64::from(second_op) + u64::from(carry_in);
    let result = wide as u32;

    // Overflow happens when both operands share a sign that the result lacks.
    let overflow = (!(first_op ^ second_op) & (first_op ^ result)).get_bit(31);

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow,
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

#[must_use]
pub fn add_inner_op(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    add_with_carry(first_op, second_op, false)
}

#[must_use]
pub fn sub_inner_op(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    add_with_carry(first_op, !second_op, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logical_instruction() {
        let alu_op_code = 9;
        let instruction_kind = ArmModeAluInstruction::from(alu_op_code).kind();

        assert_eq!(instruction_kind, AluInstructionKind::Logical);
    }

    #[test]
    fn test_arithmetic_instruction() {
        let alu_op_code = 2;
        let instruction_kind = ArmModeAluInstruction::from(alu_op_code).kind();

        assert_eq!(instruction_kind, AluInstructionKind::Arithmetic);
    }

    #[test]
    fn check_add_flags() {
        let r = add_inner_op(0xFFFF_FFFF, 1);
        assert_eq!(r.result, 0);
        assert!(r.carry);
        assert!(r.zero);
        assert!(!r.overflow);

        let r = add_inner_op(0x7FFF_FFFF, 1);
        assert_eq!(r.result, 0x8000_0000);
        assert!(!r.carry);
        assert!(r.overflow);
        assert!(r.sign);
    }

    #[test]
    fn check_sub_carry_is_not_borrow() {
        let r = sub_inner_op(5, 3);
        assert_eq!(r.result, 2);
        assert!(r.carry);

        let r = sub_inner_op(3, 5);
        assert_eq!(r.result, 0xFFFF_FFFE);
        assert!(!r.carry);
        assert!(r.sign);

        let r = sub_inner_op(7, 7);
        assert!(r.zero);
        assert!(r.carry);

        let r = sub_inner_op(0x8000_0000, 1);
        assert!(r.overflow);
    }

    #[test]
    fn check_add_then_sub_recovers_operand() {
        for _ in 0..512 {
            let a = rand::random::<u32>();
            let b = rand::random::<u32>();
            let sum = add_inner_op(a, b).result;
            assert_eq!(sub_inner_op(sum, b).result, a);
        }
    }

    #[test]
    fn check_flags_match_wide_arithmetic() {
        for _ in 0..512 {
            let a = rand::random::<u32>();
            let b = rand::random::<u32>();
            let carry_in = rand::random::<u32>() & 1 == 1;

            let r = add_with_carry(a, b, carry_in);
            let unsigned = u64::from(a) + u64::from(b) + u64::from(carry_in);
            let signed = i64::from(a as i32) + i64::from(b as i32) + i64::from(carry_in);
            assert_eq!(r.result, unsigned as u32);
            assert_eq!(r.carry, unsigned > 0xFFFF_FFFF);
            assert_eq!(r.overflow, signed != i64::from(r.result as i32));

            let r = sub_inner_op(a, b);
            let signed = i64::from(a as i32) - i64::from(b as i32);
            assert_eq!(r.carry, a >= b);
            assert_eq!(r.overflow, signed != i64::from(r.result as i32));
        }
    }
}
