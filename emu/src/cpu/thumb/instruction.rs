//! # Thumb Instruction Decoding
//!
//! This module handles decoding 16-bit Thumb instructions.
//!
//! ## Thumb Instruction Formats
//!
//! Thumb instructions are grouped into 19 formats, identified by their high bits:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Thumb Instruction Formats                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Format 1:  000 xx          Move shifted register                      │
//! │  Format 2:  00011           Add/subtract                               │
//! │  Format 3:  001 xx          Move/compare/add/subtract immediate        │
//! │  Format 4:  010000          ALU operations                             │
//! │  Format 5:  010001          Hi register operations / BX                │
//! │  Format 6:  01001           PC-relative load                           │
//! │  Format 7:  0101 xx0        Load/store with register offset            │
//! │  Format 8:  0101 xx1        Load/store sign-extended byte/halfword     │
//! │  Format 9:  011 xx          Load/store with immediate offset           │
//! │  Format 10: 1000 x          Load/store halfword                        │
//! │  Format 11: 1001 x          SP-relative load/store                     │
//! │  Format 12: 1010 x          Load address                               │
//! │  Format 13: 10110000        Add offset to stack pointer                │
//! │  Format 14: 1011 x10x       Push/pop registers                         │
//! │  Format 15: 1100 x          Multiple load/store                        │
//! │  Format 16: 1101 xxxx       Conditional branch                         │
//! │  Format 17: 11011111        Software interrupt                         │
//! │  Format 18: 11100           Unconditional branch                       │
//! │  Format 19: 1111 x          Long branch with link                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything else (`1101 1110`, the unused `1011` slots and the ARMv5
//! `11101` BLX suffix) decodes to [`ThumbModeInstruction::Undefined`].
//!
//! ## Long Branch (BL)
//!
//! The BL instruction spans ±4MB but requires two 16-bit instructions:
//!
//! ```text
//! First:  1111 0xxx xxxx xxxx  ; LR = PC + (offset_hi << 12)
//! Second: 1111 1xxx xxxx xxxx  ; PC = LR + (offset_lo << 1), LR = next | 1
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::barrel_shifter::ShiftKind;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{LoadStoreKind, Offsetting, OperandKind, ReadWriteKind};
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbModeInstruction {
    MoveShiftedRegister {
        shift_operation: ShiftKind,
        offset5: u16,
        source_register: u16,
        destination_register: u16,
    },
    AddSubtract {
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u16,
        source_register: u16,
        destination_register: u16,
    },
    MoveCompareAddSubtractImm {
        operation: ThumbImmediateOperation,
        destination_register: u16,
        offset: u32,
    },
    AluOp {
        alu_operation: ThumbModeAluInstruction,
        source_register: u16,
        destination_register: u16,
    },
    HiRegisterOpBX {
        register_operation: ThumbHighRegisterOperation,
        source_register: u16,
        destination_register: u16,
    },
    PCRelativeLoad {
        destination_register: u16,
        immediate_value: u16,
    },
    LoadStoreRegisterOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        ro: u16,
        base_register: u16,
        destination_register: u16,
    },
    /// `sign_extend_flag`/`h`: 00 STRH, 01 LDRH, 10 LDSB, 11 LDSH.
    LoadStoreSignExtByteHalfword {
        h: bool,
        sign_extend_flag: bool,
        offset_register: u16,
        base_register: u16,
        destination_register: u16,
    },
    LoadStoreImmOffset {
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        offset: u16,
        base_register: u16,
        destination_register: u16,
    },
    LoadStoreHalfword {
        load_store: LoadStoreKind,
        offset: u16,
        base_register: u16,
        source_destination_register: u16,
    },
    SPRelativeLoadStore {
        load_store: LoadStoreKind,
        destination_register: u16,
        word8: u16,
    },
    LoadAddress {
        sp: bool,
        destination_register: u16,
        offset: u32,
    },
    AddOffsetSP {
        offsetting: Offsetting,
        word7: u16,
    },
    PushPopReg {
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u16,
    },
    MultipleLoadStore {
        load_store: LoadStoreKind,
        base_register: u16,
        register_list: u16,
    },
    CondBranch {
        condition: Condition,
        immediate_offset: i32,
    },
    Swi {
        comment: u8,
    },
    UncondBranch {
        offset: i32,
    },
    LongBranchLink {
        h: bool,
        offset: u32,
    },
    Undefined,
}

impl From<u16> for ThumbModeInstruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u16) -> Self {
        use ThumbModeInstruction::{
            AddOffsetSP, AddSubtract, AluOp, CondBranch, HiRegisterOpBX, LoadAddress,
            LoadStoreHalfword, LoadStoreImmOffset, LoadStoreRegisterOffset,
            LoadStoreSignExtByteHalfword, LongBranchLink, MoveCompareAddSubtractImm,
            MoveShiftedRegister, MultipleLoadStore, PCRelativeLoad, PushPopReg,
            SPRelativeLoadStore, Swi, UncondBranch, Undefined,
        };

        if op_code.get_bits(8..=15) == 0b1101_1111 {
            Swi {
                comment: op_code.get_bits(0..=7) as u8,
            }
        } else if op_code.get_bits(8..=15) == 0b1101_1110 {
            Undefined
        } else if op_code.get_bits(8..=15) == 0b1011_0000 {
            AddOffsetSP {
                offsetting: (!op_code.get_bit(7)).into(),
                // Word7 holds the offset divided by four.
                word7: op_code.get_bits(0..=6) << 2,
            }
        } else if op_code.get_bits(10..=15) == 0b01_0000 {
            AluOp {
                alu_operation: op_code.get_bits(6..=9).into(),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(10..=15) == 0b01_0001 {
            let h1 = op_code.get_bit(7);
            let rd_hd = op_code.get_bits(0..=2);
            let destination_register = if h1 { rd_hd | (1 << 3) } else { rd_hd };

            HiRegisterOpBX {
                register_operation: op_code.get_bits(8..=9).into(),
                source_register: op_code.get_bits(3..=6),
                destination_register,
            }
        } else if op_code.get_bits(12..=15) == 0b1011 && op_code.get_bits(9..=10) == 0b10 {
            PushPopReg {
                load_store: op_code.get_bit(11).into(),
                pc_lr: op_code.get_bit(8),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(12..=15) == 0b1011 {
            Undefined
        } else if op_code.get_bits(11..=15) == 0b00011 {
            AddSubtract {
                operation_kind: op_code.get_bit(10).into(),
                subtract: op_code.get_bit(9),
                rn_offset3: op_code.get_bits(6..=8),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(11..=15) == 0b01001 {
            PCRelativeLoad {
                destination_register: op_code.get_bits(8..=10),
                immediate_value: op_code.get_bits(0..=7) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b0101 && !op_code.get_bit(9) {
            LoadStoreRegisterOffset {
                load_store: op_code.get_bit(11).into(),
                byte_word: op_code.get_bit(10).into(),
                ro: op_code.get_bits(6..=8),
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b0101 {
            LoadStoreSignExtByteHalfword {
                h: op_code.get_bit(11),
                sign_extend_flag: op_code.get_bit(10),
                offset_register: op_code.get_bits(6..=8),
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(11..=15) == 0b11100 {
            let offset = u32::from(op_code.get_bits(0..=10) << 1);
            UncondBranch {
                offset: offset.sign_extended(12) as i32,
            }
        } else if op_code.get_bits(11..=15) == 0b11101 {
            Undefined
        } else if op_code.get_bits(12..=15) == 0b1000 {
            LoadStoreHalfword {
                load_store: op_code.get_bit(11).into(),
                offset: op_code.get_bits(6..=10) << 1,
                base_register: op_code.get_bits(3..=5),
                source_destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b1001 {
            SPRelativeLoadStore {
                load_store: op_code.get_bit(11).into(),
                destination_register: op_code.get_bits(8..=10),
                word8: op_code.get_bits(0..=7) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1010 {
            LoadAddress {
                sp: op_code.get_bit(11),
                destination_register: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1100 {
            MultipleLoadStore {
                load_store: op_code.get_bit(11).into(),
                base_register: op_code.get_bits(8..=10),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(12..=15) == 0b1101 {
            // 9 bits signed offset, the assembler stores `label >> 1`.
            let offset = u32::from(op_code.get_bits(0..=7) << 1);

            CondBranch {
                condition: Condition::from(op_code.get_bits(8..=11) as u8),
                immediate_offset: offset.sign_extended(9) as i32,
            }
        } else if op_code.get_bits(12..=15) == 0b1111 {
            LongBranchLink {
                h: op_code.get_bit(11),
                offset: u32::from(op_code.get_bits(0..=10)),
            }
        } else if op_code.get_bits(13..=15) == 0b000 {
            MoveShiftedRegister {
                shift_operation: u32::from(op_code.get_bits(11..=12)).into(),
                offset5: op_code.get_bits(6..=10),
                source_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(13..=15) == 0b001 {
            MoveCompareAddSubtractImm {
                operation: op_code.get_bits(11..=12).into(),
                destination_register: op_code.get_bits(8..=10),
                offset: op_code.get_bits(0..=7).into(),
            }
        } else {
            // 011: immediate offset, words store the offset divided by four.
            let byte_word: ReadWriteKind = op_code.get_bit(12).into();
            let offset = match byte_word {
                ReadWriteKind::Word => op_code.get_bits(6..=10) << 2,
                ReadWriteKind::Byte => op_code.get_bits(6..=10),
            };

            LoadStoreImmOffset {
                load_store: op_code.get_bit(11).into(),
                byte_word,
                offset,
                base_register: op_code.get_bits(3..=5),
                destination_register: op_code.get_bits(0..=2),
            }
        }
    }
}

impl std::fmt::Display for ThumbModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_multiple_load_store() {
        let output = ThumbModeInstruction::from(0b1100_1001_1010_0000);
        assert_eq!(
            ThumbModeInstruction::MultipleLoadStore {
                load_store: LoadStoreKind::Load,
                base_register: 1,
                register_list: 160,
            },
            output
        );
    }

    #[test]
    fn decode_pc_relative_load() {
        let output = ThumbModeInstruction::from(0b0100_1001_0101_1000);
        assert_eq!(
            ThumbModeInstruction::PCRelativeLoad {
                destination_register: 1,
                immediate_value: 352,
            },
            output
        );
    }

    #[test]
    fn decode_load_store_register_offset() {
        let output = ThumbModeInstruction::from(0b0101_00_0_000_001_010);
        assert_eq!(
            ThumbModeInstruction::LoadStoreRegisterOffset {
                load_store: LoadStoreKind::Store,
                byte_word: ReadWriteKind::Word,
                ro: 0,
                base_register: 1,
                destination_register: 2,
            },
            output
        );
    }

    #[test]
    fn decode_uncond_branch() {
        let output = ThumbModeInstruction::from(0b1110_0001_0010_1111);
        assert_eq!(ThumbModeInstruction::UncondBranch { offset: 606 }, output);

        // B . (offset -4)
        let output = ThumbModeInstruction::from(0xE7FE);
        assert_eq!(ThumbModeInstruction::UncondBranch { offset: -4 }, output);
    }

    #[test]
    fn decode_hi_reg_operation() {
        let output = ThumbModeInstruction::from(0b0100_0111_0111_0000);
        assert_eq!(
            ThumbModeInstruction::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Bx,
                source_register: 14,
                destination_register: 0,
            },
            output
        );

        let output = ThumbModeInstruction::from(0b010001_00_0_1_000_001);
        assert_eq!(
            ThumbModeInstruction::HiRegisterOpBX {
                register_operation: ThumbHighRegisterOperation::Add,
                source_register: 8,
                destination_register: 1,
            },
            output
        );
    }

    #[test]
    fn decode_push_pop_register() {
        let output = ThumbModeInstruction::from(0b1011_0101_1111_0000);
        assert_eq!(
            ThumbModeInstruction::PushPopReg {
                load_store: LoadStoreKind::Store,
                pc_lr: true,
                register_list: 240,
            },
            output
        );
    }

    #[test]
    fn decode_alu_operation() {
        let output = ThumbModeInstruction::from(0b0100_0011_0110_0000);
        assert_eq!(
            ThumbModeInstruction::AluOp {
                alu_operation: ThumbModeAluInstruction::Mul,
                source_register: 4,
                destination_register: 0,
            },
            output
        );
    }

    #[test]
    fn decode_add_offset_sp() {
        assert_eq!(
            ThumbModeInstruction::from(0xB082),
            ThumbModeInstruction::AddOffsetSP {
                offsetting: Offsetting::Down,
                word7: 8,
            }
        );
        assert_eq!(
            ThumbModeInstruction::from(0xB002),
            ThumbModeInstruction::AddOffsetSP {
                offsetting: Offsetting::Up,
                word7: 8,
            }
        );
    }

    #[test]
    fn decode_conditional_branch_and_swi() {
        assert_eq!(
            ThumbModeInstruction::from(0xD0FE),
            ThumbModeInstruction::CondBranch {
                condition: Condition::EQ,
                immediate_offset: -4,
            }
        );
        assert_eq!(
            ThumbModeInstruction::from(0xDF05),
            ThumbModeInstruction::Swi { comment: 5 }
        );
        assert_eq!(ThumbModeInstruction::from(0xDE00), ThumbModeInstruction::Undefined);
    }

    #[test]
    fn decode_move_shifted_and_add_subtract() {
        assert_eq!(
            ThumbModeInstruction::from(0x0048),
            ThumbModeInstruction::MoveShiftedRegister {
                shift_operation: ShiftKind::Lsl,
                offset5: 1,
                source_register: 1,
                destination_register: 0,
            }
        );
        // SUB R0, R1, #2
        assert_eq!(
            ThumbModeInstruction::from(0b00011_1_1_010_001_000),
            ThumbModeInstruction::AddSubtract {
                operation_kind: OperandKind::Immediate,
                subtract: true,
                rn_offset3: 2,
                source_register: 1,
                destination_register: 0,
            }
        );
    }

    #[test]
    fn decode_load_store_imm_offset() {
        // LDR R0, [R1, #4]
        assert_eq!(
            ThumbModeInstruction::from(0x6848),
            ThumbModeInstruction::LoadStoreImmOffset {
                load_store: LoadStoreKind::Load,
                byte_word: ReadWriteKind::Word,
                offset: 4,
                base_register: 1,
                destination_register: 0,
            }
        );
        // STRB R0, [R1, #1]
        assert_eq!(
            ThumbModeInstruction::from(0x7048),
            ThumbModeInstruction::LoadStoreImmOffset {
                load_store: LoadStoreKind::Store,
                byte_word: ReadWriteKind::Byte,
                offset: 1,
                base_register: 1,
                destination_register: 0,
            }
        );
    }

    #[test]
    fn decode_long_branch_link() {
        assert_eq!(
            ThumbModeInstruction::from(0xF000),
            ThumbModeInstruction::LongBranchLink {
                h: false,
                offset: 0,
            }
        );
        assert_eq!(
            ThumbModeInstruction::from(0xF880),
            ThumbModeInstruction::LongBranchLink {
                h: true,
                offset: 0x80,
            }
        );
        assert_eq!(ThumbModeInstruction::from(0xE800), ThumbModeInstruction::Undefined);
    }
}
