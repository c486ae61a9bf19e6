//! # ARM Instruction Decoding
//!
//! This module handles decoding 32-bit ARM instructions into their component
//! fields and classifying them by type.
//!
//! ## Decoding Priority
//!
//! Several categories share bit patterns, so the decoder is an ordered chain of
//! predicates. The first match wins:
//!
//! 1. Branch and Exchange (`BX`), a single fixed pattern
//! 2. Block Data Transfer (`LDM`, `STM`), bits 27-25 = `100`
//! 3. Branch (`B`, `BL`), bits 27-25 = `101`
//! 4. Software Interrupt, bits 27-24 = `1111`
//! 5. Coprocessor space, bits 27-25 = `11x` (no coprocessor on the GBA)
//! 6. Undefined, bits 27-25 = `011` with bit 4 set
//! 7. Single Data Transfer (`LDR`, `STR`), bits 27-26 = `01`
//! 8. Multiply (`MUL`, `MLA`)
//! 9. Multiply Long (`UMULL`, `UMLAL`, `SMULL`, `SMLAL`)
//! 10. `UMAAL` (ARMv6, decoded only to be reported)
//! 11. Single Data Swap (`SWP`, `SWPB`)
//! 12. Halfword and signed transfers (`LDRH`, `STRH`, `LDRSB`, `LDRSH`)
//! 13. PSR transfer (`MRS`, `MSR`)
//! 14. Data Processing
//!
//! ## Instruction Encoding Example
//!
//! ```text
//! ADD R0, R1, R2, LSL #3
//!
//! 31-28  27-26  25  24-21  20  19-16  15-12  11-7   6-5  4  3-0
//! [1110] [ 00 ] [0] [0100] [0] [0001] [0000] [00011][00] [0][0010]
//!   ↑       ↑    ↑    ↑     ↑    ↑      ↑      ↑     ↑   ↑   ↑
//!   │       │    │    │     │    │      │      │     │   │   └─ Rm = R2
//!   │       │    │    │     │    │      │      │     │   └──── Shift by imm
//!   │       │    │    │     │    │      │      │     └──────── LSL
//!   │       │    │    │     │    │      │      └────────────── Shift = 3
//!   │       │    │    │     │    │      └───────────────────── Rd = R0
//!   │       │    │    │     │    └──────────────────────────── Rn = R1
//!   │       │    │    │     └───────────────────────────────── S = 0 (no flags)
//!   │       │    │    └─────────────────────────────────────── ADD opcode
//!   │       │    └──────────────────────────────────────────── Register operand
//!   │       └───────────────────────────────────────────────── Data processing
//!   └───────────────────────────────────────────────────────── Always execute
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::ArmModeAluInstruction;
use crate::cpu::barrel_shifter::ShiftKind;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, OperandKind, ReadWriteKind,
};

/// Where the shift amount of a register operand comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftOperator {
    /// 5-bit amount encoded in the instruction.
    Immediate(u32),
    /// Low byte of the register with this index.
    Register(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluSecondOperandInfo {
    Register {
        shift_op: ShiftOperator,
        shift_kind: ShiftKind,
        register: u32,
    },
    /// 8-bit `base` rotated right by `shift` (already doubled).
    Immediate { base: u32, shift: u32 },
}

impl AluSecondOperandInfo {
    fn decode(op_code: u32) -> Self {
        match OperandKind::from(op_code.get_bit(25)) {
            OperandKind::Immediate => Self::Immediate {
                base: op_code.get_bits(0..=7),
                shift: op_code.get_bits(8..=11) * 2,
            },
            OperandKind::Register => {
                let shift_op = if op_code.get_bit(4) {
                    ShiftOperator::Register(op_code.get_bits(8..=11))
                } else {
                    ShiftOperator::Immediate(op_code.get_bits(7..=11))
                };
                Self::Register {
                    shift_op,
                    shift_kind: op_code.get_bits(5..=6).into(),
                    register: op_code.get_bits(0..=3),
                }
            }
        }
    }
}

impl std::fmt::Display for AluSecondOperandInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind: ShiftKind::Lsl,
                register,
            } => write!(f, "R{register}"),
            Self::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} #{amount}"),
            Self::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} R{rs}"),
            Self::Immediate { base, shift } => write!(f, "#0x{:X}", base.rotate_right(*shift)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: u32,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum HalfwordDataTransferOffsetKind {
    Immediate { offset: u32 },
    Register { register: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsrKind {
    Cpsr,
    Spsr,
}

impl From<bool> for PsrKind {
    fn from(value: bool) -> Self {
        if value { Self::Spsr } else { Self::Cpsr }
    }
}

impl std::fmt::Display for PsrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpsr => f.write_str("CPSR"),
            Self::Spsr => f.write_str("SPSR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsrOpKind {
    /// Reads a PSR into a register.
    Mrs { destination_register: u32 },
    /// Writes the fields selected by `field_mask` (bits 16-19 of the opcode:
    /// control, extension, status, flags).
    Msr {
        field_mask: u32,
        operand: AluSecondOperandInfo,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyVariant {
    Mul,
    Mla,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyLongVariant {
    Umull,
    Umlal,
    Smull,
    Smlal,
}

impl std::fmt::Display for ArmModeMultiplyLongVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Umull => f.write_str("UMULL"),
            Self::Umlal => f.write_str("UMLAL"),
            Self::Smull => f.write_str("SMULL"),
            Self::Smlal => f.write_str("SMLAL"),
        }
    }
}

impl From<u32> for ArmModeMultiplyVariant {
    fn from(op_code: u32) -> Self {
        if op_code.get_bit(21) { Self::Mla } else { Self::Mul }
    }
}

impl From<u32> for ArmModeMultiplyLongVariant {
    fn from(op_code: u32) -> Self {
        match op_code.get_bits(21..=22) {
            0b00 => Self::Umull,
            0b01 => Self::Umlal,
            0b10 => Self::Smull,
            _ => Self::Smlal,
        }
    }
}

/// All ARM instruction types after decoding.
///
/// | Variant                | Example Instructions | Description                  |
/// |------------------------|----------------------|------------------------------|
/// | `DataProcessing`       | AND, ADD, CMP, MOV   | ALU operations               |
/// | `Multiply`             | MUL, MLA             | 32-bit multiply              |
/// | `MultiplyLong`         | UMULL, SMULL         | 64-bit multiply              |
/// | `PSRTransfer`          | MRS, MSR             | Status register access       |
/// | `SingleDataSwap`       | SWP, SWPB            | Atomic memory swap           |
/// | `BranchAndExchange`    | BX                   | Branch + possible ARM↔Thumb  |
/// | `HalfwordDataTransfer` | LDRH, STRH, LDRSB    | 16-bit and signed transfers  |
/// | `SingleDataTransfer`   | LDR, STR, LDRB       | 32-bit and byte transfers    |
/// | `BlockDataTransfer`    | LDM, STM             | Multiple register transfer   |
/// | `Branch`               | B, BL                | Branch (and link)            |
/// | `SoftwareInterrupt`    | SWI                  | BIOS call                    |
/// | `Undefined`            | -                    | Undefined exception          |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        condition: Condition,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    },
    Multiply {
        variant: ArmModeMultiplyVariant,
        condition: Condition,
        should_set_codes: bool,
        rd_destination_register: u32,
        rn_accumulate_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    MultiplyLong {
        variant: ArmModeMultiplyLongVariant,
        condition: Condition,
        should_set_codes: bool,
        rdhi_destination_register: u32,
        rdlo_destination_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    /// ARMv6 unsigned multiply double accumulate, not implemented by the ARM7TDMI.
    Umaal {
        condition: Condition,
    },
    PSRTransfer {
        condition: Condition,
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    SingleDataSwap {
        condition: Condition,
        quantity: ReadWriteKind,
        rn: u32,
        rd: u32,
        rm: u32,
    },
    BranchAndExchange {
        condition: Condition,
        register: u32,
    },
    HalfwordDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        source_destination_register: u32,
        transfer_kind: HalfwordTransferKind,
    },
    SingleDataTransfer {
        condition: Condition,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    },
    BlockDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        register_list: u32,
    },
    Branch {
        condition: Condition,
        link: bool,
        /// Byte offset from PC+8, already sign-extended.
        offset: i32,
    },
    SoftwareInterrupt {
        condition: Condition,
        comment: u32,
    },
    Undefined {
        condition: Condition,
    },
}

impl ArmModeInstruction {
    #[must_use]
    pub const fn condition(&self) -> Condition {
        match self {
            Self::DataProcessing { condition, .. }
            | Self::Multiply { condition, .. }
            | Self::MultiplyLong { condition, .. }
            | Self::Umaal { condition }
            | Self::PSRTransfer { condition, .. }
            | Self::SingleDataSwap { condition, .. }
            | Self::BranchAndExchange { condition, .. }
            | Self::HalfwordDataTransfer { condition, .. }
            | Self::SingleDataTransfer { condition, .. }
            | Self::BlockDataTransfer { condition, .. }
            | Self::Branch { condition, .. }
            | Self::SoftwareInterrupt { condition, .. }
            | Self::Undefined { condition } => *condition,
        }
    }
}

impl From<u32> for ArmModeInstruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u32) -> Self {
        let condition = Condition::from(op_code.get_bits(28..=31) as u8);

        if op_code & 0x0FFF_FFF0 == 0x012F_FF10 {
            Self::BranchAndExchange {
                condition,
                register: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(25..=27) == 0b100 {
            Self::BlockDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                load_psr: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn: op_code.get_bits(16..=19),
                register_list: op_code.get_bits(0..=15),
            }
        } else if op_code.get_bits(25..=27) == 0b101 {
            Self::Branch {
                condition,
                link: op_code.get_bit(24),
                offset: (op_code.get_bits(0..=23) << 2).sign_extended(26) as i32,
            }
        } else if op_code.get_bits(24..=27) == 0b1111 {
            Self::SoftwareInterrupt {
                condition,
                comment: op_code.get_bits(0..=23),
            }
        } else if op_code.get_bits(26..=27) == 0b11 {
            tracing::debug!("coprocessor instruction 0x{op_code:08X}");
            Self::Undefined { condition }
        } else if op_code.get_bits(25..=27) == 0b011 && op_code.get_bit(4) {
            Self::Undefined { condition }
        } else if op_code.get_bits(26..=27) == 0b01 {
            // The I bit is inverted compared to data processing: set means register.
            let offset_info = match OperandKind::from(!op_code.get_bit(25)) {
                OperandKind::Immediate => SingleDataTransferOffsetInfo::Immediate {
                    offset: op_code.get_bits(0..=11),
                },
                OperandKind::Register => SingleDataTransferOffsetInfo::RegisterImmediate {
                    shift_amount: op_code.get_bits(7..=11),
                    shift_kind: op_code.get_bits(5..=6).into(),
                    reg_offset: op_code.get_bits(0..=3),
                },
            };

            Self::SingleDataTransfer {
                condition,
                kind: op_code.get_bit(20).into(),
                quantity: op_code.get_bit(22).into(),
                write_back: op_code.get_bit(21),
                indexing: op_code.get_bit(24).into(),
                rd: op_code.get_bits(12..=15),
                base_register: op_code.get_bits(16..=19),
                offset_info,
                offsetting: op_code.get_bit(23).into(),
            }
        } else if op_code.get_bits(22..=27) == 0 && op_code.get_bits(4..=7) == 0b1001 {
            Self::Multiply {
                variant: op_code.into(),
                condition,
                should_set_codes: op_code.get_bit(20),
                rd_destination_register: op_code.get_bits(16..=19),
                rn_accumulate_register: op_code.get_bits(12..=15),
                rs_operand_register: op_code.get_bits(8..=11),
                rm_operand_register: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(23..=27) == 0b00001 && op_code.get_bits(4..=7) == 0b1001 {
            Self::MultiplyLong {
                variant: op_code.into(),
                condition,
                should_set_codes: op_code.get_bit(20),
                rdhi_destination_register: op_code.get_bits(16..=19),
                rdlo_destination_register: op_code.get_bits(12..=15),
                rs_operand_register: op_code.get_bits(8..=11),
                rm_operand_register: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(20..=27) == 0b0000_0100 && op_code.get_bits(4..=7) == 0b1001 {
            Self::Umaal { condition }
        } else if op_code.get_bits(23..=27) == 0b00010
            && op_code.get_bits(20..=21) == 0b00
            && op_code.get_bits(4..=11) == 0b0000_1001
        {
            Self::SingleDataSwap {
                condition,
                quantity: op_code.get_bit(22).into(),
                rn: op_code.get_bits(16..=19),
                rd: op_code.get_bits(12..=15),
                rm: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(25..=27) == 0b000 && op_code.get_bit(7) && op_code.get_bit(4) {
            let transfer_kind = match op_code.get_bits(5..=6) {
                0b01 => HalfwordTransferKind::UnsignedHalfwords,
                0b10 => HalfwordTransferKind::SignedByte,
                0b11 => HalfwordTransferKind::SignedHalfwords,
                _ => return Self::Undefined { condition },
            };

            let offset_kind = if op_code.get_bit(22) {
                HalfwordDataTransferOffsetKind::Immediate {
                    offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
                }
            } else {
                HalfwordDataTransferOffsetKind::Register {
                    register: op_code.get_bits(0..=3),
                }
            };

            Self::HalfwordDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                write_back: op_code.get_bit(21),
                load_store_kind: op_code.get_bit(20).into(),
                offset_kind,
                base_register: op_code.get_bits(16..=19),
                source_destination_register: op_code.get_bits(12..=15),
                transfer_kind,
            }
        } else if op_code & 0x0FBF_0FFF == 0x010F_0000 {
            Self::PSRTransfer {
                condition,
                psr_kind: op_code.get_bit(22).into(),
                kind: PsrOpKind::Mrs {
                    destination_register: op_code.get_bits(12..=15),
                },
            }
        } else if op_code & 0x0DB0_F000 == 0x0120_F000 {
            Self::PSRTransfer {
                condition,
                psr_kind: op_code.get_bit(22).into(),
                kind: PsrOpKind::Msr {
                    field_mask: op_code.get_bits(16..=19),
                    operand: AluSecondOperandInfo::decode(op_code),
                },
            }
        } else if op_code.get_bits(26..=27) == 0b00 {
            Self::DataProcessing {
                condition,
                alu_instruction: op_code.get_bits(21..=24).into(),
                set_conditions: op_code.get_bit(20),
                rn: op_code.get_bits(16..=19),
                destination: op_code.get_bits(12..=15),
                op2: AluSecondOperandInfo::decode(op_code),
            }
        } else {
            Self::Undefined { condition }
        }
    }
}

impl std::fmt::Display for ArmModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataProcessing {
                condition,
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => {
                let s = if *set_conditions { "S" } else { "" };
                write!(f, "{alu_instruction}{condition}{s} R{destination}, R{rn}, {op2}")
            }
            Self::Branch {
                condition,
                link,
                offset,
            } => {
                let l = if *link { "L" } else { "" };
                write!(f, "B{l}{condition} {offset:+}")
            }
            Self::BranchAndExchange {
                condition,
                register,
            } => write!(f, "BX{condition} R{register}"),
            Self::SoftwareInterrupt { condition, comment } => {
                write!(f, "SWI{condition} 0x{comment:06X}")
            }
            _ => write!(f, "{self:?}"),
        }
    }
}
