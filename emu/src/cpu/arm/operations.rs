use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    add_inner_op, add_with_carry, sub_inner_op, AluInstructionKind, ArithmeticOpResult,
    ArmModeAluInstruction,
};
use crate::cpu::arm::instructions::{
    AluSecondOperandInfo, ArmModeMultiplyLongVariant, ArmModeMultiplyVariant,
    HalfwordDataTransferOffsetKind, PsrKind, PsrOpKind, ShiftOperator,
    SingleDataTransferOffsetInfo,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::barrel_shifter::{shift, ShiftResult};
use crate::cpu::cpu_modes::Mode;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, ReadWriteKind,
};
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};

pub const SIZE_OF_INSTRUCTION: u32 = 4;

/// Value produced by the ALU before it is written back.
enum AluOutcome {
    Logical(u32),
    Arithmetic(ArithmeticOpResult),
}

impl AluOutcome {
    const fn value(&self) -> u32 {
        match self {
            Self::Logical(v) => *v,
            Self::Arithmetic(r) => r.result,
        }
    }
}

impl Arm7tdmi {
    pub fn data_processing(
        &mut self,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    ) {
        let shift_by_register = matches!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(_),
                ..
            }
        );

        let mut op1 = self.registers.register_at(rn as usize);
        // The extra internal cycle of a register shift moves PC one more word ahead.
        if rn as usize == REG_PROGRAM_COUNTER && shift_by_register {
            op1 = op1.wrapping_add(4);
        }

        let ShiftResult {
            value: op2,
            carry: shifter_carry,
        } = self.alu_second_operand(op2);

        let carry = self.cpsr.carry_flag();

        use ArmModeAluInstruction::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        let outcome = match alu_instruction {
            And | Tst => AluOutcome::Logical(op1 & op2),
            Eor | Teq => AluOutcome::Logical(op1 ^ op2),
            Orr => AluOutcome::Logical(op1 | op2),
            Bic => AluOutcome::Logical(op1 & !op2),
            Mov => AluOutcome::Logical(op2),
            Mvn => AluOutcome::Logical(!op2),
            Sub | Cmp => AluOutcome::Arithmetic(sub_inner_op(op1, op2)),
            Rsb => AluOutcome::Arithmetic(sub_inner_op(op2, op1)),
            Add | Cmn => AluOutcome::Arithmetic(add_inner_op(op1, op2)),
            Adc => AluOutcome::Arithmetic(add_with_carry(op1, op2, carry)),
            Sbc => AluOutcome::Arithmetic(add_with_carry(op1, !op2, carry)),
            Rsc => AluOutcome::Arithmetic(add_with_carry(op2, !op1, carry)),
        };

        let writes_pc = destination as usize == REG_PROGRAM_COUNTER && !alu_instruction.is_test();

        if set_conditions {
            if writes_pc {
                self.restore_from_spsr();
            } else {
                match &outcome {
                    AluOutcome::Logical(value) => {
                        debug_assert_eq!(alu_instruction.kind(), AluInstructionKind::Logical);
                        self.cpsr.set_logical_flags(*value);
                        self.cpsr.set_carry_flag(shifter_carry);
                    }
                    AluOutcome::Arithmetic(result) => self.cpsr.set_flags(result),
                }
            }
        }

        if !alu_instruction.is_test() {
            self.write_register(destination as usize, outcome.value());
        }
    }

    /// Evaluates operand 2 of data processing and MSR, with the shifter carry-out.
    pub(crate) fn alu_second_operand(&mut self, op2: AluSecondOperandInfo) -> ShiftResult {
        let carry = self.cpsr.carry_flag();
        match op2 {
            AluSecondOperandInfo::Immediate { base, shift } => {
                let value = base.rotate_right(shift);
                ShiftResult {
                    value,
                    carry: if shift == 0 { carry } else { value.get_bit(31) },
                }
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => {
                let rm = self.registers.register_at(register as usize);
                shift(shift_kind, amount, rm, carry, true)
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => {
                self.bus.idle(1);
                let amount = self.registers.register_at(rs as usize) & 0xFF;
                let mut rm = self.registers.register_at(register as usize);
                if register as usize == REG_PROGRAM_COUNTER {
                    rm = rm.wrapping_add(4);
                }
                shift(shift_kind, amount, rm, carry, false)
            }
        }
    }

    pub fn psr_transfer(&mut self, op_kind: PsrOpKind, psr_kind: PsrKind) {
        match op_kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let psr = match psr_kind {
                    PsrKind::Cpsr => self.cpsr,
                    PsrKind::Spsr => self.spsr(),
                };

                self.write_register(destination_register as usize, psr.into());
            }
            PsrOpKind::Msr {
                field_mask,
                operand,
            } => {
                let value = match operand {
                    AluSecondOperandInfo::Immediate { base, shift } => base.rotate_right(shift),
                    AluSecondOperandInfo::Register { register, .. } => {
                        self.registers.register_at(register as usize)
                    }
                };

                let mut mask = (0..4)
                    .filter(|field| field_mask.get_bit(*field))
                    .fold(0_u32, |mask, field| mask | (0xFF << (field * 8)));

                // In User mode only the flags can be written.
                if self.cpsr.mode() == Mode::User {
                    mask &= 0xFF00_0000;
                }

                // The T bit is never altered by MSR.
                mask.set_bit_off(5);

                match psr_kind {
                    PsrKind::Cpsr => {
                        if mask.get_bit(0) {
                            let mut requested = self.cpsr;
                            requested.write_masked(value, mask);
                            self.set_mode(requested.mode());
                        }
                        self.cpsr.write_masked(value, mask & !0x1F);
                    }
                    PsrKind::Spsr => {
                        let mode = self.cpsr.mode();
                        if let Some(mut spsr) = self.register_bank.spsr(mode) {
                            // The BIOS parks arbitrary mode bits in SPSRs so they are kept raw.
                            spsr.write_masked(value, mask);
                            self.register_bank.set_spsr(mode, spsr);
                        }
                    }
                }
            }
        }
    }

    pub fn branch_and_exchange(&mut self, register: usize) {
        let rn = self.registers.register_at(register);
        let state: CpuState = rn.get_bit(0).into();
        self.cpsr.set_cpu_state(state);

        self.set_pc(rn);
    }

    pub fn branch(&mut self, is_link: bool, offset: i32) {
        let pc = self.registers.program_counter();
        if is_link {
            self.registers
                .set_register_at(REG_LR, pc.wrapping_sub(SIZE_OF_INSTRUCTION));
        }

        self.set_pc(pc.wrapping_add_signed(offset));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn half_word_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        source_destination_register: u32,
        transfer_kind: HalfwordTransferKind,
    ) {
        let offset = match offset_kind {
            HalfwordDataTransferOffsetKind::Immediate { offset } => offset,
            HalfwordDataTransferOffsetKind::Register { register } => {
                self.registers.register_at(register as usize)
            }
        };

        let base = self.registers.register_at(base_register as usize);
        let effective = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => effective,
            Indexing::Post => base,
        };

        let loaded = match load_store_kind {
            LoadStoreKind::Store => {
                let mut value = self
                    .registers
                    .register_at(source_destination_register as usize);
                if source_destination_register as usize == REG_PROGRAM_COUNTER {
                    value = value.wrapping_add(4);
                }

                self.bus.write_half_word(address, value as u16);
                None
            }
            LoadStoreKind::Load => {
                self.bus.idle(1);
                Some(match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => self.load_half_word(address),
                    HalfwordTransferKind::SignedByte => {
                        u32::from(self.bus.read_byte(address)).sign_extended(8)
                    }
                    HalfwordTransferKind::SignedHalfwords => self.load_signed_half_word(address),
                })
            }
        };

        if indexing == Indexing::Post || write_back {
            self.write_register(base_register as usize, effective);
        }

        if let Some(value) = loaded {
            self.write_register(source_destination_register as usize, value);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn single_data_transfer(
        &mut self,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    ) {
        let base = self.registers.register_at(base_register as usize);

        let amount = match offset_info {
            SingleDataTransferOffsetInfo::Immediate { offset } => offset,
            SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => {
                let v = self.registers.register_at(reg_offset as usize);
                // Addressing shifts never touch the carry flag.
                shift(shift_kind, shift_amount, v, self.cpsr.carry_flag(), true).value
            }
        };

        let effective = offsetting.apply(base, amount);
        let address = match indexing {
            Indexing::Pre => effective,
            Indexing::Post => base,
        };

        let loaded = match kind {
            LoadStoreKind::Load => {
                self.bus.idle(1);
                Some(match quantity {
                    ReadWriteKind::Byte => u32::from(self.bus.read_byte(address)),
                    ReadWriteKind::Word => self.load_word(address),
                })
            }
            LoadStoreKind::Store => {
                let mut value = self.registers.register_at(rd as usize);
                // R15 is stored as the instruction address + 12.
                if rd as usize == REG_PROGRAM_COUNTER {
                    value = value.wrapping_add(4);
                }

                match quantity {
                    ReadWriteKind::Byte => self.bus.write_byte(address, value as u8),
                    ReadWriteKind::Word => self.bus.write_word(address, value),
                }
                None
            }
        };

        // Post-indexing always writes back.
        if indexing == Indexing::Post || write_back {
            self.write_register(base_register as usize, effective);
        }

        if let Some(value) = loaded {
            self.write_register(rd as usize, value);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn block_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        reg_list: u32,
    ) {
        let base_register = rn as usize;
        let base = self.registers.register_at(base_register);

        // An empty list transfers R15 alone but moves the base as if all 16 were transferred.
        let (reg_list, transfer_size) = if reg_list == 0 {
            (1 << REG_PROGRAM_COUNTER, 0x40)
        } else {
            (reg_list, reg_list.count_ones() * 4)
        };

        let final_base = offsetting.apply(base, transfer_size);
        let lowest_address = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Pre) => base.wrapping_add(4),
            (Offsetting::Up, Indexing::Post) => base,
            (Offsetting::Down, Indexing::Pre) => final_base,
            (Offsetting::Down, Indexing::Post) => final_base.wrapping_add(4),
        };

        let restores_cpsr =
            load_psr && load_store == LoadStoreKind::Load && reg_list.get_bit(15);
        let user_bank = load_psr && !restores_cpsr;

        let registers: Vec<usize> = (0..16).filter(|r| reg_list.get_bit(*r as u8)).collect();
        let slots: Vec<(usize, u32)> = registers
            .iter()
            .enumerate()
            .map(|(slot, reg)| (*reg, lowest_address.wrapping_add(slot as u32 * 4)))
            .collect();

        // Up modes walk the list upwards, down modes from the top.
        let ordered: Box<dyn Iterator<Item = &(usize, u32)>> = match offsetting {
            Offsetting::Up => Box::new(slots.iter()),
            Offsetting::Down => Box::new(slots.iter().rev()),
        };

        match load_store {
            LoadStoreKind::Store => {
                for &(reg, address) in ordered {
                    let mut value = if user_bank {
                        self.user_register(reg)
                    } else {
                        self.registers.register_at(reg)
                    };
                    if reg == REG_PROGRAM_COUNTER {
                        value = value.wrapping_add(4);
                    }
                    self.bus.write_word(address, value);
                }

                if write_back {
                    self.write_register(base_register, final_base);
                }
            }
            LoadStoreKind::Load => {
                self.bus.idle(1);
                let mut new_pc = None;
                for &(reg, address) in ordered {
                    let value = self.bus.read_word(address);
                    if reg == REG_PROGRAM_COUNTER {
                        new_pc = Some(value);
                    } else if user_bank {
                        self.set_user_register(reg, value);
                    } else {
                        self.registers.set_register_at(reg, value);
                    }
                }

                // A loaded base wins over write-back.
                if write_back && !reg_list.get_bit(rn as u8) {
                    self.write_register(base_register, final_base);
                }

                if let Some(pc) = new_pc {
                    if restores_cpsr {
                        self.restore_from_spsr();
                    }
                    self.set_pc(pc);
                }
            }
        }
    }

    pub(crate) fn single_data_swap(&mut self, quantity: ReadWriteKind, rn: u32, rd: u32, rm: u32) {
        let address = self.registers.register_at(rn as usize);
        let source = self.registers.register_at(rm as usize);

        let loaded = match quantity {
            ReadWriteKind::Byte => {
                let v = u32::from(self.bus.read_byte(address));
                self.bus.write_byte(address, source as u8);
                v
            }
            ReadWriteKind::Word => {
                let v = self.load_word(address);
                self.bus.write_word(address, source);
                v
            }
        };

        self.bus.idle(1);
        self.write_register(rd as usize, loaded);
    }

    /// Internal cycles spent by the multiplier array for operand `rs`.
    ///
    /// Signed variants terminate early on both all-zero and all-one upper bytes.
    pub(crate) const fn multiply_cycles(rs: u32, signed: bool) -> u32 {
        let mut m = 4;
        let mut bytes = 1;
        while bytes < 4 {
            let upper = rs >> (bytes * 8);
            let all_ones = u32::MAX >> (bytes * 8);
            if upper == 0 || (signed && upper == all_ones) {
                m = bytes;
                break;
            }
            bytes += 1;
        }
        m
    }

    pub fn multiply(
        &mut self,
        mul_variant: ArmModeMultiplyVariant,
        set_condition_codes: bool,
        rd: u32,
        rn: u32,
        rs: u32,
        rm: u32,
    ) {
        let rm_value = self.registers.register_at(rm as usize);
        let rs_value = self.registers.register_at(rs as usize);

        let mut result = rm_value.wrapping_mul(rs_value);
        let mut cycles = Self::multiply_cycles(rs_value, true);
        if mul_variant == ArmModeMultiplyVariant::Mla {
            result = result.wrapping_add(self.registers.register_at(rn as usize));
            cycles += 1;
        }

        self.bus.idle(cycles);
        self.write_register(rd as usize, result);

        if set_condition_codes {
            self.cpsr.set_logical_flags(result);
        }
    }

    pub fn multiply_long(
        &mut self,
        mul_variant: ArmModeMultiplyLongVariant,
        set_condition_codes: bool,
        rdhi: u32,
        rdlo: u32,
        rs: u32,
        rm: u32,
    ) {
        use ArmModeMultiplyLongVariant::{Smlal, Smull, Umlal, Umull};

        let rm_value = self.registers.register_at(rm as usize);
        let rs_value = self.registers.register_at(rs as usize);

        let signed = matches!(mul_variant, Smull | Smlal);
        let accumulate = matches!(mul_variant, Umlal | Smlal);

        let mut result = if signed {
            (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
        } else {
            u64::from(rm_value) * u64::from(rs_value)
        };

        let mut cycles = Self::multiply_cycles(rs_value, signed) + 1;
        if accumulate {
            let hi = u64::from(self.registers.register_at(rdhi as usize));
            let lo = u64::from(self.registers.register_at(rdlo as usize));
            result = result.wrapping_add((hi << 32) | lo);
            cycles += 1;
        }

        self.bus.idle(cycles);
        self.write_register(rdlo as usize, result as u32);
        self.write_register(rdhi as usize, (result >> 32) as u32);

        if set_condition_codes {
            self.cpsr.set_zero_flag(result == 0);
            self.cpsr.set_sign_flag(result.get_bit(63));
        }
    }

    /// LDR semantics: misaligned words are rotated into place.
    pub(crate) fn load_word(&mut self, address: u32) -> u32 {
        self.bus.read_word(address).rotate_right((address & 3) * 8)
    }

    /// LDRH semantics: odd addresses rotate the aligned halfword.
    pub(crate) fn load_half_word(&mut self, address: u32) -> u32 {
        u32::from(self.bus.read_half_word(address)).rotate_right((address & 1) * 8)
    }

    /// LDRSH semantics: odd addresses load a sign-extended byte.
    pub(crate) fn load_signed_half_word(&mut self, address: u32) -> u32 {
        if address.get_bit(0) {
            u32::from(self.bus.read_byte(address)).sign_extended(8)
        } else {
            u32::from(self.bus.read_half_word(address)).sign_extended(16)
        }
    }

    /// Reads a register of the User bank regardless of the current mode.
    pub(crate) fn user_register(&self, reg: usize) -> u32 {
        match (reg, self.cpsr.mode()) {
            (8..=12, Mode::Fiq) => self.register_bank.r8_r12_user[reg - 8],
            (13, mode) if mode.bank_index() != 0 => self.register_bank.r13[0],
            (14, mode) if mode.bank_index() != 0 => self.register_bank.r14[0],
            _ => self.registers.register_at(reg),
        }
    }

    pub(crate) fn set_user_register(&mut self, reg: usize, value: u32) {
        match (reg, self.cpsr.mode()) {
            (8..=12, Mode::Fiq) => self.register_bank.r8_r12_user[reg - 8] = value,
            (13, mode) if mode.bank_index() != 0 => self.register_bank.r13[0] = value,
            (14, mode) if mode.bank_index() != 0 => self.register_bank.r14[0] = value,
            _ => self.registers.set_register_at(reg, value),
        }
    }

    /// The SPSR of the current mode, or the CPSR in User and System mode.
    #[must_use]
    pub fn spsr(&self) -> Psr {
        self.register_bank
            .spsr(self.cpsr.mode())
            .unwrap_or(self.cpsr)
    }
}
