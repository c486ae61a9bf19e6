use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    add_inner_op, add_with_carry, sub_inner_op, ArithmeticOpResult,
};
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::barrel_shifter::{shift, ShiftKind};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{Indexing, LoadStoreKind, Offsetting, OperandKind, ReadWriteKind};
use crate::cpu::registers::{REG_LR, REG_SP};
use crate::cpu::thumb::alu_instructions::{
    ThumbHighRegisterOperation, ThumbImmediateOperation, ThumbModeAluInstruction,
};
use crate::cpu::thumb::instruction::ThumbModeInstruction;

impl Arm7tdmi {
    pub(crate) fn execute_thumb(&mut self, op_code: u16, instruction: ThumbModeInstruction) {
        use ThumbModeInstruction::{
            AddOffsetSP, AddSubtract, AluOp, CondBranch, HiRegisterOpBX, LoadAddress,
            LoadStoreHalfword, LoadStoreImmOffset, LoadStoreRegisterOffset,
            LoadStoreSignExtByteHalfword, LongBranchLink, MoveCompareAddSubtractImm,
            MoveShiftedRegister, MultipleLoadStore, PCRelativeLoad, PushPopReg,
            SPRelativeLoadStore, Swi, UncondBranch, Undefined,
        };

        match instruction {
            MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => self.move_shifted_reg(
                shift_operation,
                offset5,
                source_register,
                destination_register,
            ),
            AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => self.add_subtract(
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            ),
            MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => self.move_compare_add_sub_imm(operation, destination_register, offset),
            AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => self.alu_op(alu_operation, source_register, destination_register),
            HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => self.hi_reg_operation_branch_ex(
                register_operation,
                source_register,
                destination_register,
            ),
            PCRelativeLoad {
                destination_register,
                immediate_value,
            } => self.pc_relative_load(destination_register, immediate_value),
            LoadStoreRegisterOffset {
                load_store,
                byte_word,
                ro,
                base_register,
                destination_register,
            } => {
                let address = self
                    .registers
                    .register_at(base_register.into())
                    .wrapping_add(self.registers.register_at(ro.into()));
                self.load_store_word_byte(load_store, byte_word, address, destination_register);
            }
            LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => self.load_store_sign_extend_byte_halfword(
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            ),
            LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let address = self
                    .registers
                    .register_at(base_register.into())
                    .wrapping_add(offset.into());
                self.load_store_word_byte(load_store, byte_word, address, destination_register);
            }
            LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => self.load_store_halfword(
                load_store,
                offset,
                base_register,
                source_destination_register,
            ),
            SPRelativeLoadStore {
                load_store,
                destination_register,
                word8,
            } => {
                let address = self
                    .registers
                    .register_at(REG_SP)
                    .wrapping_add(word8.into());
                self.load_store_word_byte(
                    load_store,
                    ReadWriteKind::Word,
                    address,
                    destination_register,
                );
            }
            LoadAddress {
                sp,
                destination_register,
                offset,
            } => self.load_address(sp, destination_register, offset),
            AddOffsetSP { offsetting, word7 } => {
                let sp = self.registers.register_at(REG_SP);
                self.registers
                    .set_register_at(REG_SP, offsetting.apply(sp, word7.into()));
            }
            PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => self.push_pop_register(load_store, pc_lr, register_list),
            MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => self.block_data_transfer(
                Indexing::Post,
                Offsetting::Up,
                false,
                true,
                load_store,
                base_register.into(),
                register_list.into(),
            ),
            CondBranch {
                condition,
                immediate_offset,
            } => self.cond_branch(condition, immediate_offset),
            Swi { comment } => self.software_interrupt(comment),
            UncondBranch { offset } => {
                let pc = self.registers.program_counter();
                self.set_pc(pc.wrapping_add_signed(offset));
            }
            LongBranchLink { h, offset } => self.long_branch_link(h, offset),
            Undefined => self.undefined_instruction(op_code.into()),
        }
    }

    pub fn move_shifted_reg(&mut self, op: ShiftKind, offset5: u16, rs: u16, rd: u16) {
        let source = self.registers.register_at(rs.into());
        let r = shift(op, offset5.into(), source, self.cpsr.carry_flag(), true);
        self.registers.set_register_at(rd.into(), r.value);

        self.cpsr.set_logical_flags(r.value);
        self.cpsr.set_carry_flag(r.carry);
    }

    pub fn add_subtract(
        &mut self,
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u16,
        rs: u16,
        rd: u16,
    ) {
        let rs = self.registers.register_at(rs.into());
        let offset = match operation_kind {
            OperandKind::Immediate => u32::from(rn_offset3),
            OperandKind::Register => self.registers.register_at(rn_offset3.into()),
        };

        let result = if subtract {
            sub_inner_op(rs, offset)
        } else {
            add_inner_op(rs, offset)
        };
        self.registers.set_register_at(rd.into(), result.result);
        self.cpsr.set_flags(&result);
    }

    pub fn move_compare_add_sub_imm(
        &mut self,
        op: ThumbImmediateOperation,
        r_destination: u16,
        offset: u32,
    ) {
        let dest = r_destination.into();
        let rd = self.registers.register_at(dest);
        match op {
            ThumbImmediateOperation::Mov => {
                // Same as ARM `MOVS Rd, #imm` with no rotation: C is untouched.
                self.registers.set_register_at(dest, offset);
                self.cpsr.set_logical_flags(offset);
            }
            ThumbImmediateOperation::Cmp => self.cpsr.set_flags(&sub_inner_op(rd, offset)),
            ThumbImmediateOperation::Add => self.thumb_arithmetic(dest, add_inner_op(rd, offset)),
            ThumbImmediateOperation::Sub => self.thumb_arithmetic(dest, sub_inner_op(rd, offset)),
        }
    }

    pub fn alu_op(&mut self, op: ThumbModeAluInstruction, rs: u16, rd: u16) {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let destination: usize = rd.into();
        let op1 = self.registers.register_at(destination);
        let op2 = self.registers.register_at(rs.into());
        let carry = self.cpsr.carry_flag();

        match op {
            And => self.thumb_logical(destination, op1 & op2),
            Eor => self.thumb_logical(destination, op1 ^ op2),
            Orr => self.thumb_logical(destination, op1 | op2),
            Bic => self.thumb_logical(destination, op1 & !op2),
            Mvn => self.thumb_logical(destination, !op2),
            Tst => self.cpsr.set_logical_flags(op1 & op2),
            Lsl | Lsr | Asr | Ror => {
                let kind = match op {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                self.bus.idle(1);
                let r = shift(kind, op2, op1, carry, false);
                self.thumb_logical(destination, r.value);
                self.cpsr.set_carry_flag(r.carry);
            }
            Adc => self.thumb_arithmetic(destination, add_with_carry(op1, op2, carry)),
            Sbc => self.thumb_arithmetic(destination, add_with_carry(op1, !op2, carry)),
            Neg => self.thumb_arithmetic(destination, sub_inner_op(0, op2)),
            Cmp => self.cpsr.set_flags(&sub_inner_op(op1, op2)),
            Cmn => self.cpsr.set_flags(&add_inner_op(op1, op2)),
            Mul => {
                self.bus.idle(Self::multiply_cycles(op1, true));
                self.thumb_logical(destination, op1.wrapping_mul(op2));
            }
        }
    }

    fn thumb_logical(&mut self, rd: usize, result: u32) {
        self.registers.set_register_at(rd, result);
        self.cpsr.set_logical_flags(result);
    }

    fn thumb_arithmetic(&mut self, rd: usize, result: ArithmeticOpResult) {
        self.registers.set_register_at(rd, result.result);
        self.cpsr.set_flags(&result);
    }

    pub fn hi_reg_operation_branch_ex(
        &mut self,
        op: ThumbHighRegisterOperation,
        rs: u16,
        rd: u16,
    ) {
        let source = self.registers.register_at(rs.into());
        let destination: usize = rd.into();

        match op {
            ThumbHighRegisterOperation::Add => {
                let value = self.registers.register_at(destination).wrapping_add(source);
                self.write_register(destination, value);
            }
            ThumbHighRegisterOperation::Cmp => {
                let value = self.registers.register_at(destination);
                self.cpsr.set_flags(&sub_inner_op(value, source));
            }
            ThumbHighRegisterOperation::Mov => self.write_register(destination, source),
            ThumbHighRegisterOperation::Bx => self.branch_and_exchange(rs.into()),
        }
    }

    pub fn pc_relative_load(&mut self, r_destination: u16, immediate_value: u16) {
        let address = (self.registers.program_counter() & !3).wrapping_add(immediate_value.into());
        let value = self.bus.read_word(address);
        self.bus.idle(1);
        self.registers.set_register_at(r_destination.into(), value);
    }

    fn load_store_word_byte(
        &mut self,
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        address: u32,
        rd: u16,
    ) {
        let rd: usize = rd.into();
        match (load_store, byte_word) {
            (LoadStoreKind::Store, ReadWriteKind::Word) => {
                self.bus.write_word(address, self.registers.register_at(rd));
            }
            (LoadStoreKind::Store, ReadWriteKind::Byte) => {
                self.bus.write_byte(address, self.registers.register_at(rd) as u8);
            }
            (LoadStoreKind::Load, ReadWriteKind::Word) => {
                let value = self.load_word(address);
                self.bus.idle(1);
                self.registers.set_register_at(rd, value);
            }
            (LoadStoreKind::Load, ReadWriteKind::Byte) => {
                let value = u32::from(self.bus.read_byte(address));
                self.bus.idle(1);
                self.registers.set_register_at(rd, value);
            }
        }
    }

    pub fn load_store_sign_extend_byte_halfword(
        &mut self,
        h: bool,
        sign_extend_flag: bool,
        ro: u16,
        rb: u16,
        rd: u16,
    ) {
        let address = self
            .registers
            .register_at(rb.into())
            .wrapping_add(self.registers.register_at(ro.into()));
        let rd: usize = rd.into();

        let value = match (sign_extend_flag, h) {
            (false, false) => {
                self.bus
                    .write_half_word(address, self.registers.register_at(rd) as u16);
                return;
            }
            (false, true) => self.load_half_word(address),
            (true, false) => u32::from(self.bus.read_byte(address)).sign_extended(8),
            (true, true) => self.load_signed_half_word(address),
        };

        self.bus.idle(1);
        self.registers.set_register_at(rd, value);
    }

    pub fn load_store_halfword(
        &mut self,
        load_store: LoadStoreKind,
        offset: u16,
        rb: u16,
        rd: u16,
    ) {
        let address = self
            .registers
            .register_at(rb.into())
            .wrapping_add(offset.into());
        let rd: usize = rd.into();

        match load_store {
            LoadStoreKind::Store => {
                self.bus
                    .write_half_word(address, self.registers.register_at(rd) as u16);
            }
            LoadStoreKind::Load => {
                let value = self.load_half_word(address);
                self.bus.idle(1);
                self.registers.set_register_at(rd, value);
            }
        }
    }

    pub fn load_address(&mut self, sp: bool, rd: u16, offset: u32) {
        let base = if sp {
            self.registers.register_at(REG_SP)
        } else {
            self.registers.program_counter() & !3
        };
        self.registers
            .set_register_at(rd.into(), base.wrapping_add(offset));
    }

    /// PUSH is `STMDB SP!` with optional LR, POP is `LDMIA SP!` with optional PC.
    pub fn push_pop_register(
        &mut self,
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u16,
    ) {
        let mut list = u32::from(register_list);
        match load_store {
            LoadStoreKind::Store => {
                list.set_bit(REG_LR as u8, pc_lr);
                self.block_data_transfer(
                    Indexing::Pre,
                    Offsetting::Down,
                    false,
                    true,
                    load_store,
                    REG_SP as u32,
                    list,
                );
            }
            LoadStoreKind::Load => {
                list.set_bit(15, pc_lr);
                self.block_data_transfer(
                    Indexing::Post,
                    Offsetting::Up,
                    false,
                    true,
                    load_store,
                    REG_SP as u32,
                    list,
                );
            }
        }
    }

    pub fn cond_branch(&mut self, condition: Condition, immediate_offset: i32) {
        if self.cpsr.can_execute(condition) {
            let pc = self.registers.program_counter();
            self.set_pc(pc.wrapping_add_signed(immediate_offset));
        }
    }

    pub fn long_branch_link(&mut self, h: bool, offset: u32) {
        if h {
            let next = self.next_instruction_address();
            let target = self
                .registers
                .register_at(REG_LR)
                .wrapping_add(offset << 1);
            self.registers.set_register_at(REG_LR, next | 1);
            self.set_pc(target);
        } else {
            let high = (offset << 12).sign_extended(23);
            let lr = self.registers.program_counter().wrapping_add(high);
            self.registers.set_register_at(REG_LR, lr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::psr::CpuState;
    use pretty_assertions::assert_eq;

    const BASE: u32 = 0x0300_0000;

    fn thumb_cpu() -> Arm7tdmi {
        let mut cpu = Arm7tdmi::default();
        cpu.skip_bios();
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_program_counter(BASE);
        cpu
    }

    fn run(cpu: &mut Arm7tdmi, op_code: u16) {
        let pc = cpu.registers.program_counter();
        cpu.bus.write_half_word(pc, op_code);
        cpu.step();
    }

    #[test]
    fn check_move_compare_add_sub_imm() {
        let mut cpu = thumb_cpu();
        cpu.cpsr.set_carry_flag(true);
        run(&mut cpu, 0x2005); // MOV R0, #5
        assert_eq!(cpu.registers.register_at(0), 5);
        assert!(cpu.cpsr.carry_flag());

        run(&mut cpu, 0x3003); // ADD R0, #3
        assert_eq!(cpu.registers.register_at(0), 8);

        run(&mut cpu, 0x2809); // CMP R0, #9
        assert!(cpu.cpsr.sign_flag());
        assert!(!cpu.cpsr.carry_flag());
        assert_eq!(cpu.registers.program_counter(), BASE + 6);
    }

    #[test]
    fn check_move_shifted_register() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(1, 0x8000_0001);
        run(&mut cpu, 0x0048); // LSL R0, R1, #1
        assert_eq!(cpu.registers.register_at(0), 2);
        assert!(cpu.cpsr.carry_flag());
        assert!(!cpu.cpsr.zero_flag());
    }

    #[test]
    fn check_alu_neg_and_mul() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(1, 5);
        run(&mut cpu, 0x4248); // NEG R0, R1
        assert_eq!(cpu.registers.register_at(0), (-5_i32) as u32);
        assert!(cpu.cpsr.sign_flag());

        cpu.registers.set_register_at(2, 3);
        run(&mut cpu, 0x4350); // MUL R0, R2
        assert_eq!(cpu.registers.register_at(0), (-15_i32) as u32);
    }

    #[test]
    fn check_alu_register_shift_by_zero_keeps_carry() {
        let mut cpu = thumb_cpu();
        cpu.cpsr.set_carry_flag(true);
        cpu.registers.set_register_at(0, 0x10);
        cpu.registers.set_register_at(1, 0x100);
        run(&mut cpu, 0x4088); // LSL R0, R1
        assert_eq!(cpu.registers.register_at(0), 0x10);
        assert!(cpu.cpsr.carry_flag());
    }

    #[test]
    fn check_long_branch_link() {
        let mut cpu = thumb_cpu();
        run(&mut cpu, 0xF000);
        run(&mut cpu, 0xF880);
        assert_eq!(cpu.registers.program_counter(), BASE + 0x104);
        assert_eq!(cpu.registers.register_at(REG_LR), (BASE + 4) | 1);
    }

    #[test]
    fn check_push_pop() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(0, 0xAAAA);
        cpu.registers.set_register_at(REG_LR, BASE + 0x41);
        run(&mut cpu, 0xB501); // PUSH {R0, LR}
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00 - 8);
        assert_eq!(cpu.bus.read_word(0x0300_7F00 - 8), 0xAAAA);

        run(&mut cpu, 0xBD02); // POP {R1, PC}
        assert_eq!(cpu.registers.register_at(1), 0xAAAA);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00);
        assert_eq!(cpu.registers.program_counter(), BASE + 0x40);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_conditional_branch() {
        let mut cpu = thumb_cpu();
        cpu.cpsr.set_zero_flag(false);
        run(&mut cpu, 0xD0FE); // BEQ .
        assert_eq!(cpu.registers.program_counter(), BASE + 2);

        cpu.cpsr.set_zero_flag(true);
        run(&mut cpu, 0xD0FE);
        assert_eq!(cpu.registers.program_counter(), BASE + 2);
    }

    #[test]
    fn check_hi_register_mov_and_bx() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(0, BASE + 0x100);
        run(&mut cpu, 0x4680); // MOV R8, R0
        assert_eq!(cpu.registers.register_at(8), BASE + 0x100);

        run(&mut cpu, 0x4740); // BX R8
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.program_counter(), BASE + 0x100);
    }

    #[test]
    fn check_pc_relative_load() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_program_counter(BASE + 2);
        cpu.bus.write_word(BASE + 8, 0xDEAD_BEEF);
        run(&mut cpu, 0x4801); // LDR R0, [PC, #4]
        assert_eq!(cpu.registers.register_at(0), 0xDEAD_BEEF);
    }

    #[test]
    fn check_load_store_sign_extended() {
        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(1, BASE + 0x200);
        cpu.registers.set_register_at(2, 0);
        cpu.bus.write_half_word(BASE + 0x200, 0x80FF);
        run(&mut cpu, 0x5688); // LDSB R0, [R1, R2]
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_FFFF);
        run(&mut cpu, 0x5E88); // LDSH R0, [R1, R2]
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_80FF);
    }

    #[test]
    fn check_add_offset_sp() {
        let mut cpu = thumb_cpu();
        run(&mut cpu, 0xB082); // SUB SP, #8
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00 - 8);
        run(&mut cpu, 0xB002); // ADD SP, #8
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00);
    }

    #[test]
    fn check_undefined_enters_arm_handler() {
        let mut cpu = thumb_cpu();
        run(&mut cpu, 0xDE00);
        assert_eq!(cpu.cpsr.mode(), Mode::Undefined);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.register_at(REG_LR), BASE + 2);
        assert_eq!(cpu.registers.program_counter(), 0x04);
    }
}
