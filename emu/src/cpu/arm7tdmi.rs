//! # ARM7TDMI core
//!
//! Owns the [`Bus`] and executes one instruction per [`Arm7tdmi::step`].
//!
//! While an instruction executes R15 reads as its address plus two
//! instruction sizes (+8 ARM, +4 Thumb). When it retires R15 is moved to the
//! following instruction, unless the instruction wrote R15 itself, in which
//! case the pipeline is considered flushed and the written value is kept.

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::bios::IntrWait;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{Registers, REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::thumb::instruction::ThumbModeInstruction;

pub const SIZE_OF_ARM_INSTRUCTION: u32 = 4;
pub const SIZE_OF_THUMB_INSTRUCTION: u32 = 2;

/// Exceptions raised on the GBA. Reset, aborts and FIQ never happen there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Undefined,
    SoftwareInterrupt,
    Irq,
}

impl Exception {
    const fn vector(self) -> u32 {
        match self {
            Self::Undefined => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::Irq => 0x18,
        }
    }

    const fn mode(self) -> Mode {
        match self {
            Self::Undefined => Mode::Undefined,
            Self::SoftwareInterrupt => Mode::Supervisor,
            Self::Irq => Mode::Irq,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub bus: Bus,

    pub cpsr: Psr,
    pub registers: Registers,

    pub register_bank: RegisterBank,

    /// Address of the instruction currently (or last) executed.
    current_instruction_address: u32,

    /// Raw opcode of the instruction currently (or last) executed.
    last_opcode: u32,

    /// Set when the executing instruction wrote R15.
    pipeline_flushed: bool,

    /// BIOS calls are serviced in Rust instead of jumping to the SWI vector.
    pub(crate) hle_bios: bool,

    /// Pending `IntrWait`/`VBlankIntrWait` call.
    pub(crate) intr_wait: Option<IntrWait>,

    umaal_reported: bool,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        Self::new(Bus::default())
    }
}

impl Arm7tdmi {
    #[must_use]
    pub fn new(bus: Bus) -> Self {
        let mut cpsr = Psr::from(Mode::Supervisor);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        cpsr.set_cpu_state(CpuState::Arm);

        Self {
            bus,
            cpsr,
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            current_instruction_address: 0,
            last_opcode: 0,
            pipeline_flushed: false,
            hle_bios: true,
            intr_wait: None,
            umaal_reported: false,
        }
    }

    /// Puts the CPU in the state the BIOS leaves it in before jumping to the cartridge.
    pub fn skip_bios(&mut self) {
        self.set_mode(Mode::Supervisor);
        self.registers.set_register_at(REG_SP, 0x0300_7FE0);
        self.set_mode(Mode::Irq);
        self.registers.set_register_at(REG_SP, 0x0300_7FA0);
        self.set_mode(Mode::System);
        self.registers.set_register_at(REG_SP, 0x0300_7F00);

        self.cpsr = Psr::from(Mode::System);
        self.registers.set_program_counter(0x0800_0000);
        self.bus.interrupt_control.post_boot_flag = 1;
    }

    /// Executes one instruction, or services an interrupt, or idles while halted.
    /// Returns the cycles consumed.
    pub fn step(&mut self) -> u32 {
        if self.bus.interrupt_control.halted {
            if self.bus.interrupt_control.wake_up_pending() {
                self.bus.interrupt_control.halted = false;
            } else {
                let idle = self.bus.cycles_until_next_event();
                self.bus.idle(idle);
                return self.bus.take_cycles().max(1);
            }
        }

        if self.bus.interrupt_control.irq_pending() && !self.cpsr.irq_disable() {
            let return_address = self.registers.program_counter().wrapping_add(4);
            self.exception(Exception::Irq, return_address);
            return self.bus.take_cycles().max(1);
        }

        if self.resume_intr_wait() {
            return self.bus.take_cycles().max(1);
        }

        match self.cpsr.cpu_state() {
            CpuState::Arm => self.step_arm(),
            CpuState::Thumb => self.step_thumb(),
        }

        self.bus.take_cycles().max(1)
    }

    fn step_arm(&mut self) {
        let address = self.registers.program_counter() & !3;
        let op_code = self.bus.fetch_arm(address);
        self.begin_instruction(address, op_code, SIZE_OF_ARM_INSTRUCTION);

        let instruction = ArmModeInstruction::from(op_code);
        if self.cpsr.can_execute(instruction.condition()) {
            self.execute_arm(op_code, instruction);
        }

        self.retire_instruction(address, SIZE_OF_ARM_INSTRUCTION);
    }

    fn step_thumb(&mut self) {
        let address = self.registers.program_counter() & !1;
        let op_code = self.bus.fetch_thumb(address);
        self.begin_instruction(address, u32::from(op_code), SIZE_OF_THUMB_INSTRUCTION);

        let instruction = ThumbModeInstruction::from(op_code);
        self.execute_thumb(op_code, instruction);

        self.retire_instruction(address, SIZE_OF_THUMB_INSTRUCTION);
    }

    fn begin_instruction(&mut self, address: u32, op_code: u32, size: u32) {
        self.current_instruction_address = address;
        self.last_opcode = op_code;
        self.pipeline_flushed = false;
        self.registers
            .set_program_counter(address.wrapping_add(2 * size));
    }

    fn retire_instruction(&mut self, address: u32, size: u32) {
        if !self.pipeline_flushed {
            self.registers.set_program_counter(address.wrapping_add(size));
        }
    }

    pub(crate) fn execute_arm(&mut self, op_code: u32, instruction: ArmModeInstruction) {
        use ArmModeInstruction::{
            BlockDataTransfer, Branch, BranchAndExchange, DataProcessing, HalfwordDataTransfer,
            Multiply, MultiplyLong, PSRTransfer, SingleDataSwap, SingleDataTransfer,
            SoftwareInterrupt, Umaal, Undefined,
        };

        match instruction {
            DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
                ..
            } => self.data_processing(alu_instruction, set_conditions, rn, destination, op2),
            Multiply {
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply(
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            ),
            MultiplyLong {
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply_long(
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            ),
            Umaal { .. } => {
                if !self.umaal_reported {
                    tracing::warn!(
                        "UMAAL does not exist on the ARM7TDMI, ignored 0x{op_code:08X} at 0x{:08X}",
                        self.current_instruction_address
                    );
                    self.umaal_reported = true;
                }
            }
            PSRTransfer { psr_kind, kind, .. } => self.psr_transfer(kind, psr_kind),
            SingleDataSwap {
                quantity, rn, rd, rm, ..
            } => self.single_data_swap(quantity, rn, rd, rm),
            BranchAndExchange { register, .. } => self.branch_and_exchange(register as usize),
            HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
                ..
            } => self.half_word_data_transfer(
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            ),
            SingleDataTransfer {
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
                ..
            } => self.single_data_transfer(
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            ),
            BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
                ..
            } => self.block_data_transfer(
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            ),
            Branch { link, offset, .. } => self.branch(link, offset),
            SoftwareInterrupt { comment, .. } => self.software_interrupt((comment >> 16) as u8),
            Undefined { .. } => self.undefined_instruction(op_code),
        }
    }

    pub(crate) fn undefined_instruction(&mut self, op_code: u32) {
        tracing::warn!(
            "undefined instruction 0x{op_code:08X} at 0x{:08X}",
            self.current_instruction_address
        );
        let return_address = self.next_instruction_address();
        self.exception(Exception::Undefined, return_address);
    }

    /// Address of the instruction following the one being executed.
    pub(crate) fn next_instruction_address(&self) -> u32 {
        let size = match self.cpsr.cpu_state() {
            CpuState::Arm => SIZE_OF_ARM_INSTRUCTION,
            CpuState::Thumb => SIZE_OF_THUMB_INSTRUCTION,
        };
        self.current_instruction_address.wrapping_add(size)
    }

    /// Writes a register, branching when it is R15.
    pub(crate) fn write_register(&mut self, reg: usize, value: u32) {
        if reg == REG_PROGRAM_COUNTER {
            self.set_pc(value);
        } else {
            self.registers.set_register_at(reg, value);
        }
    }

    /// Jumps to `value` aligned for the current state and flushes the pipeline.
    pub(crate) fn set_pc(&mut self, value: u32) {
        let aligned = match self.cpsr.cpu_state() {
            CpuState::Arm => value & !3,
            CpuState::Thumb => value & !1,
        };
        self.registers.set_program_counter(aligned);
        self.pipeline_flushed = true;
    }

    /// Switches mode, swapping banked registers in and out of the live file.
    pub fn set_mode(&mut self, new_mode: Mode) {
        let old_mode = self.cpsr.mode();
        if old_mode == new_mode {
            self.cpsr.set_mode(new_mode);
            return;
        }

        let old_bank = old_mode.bank_index();
        let new_bank = new_mode.bank_index();

        if old_mode == Mode::Fiq {
            for (i, reg) in (8..=12).enumerate() {
                self.register_bank.r8_r12_fiq[i] = self.registers.register_at(reg);
                self.registers
                    .set_register_at(reg, self.register_bank.r8_r12_user[i]);
            }
        } else if new_mode == Mode::Fiq {
            for (i, reg) in (8..=12).enumerate() {
                self.register_bank.r8_r12_user[i] = self.registers.register_at(reg);
                self.registers
                    .set_register_at(reg, self.register_bank.r8_r12_fiq[i]);
            }
        }

        if old_bank != new_bank {
            self.register_bank.r13[old_bank] = self.registers.register_at(REG_SP);
            self.register_bank.r14[old_bank] = self.registers.register_at(REG_LR);
            self.registers
                .set_register_at(REG_SP, self.register_bank.r13[new_bank]);
            self.registers
                .set_register_at(REG_LR, self.register_bank.r14[new_bank]);
        }

        self.cpsr.set_mode(new_mode);
    }

    /// Copies the current SPSR into the CPSR. Does nothing in User and System mode.
    pub fn restore_from_spsr(&mut self) {
        let Some(spsr) = self.register_bank.spsr(self.cpsr.mode()) else {
            return;
        };

        let mode = spsr.mode();
        self.set_mode(mode);
        self.cpsr = spsr;
        self.cpsr.set_mode(mode);
    }

    pub(crate) fn exception(&mut self, kind: Exception, return_address: u32) {
        let cpsr = self.cpsr;
        self.set_mode(kind.mode());
        self.register_bank.set_spsr(kind.mode(), cpsr);

        self.cpsr.set_cpu_state(CpuState::Arm);
        self.cpsr.set_irq_disable(true);

        self.registers.set_register_at(REG_LR, return_address);
        self.set_pc(kind.vector());
    }

    /// Address and raw opcode of the instruction executed last.
    #[must_use]
    pub const fn fault_context(&self) -> (u32, u32) {
        (self.current_instruction_address, self.last_opcode)
    }
}
