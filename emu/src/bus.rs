//! # System bus
//!
//! Routes every CPU and DMA access to its region and accounts the wait
//! states it costs. The cycles pile up until the CPU takes them with
//! [`Bus::take_cycles`]; [`Bus::tick`] then advances the hardware by that
//! amount.
//!
//! | Region      | Address range                 | Mirroring        |
//! |-------------|-------------------------------|------------------|
//! | BIOS        | `0x0000_0000-0x0000_3FFF`     | -                |
//! | EWRAM       | `0x0200_0000-0x02FF_FFFF`     | every 256KB      |
//! | IWRAM       | `0x0300_0000-0x03FF_FFFF`     | every 32KB       |
//! | I/O         | `0x0400_0000-0x0400_03FF`     | -                |
//! | Palette     | `0x0500_0000-0x05FF_FFFF`     | every 1KB        |
//! | VRAM        | `0x0600_0000-0x06FF_FFFF`     | every 128KB      |
//! | OAM         | `0x0700_0000-0x07FF_FFFF`     | every 1KB        |
//! | ROM         | `0x0800_0000-0x0DFF_FFFF`     | 3 wait state sets|
//! | SRAM/Flash  | `0x0E00_0000-0x0FFF_FFFF`     | every 64KB       |
//!
//! Nothing on the bus faults: unmapped reads return the open bus value
//! and unmapped writes are dropped.


use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::bios::hle_image;
use crate::cpu::hardware::backup::Backup;
use crate::cpu::hardware::dma::{AddressControl, Dma, DmaTiming};
use crate::cpu::hardware::internal_memory::InternalMemory;
use crate::cpu::hardware::interrupt_control::{Interrupt, InterruptControl};
use crate::cpu::hardware::keypad::{GbaButton, Keypad};
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::sound::{Sound, FIFO_A_ADDRESS, FIFO_B_ADDRESS};
use crate::cpu::hardware::timers::Timers;

/// Size of the BIOS region. Reads there only see the BIOS while it executes.
const BIOS_END: u32 = 0x4000;

/// VRAM is 96KB mirrored in 128KB blocks: the last 32KB repeat the OBJ tiles.
const VRAM_MIRROR_MASK: u32 = 0x1_FFFF;
const VRAM_SIZE: u32 = 0x1_8000;

/// BG VRAM ends here in tile modes, OBJ VRAM starts.
const OBJ_VRAM_TILE_MODES: u32 = 0x1_0000;
/// In bitmap modes the frame buffers take the first 16KB of OBJ VRAM.
const OBJ_VRAM_BITMAP_MODES: u32 = 0x1_4000;

const IO_BASE: u32 = 0x0400_0000;
/// Register window backing unmapped I/O bytes, everything past it reads 0.
const IO_WINDOW_SIZE: usize = 0x400;

/// Non sequential ROM and SRAM wait states, indexed by the WAITCNT field.
const NON_SEQUENTIAL_WAIT: [u32; 4] = [4, 3, 2, 8];
/// Sequential ROM wait states of WS0, WS1 and WS2, indexed by the WAITCNT bit.
const SEQUENTIAL_WAIT: [[u32; 2]; 3] = [[2, 1], [4, 1], [8, 1]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessWidth {
    Byte,
    HalfWord,
    Word,
}

impl AccessWidth {
    const fn size(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Bus {
    pub internal_memory: InternalMemory,
    pub lcd: Lcd,
    pub sound: Sound,
    pub dma: Dma,
    pub timers: Timers,
    pub keypad: Keypad,
    pub interrupt_control: InterruptControl,
    pub backup: Backup,

    /// Cycles spent by accesses since the last [`Bus::take_cycles`].
    cycles: u32,
    last_access: u32,

    /// Last opcode fetched, the value of the open bus.
    last_opcode: u32,
    /// Last opcode fetched from the BIOS, returned by BIOS reads from outside it.
    pub(crate) bios_latch: u32,
    executing_bios: bool,

    /// Unmapped bytes of the register window read back what was written.
    unused_region: Vec<u8>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::with_memory(InternalMemory::new(hle_image(), vec![]))
    }
}

impl Bus {
    #[must_use]
    pub fn with_memory(memory: InternalMemory) -> Self {
        Self {
            internal_memory: memory,
            lcd: Lcd::default(),
            sound: Sound::default(),
            dma: Dma::default(),
            timers: Timers::default(),
            keypad: Keypad::default(),
            interrupt_control: InterruptControl::default(),
            backup: Backup::default(),
            cycles: 0,
            last_access: 0,
            last_opcode: 0,
            bios_latch: 0,
            executing_bios: true,
            unused_region: vec![0; IO_WINDOW_SIZE],
        }
    }

    /// A bus over `bios` and `rom`, with the audio resampled to `sample_rate`.
    #[must_use]
    pub fn new(bios: Vec<u8>, rom: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            sound: Sound::new(sample_rate),
            ..Self::with_memory(InternalMemory::new(bios, rom))
        }
    }

    fn read_interrupt_control_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0200 => self.interrupt_control.interrupt_enable.get_byte(0),
            0x0400_0201 => self.interrupt_control.interrupt_enable.get_byte(1),
            0x0400_0202 => self.interrupt_control.interrupt_request.get_byte(0),
            0x0400_0203 => self.interrupt_control.interrupt_request.get_byte(1),
            0x0400_0204 => self.interrupt_control.wait_state_control.get_byte(0),
            0x0400_0205 => self.interrupt_control.wait_state_control.get_byte(1),
            0x0400_0208 => self.interrupt_control.interrupt_master_enable.get_byte(0),
            0x0400_0209 => self.interrupt_control.interrupt_master_enable.get_byte(1),
            0x0400_0300 => self.interrupt_control.post_boot_flag,
            0x0400_0301 => self.interrupt_control.power_down_control,
            _ if address & 0xFFFC == 0x0800 => self
                .interrupt_control
                .internal_memory_control
                .get_byte((address & 0b11) as u8),
            _ => self.read_unused(address),
        }
    }

    fn write_interrupt_control_raw(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0200 => self.interrupt_control.interrupt_enable.set_byte(0, value),
            0x0400_0201 => self.interrupt_control.interrupt_enable.set_byte(1, value),
            0x0400_0202 => self.interrupt_control.acknowledge(u16::from(value)),
            0x0400_0203 => self.interrupt_control.acknowledge(u16::from(value) << 8),
            0x0400_0204 => self.interrupt_control.wait_state_control.set_byte(0, value),
            0x0400_0205 => self.interrupt_control.wait_state_control.set_byte(1, value),
            0x0400_0208 => self.interrupt_control.interrupt_master_enable.set_byte(0, value),
            0x0400_0209 => self.interrupt_control.interrupt_master_enable.set_byte(1, value),
            0x0400_0300 => self.interrupt_control.post_boot_flag = value & 1,
            0x0400_0301 => {
                // Stop (bit 7) is handled like Halt: nothing wakes the
                // system up but interrupts anyway.
                self.interrupt_control.power_down_control = value;
                self.interrupt_control.halted = true;
                tracing::debug!("HALTCNT 0x{value:02X}: halted");
            }
            _ if address & 0xFFFC == 0x0800 => self
                .interrupt_control
                .internal_memory_control
                .set_byte((address & 0b11) as u8, value),
            _ => self.write_unused(address, value),
        }
    }

    fn read_keypad_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0130 => self.keypad.key_input.get_byte(0),
            0x0400_0131 => self.keypad.key_input.get_byte(1),
            0x0400_0132 => self.keypad.key_interrupt_control.get_byte(0),
            0x0400_0133 => self.keypad.key_interrupt_control.get_byte(1),
            _ => self.read_unused(address),
        }
    }

    fn write_keypad_raw(&mut self, address: u32, value: u8) {
        match address {
            // KEYINPUT is read only.
            0x0400_0130 | 0x0400_0131 => {}
            0x0400_0132 => self.keypad.key_interrupt_control.set_byte(0, value),
            0x0400_0133 => {
                self.keypad.key_interrupt_control.set_byte(1, value);
                self.check_keypad_interrupt();
            }
            _ => self.write_unused(address, value),
        }
    }

    fn read_timers_raw(&self, address: u32) -> u8 {
        let offset = address - 0x0400_0100;
        let timer = &self.timers.timers[offset as usize / 4];
        match offset & 0b11 {
            byte_nth @ 0..=1 => timer.counter.get_byte(byte_nth as u8),
            byte_nth => timer.control.get_byte(byte_nth as u8 - 2),
        }
    }

    fn write_timers_raw(&mut self, address: u32, value: u8) {
        let offset = address - 0x0400_0100;
        let index = offset as usize / 4;
        match offset & 0b11 {
            byte_nth @ 0..=1 => self.timers.write_reload(index, byte_nth as u8, value),
            byte_nth => self.timers.write_control(index, byte_nth as u8 - 2, value),
        }
    }

    fn read_dma_raw(&self, address: u32) -> u8 {
        let offset = address - 0x0400_00B0;
        let channel = &self.dma.channels[offset as usize / 12];
        match offset % 12 {
            // Only the control register can be read back.
            byte_nth @ 10..=11 => channel.control.get_byte(byte_nth as u8 - 10),
            _ => 0,
        }
    }

    fn write_dma_raw(&mut self, address: u32, value: u8) {
        let offset = address - 0x0400_00B0;
        let index = offset as usize / 12;
        let channel = &mut self.dma.channels[index];
        match offset % 12 {
            byte_nth @ 0..=3 => channel.source_address.set_byte(byte_nth as u8, value),
            byte_nth @ 4..=7 => channel.destination_address.set_byte(byte_nth as u8 - 4, value),
            byte_nth @ 8..=9 => channel.word_count.set_byte(byte_nth as u8 - 8, value),
            byte_nth => self.dma.write_control(index, byte_nth as u8 - 10, value),
        }
    }

    fn read_sound_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0060..=0x0400_007F => {
                self.sound.channel_registers[(address - 0x0400_0060) as usize]
            }
            0x0400_0080 => self.sound.control_stereo_volume_enable.get_byte(0),
            0x0400_0081 => self.sound.control_stereo_volume_enable.get_byte(1),
            0x0400_0082 => self.sound.control_mixing_dma_control.get_byte(0),
            0x0400_0083 => self.sound.control_mixing_dma_control.get_byte(1),
            0x0400_0084 => self.sound.control_sound_on_off.get_byte(0),
            0x0400_0085 => self.sound.control_sound_on_off.get_byte(1),
            0x0400_0088 => self.sound.sound_pwm_control.get_byte(0),
            0x0400_0089 => self.sound.sound_pwm_control.get_byte(1),
            0x0400_0090..=0x0400_009F => {
                self.sound.channel3_wave_pattern_ram[(address - 0x0400_0090) as usize]
            }
            // The FIFOs are write only.
            0x0400_00A0..=0x0400_00A7 => 0,
            _ => self.read_unused(address),
        }
    }

    fn write_sound_raw(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0060..=0x0400_007F => {
                self.sound.channel_registers[(address - 0x0400_0060) as usize] = value;
            }
            0x0400_0080 => self.sound.control_stereo_volume_enable.set_byte(0, value),
            0x0400_0081 => self.sound.control_stereo_volume_enable.set_byte(1, value),
            0x0400_0082 => self.sound.write_mixing_control(0, value),
            0x0400_0083 => self.sound.write_mixing_control(1, value),
            0x0400_0084 => self.sound.control_sound_on_off.set_byte(0, value),
            0x0400_0085 => self.sound.control_sound_on_off.set_byte(1, value),
            0x0400_0088 => self.sound.sound_pwm_control.set_byte(0, value),
            0x0400_0089 => self.sound.sound_pwm_control.set_byte(1, value),
            0x0400_0090..=0x0400_009F => {
                self.sound.channel3_wave_pattern_ram[(address - 0x0400_0090) as usize] = value;
            }
            0x0400_00A0..=0x0400_00A3 => self.sound.fifo_a.push(value),
            0x0400_00A4..=0x0400_00A7 => self.sound.fifo_b.push(value),
            _ => self.write_unused(address, value),
        }
    }

    fn read_lcd_raw(&self, address: u32) -> u8 {
        let registers = &self.lcd.registers;
        let byte_nth = (address & 1) as u8;
        match address {
            0x0400_0000..=0x0400_0001 => registers.dispcnt.get_byte(byte_nth),
            0x0400_0002..=0x0400_0003 => registers.green_swap.get_byte(byte_nth),
            0x0400_0004..=0x0400_0005 => registers.dispstat.get_byte(byte_nth),
            0x0400_0006..=0x0400_0007 => registers.vcount.get_byte(byte_nth),
            0x0400_0008..=0x0400_000F => {
                registers.bg_control[(address as usize - 0x0400_0008) / 2].get_byte(byte_nth)
            }
            0x0400_0048..=0x0400_0049 => registers.winin.get_byte(byte_nth),
            0x0400_004A..=0x0400_004B => registers.winout.get_byte(byte_nth),
            0x0400_0050..=0x0400_0051 => registers.bldcnt.get_byte(byte_nth),
            0x0400_0052..=0x0400_0053 => registers.bldalpha.get_byte(byte_nth),
            // Scroll, affine, window bounds, mosaic and BLDY are write only.
            0x0400_0010..=0x0400_0047 | 0x0400_004C..=0x0400_004D | 0x0400_0054..=0x0400_0055 => 0,
            _ => self.read_unused(address),
        }
    }

    fn write_lcd_raw(&mut self, address: u32, value: u8) {
        let registers = &mut self.lcd.registers;
        let byte_nth = (address & 1) as u8;
        match address {
            0x0400_0000..=0x0400_0001 => registers.dispcnt.set_byte(byte_nth, value),
            0x0400_0002..=0x0400_0003 => registers.green_swap.set_byte(byte_nth, value),
            0x0400_0004..=0x0400_0005 => registers.write_dispstat(byte_nth, value),
            // VCOUNT is read only.
            0x0400_0006..=0x0400_0007 => {}
            0x0400_0008..=0x0400_000F => {
                registers.bg_control[(address as usize - 0x0400_0008) / 2]
                    .set_byte(byte_nth, value);
            }
            0x0400_0010..=0x0400_001F => {
                let offset = address as usize - 0x0400_0010;
                let bg = offset / 4;
                if offset % 4 < 2 {
                    registers.bg_hofs[bg].set_byte(byte_nth, value);
                } else {
                    registers.bg_vofs[bg].set_byte(byte_nth, value);
                }
            }
            0x0400_0020..=0x0400_003F => {
                let offset = address as usize - 0x0400_0020;
                let index = offset / 0x10;
                let parameters = &mut registers.bg_affine[index];
                match offset % 0x10 {
                    0x0..=0x1 => parameters.pa.set_byte(byte_nth, value),
                    0x2..=0x3 => parameters.pb.set_byte(byte_nth, value),
                    0x4..=0x5 => parameters.pc.set_byte(byte_nth, value),
                    0x6..=0x7 => parameters.pd.set_byte(byte_nth, value),
                    reference @ 0x8..=0xB => {
                        parameters.x.set_byte(reference as u8 - 0x8, value);
                        self.lcd.reset_affine_reference(index);
                    }
                    reference => {
                        parameters.y.set_byte(reference as u8 - 0xC, value);
                        self.lcd.reset_affine_reference(index);
                    }
                }
            }
            0x0400_0040..=0x0400_0041 => registers.win0h.set_byte(byte_nth, value),
            0x0400_0042..=0x0400_0043 => registers.win1h.set_byte(byte_nth, value),
            0x0400_0044..=0x0400_0045 => registers.win0v.set_byte(byte_nth, value),
            0x0400_0046..=0x0400_0047 => registers.win1v.set_byte(byte_nth, value),
            0x0400_0048..=0x0400_0049 => registers.winin.set_byte(byte_nth, value),
            0x0400_004A..=0x0400_004B => registers.winout.set_byte(byte_nth, value),
            0x0400_004C..=0x0400_004D => registers.mosaic.set_byte(byte_nth, value),
            0x0400_0050..=0x0400_0051 => registers.bldcnt.set_byte(byte_nth, value),
            0x0400_0052..=0x0400_0053 => registers.bldalpha.set_byte(byte_nth, value),
            0x0400_0054..=0x0400_0055 => registers.bldy.set_byte(byte_nth, value),
            _ => self.write_unused(address, value),
        }
    }

    fn read_unused(&self, address: u32) -> u8 {
        tracing::trace!("read on unused I/O 0x{address:08X}");
        self.unused_region
            .get(address.wrapping_sub(IO_BASE) as usize)
            .copied()
            .unwrap_or(0)
    }

    fn write_unused(&mut self, address: u32, value: u8) {
        tracing::trace!("write on unused I/O 0x{address:08X}: 0x{value:02X}");
        if let Some(byte) = self.unused_region.get_mut(address.wrapping_sub(IO_BASE) as usize) {
            *byte = value;
        }
    }

    fn read_io_raw(&self, address: u32) -> u8 {
        match address {
            0x0400_0000..=0x0400_005F => self.read_lcd_raw(address),
            0x0400_0060..=0x0400_00AF => self.read_sound_raw(address),
            0x0400_00B0..=0x0400_00DF => self.read_dma_raw(address),
            0x0400_0100..=0x0400_010F => self.read_timers_raw(address),
            0x0400_0130..=0x0400_0133 => self.read_keypad_raw(address),
            0x0400_0200..=0x04FF_FFFF => self.read_interrupt_control_raw(address),
            // Serial communication is not emulated.
            _ => self.read_unused(address),
        }
    }

    fn write_io_raw(&mut self, address: u32, value: u8) {
        match address {
            0x0400_0000..=0x0400_005F => self.write_lcd_raw(address, value),
            0x0400_0060..=0x0400_00AF => self.write_sound_raw(address, value),
            0x0400_00B0..=0x0400_00DF => self.write_dma_raw(address, value),
            0x0400_0100..=0x0400_010F => self.write_timers_raw(address, value),
            0x0400_0130..=0x0400_0133 => self.write_keypad_raw(address, value),
            0x0400_0200..=0x04FF_FFFF => self.write_interrupt_control_raw(address, value),
            _ => self.write_unused(address, value),
        }
    }

    fn open_bus(&self, address: u32) -> u8 {
        tracing::trace!("open bus read 0x{address:08X}");
        self.last_opcode.get_byte((address & 0b11) as u8)
    }

    const fn vram_offset(address: u32) -> usize {
        let offset = address & VRAM_MIRROR_MASK;
        (if offset >= VRAM_SIZE { offset - 0x8000 } else { offset }) as usize
    }

    fn read_raw(&self, address: u32) -> u8 {
        match address >> 24 {
            0x00 if address < BIOS_END => {
                if self.executing_bios {
                    self.internal_memory.read_bios(address)
                } else {
                    self.bios_latch.get_byte((address & 0b11) as u8)
                }
            }
            0x02 | 0x03 => self.internal_memory.read_at(address),
            0x04 => self.read_io_raw(address),
            0x05 => self.lcd.memory.palette_ram[address as usize & 0x3FF],
            0x06 => self.lcd.memory.video_ram[Self::vram_offset(address)],
            0x07 => self.lcd.memory.object_attribute_memory[address as usize & 0x3FF],
            0x08..=0x0D => self.internal_memory.read_rom(address & 0x01FF_FFFF),
            0x0E | 0x0F => self.backup.read(address),
            _ => self.open_bus(address),
        }
    }

    fn write_raw(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x02 | 0x03 => self.internal_memory.write_at(address, value),
            0x04 => self.write_io_raw(address, value),
            0x05 => self.lcd.memory.palette_ram[address as usize & 0x3FF] = value,
            0x06 => self.lcd.memory.video_ram[Self::vram_offset(address)] = value,
            0x07 => self.lcd.memory.object_attribute_memory[address as usize & 0x3FF] = value,
            0x0E | 0x0F => self.backup.write(address, value),
            _ => tracing::debug!("write to read only or unmapped 0x{address:08X}: 0x{value:02X}"),
        }
    }

    /// Wait states of one access, the access cycle included.
    fn wait_cycles(&self, address: u32, width: AccessWidth, sequential: bool) -> u32 {
        let waitcnt = self.interrupt_control.wait_state_control;
        let word = width == AccessWidth::Word;

        match address >> 24 {
            0x02 => {
                if word {
                    6
                } else {
                    3
                }
            }
            0x05 | 0x06 => {
                if word {
                    2
                } else {
                    1
                }
            }
            region @ 0x08..=0x0D => {
                let state = ((region - 0x08) / 2) as usize;
                let (n_field, s_bit) = match state {
                    0 => (waitcnt.get_bits(2..=3), waitcnt.get_bit(4)),
                    1 => (waitcnt.get_bits(5..=6), waitcnt.get_bit(7)),
                    _ => (waitcnt.get_bits(8..=9), waitcnt.get_bit(10)),
                };
                let non_sequential = 1 + NON_SEQUENTIAL_WAIT[n_field as usize];
                let sequential_cost = 1 + SEQUENTIAL_WAIT[state][usize::from(s_bit)];
                let first = if sequential { sequential_cost } else { non_sequential };

                // The ROM bus is 16 bits wide: a word is two accesses.
                if word {
                    first + sequential_cost
                } else {
                    first
                }
            }
            0x0E | 0x0F => 1 + NON_SEQUENTIAL_WAIT[waitcnt.get_bits(0..=1) as usize],
            _ => 1,
        }
    }

    fn access(&mut self, address: u32, width: AccessWidth) {
        let sequential = address == self.last_access.wrapping_add(width.size());
        self.cycles += self.wait_cycles(address, width, sequential);
        self.last_access = address;
    }

    const fn is_backup(address: u32) -> bool {
        matches!(address >> 24, 0x0E | 0x0F)
    }

    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.access(address, AccessWidth::Byte);
        self.read_raw(address)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.access(address, AccessWidth::Byte);

        match address >> 24 {
            // Palette and BG VRAM take the byte on both halves of the halfword.
            0x05 => {
                self.write_raw(address & !1, value);
                self.write_raw(address | 1, value);
            }
            0x06 => {
                let obj_start = if self.lcd.registers.dispcnt.get_bits(0..=2) >= 3 {
                    OBJ_VRAM_BITMAP_MODES
                } else {
                    OBJ_VRAM_TILE_MODES
                };
                if (Self::vram_offset(address) as u32) < obj_start {
                    self.write_raw(address & !1, value);
                    self.write_raw(address | 1, value);
                } else {
                    tracing::trace!("byte write to OBJ VRAM ignored 0x{address:08X}");
                }
            }
            0x07 => tracing::trace!("byte write to OAM ignored 0x{address:08X}"),
            _ => self.write_raw(address, value),
        }
    }

    pub fn read_half_word(&mut self, address: u32) -> u16 {
        if Self::is_backup(address) {
            self.access(address, AccessWidth::HalfWord);
            return u16::from(self.read_raw(address)) * 0x0101;
        }

        let address = address & !1;
        self.access(address, AccessWidth::HalfWord);

        u16::from_le_bytes([self.read_raw(address), self.read_raw(address + 1)])
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        if Self::is_backup(address) {
            self.access(address, AccessWidth::HalfWord);
            self.write_raw(address, value.get_byte((address & 1) as u8));
            return;
        }

        let address = address & !1;
        self.access(address, AccessWidth::HalfWord);

        let [part_0, part_1] = value.to_le_bytes();
        self.write_raw(address, part_0);
        self.write_raw(address + 1, part_1);
    }

    pub fn read_word(&mut self, address: u32) -> u32 {
        if Self::is_backup(address) {
            self.access(address, AccessWidth::Word);
            return u32::from(self.read_raw(address)) * 0x0101_0101;
        }

        let address = address & !3;
        self.access(address, AccessWidth::Word);

        u32::from_le_bytes([
            self.read_raw(address),
            self.read_raw(address + 1),
            self.read_raw(address + 2),
            self.read_raw(address + 3),
        ])
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        if Self::is_backup(address) {
            self.access(address, AccessWidth::Word);
            self.write_raw(address, value.rotate_right((address & 3) * 8) as u8);
            return;
        }

        let address = address & !3;
        self.access(address, AccessWidth::Word);

        for (offset, byte) in (0..).zip(value.to_le_bytes()) {
            self.write_raw(address + offset, byte);
        }
    }

    /// Fetches an ARM opcode and latches it as the open bus value.
    pub fn fetch_arm(&mut self, address: u32) -> u32 {
        self.executing_bios = address < BIOS_END;
        let op_code = self.read_word(address);

        self.last_opcode = op_code;
        if self.executing_bios {
            self.bios_latch = op_code;
        }

        op_code
    }

    /// Fetches a Thumb opcode and latches it as the open bus value.
    pub fn fetch_thumb(&mut self, address: u32) -> u16 {
        self.executing_bios = address < BIOS_END;
        let op_code = self.read_half_word(address);

        self.last_opcode = u32::from(op_code) * 0x0001_0001;
        if self.executing_bios {
            self.bios_latch = self.last_opcode;
        }

        op_code
    }

    /// Internal cycles of the CPU, no memory access.
    pub const fn idle(&mut self, cycles: u32) {
        self.cycles += cycles;
    }

    /// Cycles spent since the last call.
    pub const fn take_cycles(&mut self) -> u32 {
        std::mem::replace(&mut self.cycles, 0)
    }

    /// Cycles a halted CPU can skip before some hardware needs attention.
    #[must_use]
    pub fn cycles_until_next_event(&self) -> u32 {
        let lcd = self.lcd.cycles_until_next_event();
        self.timers
            .cycles_until_overflow()
            .map_or(lcd, |timers| timers.min(lcd))
            .max(1)
    }

    pub fn set_key(&mut self, button: GbaButton, pressed: bool) {
        self.keypad.set_button(button, pressed);
        self.check_keypad_interrupt();
    }

    fn check_keypad_interrupt(&mut self) {
        if self.keypad.interrupt_condition() {
            self.interrupt_control.request(Interrupt::Keypad);
        }
    }

    /// Advances the LCD, the timers and the sound by `cycles`, then runs the
    /// DMA transfers that got triggered. Returns `true` when a frame was completed.
    pub fn tick(&mut self, cycles: u32) -> bool {
        let lcd = self.lcd.step(cycles);
        if lcd.request_vblank_irq {
            self.interrupt_control.request(Interrupt::VBlank);
        }
        if lcd.request_hblank_irq {
            self.interrupt_control.request(Interrupt::HBlank);
        }
        if lcd.request_vcount_irq {
            self.interrupt_control.request(Interrupt::VCount);
        }
        if lcd.vblank_dma {
            self.dma.trigger(DmaTiming::VBlank);
        }
        if lcd.hblank_dma {
            self.dma.trigger(DmaTiming::HBlank);
        }

        let overflows = self.timers.step(cycles);
        for (index, &count) in overflows.iter().enumerate() {
            if count == 0 {
                continue;
            }
            if self.timers.timers[index].irq_enabled() {
                self.interrupt_control.request(Interrupt::timer(index));
            }
            if index < 2 {
                for _ in 0..count {
                    let request = self.sound.timer_overflow(index);
                    if request.fifo_a {
                        self.dma.trigger_fifo(FIFO_A_ADDRESS);
                    }
                    if request.fifo_b {
                        self.dma.trigger_fifo(FIFO_B_ADDRESS);
                    }
                }
            }
        }

        self.sound.step(cycles);
        self.run_dma();

        lcd.frame_completed
    }

    /// Runs every armed DMA channel, lowest channel first.
    pub fn run_dma(&mut self) {
        while let Some(index) = self.dma.next_pending() {
            self.transfer(index);
        }
    }

    fn transfer(&mut self, index: usize) {
        let channel = self.dma.channels[index];
        let fifo = self.dma.is_fifo_transfer(index);

        let (count, word_transfer, destination_control) = if fifo {
            (4, true, AddressControl::Fixed)
        } else {
            (
                channel.internal_count,
                channel.word_transfer(),
                channel.destination_control(),
            )
        };
        let source_control = if (0x0800_0000..0x0E00_0000).contains(&channel.internal_source) {
            AddressControl::Increment
        } else {
            channel.source_control()
        };
        let unit = if word_transfer { 4 } else { 2 };

        tracing::trace!(
            "DMA{index}: {count} units 0x{:08X} -> 0x{:08X}",
            channel.internal_source,
            channel.internal_destination
        );

        let mut source = channel.internal_source;
        let mut destination = channel.internal_destination;
        for _ in 0..count {
            if word_transfer {
                let value = self.read_word(source);
                self.write_word(destination, value);
            } else {
                let value = self.read_half_word(source);
                self.write_half_word(destination, value);
            }
            source = source.wrapping_add(source_control.step(unit));
            destination = destination.wrapping_add(destination_control.step(unit));
        }

        let channel = &mut self.dma.channels[index];
        channel.internal_source = source;
        channel.internal_destination = destination;

        if channel.irq_enabled() {
            self.interrupt_control.request(Interrupt::dma(index));
        }
        self.dma.finish_transfer(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_lcd_reg() {
        let mut bus = Bus::default();
        let address = 0x0400_0048; // WININ lower byte

        bus.write_raw(address, 10);

        assert_eq!(bus.lcd.registers.winin, 10);

        let address = 0x0400_0049; // WININ higher byte

        bus.write_raw(address, 5);
        assert_eq!(bus.lcd.registers.winin, (5 << 8) | 10);
    }

    #[test]
    fn test_read_lcd_reg() {
        let mut bus = Bus::default();
        bus.lcd.registers.winin = (5 << 8) | 10;

        assert_eq!(bus.read_raw(0x0400_0048), 10);
        assert_eq!(bus.read_raw(0x0400_0049), 5);
    }

    #[test]
    fn test_timer_counter_and_reload() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0100, 0xFF00);
        assert_eq!(bus.timers.timers[0].reload, 0xFF00);
        assert_eq!(bus.read_half_word(0x0400_0100), 0);

        // Enabling reloads the counter.
        bus.write_half_word(0x0400_0102, 0x0080);
        assert_eq!(bus.read_half_word(0x0400_0100), 0xFF00);
    }

    #[test]
    fn check_interrupt_flags_are_write_one_to_clear() {
        let mut bus = Bus::default();
        bus.interrupt_control.interrupt_request = 0b1011;
        bus.write_half_word(0x0400_0202, 0b0010);
        assert_eq!(bus.read_half_word(0x0400_0202), 0b1001);
    }

    #[test]
    fn check_haltcnt_halts() {
        let mut bus = Bus::default();
        bus.write_byte(0x0400_0301, 0);
        assert!(bus.interrupt_control.halted);
    }

    #[test]
    fn check_work_ram_mirrors() {
        let mut bus = Bus::default();
        bus.write_word(0x0200_0010, 0xDEAD_BEEF);
        assert_eq!(bus.read_word(0x0204_0010), 0xDEAD_BEEF);

        bus.write_half_word(0x0300_0100, 0x1234);
        assert_eq!(bus.read_half_word(0x03FF_8100), 0x1234);
    }

    #[test]
    fn check_unaligned_accesses_align_down() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0003, 0x1122_3344);
        assert_eq!(bus.read_word(0x0300_0000), 0x1122_3344);
        assert_eq!(bus.read_half_word(0x0300_0001), 0x3344);
    }

    #[test]
    fn check_byte_writes_to_video_memory() {
        let mut bus = Bus::default();
        bus.write_byte(0x0500_0001, 0x2A);
        assert_eq!(bus.read_half_word(0x0500_0000), 0x2A2A);

        bus.write_byte(0x0600_0004, 0x11);
        assert_eq!(bus.read_half_word(0x0600_0004), 0x1111);

        bus.write_byte(0x0601_0000, 0x11);
        assert_eq!(bus.read_half_word(0x0601_0000), 0);

        bus.write_byte(0x0700_0000, 0x11);
        assert_eq!(bus.read_half_word(0x0700_0000), 0);
    }

    #[test]
    fn check_vram_upper_mirror() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0601_0002, 0xABCD);
        assert_eq!(bus.read_half_word(0x0601_8002), 0xABCD);
        assert_eq!(bus.read_half_word(0x0602_0000 + 0x1_0002), 0xABCD);
    }

    #[test]
    fn check_open_bus() {
        let mut bus = Bus::with_memory(InternalMemory::new(vec![0xAA; 0x4000], vec![1, 2, 3, 4]));

        // Executing the BIOS: it can be read.
        bus.fetch_arm(0);
        assert_eq!(bus.read_word(0x100), 0xAAAA_AAAA);

        bus.write_word(0x0300_0000, 0xE1A0_0000);
        bus.fetch_arm(0x0300_0000);
        assert_eq!(bus.read_word(0x100), 0xAAAA_AAAA);
        assert_eq!(bus.read_word(0x1000_0000), 0xE1A0_0000);

        // Past the end of the ROM the bus holds the halfword address.
        assert_eq!(bus.read_half_word(0x0800_0010), 0x0008);

        let mut bus = Bus::with_memory(InternalMemory::new(vec![0xAA; 0x4000], vec![]));
        bus.bios_latch = 0x1234_5678;
        bus.write_word(0x0300_0000, 0);
        bus.fetch_arm(0x0300_0000);
        assert_eq!(bus.read_word(0x0), 0x1234_5678);
    }

    #[test]
    fn check_unused_io_storage_is_bounded() {
        let mut bus = Bus::default();

        bus.write_byte(0x0400_0110, 0x5A);
        assert_eq!(bus.read_byte(0x0400_0110), 0x5A);

        for address in (0x0400_1000..0x0401_0000).step_by(0x100) {
            bus.write_byte(address, 0x77);
        }
        assert_eq!(bus.read_byte(0x0400_1000), 0);
        assert_eq!(bus.unused_region.len(), IO_WINDOW_SIZE);
    }

    #[test]
    fn check_backup_wide_accesses() {
        let mut bus = Bus::default();
        bus.write_byte(0x0E00_0010, 0x5A);
        assert_eq!(bus.read_half_word(0x0E00_0010), 0x5A5A);
        assert_eq!(bus.read_word(0x0E00_0010), 0x5A5A_5A5A);

        bus.write_word(0x0E00_0021, 0x4433_2211);
        assert_eq!(bus.read_byte(0x0E00_0021), 0x22);
    }

    #[test]
    fn check_wait_states() {
        let mut bus = Bus::default();
        bus.read_word(0x0200_0000);
        assert_eq!(bus.take_cycles(), 6);
        bus.read_half_word(0x0300_0000);
        assert_eq!(bus.take_cycles(), 1);

        // ROM word, default WAITCNT: N (1 + 4) then S (1 + 2), then S + S.
        bus.read_word(0x0800_0000);
        assert_eq!(bus.take_cycles(), 8);
        bus.read_word(0x0800_0004);
        assert_eq!(bus.take_cycles(), 6);

        // WS0 N = 2, S = 1 cycle of wait.
        bus.write_half_word(0x0400_0204, (2 << 2) | (1 << 4));
        bus.take_cycles();
        bus.read_half_word(0x0800_0100);
        assert_eq!(bus.take_cycles(), 3);
        bus.read_half_word(0x0800_0102);
        assert_eq!(bus.take_cycles(), 2);
    }

    #[test]
    fn check_dma_count_zero_is_maximum() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0201_FFFE, 0xBEEF);

        // DMA3, 16 bit, count 0: 0x10000 halfwords.
        bus.write_word(0x0400_00D4, 0x0200_0000);
        bus.write_word(0x0400_00D8, 0x0202_0000);
        bus.write_half_word(0x0400_00DC, 0);
        bus.write_half_word(0x0400_00DE, 0x8000);
        bus.run_dma();

        assert_eq!(bus.read_half_word(0x0203_FFFE), 0xBEEF);
        assert_eq!(bus.dma.channels[3].internal_destination, 0x0204_0000);
        assert!(!bus.dma.channels[3].enabled());

        // DMA0, count 0: 0x4000 units.
        bus.write_word(0x0400_00B0, 0x0200_0000);
        bus.write_word(0x0400_00B4, 0x0300_0000);
        bus.write_half_word(0x0400_00B8, 0);
        bus.write_half_word(0x0400_00BA, 0x8000);
        bus.run_dma();
        assert_eq!(bus.dma.channels[0].internal_destination, 0x0300_8000);
    }

    #[test]
    fn check_dma_irq_and_fixed_source() {
        let mut bus = Bus::default();
        bus.write_word(0x0300_0000, 0x0102_0304);

        bus.write_word(0x0400_00BC, 0x0300_0000);
        bus.write_word(0x0400_00C0, 0x0300_0100);
        bus.write_half_word(0x0400_00C4, 3);
        // Enabled, IRQ, 32 bit, source fixed.
        bus.write_half_word(0x0400_00C6, 0xC000 | (1 << 10) | (2 << 7));
        bus.run_dma();

        for i in 0..3 {
            assert_eq!(bus.read_word(0x0300_0100 + i * 4), 0x0102_0304);
        }
        assert_eq!(bus.interrupt_control.interrupt_request, 1 << 9);
    }

    #[test]
    fn check_fifo_dma_moves_four_words() {
        let mut bus = Bus::default();
        for i in 0..8 {
            bus.write_word(0x0200_0000 + i * 4, i);
        }

        // Master enable, FIFO A on timer 0.
        bus.write_half_word(0x0400_0084, 0x80);
        bus.write_word(0x0400_00BC, 0x0200_0000);
        bus.write_word(0x0400_00C0, FIFO_A_ADDRESS);
        bus.write_half_word(0x0400_00C6, 0x8000 | (3 << 12) | (1 << 9) | (1 << 10));

        // Timer 0 overflows on its first tick.
        bus.write_half_word(0x0400_0100, 0xFFFF);
        bus.write_half_word(0x0400_0102, 0x0080);
        bus.tick(1);

        assert_eq!(bus.sound.fifo_a.len(), 16);
        assert_eq!(bus.dma.channels[1].internal_source, 0x0200_0010);
        assert!(bus.dma.channels[1].enabled());
    }

    #[test]
    fn check_keypad_interrupt() {
        let mut bus = Bus::default();
        // IRQ when A or B is pressed.
        bus.write_half_word(0x0400_0132, (1 << 14) | 0b11);
        bus.set_key(GbaButton::Start, true);
        assert_eq!(bus.interrupt_control.interrupt_request, 0);

        bus.set_key(GbaButton::B, true);
        assert_eq!(bus.interrupt_control.interrupt_request, 1 << 12);
        assert_eq!(bus.read_half_word(0x0400_0130), 0x03FF & !(1 << 1) & !(1 << 3));
    }

    #[test]
    fn check_vblank_interrupt_and_dma_from_tick() {
        let mut bus = Bus::default();
        bus.write_half_word(0x0400_0004, 1 << 3);
        bus.write_half_word(0x0300_0000, 0x7777);

        // DMA0 on VBlank, one halfword.
        bus.write_word(0x0400_00B0, 0x0300_0000);
        bus.write_word(0x0400_00B4, 0x0300_0010);
        bus.write_half_word(0x0400_00B8, 1);
        bus.write_half_word(0x0400_00BA, 0x8000 | (1 << 12));

        let mut frame_completed = false;
        for _ in 0..160 {
            frame_completed |= bus.tick(1232);
        }
        assert!(frame_completed);
        assert_eq!(bus.interrupt_control.interrupt_request, 1);
        assert_eq!(bus.read_half_word(0x0300_0010), 0x7777);
    }
}
