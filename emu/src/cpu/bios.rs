//! # BIOS
//!
//! When no BIOS dump is supplied the core maps a small generated image at
//! `0x0000_0000` ([`hle_image`]) and services `SWI` calls directly in Rust.
//!
//! The image only contains what cartridges observe:
//!
//! ```text
//! 0x0000  mov pc, #0x08000000        ; reset: jump to the cartridge
//! 0x0004  movs pc, lr                ; undefined: return
//! 0x0008  movs pc, lr                ; SWI (only reached with a real BIOS flow)
//! 0x0018  b 0x128                    ; IRQ
//! 0x0128  stmfd sp!, {r0-r3, r12, lr}
//! 0x012C  mov r0, #0x04000000
//! 0x0130  add lr, pc, #0
//! 0x0134  ldr pc, [r0, #-4]          ; user handler at 0x03007FFC
//! 0x0138  ldmfd sp!, {r0-r3, r12, lr}
//! 0x013C  subs pc, lr, #4
//! ```
//!
//! `IntrWait` halts the CPU and remembers where the call returns. Each time
//! the CPU comes back to that address outside IRQ mode the BIOS interrupt
//! flags at `0x0300_7FF8` are checked again, exactly like the real loop.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm7tdmi::{Arm7tdmi, Exception};
use crate::cpu::cpu_modes::Mode;
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::REG_LR;

pub use crate::cpu::hardware::internal_memory::BIOS_SIZE;

/// Value left on the BIOS bus after a BIOS call returns.
const SWI_RETURN_OPCODE: u32 = 0xE3A0_2004;

/// Interrupt flags acknowledged by user handlers for the BIOS.
const BIOS_INTERRUPT_FLAGS: u32 = 0x0300_7FF8;

const HLE_IMAGE: [(usize, u32); 10] = [
    (0x0000, 0xE3A0_F302),
    (0x0004, 0xE1B0_F00E),
    (0x0008, 0xE1B0_F00E),
    (0x0018, 0xEA00_0042),
    (0x0128, 0xE92D_500F),
    (0x012C, 0xE3A0_0301),
    (0x0130, 0xE28F_E000),
    (0x0134, 0xE510_F004),
    (0x0138, 0xE8BD_500F),
    (0x013C, 0xE25E_F004),
];

/// Builds the replacement BIOS image.
#[must_use]
pub fn hle_image() -> Vec<u8> {
    let mut image = vec![0; BIOS_SIZE];
    for (offset, op_code) in HLE_IMAGE {
        image[offset..offset + 4].copy_from_slice(&op_code.to_le_bytes());
    }
    image
}

/// A pending `IntrWait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrWait {
    /// Interrupts the caller is waiting for.
    pub flags: u16,
    /// Address of the instruction after the `SWI`.
    pub resume: u32,
}

impl Arm7tdmi {
    pub(crate) fn software_interrupt(&mut self, comment: u8) {
        if !self.hle_bios {
            let return_address = self.next_instruction_address();
            self.exception(Exception::SoftwareInterrupt, return_address);
            return;
        }

        tracing::debug!("BIOS call 0x{comment:02X}");

        let r0 = self.registers.register_at(0);
        let r1 = self.registers.register_at(1);
        let r2 = self.registers.register_at(2);

        match comment {
            0x00 => self.soft_reset(),
            0x01 => self.register_ram_reset(r0),
            0x02 | 0x03 => self.bus.interrupt_control.halted = true,
            0x04 => self.start_intr_wait(r0 != 0, r1 as u16),
            0x05 => self.start_intr_wait(true, 1),
            0x06 => self.div(r0, r1),
            0x07 => self.div(r1, r0),
            0x08 => self.registers.set_register_at(0, sqrt(r0)),
            0x09 => self
                .registers
                .set_register_at(0, arctan(r0 as i16 as i32) as u32 & 0xFFFF),
            0x0A => self
                .registers
                .set_register_at(0, arctan2(r0 as i16 as i32, r1 as i16 as i32)),
            0x0B => self.cpu_set(r0, r1, r2),
            0x0C => self.cpu_fast_set(r0, r1, r2),
            0x0D => self.registers.set_register_at(0, 0xBAAE_187F),
            0x0E => self.bg_affine_set(r0, r1, r2),
            0x0F => {
                let r3 = self.registers.register_at(3);
                self.obj_affine_set(r0, r1, r2, r3);
            }
            0x10 => self.bit_unpack(r0, r1, r2),
            0x11 => self.lz77_uncomp(r0, r1, false),
            0x12 => self.lz77_uncomp(r0, r1, true),
            0x14 => self.rl_uncomp(r0, r1, false),
            0x15 => self.rl_uncomp(r0, r1, true),
            0x19 => {}
            0x1F => self.midi_key_to_freq(r0, r1, r2),
            _ => {
                tracing::warn!(
                    "unsupported BIOS call 0x{comment:02X} at 0x{:08X}",
                    self.fault_context().0
                );
                let return_address = self.next_instruction_address();
                self.exception(Exception::Undefined, return_address);
                return;
            }
        }

        self.bus.bios_latch = SWI_RETURN_OPCODE;
    }

    fn soft_reset(&mut self) {
        tracing::info!("soft reset");

        let return_to_ewram = self.bus.read_byte(0x0300_7FFA) != 0;
        self.bus.internal_memory.working_iram[0x7E00..].fill(0);

        for reg in 0..=REG_LR {
            self.registers.set_register_at(reg, 0);
        }
        self.register_bank = RegisterBank::default();
        self.skip_bios();

        self.set_pc(if return_to_ewram {
            0x0200_0000
        } else {
            0x0800_0000
        });
    }

    /// Clears the memory regions selected by `flags`. I/O register bits are ignored.
    fn register_ram_reset(&mut self, flags: u32) {
        if flags.get_bit(0) {
            self.bus.internal_memory.working_ram.fill(0);
        }
        if flags.get_bit(1) {
            // The top 0x200 bytes hold the BIOS variables and stacks.
            self.bus.internal_memory.working_iram[..0x7E00].fill(0);
        }
        if flags.get_bit(2) {
            self.bus.lcd.memory.palette_ram.fill(0);
        }
        if flags.get_bit(3) {
            self.bus.lcd.memory.video_ram.fill(0);
        }
        if flags.get_bit(4) {
            self.bus.lcd.memory.object_attribute_memory.fill(0);
        }
    }

    fn start_intr_wait(&mut self, discard_old: bool, flags: u16) {
        self.bus.interrupt_control.interrupt_master_enable = 1;

        let pending = self.bus.read_half_word(BIOS_INTERRUPT_FLAGS);
        if discard_old {
            self.bus
                .write_half_word(BIOS_INTERRUPT_FLAGS, pending & !flags);
        } else if pending & flags != 0 {
            self.bus
                .write_half_word(BIOS_INTERRUPT_FLAGS, pending & !flags);
            return;
        }

        self.intr_wait = Some(IntrWait {
            flags,
            resume: self.next_instruction_address(),
        });
        self.bus.interrupt_control.halted = true;
    }

    /// Re-checks a pending `IntrWait` once the CPU is back at its return address.
    /// Returns `true` when the wait goes on (the CPU halted again).
    pub(crate) fn resume_intr_wait(&mut self) -> bool {
        let Some(wait) = self.intr_wait else {
            return false;
        };
        if self.registers.program_counter() != wait.resume || self.cpsr.mode() == Mode::Irq {
            return false;
        }

        let pending = self.bus.read_half_word(BIOS_INTERRUPT_FLAGS);
        if pending & wait.flags != 0 {
            self.bus
                .write_half_word(BIOS_INTERRUPT_FLAGS, pending & !wait.flags);
            self.intr_wait = None;
            false
        } else {
            self.bus.interrupt_control.halted = true;
            true
        }
    }

    fn div(&mut self, numerator: u32, denominator: u32) {
        let (quotient, remainder) = divide(numerator as i32, denominator as i32);
        self.registers.set_register_at(0, quotient as u32);
        self.registers.set_register_at(1, remainder as u32);
        self.registers.set_register_at(3, quotient.unsigned_abs());
    }

    fn cpu_set(&mut self, source: u32, destination: u32, control: u32) {
        if source < 0x0200_0000 {
            tracing::debug!("CpuSet from BIOS area 0x{source:08X} ignored");
            return;
        }

        let count = control.get_bits(0..=20);
        let fill = control.get_bit(24);

        if control.get_bit(26) {
            let (mut source, mut destination) = (source & !3, destination & !3);
            let fill_value = self.bus.read_word(source);
            for _ in 0..count {
                let value = if fill {
                    fill_value
                } else {
                    let v = self.bus.read_word(source);
                    source = source.wrapping_add(4);
                    v
                };
                self.bus.write_word(destination, value);
                destination = destination.wrapping_add(4);
            }
        } else {
            let (mut source, mut destination) = (source & !1, destination & !1);
            let fill_value = self.bus.read_half_word(source);
            for _ in 0..count {
                let value = if fill {
                    fill_value
                } else {
                    let v = self.bus.read_half_word(source);
                    source = source.wrapping_add(2);
                    v
                };
                self.bus.write_half_word(destination, value);
                destination = destination.wrapping_add(2);
            }
        }
    }

    fn cpu_fast_set(&mut self, source: u32, destination: u32, control: u32) {
        if source < 0x0200_0000 {
            tracing::debug!("CpuFastSet from BIOS area 0x{source:08X} ignored");
            return;
        }

        // Transfers in blocks of eight words.
        let count = (control.get_bits(0..=20) + 7) & !7;
        let mut word_control = count | (1 << 26);
        word_control.set_bit(24, control.get_bit(24));
        self.cpu_set(source, destination, word_control);
    }

    fn bg_affine_set(&mut self, source: u32, destination: u32, count: u32) {
        let (mut source, mut destination) = (source, destination);
        for _ in 0..count {
            let origin_x = self.bus.read_word(source) as i32;
            let origin_y = self.bus.read_word(source.wrapping_add(4)) as i32;
            let center_x = i32::from(self.bus.read_half_word(source.wrapping_add(8)) as i16);
            let center_y = i32::from(self.bus.read_half_word(source.wrapping_add(10)) as i16);
            let scale_x = i32::from(self.bus.read_half_word(source.wrapping_add(12)) as i16);
            let scale_y = i32::from(self.bus.read_half_word(source.wrapping_add(14)) as i16);
            let angle = (self.bus.read_half_word(source.wrapping_add(16)) >> 8) as u8;

            let [pa, pb, pc, pd] = affine_matrix(scale_x, scale_y, angle);
            let x = origin_x.wrapping_sub((pa * center_x).wrapping_add(pb * center_y));
            let y = origin_y.wrapping_sub((pc * center_x).wrapping_add(pd * center_y));

            self.bus.write_half_word(destination, pa as u16);
            self.bus.write_half_word(destination.wrapping_add(2), pb as u16);
            self.bus.write_half_word(destination.wrapping_add(4), pc as u16);
            self.bus.write_half_word(destination.wrapping_add(6), pd as u16);
            self.bus.write_word(destination.wrapping_add(8), x as u32);
            self.bus.write_word(destination.wrapping_add(12), y as u32);

            source = source.wrapping_add(20);
            destination = destination.wrapping_add(16);
        }
    }

    fn obj_affine_set(&mut self, source: u32, destination: u32, count: u32, stride: u32) {
        let (mut source, mut destination) = (source, destination);
        for _ in 0..count {
            let scale_x = i32::from(self.bus.read_half_word(source) as i16);
            let scale_y = i32::from(self.bus.read_half_word(source.wrapping_add(2)) as i16);
            let angle = (self.bus.read_half_word(source.wrapping_add(4)) >> 8) as u8;

            for (i, value) in affine_matrix(scale_x, scale_y, angle).into_iter().enumerate() {
                let address = destination.wrapping_add((i as u32).wrapping_mul(stride));
                self.bus.write_half_word(address, value as u16);
            }

            source = source.wrapping_add(8);
            destination = destination.wrapping_add(stride.wrapping_mul(4));
        }
    }

    fn bit_unpack(&mut self, source: u32, destination: u32, info: u32) {
        let length = u32::from(self.bus.read_half_word(info));
        let source_width = u32::from(self.bus.read_byte(info.wrapping_add(2)));
        let destination_width = u32::from(self.bus.read_byte(info.wrapping_add(3)));
        let offset_word = self.bus.read_word(info.wrapping_add(4));

        if !matches!(source_width, 1 | 2 | 4 | 8)
            || !matches!(destination_width, 1 | 2 | 4 | 8 | 16 | 32)
        {
            tracing::warn!("BitUnpack with widths {source_width}/{destination_width} ignored");
            return;
        }

        let bias = offset_word & 0x7FFF_FFFF;
        let bias_zero = offset_word.get_bit(31);
        let source_mask = (1 << source_width) - 1;
        let destination_mask = if destination_width == 32 {
            u32::MAX
        } else {
            (1 << destination_width) - 1
        };

        let mut destination = destination & !3;
        let mut out = 0_u32;
        let mut out_bits = 0;
        for i in 0..length {
            let byte = u32::from(self.bus.read_byte(source.wrapping_add(i)));
            for shift in (0..8).step_by(source_width as usize) {
                let mut unit = (byte >> shift) & source_mask;
                if unit != 0 || bias_zero {
                    unit = unit.wrapping_add(bias);
                }
                out |= (unit & destination_mask) << out_bits;
                out_bits += destination_width;

                if out_bits == 32 {
                    self.bus.write_word(destination, out);
                    destination = destination.wrapping_add(4);
                    out = 0;
                    out_bits = 0;
                }
            }
        }
    }

    fn lz77_uncomp(&mut self, source: u32, destination: u32, vram: bool) {
        let header = self.bus.read_word(source);
        let size = (header >> 8) as usize;
        let mut data: Vec<u8> = Vec::with_capacity(size);
        let mut cursor = source.wrapping_add(4);

        let mut next_byte = |cpu: &mut Self| {
            let b = cpu.bus.read_byte(cursor);
            cursor = cursor.wrapping_add(1);
            b
        };

        while data.len() < size {
            let flags = next_byte(self);
            for block in (0..8).rev() {
                if data.len() >= size {
                    break;
                }
                if flags.get_bit(block) {
                    let b0 = next_byte(self);
                    let b1 = next_byte(self);
                    let length = usize::from(b0 >> 4) + 3;
                    let displacement = ((usize::from(b0 & 0xF) << 8) | usize::from(b1)) + 1;
                    for _ in 0..length {
                        let byte = data
                            .len()
                            .checked_sub(displacement)
                            .map_or(0, |at| data[at]);
                        data.push(byte);
                    }
                } else {
                    let b = next_byte(self);
                    data.push(b);
                }
            }
        }

        data.truncate(size);
        self.write_decompressed(destination, &data, vram);
    }

    fn rl_uncomp(&mut self, source: u32, destination: u32, vram: bool) {
        let header = self.bus.read_word(source);
        let size = (header >> 8) as usize;
        let mut data: Vec<u8> = Vec::with_capacity(size);
        let mut cursor = source.wrapping_add(4);

        while data.len() < size {
            let flag = self.bus.read_byte(cursor);
            cursor = cursor.wrapping_add(1);

            if flag.get_bit(7) {
                let length = usize::from(flag & 0x7F) + 3;
                let byte = self.bus.read_byte(cursor);
                cursor = cursor.wrapping_add(1);
                data.extend(std::iter::repeat_n(byte, length));
            } else {
                let length = u32::from(flag & 0x7F) + 1;
                for _ in 0..length {
                    data.push(self.bus.read_byte(cursor));
                    cursor = cursor.wrapping_add(1);
                }
            }
        }

        data.truncate(size);
        self.write_decompressed(destination, &data, vram);
    }

    /// VRAM ignores byte writes, so VRAM variants store halfwords.
    fn write_decompressed(&mut self, destination: u32, data: &[u8], vram: bool) {
        if vram {
            for (i, pair) in data.chunks(2).enumerate() {
                let low = u16::from(pair[0]);
                let high = pair.get(1).map_or(0, |b| u16::from(*b));
                self.bus
                    .write_half_word(destination.wrapping_add(2 * i as u32), low | (high << 8));
            }
        } else {
            for (i, byte) in data.iter().enumerate() {
                self.bus.write_byte(destination.wrapping_add(i as u32), *byte);
            }
        }
    }

    fn midi_key_to_freq(&mut self, wave_data: u32, key: u32, fine_adjust: u32) {
        let frequency = f64::from(self.bus.read_word(wave_data.wrapping_add(4)));
        let exponent = (180.0 - f64::from(key) - f64::from(fine_adjust) / 256.0) / 12.0;
        let result = frequency / 2_f64.powf(exponent);
        self.registers.set_register_at(0, result as u32);
    }
}

/// Signed division as the BIOS computes it, `(quotient, remainder)`.
///
/// Division by zero yields ±1 following the numerator's sign and the numerator
/// as remainder. `i32::MIN / -1` saturates to `i32::MIN` with remainder 0.
#[must_use]
pub const fn divide(numerator: i32, denominator: i32) -> (i32, i32) {
    if denominator == 0 {
        (if numerator < 0 { -1 } else { 1 }, numerator)
    } else if numerator == i32::MIN && denominator == -1 {
        (i32::MIN, 0)
    } else {
        (numerator / denominator, numerator % denominator)
    }
}

/// Binary restoring integer square root.
#[must_use]
pub const fn sqrt(value: u32) -> u32 {
    let mut remainder = value;
    let mut root = 0_u32;
    let mut bit = 1_u32 << 30;

    while bit > remainder {
        bit >>= 2;
    }

    while bit != 0 {
        if remainder >= root + bit {
            remainder -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }

    root
}

/// Arctangent of a 1.14 fixed-point tangent, result in the same 1.14 unit as the BIOS.
#[must_use]
pub const fn arctan(tangent: i32) -> i32 {
    let a = -(tangent.wrapping_mul(tangent) >> 14);
    let mut b = (0xA9_i32.wrapping_mul(a) >> 14) + 0x390;
    b = (b.wrapping_mul(a) >> 14) + 0x91C;
    b = (b.wrapping_mul(a) >> 14) + 0xFB6;
    b = (b.wrapping_mul(a) >> 14) + 0x16AA;
    b = (b.wrapping_mul(a) >> 14) + 0x2081;
    b = (b.wrapping_mul(a) >> 14) + 0x3651;
    b = (b.wrapping_mul(a) >> 14) + 0xA2F9;
    tangent.wrapping_mul(b) >> 16
}

/// Angle of the vector `(x, y)` in `0..=0xFFFF` for a full turn.
#[must_use]
pub const fn arctan2(x: i32, y: i32) -> u32 {
    let angle = if y == 0 {
        if x >= 0 { 0 } else { 0x8000 }
    } else if x == 0 {
        if y >= 0 { 0x4000 } else { 0xC000 }
    } else if y >= 0 {
        if x >= 0 && x >= y {
            arctan((y << 14) / x)
        } else if x < 0 && -x >= y {
            arctan((y << 14) / x) + 0x8000
        } else {
            0x4000 - arctan((x << 14) / y)
        }
    } else if x <= 0 && -x > -y {
        arctan((y << 14) / x) + 0x8000
    } else if x > 0 && x >= -y {
        arctan((y << 14) / x) + 0x1_0000
    } else {
        0xC000 - arctan((x << 14) / y)
    };

    (angle as u32) & 0xFFFF
}

/// Sine of `index / 256` of a full turn, in 1.14 fixed point.
fn sine(index: u8) -> i32 {
    let radians = f64::from(index) / 128.0 * PI;
    (radians.sin() * 16384.0).round() as i32
}

/// Rotation/scaling matrix `[pa, pb, pc, pd]` in 8.8 fixed point.
fn affine_matrix(scale_x: i32, scale_y: i32, angle: u8) -> [i32; 4] {
    let sin = sine(angle);
    let cos = sine(angle.wrapping_add(64));

    [
        (scale_x * cos) >> 14,
        -((scale_x * sin) >> 14),
        (scale_y * sin) >> 14,
        (scale_y * cos) >> 14,
    ]
}
