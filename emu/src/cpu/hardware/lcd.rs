//! LCD controller (PPU) - handles display rendering.
//!
//! The GBA LCD is 240x160 pixels, 15-bit color (32,768 colors). The [`Lcd`] struct
//! keeps the display timing and renders one scanline at a time into a
//! framebuffer.
//!
//! # Display Timing
//!
//! ```text
//!                 1006 cycles          226 cycles
//!                ◄──────────►         ◄──────────►
//!               ┌─────────────────────────────────────┐
//!               │                      │              │
//!    160 lines  │      Visible         │   HBlank     │ VDraw
//!               │      (VDraw)         │              │
//!               ├──────────────────────┼──────────────┤
//!     68 lines  │                VBlank               │ VBlank
//!               └─────────────────────────────────────┘
//!
//! - Total: 228 lines × 1232 cycles = 280,896 cycles/frame ≈ 59.73 Hz
//! ```
//!
//! A visible line is drawn when its HBlank starts, so the registers
//! programmed during HBlank by DMA or an IRQ handler apply to the next line.
//!
//! # Interrupts
//!
//! The LCD can generate three types of interrupts (via [`LcdStepOutput`]):
//! - **V-Blank**: When entering vertical blank period (line 160)
//! - **H-Blank**: When entering horizontal blank period, on every line
//! - **V-Count**: When the current line starts matching the V-Count setting in DISPSTAT

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use self::backgrounds::MODE_TABLE;
use self::backing::Backing;
use self::layers::Layer;
use self::memory::Memory;
use self::objects::ObjectPass;
use self::registers::Registers;
use self::windows::Windows;

mod backgrounds;
mod backing;
mod layers;
pub mod memory;
mod object_attributes;
mod objects;
pub mod registers;
mod windows;

/// GBA display width
pub const LCD_WIDTH: usize = 240;

/// GBA display height
pub const LCD_HEIGHT: usize = 160;

pub const CYCLES_PER_LINE: u32 = 1232;
pub const HBLANK_START: u32 = 1006;
pub const LINES_PER_FRAME: u16 = 228;
pub const CYCLES_PER_FRAME: u32 = CYCLES_PER_LINE * LINES_PER_FRAME as u32;

const VBLANK_START: u16 = 160;
/// The VBlank flag drops one line before the frame wraps.
const VBLANK_FLAG_END: u16 = 227;

/// 15-bit BGR color, red in the low bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u16);

impl Color {
    pub const WHITE: Self = Self(0x7FFF);

    #[must_use]
    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let red: u16 = red.into();
        let green: u16 = green.into();
        let blue: u16 = blue.into();

        Self((blue << 10) + (green << 5) + red)
    }

    #[must_use]
    pub fn red(&self) -> u8 {
        self.0.get_bits(0..=4) as u8
    }

    #[must_use]
    pub fn green(&self) -> u8 {
        self.0.get_bits(5..=9) as u8
    }

    #[must_use]
    pub fn blue(&self) -> u8 {
        self.0.get_bits(10..=14) as u8
    }

    /// 8-bit RGBA, replicating the top bits of each channel into the low ones.
    #[must_use]
    pub fn to_rgba(self) -> [u8; 4] {
        let expand = |channel: u8| (channel << 3) | (channel >> 2);
        [expand(self.red()), expand(self.green()), expand(self.blue()), 0xFF]
    }
}

#[allow(clippy::module_name_repetitions)]
#[allow(clippy::struct_excessive_bools)]
#[derive(Default, Debug, PartialEq, Eq)]
pub struct LcdStepOutput {
    pub request_vblank_irq: bool,
    pub request_hblank_irq: bool,
    pub request_vcount_irq: bool,
    pub hblank_dma: bool,
    pub vblank_dma: bool,
    pub frame_completed: bool,
}

impl LcdStepOutput {
    fn merge(&mut self, other: Self) {
        self.request_vblank_irq |= other.request_vblank_irq;
        self.request_hblank_irq |= other.request_hblank_irq;
        self.request_vcount_irq |= other.request_vcount_irq;
        self.hblank_dma |= other.hblank_dma;
        self.vblank_dma |= other.vblank_dma;
        self.frame_completed |= other.frame_completed;
    }
}

#[derive(Serialize, Deserialize)]
pub struct Lcd {
    pub registers: Registers,
    pub memory: Memory,

    /// `LCD_WIDTH * LCD_HEIGHT` colors, row major.
    pub buffer: Vec<Color>,

    /// Cycle within the current line.
    cycle: u32,

    /// Internal reference points of BG2 and BG3, advanced by (PB, PD) every line.
    affine_reference: [(i32, i32); 2],

    #[serde(skip)]
    backing: Box<Backing>,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            registers: Registers::default(),
            memory: Memory::default(),
            buffer: vec![Color::default(); LCD_WIDTH * LCD_HEIGHT],
            cycle: 0,
            affine_reference: [(0, 0); 2],
            backing: Box::default(),
        }
    }
}

impl Lcd {
    /// Advances the display by `cycles`, crossing as many HBlank and line
    /// boundaries as needed.
    pub fn step(&mut self, cycles: u32) -> LcdStepOutput {
        let mut output = LcdStepOutput::default();
        let mut remaining = cycles;

        while remaining > 0 {
            let advance = remaining.min(self.cycles_until_next_event());
            self.cycle += advance;
            remaining -= advance;

            if self.cycle == HBLANK_START {
                output.merge(self.enter_hblank());
            } else if self.cycle == CYCLES_PER_LINE {
                self.cycle = 0;
                output.merge(self.next_line());
            }
        }

        output
    }

    /// Cycles left before HBlank starts or the line ends.
    #[must_use]
    pub const fn cycles_until_next_event(&self) -> u32 {
        if self.cycle < HBLANK_START {
            HBLANK_START - self.cycle
        } else {
            CYCLES_PER_LINE - self.cycle
        }
    }

    fn enter_hblank(&mut self) -> LcdStepOutput {
        let mut output = LcdStepOutput::default();
        self.registers.set_hblank_flag(true);
        output.request_hblank_irq = self.registers.get_hblank_irq_enable();

        let line = self.registers.vcount;
        if line < VBLANK_START {
            self.draw_scanline(line);

            let affine = self.affine_reference.iter_mut().zip(&self.registers.bg_affine);
            for (reference, parameters) in affine {
                reference.0 = reference.0.wrapping_add(i32::from(parameters.pb as i16));
                reference.1 = reference.1.wrapping_add(i32::from(parameters.pd as i16));
            }

            output.hblank_dma = true;
        }

        output
    }

    fn next_line(&mut self) -> LcdStepOutput {
        let mut output = LcdStepOutput::default();
        self.registers.set_hblank_flag(false);

        self.registers.vcount += 1;
        if self.registers.vcount == LINES_PER_FRAME {
            self.registers.vcount = 0;
        }

        match self.registers.vcount {
            VBLANK_START => {
                self.registers.set_vblank_flag(true);
                output.request_vblank_irq = self.registers.get_vblank_irq_enable();
                output.vblank_dma = true;
                output.frame_completed = true;

                self.reset_affine_reference(0);
                self.reset_affine_reference(1);
            }
            VBLANK_FLAG_END => self.registers.set_vblank_flag(false),
            _ => {}
        }

        let matched = self.registers.vcount == self.registers.get_vcount_setting();
        if matched && !self.registers.get_vcounter_flag() {
            output.request_vcount_irq = self.registers.get_vcounter_irq_enable();
        }
        self.registers.set_vcounter_flag(matched);

        output
    }

    /// Reloads the internal reference point of BG2 (`index` 0) or BG3 (`index` 1)
    /// from its 28-bit signed BGxX/BGxY registers.
    pub fn reset_affine_reference(&mut self, index: usize) {
        let parameters = self.registers.bg_affine[index];
        self.affine_reference[index] = (
            parameters.x.sign_extended(28) as i32,
            parameters.y.sign_extended(28) as i32,
        );
    }

    pub fn draw_scanline(&mut self, line: u16) {
        let y = usize::from(line);
        let row = &mut self.buffer[y * LCD_WIDTH..(y + 1) * LCD_WIDTH];

        if self.registers.get_forced_blank() {
            row.fill(Color::WHITE);
            return;
        }

        let registers = &self.registers;
        let memory = &self.memory;
        let backing = &mut self.backing;

        backing.seed(memory.bg_color(0), registers.bldcnt, &Windows::compute(registers, line));

        let kinds = MODE_TABLE
            .get(registers.get_bg_mode())
            .copied()
            .unwrap_or([None; 4]);

        let mut layers: Vec<Layer> = (0..4)
            .filter(|&bg| registers.get_bg_enabled(bg) && kinds[bg].is_some())
            .map(Layer::Background)
            .collect();
        if registers.get_obj_enabled() {
            if registers.get_winobj_enabled() {
                layers.push(Layer::ObjectWindow);
            }
            layers.extend((0..4).map(Layer::Objects));
        }

        let bg_priorities = [0, 1, 2, 3].map(|bg| registers.get_bg_priority(bg));
        layers.sort_by_key(|layer| layer.sort_key(bg_priorities));

        for layer in layers {
            match layer {
                Layer::Background(bg) => {
                    let Some(kind) = kinds[bg] else {
                        continue;
                    };
                    let reference = self.affine_reference[bg.saturating_sub(2).min(1)];
                    backgrounds::draw_background(
                        backing, registers, memory, bg, kind, line, reference,
                    );
                }
                Layer::Objects(priority) => {
                    let pass = ObjectPass::Priority(priority);
                    objects::draw_objects(backing, registers, memory, line, pass);
                }
                Layer::ObjectWindow => {
                    objects::draw_objects(backing, registers, memory, line, ObjectPass::Window);
                }
                Layer::Backdrop => {}
            }
        }

        backing.resolve(registers);
        row.copy_from_slice(&backing.color);
    }

    /// The framebuffer as 8-bit RGBA, row major.
    #[must_use]
    pub fn frame_rgba(&self) -> Vec<u8> {
        self.buffer.iter().flat_map(|color| color.to_rgba()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_hblank_and_line_timing() {
        let mut lcd = Lcd::default();
        lcd.registers.dispstat = 1 << 4;

        let output = lcd.step(HBLANK_START - 1);
        assert_eq!(output, LcdStepOutput::default());

        let output = lcd.step(1);
        assert!(output.request_hblank_irq);
        assert!(output.hblank_dma);
        assert!(lcd.registers.dispstat.get_bit(1));

        lcd.step(CYCLES_PER_LINE - HBLANK_START);
        assert_eq!(lcd.registers.vcount, 1);
        assert!(!lcd.registers.dispstat.get_bit(1));
    }

    #[test]
    fn check_vblank_period() {
        let mut lcd = Lcd::default();
        lcd.registers.dispstat = 1 << 3;

        let output = lcd.step(CYCLES_PER_LINE * 160);
        assert!(output.request_vblank_irq);
        assert!(output.vblank_dma);
        assert!(output.frame_completed);
        assert!(lcd.registers.dispstat.get_bit(0));

        // No HBlank DMA during VBlank.
        let output = lcd.step(CYCLES_PER_LINE);
        assert!(!output.hblank_dma);

        lcd.step(CYCLES_PER_LINE * 66);
        assert_eq!(lcd.registers.vcount, 227);
        assert!(!lcd.registers.dispstat.get_bit(0));

        lcd.step(CYCLES_PER_LINE);
        assert_eq!(lcd.registers.vcount, 0);
    }

    #[test]
    fn check_vcount_match_fires_once() {
        let mut lcd = Lcd::default();
        lcd.registers.dispstat = (5 << 8) | (1 << 5);

        let output = lcd.step(CYCLES_PER_LINE * 5);
        assert!(output.request_vcount_irq);
        assert!(lcd.registers.dispstat.get_bit(2));

        let output = lcd.step(CYCLES_PER_LINE);
        assert!(!output.request_vcount_irq);
        assert!(!lcd.registers.dispstat.get_bit(2));
    }

    #[test]
    fn check_full_frame_cycles() {
        let mut lcd = Lcd::default();
        let output = lcd.step(CYCLES_PER_FRAME);
        assert!(output.frame_completed);
        assert_eq!(lcd.registers.vcount, 0);
        assert_eq!(lcd.cycles_until_next_event(), HBLANK_START);
    }

    #[test]
    fn check_drawing_twice_gives_the_same_row() {
        let mut lcd = Lcd::default();
        lcd.registers.dispcnt = 1 << 8;
        lcd.memory.palette_ram[0] = 0x1F;
        lcd.memory.palette_ram[2] = 0xE0;
        for byte in lcd.memory.video_ram[0..32].iter_mut() {
            *byte = rand::random::<u8>() & 0x11;
        }

        lcd.draw_scanline(10);
        let first = lcd.buffer[10 * LCD_WIDTH..11 * LCD_WIDTH].to_vec();
        lcd.draw_scanline(10);
        assert_eq!(first, lcd.buffer[10 * LCD_WIDTH..11 * LCD_WIDTH].to_vec());
    }

    #[test]
    fn check_forced_blank_is_white() {
        let mut lcd = Lcd::default();
        lcd.registers.dispcnt = 1 << 7;
        lcd.draw_scanline(0);
        assert!(lcd.buffer[..LCD_WIDTH].iter().all(|&color| color == Color::WHITE));
    }

    #[test]
    fn check_affine_reference_reset_and_advance() {
        let mut lcd = Lcd::default();
        lcd.registers.bg_affine[0].x = 0x0FFF_FF00;
        lcd.registers.bg_affine[0].y = 0x100;
        lcd.registers.bg_affine[0].pd = 0x100;
        lcd.reset_affine_reference(0);
        assert_eq!(lcd.affine_reference[0], (-256, 256));

        lcd.step(HBLANK_START);
        assert_eq!(lcd.affine_reference[0], (-256, 512));

        // Entering VBlank reloads the registers, line 0 advances them again.
        lcd.step(CYCLES_PER_FRAME);
        assert_eq!(lcd.affine_reference[0], (-256, 512));
    }

    #[test]
    fn check_color_to_rgba() {
        assert_eq!(Color(0x7FFF).to_rgba(), [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Color::from_rgb(1, 0, 16).to_rgba(), [0x08, 0, 0x84, 0xFF]);
    }
}
