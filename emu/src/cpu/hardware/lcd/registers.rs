//! LCD I/O Registers.
//!
//! | Address       | Register | Description                              |
//! |---------------|----------|------------------------------------------|
//! | `0x0400_0000` | DISPCNT  | LCD control (mode, layer enables)        |
//! | `0x0400_0004` | DISPSTAT | LCD status (vblank, hblank flags)        |
//! | `0x0400_0006` | VCOUNT   | Current scanline (0-227)                 |
//! | `0x0400_0008` | BGxCNT   | BG0-BG3 control (priority, tiles, size)  |
//! | `0x0400_0010` | BGxHOFS  | BG0-BG3 horizontal/vertical scroll       |
//! | `0x0400_0020` | BG2PA..  | BG2 affine matrix and reference point    |
//! | `0x0400_0030` | BG3PA..  | BG3 affine matrix and reference point    |
//! | `0x0400_0040` | WINxH/V  | Window 0/1 bounds                        |
//! | `0x0400_0048` | WININ    | Layer enables inside windows 0/1         |
//! | `0x0400_004A` | WINOUT   | Layer enables outside/OBJ window         |
//! | `0x0400_004C` | MOSAIC   | Mosaic size                              |
//! | `0x0400_0050` | BLDCNT   | Color special effects selection          |
//!
//! Window coordinates use wrap-around logic: if right < left or bottom < top,
//! the window wraps around the screen edge.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Rotation/scaling parameters of an affine background (BG2 or BG3).
#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct AffineParameters {
    pub pa: u16,
    pub pb: u16,
    pub pc: u16,
    pub pd: u16,
    /// Reference point, 28 bits signed 20.8 fixed point.
    pub x: u32,
    pub y: u32,
}

/// LCD control and status registers.
#[derive(Default, Serialize, Deserialize)]
pub struct Registers {
    /// LCD Control
    pub dispcnt: u16,
    /// Undocumented
    pub green_swap: u16,
    /// General LCD Status (STAT, LYC)
    pub dispstat: u16,
    /// Vertical Counter (LY)
    pub vcount: u16,
    /// BG0-BG3 Control
    pub bg_control: [u16; 4],
    /// BG0-BG3 `X-Offset`
    pub bg_hofs: [u16; 4],
    /// BG0-BG3 `Y-Offset`
    pub bg_vofs: [u16; 4],
    /// BG2 and BG3 rotation/scaling
    pub bg_affine: [AffineParameters; 2],
    /// Window 0 Horizontal Dimensions
    pub win0h: u16,
    /// Window 1 Horizontal Dimensions
    pub win1h: u16,
    /// Window 0 Vertical Dimensions
    pub win0v: u16,
    /// Window 1 Vertical Dimensions
    pub win1v: u16,
    /// Inside of Window 0 and 1
    pub winin: u16,
    /// Inside of OBJ Window & Outside of Windows
    pub winout: u16,
    /// Mosaic Size
    pub mosaic: u16,
    /// Color Special Effects Selection
    pub bldcnt: u16,
    /// Alpha Blending Coefficients
    pub bldalpha: u16,
    /// Brightness (Fade-In/Out) Coefficient
    pub bldy: u16,
}

impl Registers {
    pub(super) fn get_bg_mode(&self) -> usize {
        usize::from(self.dispcnt.get_bits(0..=2))
    }

    /// Frame select for modes 4 and 5 (DISPCNT bit 4).
    pub(super) fn get_display_frame(&self) -> bool {
        self.dispcnt.get_bit(4)
    }

    /// `true` for one-dimensional OBJ tile mapping (DISPCNT bit 6).
    pub(super) fn get_obj_one_dimensional(&self) -> bool {
        self.dispcnt.get_bit(6)
    }

    pub(super) fn get_forced_blank(&self) -> bool {
        self.dispcnt.get_bit(7)
    }

    pub(super) fn get_bg_enabled(&self, bg: usize) -> bool {
        self.dispcnt.get_bit(8 + bg as u8)
    }

    pub(super) fn get_obj_enabled(&self) -> bool {
        self.dispcnt.get_bit(12)
    }

    pub(super) fn get_vcount_setting(&self) -> u16 {
        u16::from(self.dispstat.get_byte(1))
    }

    pub(super) fn get_vblank_irq_enable(&self) -> bool {
        self.dispstat.get_bit(3)
    }

    pub(super) fn get_hblank_irq_enable(&self) -> bool {
        self.dispstat.get_bit(4)
    }

    pub(super) fn get_vcounter_irq_enable(&self) -> bool {
        self.dispstat.get_bit(5)
    }

    pub(super) fn set_vblank_flag(&mut self, value: bool) {
        self.dispstat.set_bit(0, value);
    }

    pub(super) fn set_hblank_flag(&mut self, value: bool) {
        self.dispstat.set_bit(1, value);
    }

    pub(super) fn get_vcounter_flag(&self) -> bool {
        self.dispstat.get_bit(2)
    }

    pub(super) fn set_vcounter_flag(&mut self, value: bool) {
        self.dispstat.set_bit(2, value);
    }

    /// DISPSTAT bits 0-2 are status flags and ignore writes.
    pub fn write_dispstat(&mut self, byte_nth: u8, value: u8) {
        if byte_nth == 0 {
            let flags = self.dispstat.get_bits(0..=2) as u8;
            self.dispstat.set_byte(0, (value & !0b111) | flags);
        } else {
            self.dispstat.set_byte(1, value);
        }
    }

    /// BG priority (0-3, lower = higher priority).
    pub(super) fn get_bg_priority(&self, bg: usize) -> u8 {
        self.bg_control[bg].get_bits(0..=1) as u8
    }

    /// Each block is 16KB starting at VRAM `0x0600_0000`.
    pub(super) fn get_bg_character_base(&self, bg: usize) -> usize {
        usize::from(self.bg_control[bg].get_bits(2..=3)) * 0x4000
    }

    pub(super) fn get_bg_mosaic(&self, bg: usize) -> bool {
        self.bg_control[bg].get_bit(6)
    }

    /// `false` for 4bpp (16 colors per palette), `true` for 8bpp (256 colors).
    pub(super) fn get_bg_color_mode(&self, bg: usize) -> bool {
        self.bg_control[bg].get_bit(7)
    }

    /// Each block is 2KB (one 32×32 tilemap).
    pub(super) fn get_bg_screen_base(&self, bg: usize) -> usize {
        usize::from(self.bg_control[bg].get_bits(8..=12)) * 0x800
    }

    /// Affine backgrounds only: out-of-range samples wrap instead of being transparent.
    pub(super) fn get_bg_wraparound(&self, bg: usize) -> bool {
        self.bg_control[bg].get_bit(13)
    }

    /// Text background size in pixels.
    ///
    /// | Size bits | Dimensions | Screen blocks         |
    /// |-----------|------------|-----------------------|
    /// | 0         | 256×256    | 1 block               |
    /// | 1         | 512×256    | 2 blocks horizontal   |
    /// | 2         | 256×512    | 2 blocks vertical     |
    /// | 3         | 512×512    | 4 blocks (2×2 grid)   |
    pub(super) fn get_text_screen_size(&self, bg: usize) -> (usize, usize) {
        match self.bg_control[bg].get_bits(14..=15) {
            0 => (256, 256),
            1 => (512, 256),
            2 => (256, 512),
            _ => (512, 512),
        }
    }

    /// Affine background side in pixels: 128, 256, 512 or 1024.
    pub(super) fn get_affine_screen_size(&self, bg: usize) -> usize {
        128 << self.bg_control[bg].get_bits(14..=15)
    }

    /// BG mosaic block size (width, height), at least 1.
    pub(super) fn get_bg_mosaic_size(&self) -> (usize, usize) {
        (
            usize::from(self.mosaic.get_bits(0..=3)) + 1,
            usize::from(self.mosaic.get_bits(4..=7)) + 1,
        )
    }

    /// OBJ mosaic block size (width, height), at least 1.
    pub(super) fn get_obj_mosaic_size(&self) -> (usize, usize) {
        (
            usize::from(self.mosaic.get_bits(8..=11)) + 1,
            usize::from(self.mosaic.get_bits(12..=15)) + 1,
        )
    }

    pub(super) fn get_win0_enabled(&self) -> bool {
        self.dispcnt.get_bit(13)
    }

    pub(super) fn get_win1_enabled(&self) -> bool {
        self.dispcnt.get_bit(14)
    }

    pub(super) fn get_winobj_enabled(&self) -> bool {
        self.dispcnt.get_bit(15) && self.get_obj_enabled()
    }

    /// (left, right) of window 0 or 1.
    pub(super) fn get_window_horizontal(&self, window: usize) -> (u8, u8) {
        let value = if window == 0 { self.win0h } else { self.win1h };
        (value.get_byte(1), value.get_byte(0))
    }

    /// (top, bottom) of window 0 or 1.
    pub(super) fn get_window_vertical(&self, window: usize) -> (u8, u8) {
        let value = if window == 0 { self.win0v } else { self.win1v };
        (value.get_byte(1), value.get_byte(0))
    }

    /// Blend mode from BLDCNT.
    /// 0 = Off, 1 = Alpha blend, 2 = Brightness increase (white), 3 = Brightness decrease (black)
    pub(super) fn get_blend_mode(&self) -> u8 {
        self.bldcnt.get_bits(6..=7) as u8
    }

    /// Alpha blending coefficients (EVA, EVB), capped at 16.
    pub(super) fn get_blend_alpha(&self) -> (u16, u16) {
        let eva = self.bldalpha.get_bits(0..=4).min(16);
        let evb = self.bldalpha.get_bits(8..=12).min(16);
        (eva, evb)
    }

    /// Brightness coefficient (EVY), capped at 16.
    pub(super) fn get_blend_brightness(&self) -> u16 {
        self.bldy.get_bits(0..=4).min(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_dispstat_flags_are_read_only() {
        let mut registers = Registers::default();
        registers.set_vblank_flag(true);
        registers.write_dispstat(0, 0b0011_1010);
        assert_eq!(registers.dispstat, 0b0011_1001);

        registers.write_dispstat(1, 42);
        assert_eq!(registers.get_vcount_setting(), 42);
    }

    #[test]
    fn check_bg_control_fields() {
        let mut registers = Registers::default();
        registers.bg_control[1] = 0b1110_1000_1100_0110;
        assert_eq!(registers.get_bg_priority(1), 2);
        assert_eq!(registers.get_bg_character_base(1), 0x4000);
        assert!(registers.get_bg_mosaic(1));
        assert!(registers.get_bg_color_mode(1));
        assert_eq!(registers.get_bg_screen_base(1), 8 * 0x800);
        assert!(registers.get_bg_wraparound(1));
        assert_eq!(registers.get_text_screen_size(1), (512, 512));
        assert_eq!(registers.get_affine_screen_size(1), 1024);
    }

    #[test]
    fn check_blend_coefficients_are_capped() {
        let registers = Registers {
            bldalpha: 0x1F_08,
            bldy: 0x1F,
            ..Default::default()
        };
        assert_eq!(registers.get_blend_alpha(), (8, 16));
        assert_eq!(registers.get_blend_brightness(), 16);
    }
}
