//! LCD Memory - Palette RAM, VRAM and OAM.
//!
//! | Region          | Address Range           | Size    | Purpose                          |
//! |-----------------|-------------------------|---------|----------------------------------|
//! | BG Palette RAM  | 0x0500_0000-0x0500_01FF | 512 B   | Background color palettes        |
//! | OBJ Palette RAM | 0x0500_0200-0x0500_03FF | 512 B   | Sprite color palettes            |
//! | VRAM            | 0x0600_0000-0x0601_7FFF | 96 KB   | Tile data, tilemaps and bitmaps  |
//! | OAM             | 0x0700_0000-0x0700_03FF | 1 KB    | Sprite attributes                |
//!
//! Palette RAM holds RGB555 colors. In 4bpp mode it is split in 16 banks of
//! 16 colors; color 0 of a bank (or of the whole palette in 8bpp mode) is
//! transparent.
//!
//! In tile modes the first 64KB of VRAM hold background tiles and maps and
//! the last 32KB the OBJ tiles. In bitmap modes the frame buffers extend
//! into `0x0601_0000-0x0601_3FFF`, leaving only the upper 16KB to objects.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::cpu::hardware::lcd::Color;

pub const PALETTE_RAM_SIZE: usize = 0x400;
pub const VIDEO_RAM_SIZE: usize = 0x1_8000;
pub const OAM_SIZE: usize = 0x400;

/// Start of the OBJ tiles in VRAM.
pub const OBJ_TILES_OFFSET: usize = 0x1_0000;

#[serde_as]
#[derive(Serialize, Deserialize)]
pub struct Memory {
    /// BG palette in the first half, OBJ palette in the second.
    #[serde_as(as = "Box<[_; 1024]>")]
    pub palette_ram: Box<[u8; PALETTE_RAM_SIZE]>,

    #[serde_as(as = "Box<[_; 98304]>")]
    pub video_ram: Box<[u8; VIDEO_RAM_SIZE]>,

    /// 128 entries of 8 bytes, the 4th halfword of each entry being
    /// part of one of the 32 rotation/scaling matrices.
    #[serde_as(as = "Box<[_; 1024]>")]
    pub object_attribute_memory: Box<[u8; OAM_SIZE]>,
}

impl Default for Memory {
    #[allow(clippy::large_stack_arrays)]
    fn default() -> Self {
        Self {
            palette_ram: Box::new([0; PALETTE_RAM_SIZE]),
            video_ram: Box::new([0; VIDEO_RAM_SIZE]),
            object_attribute_memory: Box::new([0; OAM_SIZE]),
        }
    }
}

impl Memory {
    fn palette_color(&self, offset: usize) -> Color {
        Color(u16::from_le_bytes([
            self.palette_ram[offset],
            self.palette_ram[offset + 1],
        ]))
    }

    /// Color `index` (0-255) of the BG palette.
    #[must_use]
    pub fn bg_color(&self, index: usize) -> Color {
        self.palette_color((index & 0xFF) * 2)
    }

    /// Color `index` (0-255) of the OBJ palette.
    #[must_use]
    pub fn obj_color(&self, index: usize) -> Color {
        self.palette_color(0x200 + (index & 0xFF) * 2)
    }

    #[must_use]
    pub fn vram_half_word(&self, offset: usize) -> u16 {
        let offset = offset & !1;
        u16::from_le_bytes([self.video_ram[offset], self.video_ram[offset + 1]])
    }

    #[must_use]
    pub fn oam_half_word(&self, offset: usize) -> u16 {
        let offset = offset & !1;
        u16::from_le_bytes([
            self.object_attribute_memory[offset],
            self.object_attribute_memory[offset + 1],
        ])
    }

    /// Palette index of pixel (`x`, `y`) of the 8x8 tile at `tile_address`.
    /// 4bpp indices are within the tile's bank.
    #[must_use]
    pub fn tile_pixel(&self, tile_address: usize, x: usize, y: usize, eight_bpp: bool) -> usize {
        if eight_bpp {
            usize::from(self.video_ram[(tile_address + y * 8 + x) % VIDEO_RAM_SIZE])
        } else {
            let byte = self.video_ram[(tile_address + y * 4 + x / 2) % VIDEO_RAM_SIZE];
            usize::from(if x % 2 == 0 { byte & 0xF } else { byte >> 4 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_palette_halves() {
        let mut memory = Memory::default();
        memory.palette_ram[0x22] = 0x1F;
        memory.palette_ram[0x222] = 0xE0;
        memory.palette_ram[0x223] = 0x03;

        assert_eq!(memory.bg_color(0x11).0, 0x001F);
        assert_eq!(memory.obj_color(0x11).0, 0x03E0);
    }

    #[test]
    fn check_tile_pixel_nibbles() {
        let mut memory = Memory::default();
        memory.video_ram[0x4000 + 4] = 0xA5;
        assert_eq!(memory.tile_pixel(0x4000, 0, 1, false), 0x5);
        assert_eq!(memory.tile_pixel(0x4000, 1, 1, false), 0xA);

        memory.video_ram[0x4000 + 8 + 3] = 0x7E;
        assert_eq!(memory.tile_pixel(0x4000, 3, 1, true), 0x7E);
    }
}
