//! Background rendering.
//!
//! The DISPCNT register (bits 0-2) selects the background mode:
//!
//! | Mode | BG0    | BG1    | BG2      | BG3      | Description           |
//! |------|--------|--------|----------|----------|-----------------------|
//! | 0    | Text   | Text   | Text     | Text     | 4 text backgrounds    |
//! | 1    | Text   | Text   | Affine   | -        | 2 text + 1 affine     |
//! | 2    | -      | -      | Affine   | Affine   | 2 affine backgrounds  |
//! | 3    | -      | -      | Bitmap   | -        | 240x160 15-bit bitmap |
//! | 4    | -      | -      | Bitmap   | -        | 240x160 8-bit indexed |
//! | 5    | -      | -      | Bitmap   | -        | 160x128 15-bit bitmap |
//!
//! Affine and bitmap backgrounds are sampled through the affine reference
//! point of the scanline: texel = (reference + PA * x, reference + PC * x),
//! in 8 bits of fraction.

use crate::bitwise::Bits;
use crate::cpu::hardware::lcd::backing::Backing;
use crate::cpu::hardware::lcd::memory::Memory;
use crate::cpu::hardware::lcd::registers::Registers;
use crate::cpu::hardware::lcd::{Color, LCD_HEIGHT, LCD_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundKind {
    Text,
    Affine,
    /// 240x160, direct color.
    Bitmap3,
    /// 240x160, paletted, two frames.
    Bitmap4,
    /// 160x128, direct color, two frames.
    Bitmap5,
}

use BackgroundKind::{Affine, Bitmap3, Bitmap4, Bitmap5, Text};

/// Kind of each background for modes 0-5. Modes 6 and 7 show nothing.
pub const MODE_TABLE: [[Option<BackgroundKind>; 4]; 6] = [
    [Some(Text), Some(Text), Some(Text), Some(Text)],
    [Some(Text), Some(Text), Some(Affine), None],
    [None, None, Some(Affine), Some(Affine)],
    [None, None, Some(Bitmap3), None],
    [None, None, Some(Bitmap4), None],
    [None, None, Some(Bitmap5), None],
];

/// Backgrounds tiles must lie in the first 64KB of VRAM.
const BG_VRAM_LIMIT: usize = 0x1_0000;

/// Offset of the second frame in modes 4 and 5.
const SECOND_FRAME_OFFSET: usize = 0xA000;

const MODE_5_WIDTH: i32 = 160;
const MODE_5_HEIGHT: i32 = 128;

pub fn draw_background(
    backing: &mut Backing,
    registers: &Registers,
    memory: &Memory,
    bg: usize,
    kind: BackgroundKind,
    line: u16,
    reference: (i32, i32),
) {
    match kind {
        Text => draw_text(backing, registers, memory, bg, line),
        Affine => draw_affine(backing, registers, memory, bg, reference),
        Bitmap3 | Bitmap4 | Bitmap5 => draw_bitmap(backing, registers, memory, kind, reference),
    }
}

fn mosaic_column(registers: &Registers, bg: usize, x: usize) -> usize {
    if registers.get_bg_mosaic(bg) {
        let (width, _) = registers.get_bg_mosaic_size();
        x - x % width
    } else {
        x
    }
}

#[allow(clippy::similar_names)]
fn draw_text(backing: &mut Backing, registers: &Registers, memory: &Memory, bg: usize, line: u16) {
    let (width, height) = registers.get_text_screen_size(bg);
    let screen_base = registers.get_bg_screen_base(bg);
    let character_base = registers.get_bg_character_base(bg);
    let eight_bpp = registers.get_bg_color_mode(bg);
    let priority = registers.get_bg_priority(bg);

    let mut y = usize::from(line);
    if registers.get_bg_mosaic(bg) {
        let (_, mosaic_height) = registers.get_bg_mosaic_size();
        y -= y % mosaic_height;
    }
    let scroll_y = (y + usize::from(registers.bg_vofs[bg].get_bits(0..=8))) % height;
    let scroll_x_offset = usize::from(registers.bg_hofs[bg].get_bits(0..=8));

    for x in 0..LCD_WIDTH {
        let scroll_x = (mosaic_column(registers, bg, x) + scroll_x_offset) % width;

        // Larger maps are made of 32x32 screen blocks laid out left to right, top to bottom.
        let block = scroll_x / 256 + (scroll_y / 256) * (width / 256);
        let tile_x = (scroll_x % 256) / 8;
        let tile_y = (scroll_y % 256) / 8;
        let entry = memory.vram_half_word(screen_base + block * 0x800 + (tile_y * 32 + tile_x) * 2);

        let tile_number = usize::from(entry.get_bits(0..=9));
        let pixel_x = if entry.get_bit(10) { 7 - scroll_x % 8 } else { scroll_x % 8 };
        let pixel_y = if entry.get_bit(11) { 7 - scroll_y % 8 } else { scroll_y % 8 };
        let palette_bank = usize::from(entry.get_bits(12..=15));

        let tile_address = character_base + tile_number * if eight_bpp { 64 } else { 32 };
        if tile_address >= BG_VRAM_LIMIT {
            continue;
        }

        let palette_index = memory.tile_pixel(tile_address, pixel_x, pixel_y, eight_bpp);
        if palette_index == 0 {
            continue;
        }

        let color = if eight_bpp {
            memory.bg_color(palette_index)
        } else {
            memory.bg_color(palette_bank * 16 + palette_index)
        };
        backing.push_pixel(x, color, bg as u8, priority, false);
    }
}

/// Texel sampled at screen column `x` of the current line.
fn affine_texel(
    registers: &Registers,
    index: usize,
    reference: (i32, i32),
    x: usize,
) -> (i32, i32) {
    let parameters = registers.bg_affine[index];
    let x = x as i32;
    (
        (reference.0 + i32::from(parameters.pa as i16) * x) >> 8,
        (reference.1 + i32::from(parameters.pc as i16) * x) >> 8,
    )
}

fn draw_affine(
    backing: &mut Backing,
    registers: &Registers,
    memory: &Memory,
    bg: usize,
    reference: (i32, i32),
) {
    let size = registers.get_affine_screen_size(bg) as i32;
    let screen_base = registers.get_bg_screen_base(bg);
    let character_base = registers.get_bg_character_base(bg);
    let wraparound = registers.get_bg_wraparound(bg);
    let priority = registers.get_bg_priority(bg);
    let tiles_per_row = size as usize / 8;

    for x in 0..LCD_WIDTH {
        let column = mosaic_column(registers, bg, x);
        let (mut texel_x, mut texel_y) = affine_texel(registers, bg - 2, reference, column);

        if wraparound {
            texel_x = texel_x.rem_euclid(size);
            texel_y = texel_y.rem_euclid(size);
        } else if !(0..size).contains(&texel_x) || !(0..size).contains(&texel_y) {
            continue;
        }

        let (texel_x, texel_y) = (texel_x as usize, texel_y as usize);
        let map_address = screen_base + (texel_y / 8) * tiles_per_row + texel_x / 8;
        let tile_number = usize::from(memory.video_ram[map_address % BG_VRAM_LIMIT]);

        // Affine tiles are always 8bpp.
        let tile_address = character_base + tile_number * 64;
        let palette_index = memory.tile_pixel(tile_address, texel_x % 8, texel_y % 8, true);
        if palette_index == 0 {
            continue;
        }

        backing.push_pixel(x, memory.bg_color(palette_index), bg as u8, priority, false);
    }
}

fn draw_bitmap(
    backing: &mut Backing,
    registers: &Registers,
    memory: &Memory,
    kind: BackgroundKind,
    reference: (i32, i32),
) {
    let (width, height) = match kind {
        Bitmap5 => (MODE_5_WIDTH, MODE_5_HEIGHT),
        _ => (LCD_WIDTH as i32, LCD_HEIGHT as i32),
    };
    let frame_offset = if kind != Bitmap3 && registers.get_display_frame() {
        SECOND_FRAME_OFFSET
    } else {
        0
    };
    let priority = registers.get_bg_priority(2);

    for x in 0..LCD_WIDTH {
        let column = mosaic_column(registers, 2, x);
        let (texel_x, texel_y) = affine_texel(registers, 0, reference, column);
        if !(0..width).contains(&texel_x) || !(0..height).contains(&texel_y) {
            continue;
        }

        let pixel = (texel_y * width + texel_x) as usize;
        let color = match kind {
            Bitmap4 => {
                let palette_index = usize::from(memory.video_ram[frame_offset + pixel]);
                if palette_index == 0 {
                    continue;
                }
                memory.bg_color(palette_index)
            }
            _ => Color(memory.vram_half_word(frame_offset + pixel * 2) & 0x7FFF),
        };

        backing.push_pixel(x, color, 2, priority, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::lcd::windows::Windows;
    use pretty_assertions::assert_eq;

    /// Identity matrix, reference at the origin of line `y`.
    fn identity(registers: &mut Registers) {
        registers.bg_affine[0].pa = 0x100;
        registers.bg_affine[0].pd = 0x100;
        registers.bg_affine[1].pa = 0x100;
        registers.bg_affine[1].pd = 0x100;
    }

    fn backing(registers: &Registers) -> Backing {
        let mut backing = Backing::default();
        backing.seed(Color(0), 0, &Windows::compute(registers, 0));
        backing
    }

    #[test]
    fn check_mode_table() {
        assert_eq!(MODE_TABLE[1], [Some(Text), Some(Text), Some(Affine), None]);
        assert_eq!(MODE_TABLE[2][3], Some(Affine));
        assert!(MODE_TABLE[3].iter().enumerate().all(|(bg, kind)| kind.is_some() == (bg == 2)));
    }

    #[test]
    fn check_text_background_with_scroll() {
        let mut registers = Registers::default();
        // Map at block 1, tiles at block 0, 4bpp.
        registers.bg_control[0] = 1 << 8;
        registers.bg_hofs[0] = 4;

        let mut memory = Memory::default();
        memory.palette_ram[(2 * 16 + 3) * 2] = 0x34;
        memory.palette_ram[(2 * 16 + 3) * 2 + 1] = 0x12;
        // Tile 1 is fully color 3.
        memory.video_ram[32..64].fill(0x33);
        // Map entry (1, 0) uses tile 1, palette bank 2.
        memory.video_ram[0x800 + 2..0x800 + 4].copy_from_slice(&((2_u16 << 12) | 1).to_le_bytes());

        let mut backing = backing(&registers);
        draw_text(&mut backing, &registers, &memory, 0, 0);
        assert_eq!(backing.color[3], Color(0));
        assert_eq!(backing.color[4], Color(0x1234));
        assert_eq!(backing.color[11], Color(0x1234));
        assert_eq!(backing.color[12], Color(0));
    }

    #[test]
    fn check_text_tiles_outside_bg_vram_are_transparent() {
        let mut registers = Registers::default();
        // Tiles at block 3, 8bpp: tile 0x200 is at 0xC000 + 0x8000.
        registers.bg_control[0] = (1 << 7) | (3 << 2) | (1 << 8);
        let mut memory = Memory::default();
        memory.palette_ram[2] = 0xFF;
        memory.video_ram[0x800..0x802].copy_from_slice(&0x200_u16.to_le_bytes());
        memory.video_ram[0x1_4000] = 1;

        let mut backing = backing(&registers);
        draw_text(&mut backing, &registers, &memory, 0, 0);
        assert_eq!(backing.color[0], Color(0));
    }

    #[test]
    fn check_affine_wraparound() {
        let mut registers = Registers::default();
        identity(&mut registers);
        // 128x128 map at block 2, tiles at block 1.
        registers.bg_control[2] = (2 << 8) | (1 << 2);

        let mut memory = Memory::default();
        memory.palette_ram[2] = 0x1F;
        memory.video_ram[0x4000 + 64..0x4000 + 128].fill(1);
        memory.video_ram[0x1000] = 1;

        let mut backing = backing(&registers);
        draw_affine(&mut backing, &registers, &memory, 2, (0, 0));
        assert_eq!(backing.color[0], Color(0x1F));
        assert_eq!(backing.color[128], Color(0));

        registers.bg_control[2].set_bit(13, true);
        let mut backing = self::backing(&registers);
        draw_affine(&mut backing, &registers, &memory, 2, (0, 0));
        assert_eq!(backing.color[128], Color(0x1F));
    }

    #[test]
    fn check_bitmap_modes() {
        let mut registers = Registers::default();
        identity(&mut registers);

        let mut memory = Memory::default();
        let offset = (240 * 2 + 5) * 2;
        memory.video_ram[offset..offset + 2].copy_from_slice(&0xFFFF_u16.to_le_bytes());
        let mut backing = backing(&registers);
        draw_bitmap(&mut backing, &registers, &memory, Bitmap3, (0, 2 << 8));
        assert_eq!(backing.color[5], Color(0x7FFF));

        // Second frame of mode 4.
        registers.dispcnt.set_bit(4, true);
        memory.palette_ram[14] = 0x42;
        memory.video_ram[SECOND_FRAME_OFFSET + 9] = 7;
        let mut backing = self::backing(&registers);
        draw_bitmap(&mut backing, &registers, &memory, Bitmap4, (0, 0));
        assert_eq!(backing.color[9], Color(0x42));
        assert_eq!(backing.color[8], Color(0));

        // Mode 5 is only 160 pixels wide.
        let mut backing = self::backing(&registers);
        memory.video_ram[SECOND_FRAME_OFFSET + 170 * 2] = 0x11;
        draw_bitmap(&mut backing, &registers, &memory, Bitmap5, (0, 0));
        assert_eq!(backing.color[170], Color(0));
    }
}
