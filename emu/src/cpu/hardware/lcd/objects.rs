//! Sprite rendering.
//!
//! OAM is decoded again on every scanline, so writes made during HBlank
//! show up on the next line. Entries are drawn in OAM order: when two
//! objects of the same priority overlap, the lower index stays on top.

use crate::cpu::hardware::lcd::backing::Backing;
use crate::cpu::hardware::lcd::layers::OBJ_LAYER_ID;
use crate::cpu::hardware::lcd::memory::{Memory, OBJ_TILES_OFFSET};
use crate::cpu::hardware::lcd::object_attributes::{
    GfxMode, ObjAttributes, RotationScaling, TransformationKind, OBJ_COUNT,
};
use crate::cpu::hardware::lcd::registers::Registers;
use crate::cpu::hardware::lcd::LCD_WIDTH;

/// In bitmap modes the frame buffers cover the low OBJ tiles.
const FIRST_BITMAP_MODE_TILE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectPass {
    /// Visible objects of one priority.
    Priority(u8),
    /// Objects in OBJ window mode.
    Window,
}

pub fn draw_objects(
    backing: &mut Backing,
    registers: &Registers,
    memory: &Memory,
    line: u16,
    pass: ObjectPass,
) {
    let bitmap_mode = registers.get_bg_mode() >= 3;
    let one_dimensional = registers.get_obj_one_dimensional();
    let (mosaic_width, mosaic_height) = registers.get_obj_mosaic_size();

    for index in 0..OBJ_COUNT {
        let Some(obj) = ObjAttributes::decode(memory, index) else {
            continue;
        };

        let selected = match pass {
            ObjectPass::Priority(priority) => {
                obj.priority == priority
                    && matches!(obj.gfx_mode, GfxMode::Normal | GfxMode::SemiTransparent)
            }
            ObjectPass::Window => obj.gfx_mode == GfxMode::ObjectWindow,
        };
        if !selected || (bitmap_mode && obj.tile_number < FIRST_BITMAP_MODE_TILE) {
            continue;
        }

        let Some(mut row) = obj.row_on_line(i32::from(line)) else {
            continue;
        };
        if obj.mosaic {
            row = (row - i32::from(line) % mosaic_height as i32).max(0);
        }

        let (bound_width, bound_height) = obj.bounds();
        let matrix = match obj.transformation {
            TransformationKind::RotationScaling { matrix } => {
                Some(RotationScaling::read(memory, matrix))
            }
            TransformationKind::Flip { .. } => None,
        };

        let first = obj.x.max(0);
        let last = (obj.x + bound_width).min(LCD_WIDTH as i32);
        for screen_x in first..last {
            let sample_x = if obj.mosaic {
                (screen_x - screen_x % mosaic_width as i32).max(obj.x)
            } else {
                screen_x
            };
            let column = sample_x - obj.x;

            let (texture_x, texture_y) = match (matrix, obj.transformation) {
                (Some(matrix), _) => {
                    let dx = column - bound_width / 2;
                    let dy = row - bound_height / 2;
                    (
                        ((matrix.pa * dx + matrix.pb * dy) >> 8) + obj.width / 2,
                        ((matrix.pc * dx + matrix.pd * dy) >> 8) + obj.height / 2,
                    )
                }
                (None, TransformationKind::Flip { horizontal, vertical }) => (
                    if horizontal { obj.width - 1 - column } else { column },
                    if vertical { obj.height - 1 - row } else { row },
                ),
                (None, TransformationKind::RotationScaling { .. }) => (column, row),
            };

            if !(0..obj.width).contains(&texture_x) || !(0..obj.height).contains(&texture_y) {
                continue;
            }

            let palette_index = texel(
                memory,
                &obj,
                one_dimensional,
                texture_x as usize,
                texture_y as usize,
            );
            if palette_index == 0 {
                continue;
            }

            let x = screen_x as usize;
            match pass {
                ObjectPass::Window => backing.mark_object_window(x),
                ObjectPass::Priority(priority) => {
                    let color = if obj.eight_bpp {
                        memory.obj_color(palette_index)
                    } else {
                        memory.obj_color(obj.palette_bank * 16 + palette_index)
                    };
                    backing.push_pixel(
                        x,
                        color,
                        OBJ_LAYER_ID,
                        priority,
                        obj.gfx_mode == GfxMode::SemiTransparent,
                    );
                }
            }
        }
    }
}

/// Palette index of texel (`x`, `y`) of the sprite.
fn texel(memory: &Memory, obj: &ObjAttributes, one_dimensional: bool, x: usize, y: usize) -> usize {
    let step = if obj.eight_bpp { 2 } else { 1 };
    let tiles_per_row = if one_dimensional {
        (obj.width as usize / 8) * step
    } else {
        32
    };
    let tile = obj.tile_number + (y / 8) * tiles_per_row + (x / 8) * step;
    let tile_address = OBJ_TILES_OFFSET + (tile & 0x3FF) * 32;

    memory.tile_pixel(tile_address, x % 8, y % 8, obj.eight_bpp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::lcd::windows::Windows;
    use crate::cpu::hardware::lcd::Color;
    use pretty_assertions::assert_eq;

    fn setup() -> (Registers, Memory, Backing) {
        let registers = Registers {
            dispcnt: (1 << 12) | (1 << 6),
            ..Default::default()
        };
        let mut memory = Memory::default();
        // OBJ palette bank 1, color 1.
        memory.palette_ram[0x200 + 17 * 2] = 0x1F;

        // Tile 0: left half color 1, right half transparent.
        for row in 0..8 {
            memory.video_ram[OBJ_TILES_OFFSET + row * 4] = 0x11;
            memory.video_ram[OBJ_TILES_OFFSET + row * 4 + 1] = 0x11;
        }

        for index in 0..OBJ_COUNT {
            write_entry(&mut memory, index, [2 << 8, 0, 0]);
        }

        let mut backing = Backing::default();
        backing.seed(Color(0), 0, &Windows::compute(&registers, 0));
        (registers, memory, backing)
    }

    fn write_entry(memory: &mut Memory, index: usize, attributes: [u16; 3]) {
        for (n, value) in attributes.iter().enumerate() {
            let offset = index * 8 + n * 2;
            memory.object_attribute_memory[offset..offset + 2]
                .copy_from_slice(&value.to_le_bytes());
        }
    }

    #[test]
    fn check_normal_sprite_and_flip() {
        let (registers, mut memory, mut backing) = setup();
        write_entry(&mut memory, 0, [0, 10, 1 << 12]);
        write_entry(&mut memory, 1, [0, 100 | (1 << 12), 1 << 12]);
        draw_objects(&mut backing, &registers, &memory, 3, ObjectPass::Priority(0));

        assert_eq!(backing.color[10], Color(0x1F));
        assert_eq!(backing.color[13], Color(0x1F));
        assert_eq!(backing.color[14], Color(0));

        // Flipped horizontally: the opaque half is on the right.
        assert_eq!(backing.color[103], Color(0));
        assert_eq!(backing.color[104], Color(0x1F));
    }

    #[test]
    fn check_priority_pass_and_disabled_entries() {
        let (registers, mut memory, mut backing) = setup();
        write_entry(&mut memory, 0, [0, 10, (1 << 12) | (1 << 10)]);
        write_entry(&mut memory, 1, [2 << 8, 20, 1 << 12]);
        draw_objects(&mut backing, &registers, &memory, 0, ObjectPass::Priority(0));
        assert_eq!(backing.color[10], Color(0));
        assert_eq!(backing.color[20], Color(0));

        draw_objects(&mut backing, &registers, &memory, 0, ObjectPass::Priority(1));
        assert_eq!(backing.color[10], Color(0x1F));
    }

    #[test]
    fn check_sprite_clipped_at_left_edge() {
        let (registers, mut memory, mut backing) = setup();
        // x = -2 as a 9 bit value.
        write_entry(&mut memory, 0, [0, 0x1FE, 1 << 12]);
        draw_objects(&mut backing, &registers, &memory, 0, ObjectPass::Priority(0));
        assert_eq!(backing.color[0], Color(0x1F));
        assert_eq!(backing.color[1], Color(0x1F));
        assert_eq!(backing.color[2], Color(0));
    }

    #[test]
    fn check_bitmap_mode_skips_low_tiles() {
        let (mut registers, mut memory, mut backing) = setup();
        registers.dispcnt |= 3;
        write_entry(&mut memory, 0, [0, 10, 1 << 12]);
        draw_objects(&mut backing, &registers, &memory, 0, ObjectPass::Priority(0));
        assert_eq!(backing.color[10], Color(0));
    }
}
