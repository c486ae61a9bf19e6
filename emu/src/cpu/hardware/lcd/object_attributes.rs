// We use nomenclature coming from https://www.coranac.com/tonc/text/regobj.htm#sec-oam

use crate::bitwise::Bits;
use crate::cpu::hardware::lcd::memory::Memory;

/// Number of entries in OAM.
pub const OBJ_COUNT: usize = 128;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ObjMode {
    #[default]
    Normal,
    Affine,
    Disabled,
    AffineDouble,
}

impl From<u16> for ObjMode {
    fn from(value: u16) -> Self {
        match value & 0b11 {
            0 => Self::Normal,
            1 => Self::Affine,
            2 => Self::Disabled,
            _ => Self::AffineDouble,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GfxMode {
    #[default]
    Normal,
    SemiTransparent,
    ObjectWindow,
    Prohibited,
}

impl From<u16> for GfxMode {
    fn from(value: u16) -> Self {
        match value & 0b11 {
            0 => Self::Normal,
            1 => Self::SemiTransparent,
            2 => Self::ObjectWindow,
            _ => Self::Prohibited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjShape {
    Square,
    Horizontal,
    Vertical,
}

impl ObjShape {
    /// Shape 3 is prohibited.
    const fn from_bits(value: u16) -> Option<Self> {
        match value & 0b11 {
            0 => Some(Self::Square),
            1 => Some(Self::Horizontal),
            2 => Some(Self::Vertical),
            _ => None,
        }
    }

    /// Sprite (width, height) in pixels for `size` 0-3.
    ///
    /// | Size | Square | Horizontal | Vertical |
    /// |------|--------|------------|----------|
    /// | 0    | 8x8    | 16x8       | 8x16     |
    /// | 1    | 16x16  | 32x8       | 8x32     |
    /// | 2    | 32x32  | 32x16      | 16x32    |
    /// | 3    | 64x64  | 64x32      | 32x64    |
    const fn dimensions(self, size: u16) -> (i32, i32) {
        const SQUARE: [(i32, i32); 4] = [(8, 8), (16, 16), (32, 32), (64, 64)];
        const HORIZONTAL: [(i32, i32); 4] = [(16, 8), (32, 8), (32, 16), (64, 32)];
        const VERTICAL: [(i32, i32); 4] = [(8, 16), (8, 32), (16, 32), (32, 64)];

        let size = (size & 0b11) as usize;
        match self {
            Self::Square => SQUARE[size],
            Self::Horizontal => HORIZONTAL[size],
            Self::Vertical => VERTICAL[size],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationKind {
    RotationScaling { matrix: usize },
    Flip { horizontal: bool, vertical: bool },
}

/// Rotation/scaling matrix in 8.8 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationScaling {
    pub pa: i32,
    pub pb: i32,
    pub pc: i32,
    pub pd: i32,
}

impl RotationScaling {
    /// Matrix `index` (0-31). Its four parameters are the fourth halfword
    /// of four consecutive OAM entries.
    #[must_use]
    pub fn read(memory: &Memory, index: usize) -> Self {
        let base = (index & 0x1F) * 32;
        let parameter = |n: usize| i32::from(memory.oam_half_word(base + 6 + n * 8) as i16);

        Self {
            pa: parameter(0),
            pb: parameter(1),
            pc: parameter(2),
            pd: parameter(3),
        }
    }
}

/// One decoded OAM entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjAttributes {
    /// Top-left corner of the bounding box; x is in -256..256.
    pub x: i32,
    pub y: i32,
    /// Sprite size, not counting the double-size area.
    pub width: i32,
    pub height: i32,
    pub obj_mode: ObjMode,
    pub gfx_mode: GfxMode,
    pub mosaic: bool,
    pub eight_bpp: bool,
    pub transformation: TransformationKind,
    pub tile_number: usize,
    pub priority: u8,
    pub palette_bank: usize,
}

impl ObjAttributes {
    /// Decodes entry `index`. Disabled entries and prohibited shapes yield `None`.
    #[must_use]
    pub fn decode(memory: &Memory, index: usize) -> Option<Self> {
        let base = index * 8;
        let attribute0 = memory.oam_half_word(base);
        let attribute1 = memory.oam_half_word(base + 2);
        let attribute2 = memory.oam_half_word(base + 4);

        let obj_mode = ObjMode::from(attribute0.get_bits(8..=9));
        if obj_mode == ObjMode::Disabled {
            return None;
        }
        let shape = ObjShape::from_bits(attribute0.get_bits(14..=15))?;
        let (width, height) = shape.dimensions(attribute1.get_bits(14..=15));

        let transformation = match obj_mode {
            ObjMode::Affine | ObjMode::AffineDouble => TransformationKind::RotationScaling {
                matrix: usize::from(attribute1.get_bits(9..=13)),
            },
            ObjMode::Normal | ObjMode::Disabled => TransformationKind::Flip {
                horizontal: attribute1.get_bit(12),
                vertical: attribute1.get_bit(13),
            },
        };

        Some(Self {
            x: i32::from(attribute1.get_bits(0..=8).sign_extended(9) as i16),
            y: i32::from(attribute0.get_bits(0..=7)),
            width,
            height,
            obj_mode,
            gfx_mode: GfxMode::from(attribute0.get_bits(10..=11)),
            mosaic: attribute0.get_bit(12),
            eight_bpp: attribute0.get_bit(13),
            transformation,
            tile_number: usize::from(attribute2.get_bits(0..=9)),
            priority: attribute2.get_bits(10..=11) as u8,
            palette_bank: usize::from(attribute2.get_bits(12..=15)),
        })
    }

    /// Bounding box (width, height): twice the sprite size in double-size mode.
    #[must_use]
    pub const fn bounds(&self) -> (i32, i32) {
        match self.obj_mode {
            ObjMode::AffineDouble => (self.width * 2, self.height * 2),
            _ => (self.width, self.height),
        }
    }

    /// Row of the bounding box drawn on scanline `line`, if any.
    /// The vertical position wraps at 256.
    #[must_use]
    pub const fn row_on_line(&self, line: i32) -> Option<i32> {
        let row = (line - self.y).rem_euclid(256);
        if row < self.bounds().1 {
            Some(row)
        } else {
            None
        }
    }
}
