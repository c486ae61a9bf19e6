//! Scanline backing: the two topmost pixels of every column and their stencil.
//!
//! Every layer pushes its opaque pixels through [`Backing::push_pixel`]. The
//! backing keeps the pixel with the highest precedence on top and the next
//! one as its blend partner. Once every layer is drawn, [`Backing::resolve`]
//! applies the color special effects.

use crate::bitwise::Bits;
use crate::cpu::hardware::lcd::layers::{Layer, BACKDROP_LAYER_ID, OBJ_LAYER_ID};
use crate::cpu::hardware::lcd::registers::Registers;
use crate::cpu::hardware::lcd::windows::{Windows, ALL_ENABLED};
use crate::cpu::hardware::lcd::{Color, LCD_WIDTH};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stencil {
    /// 0-3 backgrounds, 4 objects, 5 backdrop.
    pub layer: u8,
    pub priority: u8,
    pub target1: bool,
    pub target2: bool,
    pub semi_transparent: bool,
    /// Marked by an object in OBJ window mode.
    pub object_window: bool,
    /// A layer other than the backdrop wrote here.
    pub written: bool,
}

impl Stencil {
    /// Lower is drawn in front: priority first, then objects before
    /// backgrounds, then lower background index.
    const fn precedence(&self) -> (u8, u8) {
        let rank = match self.layer {
            OBJ_LAYER_ID => 0,
            BACKDROP_LAYER_ID => 5,
            bg => bg + 1,
        };
        (self.priority, rank)
    }
}

/// What nothing ever outranks: the partner of a column with only the backdrop.
const NO_PARTNER: Stencil = Stencil {
    layer: BACKDROP_LAYER_ID,
    priority: u8::MAX,
    target1: false,
    target2: false,
    semi_transparent: false,
    object_window: false,
    written: false,
};

pub struct Backing {
    pub color: [Color; LCD_WIDTH],
    pub stencil: [Stencil; LCD_WIDTH],
    partner_color: [Color; LCD_WIDTH],
    partner: [Stencil; LCD_WIDTH],

    window_control: [u8; LCD_WIDTH],
    outside: [bool; LCD_WIDTH],
    object_window_control: Option<u8>,
    bldcnt: u16,
}

impl Default for Backing {
    fn default() -> Self {
        Self {
            color: [Color::default(); LCD_WIDTH],
            stencil: [Stencil::default(); LCD_WIDTH],
            partner_color: [Color::default(); LCD_WIDTH],
            partner: [NO_PARTNER; LCD_WIDTH],
            window_control: [ALL_ENABLED; LCD_WIDTH],
            outside: [false; LCD_WIDTH],
            object_window_control: None,
            bldcnt: 0,
        }
    }
}

impl Backing {
    /// Starts a scanline: every column holds the backdrop, windows are
    /// laid out, object window marks are cleared.
    pub fn seed(&mut self, backdrop: Color, bldcnt: u16, windows: &Windows) {
        self.bldcnt = bldcnt;

        let stencil = Stencil {
            layer: Layer::Backdrop.id(),
            priority: 4,
            target1: bldcnt.get_bit(BACKDROP_LAYER_ID),
            target2: bldcnt.get_bit(8 + BACKDROP_LAYER_ID),
            ..Default::default()
        };
        self.color = [backdrop; LCD_WIDTH];
        self.stencil = [stencil; LCD_WIDTH];
        self.partner = [NO_PARTNER; LCD_WIDTH];

        for span in &windows.spans {
            self.window_control[span.start..span.end].fill(span.control);
            self.outside[span.start..span.end].fill(span.outside);
        }
        self.object_window_control = windows.object_window_control;
    }

    /// Enable bits in effect at column `x`.
    fn control_at(&self, x: usize) -> u8 {
        match self.object_window_control {
            Some(control) if self.outside[x] && self.stencil[x].object_window => control,
            _ => self.window_control[x],
        }
    }

    pub fn push_pixel(
        &mut self,
        x: usize,
        color: Color,
        layer: u8,
        priority: u8,
        semi_transparent: bool,
    ) {
        if !self.control_at(x).get_bit(layer) {
            return;
        }

        let top = self.stencil[x];
        let candidate = Stencil {
            layer,
            priority,
            target1: self.bldcnt.get_bit(layer),
            target2: self.bldcnt.get_bit(8 + layer),
            semi_transparent,
            object_window: top.object_window,
            written: true,
        };

        if !top.written || candidate.precedence() < top.precedence() {
            self.partner[x] = top;
            self.partner_color[x] = self.color[x];
            self.stencil[x] = candidate;
            self.color[x] = color;
        } else if candidate.precedence() > top.precedence()
            && candidate.precedence() < self.partner[x].precedence()
        {
            self.partner[x] = candidate;
            self.partner_color[x] = color;
        }
    }

    pub fn mark_object_window(&mut self, x: usize) {
        self.stencil[x].object_window = true;
    }

    /// Applies alpha blending or brightness changes where the windows allow it.
    pub fn resolve(&mut self, registers: &Registers) {
        let mode = registers.get_blend_mode();
        let (eva, evb) = registers.get_blend_alpha();
        let evy = registers.get_blend_brightness();

        for x in 0..LCD_WIDTH {
            if !self.control_at(x).get_bit(5) {
                continue;
            }

            let top = self.stencil[x];
            let partner = self.partner[x];
            let alpha = top.target1 || top.semi_transparent;

            self.color[x] = match mode {
                _ if top.semi_transparent && partner.target2 => {
                    blend(self.color[x], self.partner_color[x], eva, evb)
                }
                1 if alpha && partner.target2 => {
                    blend(self.color[x], self.partner_color[x], eva, evb)
                }
                2 if top.target1 => brighten(self.color[x], evy),
                3 if top.target1 => darken(self.color[x], evy),
                _ => continue,
            };
        }
    }
}

fn map_channels(color: Color, other: Color, f: impl Fn(u16, u16) -> u16) -> Color {
    let channel = |value: Color, shift: u8| value.0.get_bits(shift..=shift + 4);
    let mut result = 0;
    for shift in [0, 5, 10] {
        result |= f(channel(color, shift), channel(other, shift)).min(31) << shift;
    }
    Color(result)
}

fn blend(top: Color, bottom: Color, eva: u16, evb: u16) -> Color {
    map_channels(top, bottom, |a, b| (a * eva + b * evb) >> 4)
}

fn brighten(color: Color, evy: u16) -> Color {
    map_channels(color, color, |c, _| c + (((31 - c) * evy) >> 4))
}

fn darken(color: Color, evy: u16) -> Color {
    map_channels(color, color, |c, _| c - ((c * evy) >> 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded(bldcnt: u16) -> Backing {
        let mut backing = Backing::default();
        let windows = Windows::compute(&Registers::default(), 0);
        backing.seed(Color(0x7FFF), bldcnt, &windows);
        backing
    }

    #[test]
    fn check_higher_precedence_overwrites() {
        let mut backing = seeded(0);
        backing.push_pixel(0, Color(1), 2, 1, false);
        backing.push_pixel(0, Color(2), 1, 1, false);
        assert_eq!(backing.color[0], Color(2));
        assert_eq!(backing.partner_color[0], Color(1));

        // Objects win over backgrounds of the same priority.
        backing.push_pixel(0, Color(3), OBJ_LAYER_ID, 1, false);
        assert_eq!(backing.color[0], Color(3));
        assert_eq!(backing.stencil[0].layer, OBJ_LAYER_ID);
    }

    #[test]
    fn check_lower_precedence_blends_through() {
        let mut backing = seeded(0);
        backing.push_pixel(5, Color(1), 0, 0, false);
        assert_eq!(backing.partner[5].layer, BACKDROP_LAYER_ID);

        backing.push_pixel(5, Color(2), 3, 2, false);
        assert_eq!(backing.color[5], Color(1));
        assert_eq!(backing.partner[5].layer, 3);
        assert_eq!(backing.partner_color[5], Color(2));

        // Below the current partner: dropped.
        backing.push_pixel(5, Color(9), 2, 3, false);
        assert_eq!(backing.partner_color[5], Color(2));
    }

    #[test]
    fn check_equal_precedence_is_dropped() {
        let mut backing = seeded(0);
        backing.push_pixel(7, Color(1), OBJ_LAYER_ID, 0, false);
        backing.push_pixel(7, Color(2), OBJ_LAYER_ID, 0, false);
        assert_eq!(backing.color[7], Color(1));
        assert_eq!(backing.partner[7].layer, BACKDROP_LAYER_ID);
    }

    #[test]
    fn check_alpha_blend_with_backdrop() {
        // BG0 first target, backdrop second target, alpha mode.
        let registers = Registers {
            bldcnt: 0b0010_0000_0100_0001,
            bldalpha: (8 << 8) | 8,
            ..Default::default()
        };
        let mut backing = seeded(registers.bldcnt);
        backing.push_pixel(0, Color(0x001F), 0, 0, false);
        backing.push_pixel(1, Color(0x001F), 1, 0, false);
        backing.resolve(&registers);

        assert_eq!(backing.color[0], Color((15 << 10) | (15 << 5) | 31));
        assert_eq!(backing.color[1], Color(0x001F));
    }

    #[test]
    fn check_brightness() {
        let registers = Registers {
            bldcnt: (2 << 6) | 1,
            bldy: 16,
            ..Default::default()
        };
        let mut backing = seeded(registers.bldcnt);
        backing.push_pixel(0, Color(0), 0, 0, false);
        backing.resolve(&registers);
        assert_eq!(backing.color[0], Color(0x7FFF));

        let registers = Registers {
            bldcnt: (3 << 6) | 1,
            bldy: 8,
            ..Default::default()
        };
        let mut backing = seeded(registers.bldcnt);
        backing.push_pixel(0, Color(0x7FFF), 0, 0, false);
        backing.resolve(&registers);
        assert_eq!(backing.color[0], Color((16 << 10) | (16 << 5) | 16));
    }

    #[test]
    fn check_semi_transparent_object_forces_alpha() {
        let registers = Registers {
            bldcnt: 1 << 8,
            bldalpha: 16 << 8,
            ..Default::default()
        };
        let mut backing = seeded(registers.bldcnt);
        backing.push_pixel(0, Color(0x0001), 0, 1, false);
        backing.push_pixel(0, Color(0x7C00), OBJ_LAYER_ID, 0, true);
        backing.resolve(&registers);
        assert_eq!(backing.color[0], Color(0x0001));
    }
}
