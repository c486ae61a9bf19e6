//! Window spans of a scanline.
//!
//! WIN0 has precedence over WIN1, which has precedence over the outside
//! area: WIN0's span is subtracted from WIN1's, and both from the outside
//! span. The OBJ window is not a span: it applies to the pixels of the
//! outside span that objects in OBJ window mode have marked.

use crate::cpu::hardware::lcd::registers::Registers;
use crate::cpu::hardware::lcd::LCD_WIDTH;

/// Every layer and the color effects.
pub const ALL_ENABLED: u8 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpan {
    pub start: usize,
    pub end: usize,
    /// Enable bits: 0-3 backgrounds, 4 objects, 5 color effects.
    pub control: u8,
    pub outside: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Windows {
    pub spans: Vec<WindowSpan>,
    /// WINOUT high byte, when the OBJ window is on.
    pub object_window_control: Option<u8>,
}

impl Windows {
    #[must_use]
    pub fn compute(registers: &Registers, y: u16) -> Self {
        let any_window = registers.get_win0_enabled()
            || registers.get_win1_enabled()
            || registers.get_winobj_enabled();

        if !any_window {
            return Self {
                spans: vec![WindowSpan {
                    start: 0,
                    end: LCD_WIDTH,
                    control: ALL_ENABLED,
                    outside: false,
                }],
                object_window_control: None,
            };
        }

        let win0 = if registers.get_win0_enabled() {
            window_ranges(registers, 0, y)
        } else {
            vec![]
        };
        let win1 = if registers.get_win1_enabled() {
            subtract(&window_ranges(registers, 1, y), &win0)
        } else {
            vec![]
        };
        let outside = subtract(&subtract(&[(0, LCD_WIDTH)], &win0), &win1);

        let [winin_0, winin_1] = registers.winin.to_le_bytes();
        let [winout, winobj] = registers.winout.to_le_bytes();

        let mut spans = Vec::new();
        let mut push = |ranges: &[(usize, usize)], control: u8, outside: bool| {
            spans.extend(ranges.iter().map(|&(start, end)| WindowSpan {
                start,
                end,
                control: control & ALL_ENABLED,
                outside,
            }));
        };
        push(&win0, winin_0, false);
        push(&win1, winin_1, false);
        push(&outside, winout, true);

        Self {
            spans,
            object_window_control: registers
                .get_winobj_enabled()
                .then_some(winobj & ALL_ENABLED),
        }
    }

    /// Whether `layer_id` is visible anywhere in `span`.
    #[must_use]
    pub fn layer_enabled(&self, span: &WindowSpan, layer_id: u8) -> bool {
        let object_window = self
            .object_window_control
            .filter(|_| span.outside)
            .unwrap_or(0);

        (span.control | object_window) & (1 << layer_id) != 0
    }
}

/// Horizontal ranges covered by window 0 or 1 on line `y`.
fn window_ranges(registers: &Registers, window: usize, y: u16) -> Vec<(usize, usize)> {
    let (top, bottom) = registers.get_window_vertical(window);
    if !in_vertical_range(top, bottom, y) {
        return vec![];
    }

    let (left, right) = registers.get_window_horizontal(window);
    let (left, right) = (usize::from(left), usize::from(right).min(LCD_WIDTH));

    match right.cmp(&left) {
        std::cmp::Ordering::Greater => vec![(left, right)],
        std::cmp::Ordering::Less => vec![(0, right), (left.min(LCD_WIDTH), LCD_WIDTH)]
            .into_iter()
            .filter(|(start, end)| start < end)
            .collect(),
        std::cmp::Ordering::Equal => vec![],
    }
}

/// Check if y is within vertical window bounds [top, bottom).
///
/// Handles wrap-around: if bottom < top, the range wraps around the screen edge.
/// Returns false if top == bottom (empty window).
fn in_vertical_range(top: u8, bottom: u8, y: u16) -> bool {
    let (top, bottom) = (u16::from(top), u16::from(bottom));
    match bottom.cmp(&top) {
        std::cmp::Ordering::Greater => y >= top && y < bottom,
        std::cmp::Ordering::Less => y >= top || y < bottom,
        std::cmp::Ordering::Equal => false,
    }
}

/// `ranges` minus `cut`, both sorted lists of half-open ranges.
fn subtract(ranges: &[(usize, usize)], cut: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut result = ranges.to_vec();

    for &(cut_start, cut_end) in cut {
        result = result
            .into_iter()
            .flat_map(|(start, end)| {
                [(start, end.min(cut_start)), (start.max(cut_end), end)]
            })
            .filter(|(start, end)| start < end)
            .collect();
    }

    result
}
