use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// GBA button bit positions in KEYINPUT register (when pressed are set to 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GbaButton {
    A = 1 << 0,
    B = 1 << 1,
    Select = 1 << 2,
    Start = 1 << 3,
    Right = 1 << 4,
    Left = 1 << 5,
    Up = 1 << 6,
    Down = 1 << 7,
    R = 1 << 8,
    L = 1 << 9,
}

#[derive(Serialize, Deserialize)]
pub struct Keypad {
    pub key_input: u16,
    pub key_interrupt_control: u16,
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Keypad {
    /// Create a new Keypad with all buttons released (all bits set to 1).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key_input: 0x03FF,
            key_interrupt_control: 0,
        }
    }

    /// Set button state: pressed = true, released = false.
    /// GBA uses active-low logic: bit 0 = pressed, bit 1 = released.
    pub const fn set_button(&mut self, button: GbaButton, pressed: bool) {
        if pressed {
            self.key_input &= !(button as u16);
        } else {
            self.key_input |= button as u16;
        }
    }

    /// Whether KEYCNT asks for an interrupt with the current key state.
    ///
    /// Bit 15 of KEYCNT selects AND (all selected keys down) instead of OR
    /// (any selected key down).
    #[must_use]
    pub fn interrupt_condition(&self) -> bool {
        if !self.key_interrupt_control.get_bit(14) {
            return false;
        }

        let selected = self.key_interrupt_control.get_bits(0..=9);
        let pressed = !self.key_input & 0x03FF & selected;

        if self.key_interrupt_control.get_bit(15) {
            selected != 0 && pressed == selected
        } else {
            pressed != 0
        }
    }
}
