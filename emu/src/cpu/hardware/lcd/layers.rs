//! The layers a scanline is composed of.
//!
//! Backgrounds and objects are drawn into the [`Backing`](super::backing::Backing)
//! in `(is_background, priority)` order. The backing keeps the two pixels
//! with the highest precedence, so the drawing order only settles ties:
//! among objects of equal priority the first drawn (lowest OAM index) wins.

use serde::{Deserialize, Serialize};

/// Stencil id of the object layer.
pub const OBJ_LAYER_ID: u8 = 4;
/// Stencil id of the backdrop.
pub const BACKDROP_LAYER_ID: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    Background(usize),
    /// Objects of one priority (0-3).
    Objects(u8),
    /// Objects in OBJ window mode: they only mark the stencil.
    ObjectWindow,
    Backdrop,
}

impl Layer {
    /// Layer id as used by the stencil and by the enable bits of
    /// WININ/WINOUT/BLDCNT: 0-3 backgrounds, 4 objects, 5 backdrop.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Background(bg) => bg as u8,
            Self::Objects(_) | Self::ObjectWindow => OBJ_LAYER_ID,
            Self::Backdrop => BACKDROP_LAYER_ID,
        }
    }

    #[must_use]
    pub const fn is_background(self) -> bool {
        matches!(self, Self::Background(_) | Self::Backdrop)
    }

    /// Drawing order. Backgrounds take the priority of their BGxCNT.
    #[must_use]
    pub const fn sort_key(self, bg_priorities: [u8; 4]) -> (bool, u8) {
        let priority = match self {
            Self::Background(bg) => bg_priorities[bg],
            Self::Objects(priority) => priority,
            Self::ObjectWindow => 0,
            Self::Backdrop => 4,
        };

        (self.is_background(), priority)
    }
}
