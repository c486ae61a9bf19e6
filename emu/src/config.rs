use std::path::PathBuf;

use crate::cpu::hardware::sound::DEFAULT_SAMPLE_RATE;

/// Frames the headless runner executes when none are requested, 10 seconds.
pub const DEFAULT_FRAMES: u32 = 600;

/// Options of an emulation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuConfig {
    /// BIOS image to map at `0x0000_0000`. The built-in BIOS is used when missing.
    pub bios: Option<PathBuf>,
    /// Start at `0x0800_0000` in the state the BIOS leaves the CPU in.
    pub skip_bios: bool,
    pub sample_rate: u32,
    pub frames: u32,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            bios: None,
            skip_bios: true,
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames: DEFAULT_FRAMES,
        }
    }
}

impl EmuConfig {
    /// A real BIOS runs its boot sequence unless asked otherwise. Without
    /// one there is nothing to boot.
    #[must_use]
    pub fn with_bios(mut self, bios: PathBuf, skip_bios: bool) -> Self {
        self.bios = Some(bios);
        self.skip_bios = skip_bios;
        self
    }
}
