//! # Emulation session
//!
//! [`Gba`] owns the CPU, which owns the bus and through it every piece of
//! hardware. The host drives it one frame at a time and collects pixels,
//! samples and save data in between.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;

use crate::bus::Bus;
use crate::cartridge_header::CartridgeHeader;
use crate::config::EmuConfig;
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::bios::{BIOS_SIZE, hle_image};
use crate::cpu::hardware::backup::BackupKind;
use crate::cpu::hardware::keypad::GbaButton;

const ROM_EXTENSIONS: [&str; 3] = ["gba", "agb", "bin"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} does not look like a GBA ROM (expected .gba, .agb or .bin)")]
    BadExtension(PathBuf),
    #[error("BIOS image is {0} bytes, expected 16384")]
    BiosSize(usize),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("save state encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

/// The emulated program brought the core into a state it could not handle.
#[derive(Debug, Clone, Error)]
#[error("emulation fault at 0x{pc:08X} (opcode 0x{opcode:08X}): {message}")]
pub struct EmulationFault {
    pub pc: u32,
    pub opcode: u32,
    pub message: String,
    pub trace: String,
}

thread_local! {
    /// Message and backtrace of the last panic on this thread.
    static LAST_PANIC: RefCell<Option<(String, String)>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Records where panics come from, then defers to the previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|last| *last.borrow_mut() = Some((info.to_string(), trace)));
            previous(info);
        }));
    });
}

pub struct Gba {
    pub cpu: Arm7tdmi,

    pub cartridge_header: Option<CartridgeHeader>,

    /// Set once a frame panicked. The session refuses to run afterwards.
    fault: Option<EmulationFault>,
}

impl Gba {
    /// Starts a session on `rom`. Without a `bios` the built-in one is used
    /// and the boot sequence is always skipped.
    #[must_use]
    pub fn new(bios: Option<Vec<u8>>, rom: Vec<u8>, config: &EmuConfig) -> Self {
        let cartridge_header = match CartridgeHeader::new(&rom) {
            Ok(header) => {
                tracing::info!(
                    "cartridge \"{}\" ({}), maker {}",
                    header.game_title(),
                    header.game_code(),
                    header.maker_code()
                );
                Some(header)
            }
            Err(error) => {
                tracing::warn!("{error}");
                None
            }
        };

        let hle_bios = bios.is_none();
        let bus = Bus::new(bios.unwrap_or_else(hle_image), rom, config.sample_rate);
        let mut cpu = Arm7tdmi::new(bus);
        cpu.hle_bios = hle_bios;

        if hle_bios || config.skip_bios {
            cpu.skip_bios();
        }
        tracing::info!(
            "reset (built-in BIOS: {hle_bios}, skip boot: {})",
            hle_bios || config.skip_bios
        );

        Self {
            cpu,
            cartridge_header,
            fault: None,
        }
    }

    /// Reads the ROM at `rom_path` and the BIOS named by `config`.
    pub fn load(rom_path: &Path, config: &EmuConfig) -> Result<Self, LoadError> {
        let extension_ok = rom_path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                ROM_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
            });
        if !extension_ok {
            return Err(LoadError::BadExtension(rom_path.to_path_buf()));
        }

        let rom = read_file(rom_path)?;
        let bios = match &config.bios {
            Some(path) => {
                let bios = read_file(path)?;
                if bios.len() != BIOS_SIZE {
                    return Err(LoadError::BiosSize(bios.len()));
                }
                Some(bios)
            }
            None => None,
        };

        Ok(Self::new(bios, rom, config))
    }

    /// Runs one instruction and the hardware for the cycles it took.
    /// Returns `true` when the LCD entered VBlank.
    pub fn step(&mut self) -> bool {
        let cycles = self.cpu.step();
        self.cpu.bus.tick(cycles)
    }

    pub fn run_frame(&mut self) {
        while !self.step() {}
    }

    /// [`Gba::run_frame`], turning a panic of the core into an error. After
    /// the first fault every call returns it again.
    pub fn run_frame_checked(&mut self) -> Result<(), EmulationFault> {
        self.checked(Self::run_frame)
    }

    fn checked(&mut self, run: impl FnOnce(&mut Self)) -> Result<(), EmulationFault> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }

        install_panic_hook();
        if panic::catch_unwind(AssertUnwindSafe(|| run(self))).is_ok() {
            return Ok(());
        }

        let (pc, opcode) = self.cpu.fault_context();
        let (message, trace) = LAST_PANIC
            .with(|last| last.borrow_mut().take())
            .unwrap_or_else(|| ("unknown panic".to_string(), String::new()));
        let fault = EmulationFault {
            pc,
            opcode,
            message,
            trace,
        };

        tracing::error!("{fault}");
        self.fault = Some(fault.clone());
        Err(fault)
    }

    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.fault.is_some()
    }

    pub fn set_key(&mut self, button: GbaButton, pressed: bool) {
        self.cpu.bus.set_key(button, pressed);
    }

    /// Last completed frame, 240x160 RGBA pixels.
    #[must_use]
    pub fn frame_rgba(&self) -> Vec<u8> {
        self.cpu.bus.lcd.frame_rgba()
    }

    /// Interleaved stereo samples produced since the last call, at the
    /// configured sample rate. The length follows the emulated time between
    /// calls (a frame holds about 549 stereo pairs at 32768 Hz), up to one
    /// second of audio at the default rate, after which the oldest samples
    /// are dropped.
    pub fn drain_audio(&mut self) -> Vec<i16> {
        self.cpu.bus.sound.drain_samples()
    }

    /// The game used its backup memory, so there is something to write to disk.
    #[must_use]
    pub const fn save_required(&self) -> bool {
        !matches!(self.cpu.bus.backup.kind(), BackupKind::Undetected)
    }

    #[must_use]
    pub fn backup_data(&self) -> &[u8] {
        self.cpu.bus.backup.data()
    }

    pub fn load_backup(&mut self, bytes: &[u8]) {
        tracing::info!("loading {} bytes of backup memory", bytes.len());
        self.cpu.bus.backup.load(bytes);
    }

    /// Snapshot of the whole machine but the ROM.
    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        Ok(bincode::serialize(&self.cpu)?)
    }

    /// Restores a snapshot taken by [`Gba::save_state`] on the same ROM.
    pub fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        let mut cpu: Arm7tdmi = bincode::deserialize(state)?;
        cpu.bus.internal_memory.rom = std::mem::take(&mut self.cpu.bus.internal_memory.rom);

        self.cpu = cpu;
        self.fault = None;
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::lcd::Color;
    use pretty_assertions::assert_eq;

    fn gba_with_program(program: &[u32]) -> Gba {
        let rom = program.iter().flat_map(|op_code| op_code.to_le_bytes()).collect();
        Gba::new(None, rom, &EmuConfig::default())
    }

    #[test]
    fn check_swi_division() {
        let mut gba = gba_with_program(&[
            0xE3A0_0005, // MOV R0, #5
            0xE3A0_1003, // MOV R1, #3
            0xE080_2001, // ADD R2, R0, R1
            0xE3A0_000A, // MOV R0, #10
            0xEF00_0006, // SWI #6
        ]);

        for _ in 0..5 {
            gba.step();
        }

        assert_eq!(gba.cpu.registers.register_at(2), 8);
        assert_eq!(gba.cpu.registers.register_at(0), 3);
        assert_eq!(gba.cpu.registers.register_at(1), 1);
        assert_eq!(gba.cpu.registers.program_counter(), 0x0800_0014);
    }

    #[test]
    fn check_mode0_tile_first_row() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]); // B .
        let bus = &mut gba.cpu.bus;

        // Mode 0, BG0 on; BG0 tiles at 0, map at 0x800.
        bus.write_half_word(0x0400_0000, 1 << 8);
        bus.write_half_word(0x0400_0008, 1 << 8);
        // Map entry 0: tile 1, palette bank 2.
        bus.write_half_word(0x0600_0800, (2 << 12) | 1);
        // Tile 1, first row: color indices 1 to 8.
        bus.write_word(0x0600_0020, 0x8765_4321);
        for index in 1..=8u16 {
            bus.write_half_word(0x0500_0000 + u32::from(2 * 16 + index) * 2, index);
        }
        bus.write_half_word(0x0500_0000, 0x7FFF);

        gba.run_frame();

        let row: Vec<Color> = gba.cpu.bus.lcd.buffer[0..9].to_vec();
        let mut expected: Vec<Color> = (1..=8).map(Color).collect();
        expected.push(Color(0x7FFF));
        assert_eq!(row, expected);
    }

    #[test]
    fn check_dma_immediate_copy() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]);
        let bus = &mut gba.cpu.bus;
        for i in 0..4 {
            bus.write_word(0x0300_0000 + i * 4, 0x1000 + i);
        }

        bus.write_word(0x0400_00B0, 0x0300_0000);
        bus.write_word(0x0400_00B4, 0x0300_0200);
        bus.write_half_word(0x0400_00B8, 4);
        bus.write_half_word(0x0400_00BA, 0x8000 | (1 << 10));
        gba.step();

        let bus = &mut gba.cpu.bus;
        for i in 0..4 {
            assert_eq!(bus.read_word(0x0300_0200 + i * 4), 0x1000 + i);
        }
        assert_eq!(bus.read_word(0x0300_0210), 0);
        assert_eq!(bus.read_half_word(0x0400_00BA) & 0x8000, 0);
    }

    #[test]
    fn check_frames_complete() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]);
        gba.run_frame_checked().unwrap();
        assert_eq!(gba.cpu.bus.lcd.registers.vcount, 160);
        assert_eq!(gba.frame_rgba().len(), 240 * 160 * 4);

        gba.run_frame();
        assert_eq!(gba.cpu.bus.lcd.registers.vcount, 160);
        assert!(!gba.drain_audio().is_empty());
    }

    #[test]
    fn check_audio_follows_emulated_time() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]);
        gba.run_frame();
        let first = gba.drain_audio();
        assert!(!first.is_empty());
        assert_eq!(first.len() % 2, 0);
        assert!(gba.drain_audio().is_empty());

        gba.run_frame();
        gba.run_frame();
        assert!(gba.drain_audio().len() > first.len());
    }

    #[test]
    fn check_fault_kills_session() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]);
        gba.step();

        let fault = gba.checked(|_| panic!("bad state")).unwrap_err();
        assert_eq!(fault.pc, 0x0800_0000);
        assert_eq!(fault.opcode, 0xEAFF_FFFE);
        assert!(fault.message.contains("bad state"));
        assert!(gba.is_dead());

        assert_eq!(gba.run_frame_checked().unwrap_err().pc, 0x0800_0000);
    }

    #[test]
    fn check_backup_persistence() {
        let mut gba = gba_with_program(&[0xEAFF_FFFE]);
        assert!(!gba.save_required());

        gba.cpu.bus.write_byte(0x0E00_0004, 0x42);
        gba.cpu.bus.write_byte(0x0E00_8004, 0x24);
        assert!(gba.save_required());
        assert_eq!(gba.backup_data().len(), 0x1_0000);
        assert_eq!(gba.backup_data()[4], 0x42);
        assert_eq!(gba.backup_data()[0x8004], 0x24);

        let mut other = gba_with_program(&[0xEAFF_FFFE]);
        other.load_backup(gba.backup_data());
        assert_eq!(other.cpu.bus.read_byte(0x0E00_0004), 0x42);
        assert_eq!(other.cpu.bus.read_byte(0x0E01_8004), 0x24);
    }

    #[test]
    fn check_save_state_restores_machine() {
        let mut gba = gba_with_program(&[0xE3A0_0005, 0xEAFF_FFFE]);
        gba.cpu.bus.write_word(0x0200_0000, 0xCAFE_BABE);
        let state = gba.save_state().unwrap();

        gba.step();
        gba.cpu.bus.write_word(0x0200_0000, 0);
        assert_eq!(gba.cpu.registers.register_at(0), 5);

        gba.load_state(&state).unwrap();
        assert_eq!(gba.cpu.registers.register_at(0), 0);
        assert_eq!(gba.cpu.registers.program_counter(), 0x0800_0000);
        assert_eq!(gba.cpu.bus.read_word(0x0200_0000), 0xCAFE_BABE);

        // The ROM survives the snapshot.
        gba.step();
        assert_eq!(gba.cpu.registers.register_at(0), 5);
    }

    #[test]
    fn check_load_rejects_bad_inputs() {
        let config = EmuConfig::default();
        assert!(matches!(
            Gba::load(Path::new("game.txt"), &config),
            Err(LoadError::BadExtension(_))
        ));

        let missing = std::env::temp_dir().join(format!("missing-{}.gba", rand::random::<u64>()));
        assert!(matches!(Gba::load(&missing, &config), Err(LoadError::Io { .. })));

        let rom = std::env::temp_dir().join(format!("rom-{}.gba", rand::random::<u64>()));
        let bios = std::env::temp_dir().join(format!("bios-{}.bin", rand::random::<u64>()));
        std::fs::write(&rom, [0u8; 0x200]).unwrap();
        std::fs::write(&bios, [0u8; 0x100]).unwrap();

        let config = EmuConfig::default().with_bios(bios.clone(), true);
        assert!(matches!(Gba::load(&rom, &config), Err(LoadError::BiosSize(0x100))));

        std::fs::remove_file(rom).unwrap();
        std::fs::remove_file(bios).unwrap();
    }
}
