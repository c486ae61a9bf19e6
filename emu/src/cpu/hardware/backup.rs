//! Cartridge backup memory (`0x0E00_0000`): battery SRAM or Flash.
//!
//! The kind is not known up front. The first write decides it: the Flash
//! unlock sequence selects Flash, anything else selects SRAM.

use serde::{Deserialize, Serialize};

pub const SRAM_SIZE: usize = 0x1_0000;
pub const FLASH_SIZE: usize = 0x2_0000;

const FLASH_BANK_SIZE: usize = 0x1_0000;
const FLASH_SECTOR_SIZE: usize = 0x1000;

/// Sanyo 128KB chip.
const FLASH_MANUFACTURER_ID: u8 = 0x62;
const FLASH_DEVICE_ID: u8 = 0x13;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupKind {
    #[default]
    Undetected,
    Sram,
    Flash,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum FlashState {
    #[default]
    Idle,
    /// `0x5555 = 0xAA` seen.
    FirstUnlock,
    /// `0x2AAA = 0x55` seen, the next `0x5555` write is a command.
    Command,
    /// The next write programs one byte.
    Write,
    /// The next write to `0x0000` selects the bank.
    BankSwitch,
}

#[derive(Serialize, Deserialize)]
pub struct Flash {
    data: Vec<u8>,
    state: FlashState,
    bank: usize,
    id_mode: bool,
    erase_armed: bool,
}

impl Default for Flash {
    fn default() -> Self {
        Self {
            data: vec![0xFF; FLASH_SIZE],
            state: FlashState::Idle,
            bank: 0,
            id_mode: false,
            erase_armed: false,
        }
    }
}

impl Flash {
    fn read(&self, offset: usize) -> u8 {
        match (self.id_mode, offset) {
            (true, 0) => FLASH_MANUFACTURER_ID,
            (true, 1) => FLASH_DEVICE_ID,
            _ => self.data[self.bank * FLASH_BANK_SIZE + offset],
        }
    }

    fn write(&mut self, offset: usize, value: u8) {
        self.state = match (self.state, offset, value) {
            (FlashState::Write, _, _) => {
                // Programming can only clear bits.
                self.data[self.bank * FLASH_BANK_SIZE + offset] &= value;
                FlashState::Idle
            }
            (FlashState::BankSwitch, 0, _) => {
                self.bank = usize::from(value & 1);
                FlashState::Idle
            }
            (FlashState::Idle | FlashState::BankSwitch, 0x5555, 0xAA) => FlashState::FirstUnlock,
            (FlashState::Idle, 0x5555, 0xF0) => {
                self.id_mode = false;
                FlashState::Idle
            }
            (FlashState::FirstUnlock, 0x2AAA, 0x55) => FlashState::Command,
            (FlashState::Command, 0x5555, command) => self.command(command),
            (FlashState::Command, sector, 0x30) if self.erase_armed => {
                let start = self.bank * FLASH_BANK_SIZE + (sector & !(FLASH_SECTOR_SIZE - 1));
                self.data[start..start + FLASH_SECTOR_SIZE].fill(0xFF);
                self.erase_armed = false;
                FlashState::Idle
            }
            _ => {
                tracing::debug!("unexpected flash write 0x{offset:04X} = 0x{value:02X}");
                FlashState::Idle
            }
        };
    }

    fn command(&mut self, command: u8) -> FlashState {
        match command {
            0x90 => self.id_mode = true,
            0xF0 => self.id_mode = false,
            0x80 => self.erase_armed = true,
            0x10 if self.erase_armed => {
                self.data.fill(0xFF);
                self.erase_armed = false;
            }
            0xA0 => return FlashState::Write,
            0xB0 => return FlashState::BankSwitch,
            _ => tracing::debug!("unknown flash command 0x{command:02X}"),
        }

        FlashState::Idle
    }
}

#[derive(Serialize, Deserialize)]
pub struct Backup {
    kind: BackupKind,
    sram: Vec<u8>,
    flash: Flash,
}

impl Default for Backup {
    fn default() -> Self {
        Self {
            kind: BackupKind::Undetected,
            sram: vec![0xFF; SRAM_SIZE],
            flash: Flash::default(),
        }
    }
}

impl Backup {
    #[must_use]
    pub const fn kind(&self) -> BackupKind {
        self.kind
    }

    /// `offset` is the address within the 64KB window.
    #[must_use]
    pub fn read(&self, offset: u32) -> u8 {
        let offset = offset as usize & 0xFFFF;
        match self.kind {
            BackupKind::Flash => self.flash.read(offset),
            BackupKind::Undetected | BackupKind::Sram => self.sram[offset],
        }
    }

    pub fn write(&mut self, offset: u32, value: u8) {
        let offset = offset as usize & 0xFFFF;

        if self.kind == BackupKind::Undetected {
            self.kind = if offset == 0x5555 && value == 0xAA {
                BackupKind::Flash
            } else {
                BackupKind::Sram
            };
            tracing::info!("backup memory detected as {:?}", self.kind);
        }

        match self.kind {
            BackupKind::Flash => self.flash.write(offset, value),
            BackupKind::Undetected | BackupKind::Sram => {
                self.sram[offset] = value;
            }
        }
    }

    /// The buffer a save file should hold, empty while the kind is unknown.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self.kind {
            BackupKind::Undetected => &[],
            BackupKind::Sram => &self.sram,
            BackupKind::Flash => &self.flash.data,
        }
    }

    /// Loads a save file into both the SRAM and the Flash buffers.
    pub fn load(&mut self, bytes: &[u8]) {
        let bytes = &bytes[..bytes.len().min(FLASH_SIZE)];

        let sram_len = bytes.len().min(SRAM_SIZE);
        self.sram[..sram_len].copy_from_slice(&bytes[..sram_len]);

        self.flash.data[..bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn flash_command(backup: &mut Backup, command: u8) {
        backup.write(0x5555, 0xAA);
        backup.write(0x2AAA, 0x55);
        backup.write(0x5555, command);
    }

    #[test]
    fn check_plain_write_selects_sram() {
        let mut backup = Backup::default();
        assert_eq!(backup.kind(), BackupKind::Undetected);
        assert!(backup.data().is_empty());

        backup.write(0x0010, 0x42);
        assert_eq!(backup.kind(), BackupKind::Sram);
        backup.write(0x8010, 0x24);
        assert_eq!(backup.read(0x0010), 0x42);
        assert_eq!(backup.read(0x8010), 0x24);
        assert_eq!(backup.read(0xFFFF), 0xFF);
        assert_eq!(backup.data().len(), 0x1_0000);
    }

    #[test]
    fn check_unlock_selects_flash_and_reads_id() {
        let mut backup = Backup::default();
        flash_command(&mut backup, 0x90);
        assert_eq!(backup.kind(), BackupKind::Flash);
        assert_eq!(backup.read(0), FLASH_MANUFACTURER_ID);
        assert_eq!(backup.read(1), FLASH_DEVICE_ID);

        flash_command(&mut backup, 0xF0);
        assert_eq!(backup.read(0), 0xFF);
    }

    #[test]
    fn check_flash_write_erase_and_banks() {
        let mut backup = Backup::default();

        flash_command(&mut backup, 0xA0);
        backup.write(0x1234, 0x5A);
        assert_eq!(backup.read(0x1234), 0x5A);

        flash_command(&mut backup, 0xB0);
        backup.write(0x0000, 1);
        assert_eq!(backup.read(0x1234), 0xFF);
        flash_command(&mut backup, 0xA0);
        backup.write(0x1234, 0x77);

        flash_command(&mut backup, 0xB0);
        backup.write(0x0000, 0);
        assert_eq!(backup.read(0x1234), 0x5A);

        flash_command(&mut backup, 0x80);
        backup.write(0x5555, 0xAA);
        backup.write(0x2AAA, 0x55);
        backup.write(0x1000, 0x30);
        assert_eq!(backup.read(0x1234), 0xFF);
        assert_eq!(backup.data()[0x1_1234], 0x77);

        flash_command(&mut backup, 0x80);
        flash_command(&mut backup, 0x10);
        assert!(backup.data().iter().all(|byte| *byte == 0xFF));
    }

    #[test]
    fn check_load_fills_both_buffers() {
        let mut backup = Backup::default();
        let save = vec![0x11; FLASH_SIZE + 10];
        backup.load(&save);

        assert_eq!(backup.read(0x7FFF), 0x11);
        flash_command(&mut backup, 0xF0);
        assert_eq!(backup.data().len(), FLASH_SIZE);
        assert!(backup.data().iter().all(|byte| *byte == 0x11));
    }
}
