use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

pub const BIOS_SIZE: usize = 0x4000;
pub const WORKING_RAM_SIZE: usize = 0x4_0000;
pub const WORKING_IRAM_SIZE: usize = 0x8000;
pub const MAX_ROM_SIZE: usize = 0x0200_0000;

/// BIOS, on-board and on-chip work RAM, and the cartridge ROM.
#[derive(Serialize, Deserialize)]
pub struct InternalMemory {
    /// From 0x00000000 to 0x00003FFF (16 `KBytes`).
    pub(crate) bios_system_rom: Vec<u8>,

    /// From 0x02000000 to 0x0203FFFF (256 `KBytes`), mirrored up to 0x02FFFFFF.
    pub(crate) working_ram: Vec<u8>,

    /// From 0x03000000 to 0x03007FFF (32kb), mirrored up to 0x03FFFFFF.
    pub(crate) working_iram: Vec<u8>,

    /// Mapped three times, at 0x08000000, 0x0A000000 and 0x0C000000, one per wait state.
    /// Not part of save states: it is taken back from the running instance.
    #[serde(skip)]
    pub rom: Vec<u8>,
}

impl Default for InternalMemory {
    fn default() -> Self {
        Self::new(vec![0; BIOS_SIZE], vec![])
    }
}

impl InternalMemory {
    #[must_use]
    pub fn new(mut bios: Vec<u8>, mut rom: Vec<u8>) -> Self {
        bios.resize(BIOS_SIZE, 0);
        rom.truncate(MAX_ROM_SIZE);

        Self {
            bios_system_rom: bios,
            working_ram: vec![0; WORKING_RAM_SIZE],
            working_iram: vec![0; WORKING_IRAM_SIZE],
            rom,
        }
    }

    #[must_use]
    pub fn read_bios(&self, address: u32) -> u8 {
        self.bios_system_rom[address as usize & (BIOS_SIZE - 1)]
    }

    /// `offset` is relative to the start of one of the three ROM mirrors.
    #[must_use]
    pub fn read_rom(&self, offset: u32) -> u8 {
        let offset = offset as usize & (MAX_ROM_SIZE - 1);
        if offset < self.rom.len() {
            self.rom[offset]
        } else {
            // In GamePak ROM, the 16bits data and the lower 16bits of the
            // halfword address share the AD0-15 lines. Reading past the end
            // of the ROM leaves the address on the bus, which the CPU then
            // takes as data.
            (((offset >> 1) & 0xFFFF) as u16).get_byte((offset & 0b1) as u8)
        }
    }

    #[must_use]
    pub fn read_at(&self, address: u32) -> u8 {
        match address >> 24 {
            0x02 => self.working_ram[address as usize & (WORKING_RAM_SIZE - 1)],
            0x03 => self.working_iram[address as usize & (WORKING_IRAM_SIZE - 1)],
            _ => {
                tracing::debug!("internal memory read outside work RAM 0x{address:08X}");
                0
            }
        }
    }

    pub fn write_at(&mut self, address: u32, value: u8) {
        match address >> 24 {
            0x02 => self.working_ram[address as usize & (WORKING_RAM_SIZE - 1)] = value,
            0x03 => self.working_iram[address as usize & (WORKING_IRAM_SIZE - 1)] = value,
            _ => tracing::debug!("internal memory write outside work RAM 0x{address:08X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_work_ram() {
        let mut im = InternalMemory::default();

        im.write_at(0x0300_0005, 5);
        assert_eq!(im.working_iram[5], 5);

        im.write_at(0x0300_7FFF, 6);
        assert_eq!(im.working_iram[0x7FFF], 6);
        assert_eq!(im.read_at(0x0300_7FFF), 6);
    }

    #[test]
    fn test_read_rom() {
        let im = InternalMemory::new(vec![], vec![1, 2, 3, 4]);
        assert_eq!(im.read_rom(0), 1);
        assert_eq!(im.read_rom(3), 4);

        // Reading past the end returns the halfword address.
        assert_eq!(im.read_rom(0x01FF_FFFF), 0xFF);
        assert_eq!(im.read_rom(0x01FF_FFEE), 0xF7);
        assert_eq!(im.read_rom(0x01FF_FFEF), 0xFF);
        assert_eq!(im.read_rom(0x0000_0008), 0x04);
        assert_eq!(im.read_rom(0x0000_0009), 0x00);
    }

    #[test]
    fn test_bios_is_padded() {
        let im = InternalMemory::new(vec![0x12, 0x34], vec![]);
        assert_eq!(im.bios_system_rom.len(), BIOS_SIZE);
        assert_eq!(im.read_bios(1), 0x34);
        assert_eq!(im.read_bios(0x3FFF), 0);
    }

    #[test]
    fn test_mirror_wram() {
        let mut im = InternalMemory::default();
        im.working_ram[0x01_0003] = 5;

        assert_eq!(im.read_at(0x0201_0003), 5);
        assert_eq!(im.read_at(0x0205_0003), 5);
        assert_eq!(im.read_at(0x0235_0003), 5);
        assert_eq!(im.read_at(0x02F5_0003), 5);

        im.write_at(0x0205_0003, 1);
        assert_eq!(im.working_ram[0x01_0003], 1);

        im.write_at(0x02F5_003F, 1);
        assert_eq!(im.working_ram[0x01_003F], 1);
    }

    #[test]
    fn test_mirror_iram() {
        let mut im = InternalMemory::default();
        im.working_iram[0x21FF] = 5;

        assert_eq!(im.read_at(0x0300_21FF), 5);
        assert_eq!(im.read_at(0x0300_A1FF), 5);
        assert_eq!(im.read_at(0x03FF_A1FF), 5);

        im.write_at(0x0301_71FF, 10);
        assert_eq!(im.working_iram[0x71FF], 10);

        im.write_at(0x03FF_F1FF, 1);
        assert_eq!(im.working_iram[0x71FF], 1);
    }
}
