//! Cartridge header, the first 0xC0 bytes of the ROM.
//!
//! Only used for display. A header with a bad checksum or non ASCII text is
//! still accepted: plenty of homebrew ships with one.

use thiserror::Error;

const HEADER_SIZE: usize = 0xC0;
const FIXED_VALUE: u8 = 0x96;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("ROM is {0} bytes, too small to hold a cartridge header")]
    TooShort(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    rom_entry_point: u32,
    game_title: String,
    game_code: String,
    maker_code: String,
    software_version: u8,
    checksum_valid: bool,
}

impl CartridgeHeader {
    pub fn new(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderError::TooShort(data.len()));
        }

        let rom_entry_point = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let checksum_valid = execute_checks(data);
        if !checksum_valid {
            tracing::warn!("cartridge header check failed, running anyway");
        }

        Ok(Self {
            rom_entry_point,
            game_title: into_ascii_str(&data[0xA0..0xAC]),
            game_code: into_ascii_str(&data[0xAC..0xB0]),
            maker_code: into_ascii_str(&data[0xB0..0xB2]),
            software_version: data[0xBC],
            checksum_valid,
        })
    }

    /// 32bit ARM branch opcode
    #[must_use]
    pub const fn rom_entry_point(&self) -> u32 {
        self.rom_entry_point
    }

    #[must_use]
    pub fn game_title(&self) -> &str {
        self.game_title.as_str()
    }

    #[must_use]
    pub fn game_code(&self) -> &str {
        self.game_code.as_str()
    }

    #[must_use]
    pub fn maker_code(&self) -> &str {
        self.maker_code.as_str()
    }

    /// Usually 0x00
    #[must_use]
    pub const fn software_version(&self) -> u8 {
        self.software_version
    }

    #[must_use]
    pub const fn checksum_valid(&self) -> bool {
        self.checksum_valid
    }
}

fn execute_checks(data: &[u8]) -> bool {
    if data[0xB2] != FIXED_VALUE {
        return false;
    }

    let checksum_expected = data[0xBD];
    let checksum = data[0xA0..0xBD]
        .iter()
        .fold(0u8, |acc, &item| acc.wrapping_sub(item))
        .wrapping_sub(0x19);

    checksum == checksum_expected
}

/// Padding NULs are dropped, anything outside printable ASCII becomes `?`.
fn into_ascii_str(data: &[u8]) -> String {
    data.iter()
        .take_while(|&&byte| byte != 0)
        .map(|&byte| {
            if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '?'
            }
        })
        .collect()
}
