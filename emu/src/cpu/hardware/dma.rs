//! DMA channel registers and trigger bookkeeping.
//!
//! The transfers themselves run on the bus (see `Bus::run_dma`), since they
//! read and write memory like the CPU does.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::sound::{FIFO_A_ADDRESS, FIFO_B_ADDRESS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTiming {
    Immediate,
    VBlank,
    HBlank,
    /// Sound FIFO refill on channels 1/2, video capture on channel 3.
    Special,
}

impl From<u16> for DmaTiming {
    fn from(value: u16) -> Self {
        match value & 0b11 {
            0 => Self::Immediate,
            1 => Self::VBlank,
            2 => Self::HBlank,
            _ => Self::Special,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressControl {
    Increment,
    Decrement,
    Fixed,
    /// Destination only: increments, and is reloaded on every repeat.
    IncrementReload,
}

impl From<u16> for AddressControl {
    fn from(value: u16) -> Self {
        match value & 0b11 {
            0 => Self::Increment,
            1 => Self::Decrement,
            2 => Self::Fixed,
            _ => Self::IncrementReload,
        }
    }
}

impl AddressControl {
    #[must_use]
    pub const fn step(self, unit: u32) -> u32 {
        match self {
            Self::Increment | Self::IncrementReload => unit,
            Self::Decrement => unit.wrapping_neg(),
            Self::Fixed => 0,
        }
    }
}

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct Registers {
    pub source_address: u32,
    pub destination_address: u32,
    pub word_count: u16,
    pub control: u16,

    pub(crate) internal_source: u32,
    pub(crate) internal_destination: u32,
    pub(crate) internal_count: u32,

    /// The trigger was observed and the transfer still has to run.
    pub(crate) pending: bool,
}

impl Registers {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(15)
    }

    #[must_use]
    pub fn timing(&self) -> DmaTiming {
        DmaTiming::from(self.control.get_bits(12..=13))
    }

    #[must_use]
    pub fn destination_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(5..=6))
    }

    #[must_use]
    pub fn source_control(&self) -> AddressControl {
        AddressControl::from(self.control.get_bits(7..=8))
    }

    #[must_use]
    pub fn repeat(&self) -> bool {
        self.control.get_bit(9)
    }

    #[must_use]
    pub fn word_transfer(&self) -> bool {
        self.control.get_bit(10)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(14)
    }
}

/// Number of units a channel moves for a given `DMAxCNT_L`. Zero means the maximum.
#[must_use]
pub const fn transfer_count(channel: usize, word_count: u16) -> u32 {
    let (mask, max) = if channel == 3 {
        (0xFFFF, 0x1_0000)
    } else {
        (0x3FFF, 0x4000)
    };

    match word_count as u32 & mask {
        0 => max,
        count => count,
    }
}

const SOURCE_MASKS: [u32; 4] = [0x07FF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF, 0x0FFF_FFFF];
const DESTINATION_MASKS: [u32; 4] = [0x07FF_FFFF, 0x07FF_FFFF, 0x07FF_FFFF, 0x0FFF_FFFF];

#[derive(Default, Serialize, Deserialize)]
pub struct Dma {
    pub channels: [Registers; 4],
}

impl Dma {
    /// Writes one byte of `DMAxCNT_H`. Turning the enable bit on latches the
    /// internal registers and, for immediate timing, arms the transfer.
    pub fn write_control(&mut self, index: usize, byte_nth: u8, value: u8) {
        let channel = &mut self.channels[index];
        let was_enabled = channel.enabled();
        channel.control.set_byte(byte_nth, value);

        if !channel.enabled() {
            channel.pending = false;
            return;
        }

        if !was_enabled {
            channel.internal_source = channel.source_address & SOURCE_MASKS[index];
            channel.internal_destination = channel.destination_address & DESTINATION_MASKS[index];
            channel.internal_count = transfer_count(index, channel.word_count);
            channel.pending = channel.timing() == DmaTiming::Immediate;

            tracing::debug!(
                "DMA{index} armed: 0x{:08X} -> 0x{:08X}, count 0x{:X}, control 0x{:04X}",
                channel.internal_source,
                channel.internal_destination,
                channel.internal_count,
                channel.control
            );
        }
    }

    /// Arms every enabled channel waiting on `timing` (HBlank or VBlank).
    pub fn trigger(&mut self, timing: DmaTiming) {
        for channel in &mut self.channels {
            if channel.enabled() && channel.timing() == timing {
                channel.pending = true;
            }
        }
    }

    /// Arms the sound channel (1 or 2) feeding the FIFO at `fifo_address`.
    pub fn trigger_fifo(&mut self, fifo_address: u32) {
        for index in 1..=2 {
            let channel = &mut self.channels[index];
            if channel.enabled()
                && channel.timing() == DmaTiming::Special
                && channel.destination_address & !3 == fifo_address
            {
                channel.pending = true;
            }
        }
    }

    #[must_use]
    pub fn is_fifo_transfer(&self, index: usize) -> bool {
        let channel = &self.channels[index];
        matches!(index, 1 | 2)
            && channel.timing() == DmaTiming::Special
            && matches!(
                channel.destination_address & !3,
                FIFO_A_ADDRESS | FIFO_B_ADDRESS
            )
    }

    /// Lowest pending channel, which has the highest priority.
    #[must_use]
    pub fn next_pending(&self) -> Option<usize> {
        self.channels.iter().position(|channel| channel.pending)
    }

    /// Bookkeeping after channel `index` moved its units: reload for a
    /// repeat, otherwise switch the channel off.
    pub fn finish_transfer(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        channel.pending = false;

        if channel.repeat() && channel.timing() != DmaTiming::Immediate {
            channel.internal_count = transfer_count(index, channel.word_count);
            if channel.destination_control() == AddressControl::IncrementReload {
                channel.internal_destination =
                    channel.destination_address & DESTINATION_MASKS[index];
            }
        } else {
            channel.control.set_bit_off(15);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_count_zero_is_maximum() {
        assert_eq!(transfer_count(0, 0), 0x4000);
        assert_eq!(transfer_count(2, 0), 0x4000);
        assert_eq!(transfer_count(3, 0), 0x1_0000);
        assert_eq!(transfer_count(1, 0xC010), 0x10);
        assert_eq!(transfer_count(3, 0xC010), 0xC010);
    }

    #[test]
    fn check_enable_latches_and_arms_immediate() {
        let mut dma = Dma::default();
        dma.channels[0].source_address = 0x0A00_0000;
        dma.channels[0].destination_address = 0x0300_0000;
        dma.channels[0].word_count = 4;

        dma.write_control(0, 1, 0x80);
        let channel = dma.channels[0];
        assert!(channel.pending);
        assert_eq!(channel.internal_source, 0x0200_0000);
        assert_eq!(channel.internal_destination, 0x0300_0000);
        assert_eq!(channel.internal_count, 4);
        assert_eq!(dma.next_pending(), Some(0));

        // Rewriting the low byte of an enabled channel does not re-arm it.
        dma.finish_transfer(0);
        dma.channels[0].control.set_bit_on(15);
        dma.write_control(0, 0, 0x00);
        assert_eq!(dma.next_pending(), None);
    }

    #[test]
    fn check_triggers_wait_for_timing() {
        let mut dma = Dma::default();
        // HBlank, repeat.
        dma.write_control(2, 1, 0x80 | 0x20 | 0x02);
        assert_eq!(dma.next_pending(), None);

        dma.trigger(DmaTiming::VBlank);
        assert_eq!(dma.next_pending(), None);

        dma.trigger(DmaTiming::HBlank);
        assert_eq!(dma.next_pending(), Some(2));

        dma.finish_transfer(2);
        assert!(dma.channels[2].enabled());
        assert_eq!(dma.next_pending(), None);
    }

    #[test]
    fn check_fifo_trigger() {
        let mut dma = Dma::default();
        dma.channels[1].destination_address = FIFO_B_ADDRESS;
        dma.write_control(1, 1, 0x80 | 0x30 | 0x02);
        assert!(dma.is_fifo_transfer(1));

        dma.trigger_fifo(FIFO_A_ADDRESS);
        assert_eq!(dma.next_pending(), None);
        dma.trigger_fifo(FIFO_B_ADDRESS);
        assert_eq!(dma.next_pending(), Some(1));
    }

    #[test]
    fn check_lower_channel_has_priority() {
        let mut dma = Dma::default();
        dma.write_control(3, 1, 0x80);
        dma.write_control(1, 1, 0x80);
        assert_eq!(dma.next_pending(), Some(1));
        dma.finish_transfer(1);
        assert_eq!(dma.next_pending(), Some(3));
        assert!(!dma.channels[1].enabled());
    }
}
