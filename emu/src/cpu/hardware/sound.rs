//! Direct Sound: the two 8-bit PCM FIFOs and the sample output.
//!
//! The PSG channels are not synthesized; their registers only keep the
//! values written so that games reading them back see them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::ring_buffer::RingBuffer;

pub const FIFO_A_ADDRESS: u32 = 0x0400_00A0;
pub const FIFO_B_ADDRESS: u32 = 0x0400_00A4;

pub const DEFAULT_SAMPLE_RATE: u32 = 32_768;

const FIFO_CAPACITY: usize = 32;

/// A FIFO asks for a refill once it holds this many bytes or fewer.
const FIFO_REFILL_THRESHOLD: usize = 16;

const CPU_FREQUENCY: u32 = 16_777_216;

/// One second of stereo output.
const OUTPUT_CAPACITY: usize = 2 * DEFAULT_SAMPLE_RATE as usize;

#[derive(Default, Serialize, Deserialize)]
pub struct Fifo {
    bytes: VecDeque<u8>,
    current_sample: i8,
}

impl Fifo {
    pub fn push(&mut self, value: u8) {
        if self.bytes.len() < FIFO_CAPACITY {
            self.bytes.push_back(value);
        }
    }

    fn pop(&mut self) {
        if let Some(value) = self.bytes.pop_front() {
            self.current_sample = value as i8;
        }
    }

    fn reset(&mut self) {
        self.bytes.clear();
        self.current_sample = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Which FIFOs want a DMA refill after a timer overflow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FifoRequest {
    pub fifo_a: bool,
    pub fifo_b: bool,
}

#[derive(Serialize, Deserialize)]
pub struct Sound {
    /// `0x0400_0060` - `0x0400_007F`, PSG channel registers, stored as written.
    pub channel_registers: [u8; 0x20],
    pub channel3_wave_pattern_ram: [u8; 0x10],

    /// SOUNDCNT_L
    pub control_stereo_volume_enable: u16,
    /// SOUNDCNT_H
    pub control_mixing_dma_control: u16,
    /// SOUNDCNT_X
    pub control_sound_on_off: u16,
    /// SOUNDBIAS
    pub sound_pwm_control: u16,

    pub fifo_a: Fifo,
    pub fifo_b: Fifo,

    cycles_per_sample: u32,
    sample_cycles: u32,

    samples: RingBuffer<i16>,
}

impl Default for Sound {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Sound {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            channel_registers: [0; 0x20],
            channel3_wave_pattern_ram: [0; 0x10],
            control_stereo_volume_enable: 0,
            control_mixing_dma_control: 0,
            control_sound_on_off: 0,
            sound_pwm_control: 0x200,
            fifo_a: Fifo::default(),
            fifo_b: Fifo::default(),
            cycles_per_sample: CPU_FREQUENCY / sample_rate.clamp(1, CPU_FREQUENCY),
            sample_cycles: 0,
            samples: RingBuffer::new(OUTPUT_CAPACITY),
        }
    }

    /// Writes one byte of SOUNDCNT_H. The FIFO reset bits are acted upon and read back as 0.
    pub fn write_mixing_control(&mut self, byte_nth: u8, value: u8) {
        self.control_mixing_dma_control.set_byte(byte_nth, value);

        if self.control_mixing_dma_control.get_bit(11) {
            self.fifo_a.reset();
            self.control_mixing_dma_control.set_bit_off(11);
        }
        if self.control_mixing_dma_control.get_bit(15) {
            self.fifo_b.reset();
            self.control_mixing_dma_control.set_bit_off(15);
        }
    }

    fn master_enable(&self) -> bool {
        self.control_sound_on_off.get_bit(7)
    }

    /// Clocks the FIFOs driven by `timer` (0 or 1), once per overflow.
    pub fn timer_overflow(&mut self, timer: usize) -> FifoRequest {
        let mut request = FifoRequest::default();
        if !self.master_enable() {
            return request;
        }

        let timer_bit = u16::from(timer == 1);
        if self.control_mixing_dma_control.get_bits(10..=10) == timer_bit {
            self.fifo_a.pop();
            request.fifo_a = self.fifo_a.len() <= FIFO_REFILL_THRESHOLD;
        }
        if self.control_mixing_dma_control.get_bits(14..=14) == timer_bit {
            self.fifo_b.pop();
            request.fifo_b = self.fifo_b.len() <= FIFO_REFILL_THRESHOLD;
        }

        request
    }

    /// Produces output samples for the elapsed cycles.
    pub fn step(&mut self, cycles: u32) {
        self.sample_cycles += cycles;
        while self.sample_cycles >= self.cycles_per_sample {
            self.sample_cycles -= self.cycles_per_sample;
            let (left, right) = self.mix();
            self.samples.push(left);
            self.samples.push(right);
        }
    }

    fn mix(&self) -> (i16, i16) {
        if !self.master_enable() {
            return (0, 0);
        }

        let control = self.control_mixing_dma_control;
        let scale = |sample: i8, full_volume: bool| {
            i16::from(sample) << if full_volume { 7 } else { 6 }
        };
        let a = scale(self.fifo_a.current_sample, control.get_bit(2));
        let b = scale(self.fifo_b.current_sample, control.get_bit(3));

        let mut left = 0;
        let mut right = 0;
        if control.get_bit(8) {
            right += a;
        }
        if control.get_bit(9) {
            left += a;
        }
        if control.get_bit(12) {
            right += b;
        }
        if control.get_bit(13) {
            left += b;
        }

        (left, right)
    }

    /// Interleaved stereo samples produced since the last call.
    pub fn drain_samples(&mut self) -> Vec<i16> {
        self.samples.drain().collect()
    }
}
