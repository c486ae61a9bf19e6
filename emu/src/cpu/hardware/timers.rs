//! The four 16-bit timers (`TM0CNT` .. `TM3CNT`).
//!
//! A running timer counts up from its reload value. When it wraps it is
//! reloaded, may request an interrupt and, for timers 0 and 1, clocks the
//! Direct Sound FIFOs. Timers 1-3 can instead count the overflows of the
//! previous timer (cascade), in which case the prescaler is ignored.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

#[derive(Default, Clone, Copy, Serialize, Deserialize)]
pub struct Timer {
    /// Live counter, read through `TMxCNT_L`.
    pub counter: u16,
    /// Written through `TMxCNT_L`, copied into the counter on start and on overflow.
    pub reload: u16,
    pub control: u16,

    /// Cycles not yet turned into a tick by the prescaler.
    accumulator: u32,
}

impl Timer {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.control.get_bit(7)
    }

    #[must_use]
    pub fn cascade(&self) -> bool {
        self.control.get_bit(2)
    }

    #[must_use]
    pub fn irq_enabled(&self) -> bool {
        self.control.get_bit(6)
    }

    /// Prescaler as a shift: 1, 64, 256 or 1024 cycles per tick.
    #[must_use]
    pub fn prescaler_shift(&self) -> u32 {
        match self.control.get_bits(0..=1) {
            0 => 0,
            1 => 6,
            2 => 8,
            _ => 10,
        }
    }

    /// Adds `ticks` to the counter and returns how many times it wrapped.
    fn count_up(&mut self, ticks: u32) -> u32 {
        let to_overflow = 0x1_0000 - u32::from(self.counter);
        if ticks < to_overflow {
            self.counter += ticks as u16;
            return 0;
        }

        let period = 0x1_0000 - u32::from(self.reload);
        let remaining = ticks - to_overflow;
        self.counter = self.reload + (remaining % period) as u16;

        1 + remaining / period
    }
}

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    pub timers: [Timer; 4],
}

impl Timers {
    pub fn write_reload(&mut self, index: usize, byte_nth: u8, value: u8) {
        self.timers[index].reload.set_byte(byte_nth, value);
    }

    /// Writes one byte of `TMxCNT_H`. Starting a stopped timer reloads it.
    pub fn write_control(&mut self, index: usize, byte_nth: u8, value: u8) {
        let timer = &mut self.timers[index];
        let was_enabled = timer.enabled();
        timer.control.set_byte(byte_nth, value);

        if !was_enabled && timer.enabled() {
            timer.counter = timer.reload;
            timer.accumulator = 0;
        }
    }

    /// Runs every timer for `cycles` cycles and returns the number of
    /// overflows of each one.
    pub fn step(&mut self, cycles: u32) -> [u32; 4] {
        let mut overflows = [0; 4];

        for index in 0..4 {
            let timer = &mut self.timers[index];
            if !timer.enabled() {
                continue;
            }

            let ticks = if index > 0 && timer.cascade() {
                overflows[index - 1]
            } else {
                let shift = timer.prescaler_shift();
                timer.accumulator += cycles;
                let ticks = timer.accumulator >> shift;
                timer.accumulator &= (1 << shift) - 1;
                ticks
            };

            if ticks > 0 {
                overflows[index] = timer.count_up(ticks);
            }
        }

        overflows
    }

    /// Cycles before the first free running timer wraps.
    #[must_use]
    pub fn cycles_until_overflow(&self) -> Option<u32> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(index, timer)| timer.enabled() && !(*index > 0 && timer.cascade()))
            .map(|(_, timer)| {
                let ticks = 0x1_0000 - u32::from(timer.counter);
                (ticks << timer.prescaler_shift()).saturating_sub(timer.accumulator)
            })
            .min()
    }
}
