use serde::{Deserialize, Serialize};

/// Interrupt sources, by their bit in IE/IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCount = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl Interrupt {
    #[must_use]
    pub const fn timer(index: usize) -> Self {
        match index {
            0 => Self::Timer0,
            1 => Self::Timer1,
            2 => Self::Timer2,
            _ => Self::Timer3,
        }
    }

    #[must_use]
    pub const fn dma(index: usize) -> Self {
        match index {
            0 => Self::Dma0,
            1 => Self::Dma1,
            2 => Self::Dma2,
            _ => Self::Dma3,
        }
    }

    const fn mask(self) -> u16 {
        1 << self as u16
    }
}

#[derive(Serialize, Deserialize, Default)]
pub struct InterruptControl {
    pub interrupt_enable: u16,
    /// Interrupt Request Flags (IF), bits are set when interrupts are requested,
    /// cleared by writing 1 to the corresponding bit
    pub interrupt_request: u16,
    pub wait_state_control: u16,
    pub interrupt_master_enable: u16,
    pub post_boot_flag: u8,
    pub power_down_control: u8,
    pub internal_memory_control: u32,

    /// Set by HALTCNT (or the Halt/IntrWait BIOS calls), cleared once `IE & IF != 0`.
    pub halted: bool,
}

impl InterruptControl {
    pub const fn request(&mut self, interrupt: Interrupt) {
        self.interrupt_request |= interrupt.mask();
    }

    /// IF is write-1-to-clear.
    pub const fn acknowledge(&mut self, value: u16) {
        self.interrupt_request &= !value;
    }

    /// Halt ends as soon as an enabled interrupt is flagged, whatever IME says.
    #[must_use]
    pub const fn wake_up_pending(&self) -> bool {
        self.interrupt_enable & self.interrupt_request & 0x3FFF != 0
    }

    #[must_use]
    pub const fn irq_pending(&self) -> bool {
        self.interrupt_master_enable & 1 == 1 && self.wake_up_pending()
    }
}
