//! 74HC595 LED shift registers
//!
//! Two cascaded 74HC595s drive the octave marker LEDs (bi-colour pairs on
//! adjacent outputs: 01 or 10 lights red or green, 00 or 11 is off) and the
//! RGB LED in the touche button. Fifteen outputs are used; the word is
//! shifted out most significant bit first with every bit inverted on the
//! wire, then latched.

use std::sync::Arc;

use super::{Level, PinIo, PinMode};

/// Number of register outputs in use
pub const OUTPUT_BITS: u32 = 15;

/// Inverts every octave marker colour while a recording is running
pub const RECORD_MASK: u16 = 0x0FFF;

/// Pins wired to the shift registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPins {
    /// Serial data (SER)
    pub data: u8,
    /// Storage register clock (RCLK)
    pub latch: u8,
    /// Shift register clock (SRCLK)
    pub clock: u8,
}

/// Word that ends up on the register outputs
pub fn compose(pattern: u16, mask: u16, record_active: bool) -> u16 {
    let record = if record_active { RECORD_MASK } else { 0 };
    (pattern ^ record) & mask
}

pub struct LedEncoder {
    pins: Arc<dyn PinIo>,
    lines: LedPins,
}

impl LedEncoder {
    /// Claim the three lines as outputs, idle low
    pub fn new(pins: Arc<dyn PinIo>, lines: LedPins) -> Self {
        for pin in [lines.data, lines.latch, lines.clock] {
            pins.set_mode(pin, PinMode::Output);
            pins.write(pin, Level::Low);
        }
        Self { pins, lines }
    }

    /// Display `pattern` through `mask`, colours inverted while recording
    pub fn render(&self, pattern: u16, mask: u16, record_active: bool) {
        self.shift_out(compose(pattern, mask, record_active));
    }

    /// Turn every LED off
    pub fn clear(&self) {
        self.shift_out(0x0000);
    }

    fn shift_out(&self, word: u16) {
        for bit in (0..OUTPUT_BITS).rev() {
            let on = word & (1 << bit) != 0;
            self.pins.write(self.lines.data, Level::from(!on));
            self.pulse(self.lines.clock);
        }
        self.pulse(self.lines.latch);
    }

    fn pulse(&self, pin: u8) {
        self.pins.write(pin, Level::Low);
        self.pins.write(pin, Level::High);
    }
}
