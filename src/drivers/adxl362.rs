//! ADXL362 3-axis accelerometer
//!
//! Supplies the vibrato signal from the keyboard. Register accesses are
//! `{command, register, data}` frames; the 8-bit X-axis sample arrives in the
//! third reply byte as a two's-complement value.

use std::time::Duration;

use tracing::debug;

use super::{Frame, SpiEndpoint};
use crate::clock::Clock;

/// Write register command
pub const CMD_WRITE: u8 = 0x0A;
/// Read register command
pub const CMD_READ: u8 = 0x0B;

/// 8 MSBs of the X-axis sample
pub const REG_XDATA: u8 = 0x08;
/// Soft reset register
pub const REG_SOFT_RESET: u8 = 0x1F;
/// Power control register
pub const REG_POWER_CTL: u8 = 0x2D;

/// Value written to SOFT_RESET to reset the device ('R')
pub const SOFT_RESET_KEY: u8 = 0x52;
/// POWER_CTL measurement mode
pub const POWER_CTL_MEASURE: u8 = 0x02;

pub fn write_frame(register: u8, value: u8) -> Frame {
    [CMD_WRITE, register, value]
}

pub fn read_frame(register: u8) -> Frame {
    [CMD_READ, register, 0x00]
}

pub struct Adxl362 {
    endpoint: SpiEndpoint,
}

impl Adxl362 {
    pub fn new(endpoint: SpiEndpoint) -> Self {
        Self { endpoint }
    }

    /// Soft reset, let the device settle, then start measuring
    pub fn init(&mut self, clock: &dyn Clock) {
        self.endpoint.transact(&write_frame(REG_SOFT_RESET, SOFT_RESET_KEY));
        clock.sleep(Duration::from_millis(1));
        self.endpoint.transact(&write_frame(REG_POWER_CTL, POWER_CTL_MEASURE));
        debug!("ADXL362 reset and measuring");
    }

    /// Signed 8-bit X-axis sample (about -1 at rest)
    pub fn read_x(&mut self) -> i8 {
        self.endpoint.transact(&read_frame(REG_XDATA))[2] as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::testing::ScriptedSpi;

    #[test]
    fn test_init_resets_then_measures() {
        let spi = ScriptedSpi::new(|_| Ok([0; 3]));
        let log = spi.clone();
        let clock = VirtualClock::new();
        let mut accel = Adxl362::new(SpiEndpoint::new("accelerometer", Box::new(spi)));

        accel.init(&clock);

        assert_eq!(log.sent(), vec![[0x0A, 0x1F, 0x52], [0x0A, 0x2D, 0x02]]);
        assert_eq!(clock.now_millis(), 1);
    }

    #[test]
    fn test_read_x_is_signed() {
        let spi = ScriptedSpi::new(|_| Ok([0x00, 0x00, 0xFF]));
        let log = spi.clone();
        let mut accel = Adxl362::new(SpiEndpoint::new("accelerometer", Box::new(spi)));

        assert_eq!(accel.read_x(), -1);
        assert_eq!(log.sent(), vec![[0x0B, 0x08, 0x00]]);
    }
}
