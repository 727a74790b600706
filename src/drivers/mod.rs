//! Peripheral drivers for the console hardware
//!
//! Every peripheral talks to the hardware through one of two narrow seams:
//! [`PinIo`] for GPIO lines and [`SpiTransfer`] for full-duplex SPI frames.
//! The real implementations are [`gpio::GpioRegisters`] and [`spi::SpiDevice`];
//! the device protocols on top of them never touch the kernel themselves.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod adxl362;
pub mod gpio;
pub mod keyboard;
pub mod mcp23s08;
pub mod mcp3008;
pub mod shift_register;
pub mod spi;

pub use adxl362::Adxl362;
pub use gpio::GpioRegisters;
pub use keyboard::{open_keyboard, KeyboardSource};
pub use mcp23s08::Mcp23s08;
pub use mcp3008::Mcp3008;
pub use shift_register::LedEncoder;
pub use spi::{SpiDevice, SpiEndpoint};

/// Direction of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Logic level of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// GPIO access used by the bit-banged peripherals
///
/// Methods take `&self`: the set/clear registers behind the real
/// implementation are write-one-to-act, so single-pin operations never race.
pub trait PinIo: Send + Sync {
    /// Configure a pin as input or output
    fn set_mode(&self, pin: u8, mode: PinMode);

    /// Drive an output pin
    fn write(&self, pin: u8, level: Level);

    /// Sample a pin's current level
    fn read(&self, pin: u8) -> Level;
}

/// Every SPI transaction on the console is a 3-byte frame
pub const FRAME_LEN: usize = 3;

/// One SPI frame (transmitted or received)
pub type Frame = [u8; FRAME_LEN];

/// Full-duplex SPI transport
pub trait SpiTransfer: Send {
    /// Clock `tx` out and return the bytes clocked in at the same time
    fn transfer(&mut self, tx: &Frame) -> io::Result<Frame>;
}

/// Start-up failures of the hardware layer
///
/// These are fatal: the gateway does not enter its main loop without the
/// register block and the SPI devices.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to map GPIO registers from {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set {setting} on {path}: {source}")]
    Configure {
        setting: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("GPIO pin {0} does not exist on this controller")]
    InvalidPin(u8),
}
