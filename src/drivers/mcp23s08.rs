//! MCP23S08 8-bit SPI port expander
//!
//! Scans the switch banks. Every register access is a 3-byte frame: control
//! byte (fixed opcode, hardware address, read/write bit), register address,
//! then the data byte (or a dummy byte on reads, whose reply carries the
//! register value).

use tracing::debug;

use super::{Frame, SpiEndpoint};

pub mod registers {
    /// I/O direction (1 = input).
    pub const IODIR: u8 = 0x00;
    /// Configuration.
    pub const IOCON: u8 = 0x05;
    /// Pull-up enables.
    pub const GPPU: u8 = 0x06;
    /// Port value.
    pub const GPIO: u8 = 0x09;

    /// IOCON: sequential operation disabled (address pointer does not increment).
    pub const IOCON_SEQOP_OFF: u8 = 0x20;
}

use registers::*;

/// Fixed device opcode in the control byte
const OPCODE: u8 = 0x40;

/// Direction bit of the control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Write = 0,
    Read = 1,
}

/// Control byte for a register access at hardware address `hw_addr`
pub fn control_byte(access: Access, hw_addr: u8) -> u8 {
    OPCODE | ((hw_addr << 1) & 0x0E) | (access as u8 & 0x01)
}

/// Frame for a register access
pub fn register_frame(access: Access, hw_addr: u8, register: u8, data: u8) -> Frame {
    let data = match access {
        Access::Write => data,
        Access::Read => 0,
    };
    [control_byte(access, hw_addr), register, data]
}

pub struct Mcp23s08 {
    endpoint: SpiEndpoint,
    hw_addr: u8,
}

impl Mcp23s08 {
    pub fn new(endpoint: SpiEndpoint, hw_addr: u8) -> Self {
        Self { endpoint, hw_addr }
    }

    /// Configure every pin as a pulled-up input, non-sequential addressing
    pub fn init(&mut self) {
        self.write_register(IOCON, IOCON_SEQOP_OFF);
        self.write_register(IODIR, 0xFF);
        self.write_register(GPPU, 0xFF);
        debug!("MCP23S08 at address {} configured as 8 pulled-up inputs", self.hw_addr);
    }

    pub fn write_register(&mut self, register: u8, data: u8) {
        self.endpoint
            .transact(&register_frame(Access::Write, self.hw_addr, register, data));
    }

    pub fn read_register(&mut self, register: u8) -> u8 {
        self.endpoint
            .transact(&register_frame(Access::Read, self.hw_addr, register, 0))[2]
    }

    /// Raw port value (switch closed = 0 because of the pull-ups)
    pub fn read_port(&mut self) -> u8 {
        self.read_register(GPIO)
    }
}
