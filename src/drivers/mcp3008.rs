//! MCP3008 8-channel 10-bit ADC
//!
//! Reads the touche, ribbon, level pots and pedals. Single-ended conversions:
//! start bit, then SGL/DIFF + channel in the high nibble of the second byte.
//! The 10-bit result comes back as the low two bits of reply byte 1 followed
//! by reply byte 2.

use super::{Frame, SpiEndpoint};

/// Number of single-ended input channels
pub const CHANNELS: usize = 8;

/// Largest value a conversion can return
pub const MAX_SAMPLE: u16 = 0x03FF;

/// Request frame for a single-ended read of `channel`
pub fn request_frame(channel: u8) -> Frame {
    [0x01, 0x80 | ((channel & 0x07) << 4), 0x00]
}

/// Assemble the 10-bit sample from a reply frame
pub fn decode_sample(rx: &Frame) -> u16 {
    (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2])
}

pub struct Mcp3008 {
    endpoint: SpiEndpoint,
}

impl Mcp3008 {
    pub fn new(endpoint: SpiEndpoint) -> Self {
        Self { endpoint }
    }

    /// Convert one channel
    pub fn read(&mut self, channel: u8) -> u16 {
        decode_sample(&self.endpoint.transact(&request_frame(channel)))
    }

    /// Convert every channel in order
    pub fn read_all(&mut self) -> [u16; CHANNELS] {
        let mut samples = [0; CHANNELS];
        for (channel, sample) in samples.iter_mut().enumerate() {
            *sample = self.read(channel as u8);
        }
        samples
    }
}
