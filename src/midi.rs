//! MIDI channel messages
//!
//! Parsing for the keyboard's live byte stream and for the channel events
//! inside stored performance files.

/// MIDI channel voice messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Polyphonic Key Pressure: channel (0-15), note (0-127), pressure (0-127)
    PolyPressure { channel: u8, note: u8, pressure: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },

    /// Channel Pressure: channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit, 8192 = centre)
    PitchBend { channel: u8, value: u16 },
}

/// Number of data bytes following a channel status byte
pub fn data_len(status: u8) -> Option<usize> {
    match status & 0xF0 {
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Some(2),
        0xC0 | 0xD0 => Some(1),
        _ => None,
    }
}

impl MidiMessage {
    /// Parse a channel message from a status byte and its data bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }
        if rest.len() < data_len(status)? {
            return None;
        }

        let channel = status & 0x0F;
        let d1 = rest[0] & 0x7F;
        let d2 = rest.get(1).map(|b| b & 0x7F).unwrap_or(0);

        let message = match status & 0xF0 {
            0x80 => MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            },
            // Note On with velocity 0 is a Note Off
            0x90 if d2 == 0 => MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: 0,
            },
            0x90 => MidiMessage::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            },
            0xA0 => MidiMessage::PolyPressure {
                channel,
                note: d1,
                pressure: d2,
            },
            0xB0 => MidiMessage::ControlChange {
                channel,
                cc: d1,
                value: d2,
            },
            0xC0 => MidiMessage::ProgramChange {
                channel,
                program: d1,
            },
            0xD0 => MidiMessage::ChannelPressure {
                channel,
                pressure: d1,
            },
            0xE0 => MidiMessage::PitchBend {
                channel,
                value: (u16::from(d2) << 7) | u16::from(d1),
            },
            _ => return None,
        };
        Some(message)
    }
}

/// Incremental decoder for a raw MIDI byte stream
///
/// Handles running status and messages split across reads. System common
/// and SysEx bytes are dropped; real-time bytes may appear anywhere and are
/// ignored without disturbing a message in progress.
#[derive(Debug, Default)]
pub struct MidiStreamDecoder {
    running_status: Option<u8>,
    pending: Vec<u8>,
    in_sysex: bool,
}

impl MidiStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, appending every completed channel message to `out`
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<MidiMessage>) {
        for &byte in bytes {
            match byte {
                0xF8..=0xFF => {}
                0xF0 => {
                    self.in_sysex = true;
                    self.running_status = None;
                    self.pending.clear();
                }
                0xF1..=0xF7 => {
                    self.in_sysex = false;
                    self.running_status = None;
                    self.pending.clear();
                }
                0x80..=0xEF => {
                    self.in_sysex = false;
                    self.running_status = Some(byte);
                    self.pending.clear();
                }
                _ if self.in_sysex => {}
                _ => {
                    let Some(status) = self.running_status else {
                        continue;
                    };
                    self.pending.push(byte);
                    if Some(self.pending.len()) == data_len(status) {
                        let mut frame = [status, 0, 0];
                        frame[1..=self.pending.len()].copy_from_slice(&self.pending);
                        if let Some(message) = MidiMessage::parse(&frame[..=self.pending.len()]) {
                            out.push(message);
                        }
                        self.pending.clear();
                    }
                }
            }
        }
    }
}

/// Find a MIDI port whose name contains `pattern` (case-insensitive)
pub fn find_port_by_substring<T: midir::MidiIO>(io: &T, pattern: &str) -> Option<T::Port> {
    let pattern = pattern.to_lowercase();
    io.ports().into_iter().find(|port| {
        io.port_name(port)
            .map(|name| name.to_lowercase().contains(&pattern))
            .unwrap_or(false)
    })
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
