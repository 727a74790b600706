//! Outbound control messages and their OSC encoding

use rosc::{OscMessage, OscPacket, OscType};

use crate::drivers::mcp3008::CHANNELS;

/// One message of the control stream sent to the synthesis engine
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// `/anlg`: all eight transducer values
    Analog([u16; CHANNELS]),
    /// `/vib`: accelerometer or replayed pitch bend offset
    Vibrato(i32),
    /// `/sw`: the three switch banks as emitted
    Switches([u8; 3]),
    /// `/oct`: octave shift in semitones
    Octave(i32),
    /// `/key`: note relative to the bottom of the keyboard, sounding or released
    Key { note: i32, sounding: bool },
    /// `/tuning`: reference pitch in Hz
    Tuning(f32),
    /// `/record`: recording control (session id to start, "stop" to end)
    Record(String),
    /// `/quitpd`: the engine should exit
    Shutdown(i32),
    /// `/midiRbn`: ribbon pitch replayed from a performance
    RibbonPitch(f32),
}

impl OutboundMessage {
    pub fn address(&self) -> &'static str {
        match self {
            OutboundMessage::Analog(_) => "/anlg",
            OutboundMessage::Vibrato(_) => "/vib",
            OutboundMessage::Switches(_) => "/sw",
            OutboundMessage::Octave(_) => "/oct",
            OutboundMessage::Key { .. } => "/key",
            OutboundMessage::Tuning(_) => "/tuning",
            OutboundMessage::Record(_) => "/record",
            OutboundMessage::Shutdown(_) => "/quitpd",
            OutboundMessage::RibbonPitch(_) => "/midiRbn",
        }
    }

    pub fn args(&self) -> Vec<OscType> {
        match self {
            OutboundMessage::Analog(values) => {
                values.iter().map(|v| OscType::Int(i32::from(*v))).collect()
            }
            OutboundMessage::Switches(banks) => {
                banks.iter().map(|b| OscType::Int(i32::from(*b))).collect()
            }
            OutboundMessage::Vibrato(v) | OutboundMessage::Octave(v) | OutboundMessage::Shutdown(v) => {
                vec![OscType::Int(*v)]
            }
            OutboundMessage::Key { note, sounding } => {
                vec![OscType::Int(*note), OscType::Int(i32::from(*sounding))]
            }
            OutboundMessage::Tuning(hz) => vec![OscType::Float(*hz)],
            OutboundMessage::RibbonPitch(pitch) => vec![OscType::Float(*pitch)],
            OutboundMessage::Record(control) => vec![OscType::String(control.clone())],
        }
    }

    pub fn to_packet(&self) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: self.address().to_string(),
            args: self.args(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_message_args() {
        let msg = OutboundMessage::Key {
            note: 24,
            sounding: true,
        };
        assert_eq!(msg.address(), "/key");
        assert_eq!(msg.args(), vec![OscType::Int(24), OscType::Int(1)]);
    }

    #[test]
    fn test_analog_carries_eight_ints() {
        let msg = OutboundMessage::Analog([820, 0, 1, 2, 3, 4, 5, 1023]);
        let args = msg.args();
        assert_eq!(args.len(), 8);
        assert_eq!(args[0], OscType::Int(820));
        assert_eq!(args[7], OscType::Int(1023));
    }

    #[test]
    fn test_packet_encodes() {
        let packet = OutboundMessage::Switches([0xF8, 0x01, 0x3F]).to_packet();
        let bytes = rosc::encoder::encode(&packet).unwrap();
        let (_, decoded) = rosc::decoder::decode_udp(&bytes).unwrap();
        match decoded {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/sw");
                assert_eq!(msg.args, vec![OscType::Int(248), OscType::Int(1), OscType::Int(63)]);
            }
            OscPacket::Bundle(_) => panic!("expected a message"),
        }
    }
}
