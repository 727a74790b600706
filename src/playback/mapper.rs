//! Channel events of a performance mapped onto the live control stream
//!
//! A recorded performance drives the same engine inputs as the console:
//! controllers stand in for transducers and switches, pitch bend for the
//! ribbon or the vibrato, notes for the keyboard.

use crate::drivers::mcp3008::CHANNELS;
use crate::midi::MidiMessage;
use crate::osc::OutboundMessage;
use crate::state::keys::KEYBOARD_BASE_NOTE;
use crate::state::types::{BANK1_CLAQUEMENT, BANK1_RUBAN, BANK2_SENT};

/// Expression pedal (analog channel 6)
pub const CC_EXPRESSION: u8 = 0x0B;
/// General purpose 1-4: octaviant, petit gambe, souffle and diffuseur levels
pub const CC_LEVELS: std::ops::RangeInclusive<u8> = 0x10..=0x13;
/// Diffuseur selection (bank 1 high nibble)
pub const CC_DIFFUSEURS: u8 = 0x50;
/// Clavier / ruban selection
pub const CC_RUBAN: u8 = 0x51;
/// Legato / claquement selection
pub const CC_CLAQUEMENT: u8 = 0x52;
/// Feutre pedal (analog channel 7)
pub const CC_FEUTRE: u8 = 0x53;

/// Analog channel driven by the expression controller
const EXPRESSION_CHANNEL: usize = 6;
/// Analog channel driven by the feutre controller
const FEUTRE_CHANNEL: usize = 7;

/// Pitch bend units per semitone on the ribbon
const RIBBON_BEND_PER_SEMITONE: f32 = 170.666_666_7;

/// Bend value that maps to no vibrato (the accelerometer rests at -1)
const VIBRATO_CENTRE: i32 = 8193;

/// Controller values at or above this select the second mode
const SWITCH_THRESHOLD: u8 = 64;

pub fn expression_to_analog(value: u8) -> u16 {
    (u32::from(value & 0x7F) * 992 / 127) as u16
}

pub fn controller_to_analog(value: u8) -> u16 {
    u16::from(value & 0x7F) << 3
}

/// Ribbon pitch in semitones relative to the engine's reference
pub fn ribbon_pitch(bend: u16, octave_shift: i32) -> f32 {
    f32::from(bend) / RIBBON_BEND_PER_SEMITONE - 24.0 - octave_shift as f32
}

pub fn vibrato_offset(bend: u16) -> i32 {
    i32::from(bend) - VIBRATO_CENTRE
}

/// Voice switches selected by a program number
pub fn apply_program(banks: [u8; 3], program: u8) -> [u8; 3] {
    let [b0, b1, b2] = banks;
    [
        (b0 & 0x03) | ((program & 0x1F) << 3),
        (b1 & 0xFC) | ((program & 0x60) >> 5),
        b2,
    ]
}

/// Controls as the performance has set them so far
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerControls {
    pub analog: [u16; CHANNELS],
    pub switches: [u8; 3],
    pub vibrato: i32,
    pub octave_shift: i32,
}

impl PlayerControls {
    /// Start from the live controls in claquement, keyboard mode
    pub fn new(analog: [u16; CHANNELS], switches: [u8; 3], vibrato: i32, octave_shift: i32) -> Self {
        let mut controls = Self {
            analog,
            switches,
            vibrato,
            octave_shift,
        };
        controls.set_switch(1, BANK1_RUBAN, false);
        controls.set_switch(1, BANK1_CLAQUEMENT, true);
        controls
    }

    pub fn ruban(&self) -> bool {
        self.switches[1] & BANK1_RUBAN != 0
    }

    pub fn claquement(&self) -> bool {
        self.switches[1] & BANK1_CLAQUEMENT != 0
    }

    fn set_switch(&mut self, bank: usize, bit: u8, on: bool) {
        if on {
            self.switches[bank] |= bit;
        } else {
            self.switches[bank] &= !bit;
        }
    }

    fn switches_message(&self) -> OutboundMessage {
        let [b0, b1, b2] = self.switches;
        OutboundMessage::Switches([b0, b1, b2 & BANK2_SENT])
    }

    fn key(&self, note: u8, sounding: bool) -> OutboundMessage {
        OutboundMessage::Key {
            note: i32::from(note) - (KEYBOARD_BASE_NOTE + self.octave_shift),
            sounding,
        }
    }

    /// Apply one channel event, returning the message it produces
    pub fn apply(&mut self, message: &MidiMessage) -> Option<OutboundMessage> {
        match *message {
            MidiMessage::NoteOn { note, .. } => Some(self.key(note, true)),
            MidiMessage::NoteOff { note, .. } => self.claquement().then(|| self.key(note, false)),
            MidiMessage::PitchBend { value, .. } => {
                if self.ruban() {
                    Some(OutboundMessage::RibbonPitch(ribbon_pitch(value, self.octave_shift)))
                } else {
                    self.vibrato = vibrato_offset(value);
                    Some(OutboundMessage::Vibrato(self.vibrato))
                }
            }
            MidiMessage::ProgramChange { program, .. } => {
                self.switches = apply_program(self.switches, program);
                Some(self.switches_message())
            }
            MidiMessage::ControlChange { cc, value, .. } => self.control_change(cc, value),
            MidiMessage::PolyPressure { .. } | MidiMessage::ChannelPressure { .. } => None,
        }
    }

    fn control_change(&mut self, cc: u8, value: u8) -> Option<OutboundMessage> {
        match cc {
            CC_EXPRESSION => {
                self.analog[EXPRESSION_CHANNEL] = expression_to_analog(value);
                Some(OutboundMessage::Analog(self.analog))
            }
            _ if CC_LEVELS.contains(&cc) => {
                self.analog[usize::from(cc - 14)] = controller_to_analog(value);
                Some(OutboundMessage::Analog(self.analog))
            }
            CC_FEUTRE => {
                self.analog[FEUTRE_CHANNEL] = controller_to_analog(value);
                Some(OutboundMessage::Analog(self.analog))
            }
            CC_DIFFUSEURS => {
                self.switches[1] = (self.switches[1] & 0x0F) | ((value & 0x0F) << 4);
                Some(self.switches_message())
            }
            CC_RUBAN => {
                self.set_switch(1, BANK1_RUBAN, value >= SWITCH_THRESHOLD);
                Some(self.switches_message())
            }
            CC_CLAQUEMENT => {
                self.set_switch(1, BANK1_CLAQUEMENT, value >= SWITCH_THRESHOLD);
                Some(self.switches_message())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> PlayerControls {
        PlayerControls::new([0; CHANNELS], [0x00, 0x04, 0x00], -1, 0)
    }

    fn cc(cc: u8, value: u8) -> MidiMessage {
        MidiMessage::ControlChange { channel: 0, cc, value }
    }

    #[test]
    fn test_start_mode_is_claquement_keyboard() {
        let controls = controls();
        assert!(controls.claquement());
        assert!(!controls.ruban());
        assert_eq!(controls.switches, [0x00, 0x08, 0x00]);
    }

    #[test]
    fn test_program_change_sets_voices() {
        assert_eq!(apply_program([0x00, 0x00, 0x00], 0x27), [0x38, 0x01, 0x00]);
        assert_eq!(apply_program([0xFF, 0xFF, 0x12], 0x00), [0x03, 0xFC, 0x12]);

        let mut controls = controls();
        let msg = controls.apply(&MidiMessage::ProgramChange { channel: 0, program: 0x27 });
        assert_eq!(msg, Some(OutboundMessage::Switches([0x38, 0x09, 0x00])));
    }

    #[test]
    fn test_controllers_drive_analog_channels() {
        let mut controls = controls();

        controls.apply(&cc(CC_EXPRESSION, 127));
        assert_eq!(controls.analog[6], 992);
        controls.apply(&cc(0x10, 0x40));
        assert_eq!(controls.analog[2], 0x200);
        controls.apply(&cc(0x13, 127));
        assert_eq!(controls.analog[5], 1016);
        let msg = controls.apply(&cc(CC_FEUTRE, 1));
        assert_eq!(controls.analog[7], 8);
        assert_eq!(msg, Some(OutboundMessage::Analog(controls.analog)));
    }

    #[test]
    fn test_mode_controllers() {
        let mut controls = controls();

        controls.apply(&cc(CC_DIFFUSEURS, 0x0A));
        assert_eq!(controls.switches[1], 0xA8);

        controls.apply(&cc(CC_RUBAN, 64));
        assert!(controls.ruban());
        controls.apply(&cc(CC_CLAQUEMENT, 63));
        assert!(!controls.claquement());
        assert_eq!(controls.switches[1], 0xA4);

        assert_eq!(controls.apply(&cc(0x07, 100)), None);
    }

    #[test]
    fn test_pitch_bend_routing() {
        let mut controls = controls();
        let bend = MidiMessage::PitchBend { channel: 0, value: 8192 };

        assert_eq!(controls.apply(&bend), Some(OutboundMessage::Vibrato(-1)));

        controls.apply(&cc(CC_RUBAN, 127));
        match controls.apply(&bend) {
            Some(OutboundMessage::RibbonPitch(pitch)) => assert!((pitch - 24.0).abs() < 1e-3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ribbon_pitch_includes_octave_shift() {
        assert!((ribbon_pitch(0, 12) - -36.0).abs() < 1e-3);
    }

    #[test]
    fn test_notes_follow_octave_shift_and_mode() {
        let mut controls = PlayerControls::new([0; CHANNELS], [0; 3], -1, -12);
        let on = MidiMessage::NoteOn { channel: 0, note: 60, velocity: 90 };
        let off = MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 };

        assert_eq!(
            controls.apply(&on),
            Some(OutboundMessage::Key { note: 36, sounding: true })
        );
        assert_eq!(
            controls.apply(&off),
            Some(OutboundMessage::Key { note: 36, sounding: false })
        );

        controls.apply(&cc(CC_CLAQUEMENT, 0));
        assert_eq!(controls.apply(&off), None);
    }

    #[test]
    fn test_pressure_ignored() {
        let mut controls = controls();
        assert_eq!(
            controls.apply(&MidiMessage::ChannelPressure { channel: 0, pressure: 3 }),
            None
        );
    }
}
