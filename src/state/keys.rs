//! Keyboard note priority
//!
//! The instrument is monophonic with lowest-note priority: whatever else is
//! held, the lowest key sounds. Releasing every key keeps the last note
//! sounding in legato mode and silences it in claquement mode.

use crate::midi::MidiMessage;

/// MIDI note of the lowest key on the keyboard; `/key` numbers count from here
pub const KEYBOARD_BASE_NOTE: i32 = 36;

/// Note assumed before any key has been played (middle C)
pub const INITIAL_NOTE: u8 = 60;

/// Set of held MIDI notes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState(u128);

impl KeyState {
    pub fn set(&mut self, note: u8) {
        self.0 |= 1u128 << (note & 0x7F);
    }

    pub fn clear(&mut self, note: u8) {
        self.0 &= !(1u128 << (note & 0x7F));
    }

    pub fn is_held(&self, note: u8) -> bool {
        self.0 & (1u128 << (note & 0x7F)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest held note
    pub fn lowest(&self) -> Option<u8> {
        (self.0 != 0).then(|| self.0.trailing_zeros() as u8)
    }
}

/// Outcome of resolving the held keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A new lowest note starts sounding
    Press(u8),
    /// The sounding note stops (claquement only)
    Release(u8),
}

impl KeyEvent {
    pub fn note(&self) -> u8 {
        match self {
            KeyEvent::Press(note) | KeyEvent::Release(note) => *note,
        }
    }

    pub fn sounding(&self) -> bool {
        matches!(self, KeyEvent::Press(_))
    }

    /// Note number as sent in `/key`
    pub fn relative_note(&self) -> i32 {
        i32::from(self.note()) - KEYBOARD_BASE_NOTE
    }
}

/// Held keys plus the note the engine was last told about
#[derive(Debug, Clone)]
pub struct KeyTracker {
    keys: KeyState,
    last: u8,
    sounding: bool,
}

impl Default for KeyTracker {
    fn default() -> Self {
        Self {
            keys: KeyState::default(),
            last: INITIAL_NOTE,
            sounding: false,
        }
    }
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the held keys; true if the message was a note event
    pub fn apply(&mut self, message: &MidiMessage) -> bool {
        match *message {
            MidiMessage::NoteOn { note, .. } => {
                self.keys.set(note);
                true
            }
            MidiMessage::NoteOff { note, .. } => {
                self.keys.clear(note);
                true
            }
            _ => false,
        }
    }

    /// Decide what, if anything, the engine must hear about the held keys
    pub fn resolve(&mut self, claquement: bool) -> Option<KeyEvent> {
        match self.keys.lowest() {
            Some(note) if note != self.last || !self.sounding => {
                self.last = note;
                self.sounding = true;
                Some(KeyEvent::Press(note))
            }
            Some(_) => None,
            None if claquement && self.sounding => {
                self.sounding = false;
                Some(KeyEvent::Release(self.last))
            }
            None => None,
        }
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }
}
