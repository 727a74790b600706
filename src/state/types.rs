//! Console state types
//!
//! Plain data with the update rules of each control surface. Nothing in this
//! module touches hardware or sends messages; the console decides what to do
//! with the results.

use chrono::{DateTime, TimeZone};

use crate::config::OctaveLedMode;
use crate::drivers::mcp3008::CHANNELS;

// ── Analog transducers ─────────────────────────────────────────────────────

/// Touche (pressure key) usable range before inversion
pub const TOUCHE_MIN: u16 = 100;
pub const TOUCHE_MAX: u16 = 920;

/// Changes of this size or smaller are ADC noise
pub const ANALOG_HYSTERESIS: u16 = 1;

/// Map the raw touche reading so that pressing harder gives larger values
pub fn condition_touche(raw: u16) -> u16 {
    TOUCHE_MAX - raw.clamp(TOUCHE_MIN, TOUCHE_MAX)
}

/// Current values of the eight transducers and what was last sent for each
#[derive(Debug, Clone, Default)]
pub struct AnalogChannels {
    values: [u16; CHANNELS],
    last_sent: [Option<u16>; CHANNELS],
}

impl AnalogChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> [u16; CHANNELS] {
        self.values
    }

    /// Take a new set of samples; true when a snapshot should be sent
    ///
    /// Only channels that moved by more than the hysteresis update their
    /// last-sent value, so slow drift still accumulates into a change.
    pub fn update(&mut self, samples: [u16; CHANNELS]) -> bool {
        self.values = samples;
        let mut changed = false;
        for (sample, last) in samples.iter().zip(self.last_sent.iter_mut()) {
            let moved = match last {
                Some(previous) => sample.abs_diff(*previous) > ANALOG_HYSTERESIS,
                None => true,
            };
            if moved {
                *last = Some(*sample);
                changed = true;
            }
        }
        changed
    }

    /// Take values that were already sent by someone else (playback)
    pub fn adopt(&mut self, values: [u16; CHANNELS]) {
        self.values = values;
        self.last_sent = values.map(Some);
    }
}

// ── Switch banks ───────────────────────────────────────────────────────────

/// Bank 0: the "T" switch turns on every voice
pub const BANK0_T: u8 = 0x04;
/// Bank 0: Ondes, Creux, Gambe, Nasillard and Octaviant voices
pub const BANK0_VOICES: u8 = 0xF8;
/// Bank 1: petit Gambe voice
pub const BANK1_PETIT_GAMBE: u8 = 0x01;
/// Bank 1: ribbon (set) or keyboard (clear) pitch source
pub const BANK1_RUBAN: u8 = 0x04;
/// Bank 1: claquement (set) or legato (clear) keyboard mode
pub const BANK1_CLAQUEMENT: u8 = 0x08;
/// Bank 2: octave down button
pub const BANK2_OCTAVE_DOWN: u8 = 0x40;
/// Bank 2: octave up button
pub const BANK2_OCTAVE_UP: u8 = 0x80;
/// Bank 2 bits that reach the engine (transposition buttons)
pub const BANK2_SENT: u8 = 0x3F;

/// Banks as sent in `/sw`, with the "T" switch expanded
pub fn emitted_banks(banks: [u8; 3]) -> [u8; 3] {
    let [mut b0, mut b1, b2] = banks;
    if b0 & BANK0_T != 0 {
        b0 |= BANK0_VOICES;
        b1 |= BANK1_PETIT_GAMBE;
    }
    [b0, b1, b2 & BANK2_SENT]
}

/// The three scanned switch banks, pressed = 1
#[derive(Debug, Clone, Default)]
pub struct SwitchBanks {
    current: [u8; 3],
    force_resend: bool,
}

impl SwitchBanks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn banks(&self) -> [u8; 3] {
        self.current
    }

    /// Store a scan; true when it differs from the previous one or a
    /// re-send was requested
    pub fn update(&mut self, scanned: [u8; 3]) -> bool {
        let changed = scanned != self.current || self.force_resend;
        self.current = scanned;
        self.force_resend = false;
        changed
    }

    /// Report the next scan as changed even if it is not
    pub fn force_resend(&mut self) {
        self.force_resend = true;
    }

    pub fn claquement(&self) -> bool {
        self.current[1] & BANK1_CLAQUEMENT != 0
    }

    pub fn emitted(&self) -> [u8; 3] {
        emitted_banks(self.current)
    }

    /// Banks re-sent on a refresh request (vibrato switch bit dropped)
    pub fn refresh_view(&self) -> [u8; 3] {
        [self.current[0] & 0xFE, self.current[1], self.current[2] & BANK2_SENT]
    }
}

// ── Octave shift ───────────────────────────────────────────────────────────

pub const OCTAVE_MIN: i32 = -24;
pub const OCTAVE_MAX: i32 = 12;
pub const OCTAVE_STEP: i32 = 12;

/// Octave marker LED field for a shift: all six markers red with the pair
/// for the selected octave flipped
pub fn octave_markers(shift: i32) -> u16 {
    0x0555 ^ (3 << (4 + shift / 6))
}

/// Octave shift with edge-triggered buttons
#[derive(Debug, Clone, Default)]
pub struct OctaveShift {
    semitones: i32,
    down_held: bool,
    up_held: bool,
}

impl OctaveShift {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }

    pub fn markers(&self) -> u16 {
        octave_markers(self.semitones)
    }

    /// Apply the octave buttons in bank 2
    ///
    /// Returns the shift after each newly pressed button, in the order down
    /// then up. A press at the end of the range still reports the
    /// (unchanged) shift.
    pub fn apply_buttons(&mut self, bank2: u8) -> Vec<i32> {
        let mut presses = Vec::new();

        let down = bank2 & BANK2_OCTAVE_DOWN != 0;
        if down && !self.down_held {
            self.semitones = (self.semitones - OCTAVE_STEP).max(OCTAVE_MIN);
            presses.push(self.semitones);
        }
        self.down_held = down;

        let up = bank2 & BANK2_OCTAVE_UP != 0;
        if up && !self.up_held {
            self.semitones = (self.semitones + OCTAVE_STEP).min(OCTAVE_MAX);
            presses.push(self.semitones);
        }
        self.up_held = up;

        presses
    }
}

// ── LEDs ───────────────────────────────────────────────────────────────────

/// LED colour code for each `/led` colour index
pub const COLOUR_CODES: [u16; 8] = [0, 1, 3, 2, 6, 4, 5, 7];

/// Octave markers at power-up (no shift)
pub const INITIAL_MARKERS: u16 = 0x0565;

/// Touche colour LED bits of the mask
const TOUCHE_BITS: u16 = 0xF000;
/// Octave marker bits of the mask
const MARKER_BITS: u16 = 0x0FFF;

/// What the shift registers should display
#[derive(Debug, Clone)]
pub struct LedState {
    colour_index: u8,
    markers: u16,
    mask: u16,
}

impl Default for LedState {
    fn default() -> Self {
        Self {
            colour_index: 0,
            markers: INITIAL_MARKERS,
            mask: 0xFFFF,
        }
    }
}

impl LedState {
    pub fn new(touche: bool, octave_mode: OctaveLedMode) -> Self {
        let mut leds = Self::default();
        leds.set_octave_mode(octave_mode);
        leds.set_touche(touche);
        leds
    }

    /// `(colour << 12) | markers`
    pub fn pattern(&self) -> u16 {
        (COLOUR_CODES[usize::from(self.colour_index)] << 12) | self.markers
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn colour_index(&self) -> u8 {
        self.colour_index
    }

    /// Select a colour; false (and no change) when the index is out of range
    pub fn set_colour(&mut self, index: u8) -> bool {
        if usize::from(index) >= COLOUR_CODES.len() {
            return false;
        }
        self.colour_index = index;
        true
    }

    pub fn set_markers(&mut self, markers: u16) {
        self.markers = markers;
    }

    pub fn set_octave_mode(&mut self, mode: OctaveLedMode) {
        match mode {
            OctaveLedMode::Off => self.mask &= TOUCHE_BITS,
            OctaveLedMode::All => self.mask |= MARKER_BITS,
            OctaveLedMode::MiddleC => {
                self.mask |= MARKER_BITS;
                self.mask &= 0xFAAA;
            }
            OctaveLedMode::ShiftedOnly => {
                self.mask |= MARKER_BITS;
                self.mask &= 0xFA8A;
            }
        }
    }

    pub fn set_touche(&mut self, on: bool) {
        if on {
            self.mask |= TOUCHE_BITS;
        } else {
            self.mask &= MARKER_BITS;
        }
    }
}

// ── Recording ──────────────────────────────────────────────────────────────

/// Recording session identifier, `YYMMDDhhmmss` in local time
pub fn session_id<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%y%m%d%H%M%S").to_string()
}

/// Whether the engine is recording, and under which session
#[derive(Debug, Clone, Default)]
pub struct RecordingState {
    session: Option<String>,
}

impl RecordingState {
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn start(&mut self, session: String) {
        self.session = Some(session);
    }

    /// End the session, returning its id if one was running
    pub fn stop(&mut self) -> Option<String> {
        self.session.take()
    }
}
