//! Console state
//!
//! Everything the gateway knows about the instrument lives in one
//! [`ConsoleState`], owned by the main loop.

pub mod keys;
pub mod types;

pub use keys::{KeyEvent, KeyState, KeyTracker};
pub use types::{AnalogChannels, LedState, OctaveShift, RecordingState, SwitchBanks};

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct ConsoleState {
    pub analog: AnalogChannels,
    /// Last accelerometer (or replayed bend) value sent
    pub vibrato: i32,
    pub switches: SwitchBanks,
    pub octave: OctaveShift,
    pub keys: KeyTracker,
    pub leds: LedState,
    /// Reference pitch in Hz
    pub tuning: f32,
    pub recording: RecordingState,
}

impl ConsoleState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            analog: AnalogChannels::new(),
            vibrato: 0,
            switches: SwitchBanks::new(),
            octave: OctaveShift::new(),
            keys: KeyTracker::new(),
            leds: LedState::new(config.leds.touche, config.leds.octave_mode),
            tuning: config.tuning.reference_hz,
            recording: RecordingState::default(),
        }
    }
}
