//! Ondes GW - bridge between the Ondes console hardware and its synthesis engine
//!
//! Samples the console's transducers, switch banks, accelerometer and MIDI
//! keyboard, turns their state into an OSC control stream for the Pure Data
//! patch, and can replay a Standard MIDI File through the same stream.

pub mod clock;
pub mod config;
pub mod console;
pub mod drivers;
pub mod midi;
pub mod osc;
pub mod paths;
pub mod playback;
pub mod sensing;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
