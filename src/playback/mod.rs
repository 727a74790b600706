//! Stored-performance playback
//!
//! A Standard MIDI File is decoded in full ([`smf`], [`event`], [`cursor`]),
//! its channel events mapped onto the console's control stream ([`mapper`])
//! and dispatched in real time ([`scheduler`]).

pub mod cursor;
pub mod event;
pub mod mapper;
pub mod scheduler;
pub mod smf;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use cursor::DecodeError;
pub use event::{TimedEvent, TrackEvent};
pub use mapper::PlayerControls;
pub use scheduler::{PlaybackControl, PlaybackReport, Player, Tempo};
pub use smf::{Header, Performance};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a playable MIDI file: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}
