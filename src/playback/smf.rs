//! Standard MIDI File container
//!
//! Locates the `MThd` header and the `MTrk` chunks it declares, then decodes
//! every track up front so that a malformed file is rejected before any of
//! it is played.

use std::path::Path;

use tracing::debug;

use super::cursor::{ByteCursor, DecodeError};
use super::event::{decode_track, TimedEvent};
use super::PlaybackError;

/// The header must start within this many bytes of the file
pub const HEADER_SEARCH_LIMIT: usize = 200;

const HEADER_MARKER: &[u8; 4] = b"MThd";
const TRACK_MARKER: &[u8; 4] = b"MTrk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format: u16,
    pub tracks: u16,
    pub ticks_per_quarter: u16,
}

/// A parsed performance: its header and the events of each track
#[derive(Debug, Clone)]
pub struct Performance {
    header: Header,
    tracks: Vec<Vec<TimedEvent>>,
}

fn find_marker(data: &[u8], from: usize, until: usize, marker: &[u8; 4]) -> Option<usize> {
    let until = until.min(data.len());
    if from >= until {
        return None;
    }
    data[from..until]
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|offset| from + offset)
}

impl Performance {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let header_at = find_marker(data, 0, HEADER_SEARCH_LIMIT, HEADER_MARKER).ok_or(
            DecodeError::MissingHeader {
                searched: HEADER_SEARCH_LIMIT.min(data.len()),
            },
        )?;

        let mut cursor = ByteCursor::new(&data[header_at + HEADER_MARKER.len()..]);
        let header_len = cursor.read_u32()? as usize;
        let format = cursor.read_u16()?;
        let tracks = cursor.read_u16()?;
        let division = cursor.read_u16()?;

        if division & 0x8000 != 0 {
            return Err(DecodeError::SmpteDivision(division));
        }
        if division == 0 {
            return Err(DecodeError::ZeroDivision);
        }
        if tracks == 0 {
            return Err(DecodeError::NoTracks);
        }

        let header = Header {
            format,
            tracks,
            ticks_per_quarter: division,
        };

        let mut next = (header_at + HEADER_MARKER.len() + 4)
            .saturating_add(header_len)
            .min(data.len());
        let mut chunks = Vec::with_capacity(usize::from(tracks));
        for index in 0..usize::from(tracks) {
            let marker_at = find_marker(data, next, data.len(), TRACK_MARKER)
                .ok_or(DecodeError::MissingTrack { index })?;
            let mut cursor = ByteCursor::new(&data[marker_at + TRACK_MARKER.len()..]);
            let declared = cursor.read_u32()? as usize;

            let start = marker_at + TRACK_MARKER.len() + 4;
            let end = start.saturating_add(declared).min(data.len());
            if end - start < declared {
                debug!(
                    "Track {} declares {} bytes but only {} remain",
                    index,
                    declared,
                    end - start
                );
            }
            chunks.push(decode_track(&data[start..end])?);
            next = end;
        }

        debug!(
            "Performance: format {}, {} tracks, {} ticks per quarter",
            header.format, header.tracks, header.ticks_per_quarter
        );
        Ok(Self {
            header,
            tracks: chunks,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlaybackError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| PlaybackError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data).map_err(|source| PlaybackError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn header(&self) -> Header {
        self.header
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.header.ticks_per_quarter
    }

    pub fn tracks(&self) -> &[Vec<TimedEvent>] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::midi::MidiMessage;
    use crate::playback::event::TrackEvent;

    /// Assemble a file from a division and raw track bodies
    pub(crate) fn smf(ticks_per_quarter: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"MThd");
        data.extend_from_slice(&6u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
        data.extend_from_slice(&ticks_per_quarter.to_be_bytes());
        for track in tracks {
            data.extend_from_slice(b"MTrk");
            data.extend_from_slice(&(track.len() as u32).to_be_bytes());
            data.extend_from_slice(track);
        }
        data
    }

    const END: &[u8] = &[0x00, 0xFF, 0x2F, 0x00];

    #[test]
    fn test_parse_two_tracks() {
        let note = [0x00, 0x90, 0x3C, 0x64, 0x00, 0xFF, 0x2F, 0x00];
        let performance = Performance::parse(&smf(96, &[END, &note])).unwrap();

        assert_eq!(
            performance.header(),
            Header {
                format: 1,
                tracks: 2,
                ticks_per_quarter: 96
            }
        );
        let tracks = performance.tracks();
        assert_eq!(tracks[0], vec![TimedEvent::new(0, TrackEvent::EndOfTrack)]);
        assert_eq!(
            tracks[1][0],
            TimedEvent::new(
                0,
                TrackEvent::Channel(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 })
            )
        );
        assert_eq!(tracks[1].len(), 2);
    }

    #[test]
    fn test_header_found_after_leading_junk() {
        let mut data = vec![0u8; 128];
        data.extend(smf(480, &[END]));
        let performance = Performance::parse(&data).unwrap();
        assert_eq!(performance.ticks_per_quarter(), 480);
    }

    #[test]
    fn test_header_beyond_search_limit() {
        let mut data = vec![0u8; 256];
        data.extend(smf(96, &[END]));
        assert!(matches!(
            Performance::parse(&data),
            Err(DecodeError::MissingHeader { .. })
        ));
    }

    #[test]
    fn test_division_checks() {
        assert_eq!(
            Performance::parse(&smf(0xE728, &[END])).unwrap_err(),
            DecodeError::SmpteDivision(0xE728)
        );
        assert_eq!(
            Performance::parse(&smf(0, &[END])).unwrap_err(),
            DecodeError::ZeroDivision
        );
    }

    #[test]
    fn test_missing_declared_track() {
        let mut data = smf(96, &[END]);
        // Declare a second track that is not there
        data[11] = 2;
        assert_eq!(
            Performance::parse(&data).unwrap_err(),
            DecodeError::MissingTrack { index: 1 }
        );
    }

    #[test]
    fn test_oversized_header_length_runs_past_end() {
        let mut data = smf(96, &[END]);
        data[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(
            Performance::parse(&data).unwrap_err(),
            DecodeError::MissingTrack { index: 0 }
        );
    }

    #[test]
    fn test_zero_tracks_rejected() {
        assert_eq!(Performance::parse(&smf(96, &[])).unwrap_err(), DecodeError::NoTracks);
    }

    #[test]
    fn test_truncated_track_is_clipped() {
        let mut data = smf(96, &[&[0x00, 0x90, 0x3C, 0x64, 0x00, 0xFF, 0x2F, 0x00]]);
        data.truncate(data.len() - 4);
        let performance = Performance::parse(&data).unwrap();
        assert_eq!(performance.tracks()[0].len(), 1);
    }

    #[test]
    fn test_corrupt_track_rejected() {
        let data = smf(96, &[&[0x00, 0x3C, 0x64]]);
        assert!(matches!(
            Performance::parse(&data),
            Err(DecodeError::NoRunningStatus { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Performance::load("/nonexistent/take.mid"),
            Err(PlaybackError::Read { .. })
        ));
    }
}
