//! Track event decoding

use super::cursor::{ByteCursor, DecodeError};
use crate::midi::{data_len, MidiMessage};

const META: u8 = 0xFF;
const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

/// One decoded track event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    Channel(MidiMessage),
    /// Microseconds per quarter note
    Tempo(u32),
    EndOfTrack,
    /// SysEx and meta events with no effect on playback
    Skipped,
}

/// An event and the ticks since the previous event of its track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub delta: u32,
    pub event: TrackEvent,
}

impl TimedEvent {
    pub fn new(delta: u32, event: TrackEvent) -> Self {
        Self { delta, event }
    }
}

/// Reads one track's events in order
#[derive(Debug, Clone)]
pub struct TrackReader<'a> {
    cursor: ByteCursor<'a>,
    running_status: Option<u8>,
    ended: bool,
}

impl<'a> TrackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            running_status: None,
            ended: false,
        }
    }

    /// Next delta time and event, `None` once the track has ended
    ///
    /// A track that runs out of data without an end-of-track event ends
    /// there.
    pub fn next_event(&mut self) -> Result<Option<TimedEvent>, DecodeError> {
        if self.ended || self.cursor.is_empty() {
            self.ended = true;
            return Ok(None);
        }
        let delta = self.cursor.read_vlq()?;
        let event = self.decode_event()?;
        if event == TrackEvent::EndOfTrack {
            self.ended = true;
        }
        Ok(Some(TimedEvent::new(delta, event)))
    }

    fn decode_event(&mut self) -> Result<TrackEvent, DecodeError> {
        let offset = self.cursor.position();
        let first = self.cursor.peek_u8()?;

        let status = if first & 0x80 != 0 {
            self.cursor.read_u8()?;
            first
        } else {
            self.running_status.ok_or(DecodeError::NoRunningStatus {
                offset,
                byte: first,
            })?
        };

        match status {
            META => {
                self.running_status = None;
                let kind = self.cursor.read_u8()?;
                let len = self.cursor.read_vlq()? as usize;
                let body = self.cursor.read_bytes(len)?;
                Ok(match kind {
                    META_END_OF_TRACK => TrackEvent::EndOfTrack,
                    META_TEMPO if body.len() >= 3 => TrackEvent::Tempo(
                        (u32::from(body[0]) << 16) | (u32::from(body[1]) << 8) | u32::from(body[2]),
                    ),
                    _ => TrackEvent::Skipped,
                })
            }
            SYSEX | SYSEX_ESCAPE => {
                self.running_status = None;
                let len = self.cursor.read_vlq()? as usize;
                self.cursor.skip(len)?;
                Ok(TrackEvent::Skipped)
            }
            0x80..=0xEF => {
                self.running_status = Some(status);
                let len = data_len(status).unwrap_or(0);
                let data = self.cursor.read_bytes(len)?;
                let mut frame = [status, 0, 0];
                frame[1..=len].copy_from_slice(data);
                Ok(MidiMessage::parse(&frame[..=len])
                    .map(TrackEvent::Channel)
                    .unwrap_or(TrackEvent::Skipped))
            }
            byte => Err(DecodeError::UnexpectedStatus { offset, byte }),
        }
    }
}

/// Decode a whole track
pub fn decode_track(data: &[u8]) -> Result<Vec<TimedEvent>, DecodeError> {
    let mut reader = TrackReader::new(data);
    let mut events = Vec::new();
    while let Some(event) = reader.next_event()? {
        events.push(event);
    }
    Ok(events)
}
