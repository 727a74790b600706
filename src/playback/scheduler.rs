//! Real-time playback of a decoded performance
//!
//! Events due at the same tick are dispatched together, then the player
//! waits for the smallest remaining delta across live tracks. Deadlines are
//! absolute: each one is the previous deadline plus the converted delta, so
//! time spent dispatching never accumulates as drift.

use std::ops::ControlFlow;
use std::time::Duration;

use tracing::{debug, info};

use super::event::{TimedEvent, TrackEvent};
use super::mapper::PlayerControls;
use super::smf::Performance;
use crate::clock::Clock;
use crate::osc::MessageSink;

/// Tempo in effect until the performance sets one
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Longest stretch of a wait without polling the control hook
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo {
    pub micros_per_quarter: u32,
    pub ticks_per_quarter: u16,
}

impl Tempo {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            ticks_per_quarter,
        }
    }

    pub fn ticks_to_micros(&self, ticks: u64) -> u64 {
        ticks * u64::from(self.micros_per_quarter) / u64::from(self.ticks_per_quarter.max(1))
    }
}

/// Hook polled at every dispatch point and while waiting
///
/// Returning `Break` stops playback.
pub trait PlaybackControl {
    fn poll(&mut self, controls: &PlayerControls) -> ControlFlow<()>;
}

impl<F> PlaybackControl for F
where
    F: FnMut(&PlayerControls) -> ControlFlow<()>,
{
    fn poll(&mut self, controls: &PlayerControls) -> ControlFlow<()> {
        self(controls)
    }
}

/// How a playback ended
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    /// Events dispatched (including skipped and tempo events)
    pub events: usize,
    pub cancelled: bool,
    /// Controls as the performance left them
    pub controls: PlayerControls,
}

struct TrackState<'a> {
    events: &'a [TimedEvent],
    next: usize,
    remaining: u64,
    ended: bool,
}

impl<'a> TrackState<'a> {
    fn new(events: &'a [TimedEvent]) -> Self {
        let mut track = Self {
            events,
            next: 0,
            remaining: 0,
            ended: false,
        };
        track.load_delta();
        track
    }

    fn load_delta(&mut self) {
        match self.events.get(self.next) {
            Some(event) => self.remaining = u64::from(event.delta),
            None => self.ended = true,
        }
    }

    fn is_due(&self) -> bool {
        !self.ended && self.remaining == 0
    }

    fn take(&mut self) -> TrackEvent {
        let event = self.events[self.next].event;
        self.next += 1;
        if event == TrackEvent::EndOfTrack {
            self.ended = true;
        } else {
            self.load_delta();
        }
        event
    }
}

pub struct Player<'a> {
    tracks: Vec<TrackState<'a>>,
    tempo: Tempo,
    controls: PlayerControls,
    dispatched: usize,
}

impl<'a> Player<'a> {
    pub fn new(performance: &'a Performance, controls: PlayerControls) -> Self {
        Self {
            tracks: performance
                .tracks()
                .iter()
                .map(|events| TrackState::new(events))
                .collect(),
            tempo: Tempo::new(performance.ticks_per_quarter()),
            controls,
            dispatched: 0,
        }
    }

    fn finished(&self) -> bool {
        self.tracks.iter().all(|t| t.ended)
    }

    fn dispatch_due(&mut self, sink: &dyn MessageSink) {
        for index in 0..self.tracks.len() {
            while self.tracks[index].is_due() {
                let event = self.tracks[index].take();
                self.dispatched += 1;
                match event {
                    TrackEvent::Channel(message) => {
                        if let Some(out) = self.controls.apply(&message) {
                            sink.send(&out);
                        }
                    }
                    TrackEvent::Tempo(micros) => {
                        debug!("Tempo {} us per quarter", micros);
                        self.tempo.micros_per_quarter = micros;
                    }
                    TrackEvent::EndOfTrack => debug!("Track {} ended", index),
                    TrackEvent::Skipped => {}
                }
            }
        }
    }

    /// Wait until `deadline`, polling `control`; false if cancelled
    fn wait_until(
        &self,
        deadline: u64,
        control: &mut dyn PlaybackControl,
        clock: &dyn Clock,
    ) -> bool {
        loop {
            let now = clock.now_micros();
            if now >= deadline {
                return true;
            }
            if control.poll(&self.controls).is_break() {
                return false;
            }
            let remaining = Duration::from_micros(deadline - now);
            clock.pause(remaining.min(POLL_INTERVAL));
        }
    }

    /// Play to the end (or until `control` cancels)
    pub fn run(
        mut self,
        control: &mut dyn PlaybackControl,
        sink: &dyn MessageSink,
        clock: &dyn Clock,
    ) -> PlaybackReport {
        let mut deadline = clock.now_micros();
        let mut cancelled = false;

        loop {
            self.dispatch_due(sink);
            if self.finished() {
                break;
            }
            if control.poll(&self.controls).is_break() {
                cancelled = true;
                break;
            }

            let step = self
                .tracks
                .iter()
                .filter(|t| !t.ended)
                .map(|t| t.remaining)
                .min()
                .unwrap_or(0);
            deadline += self.tempo.ticks_to_micros(step);

            if !self.wait_until(deadline, control, clock) {
                cancelled = true;
                break;
            }
            for track in self.tracks.iter_mut().filter(|t| !t.ended) {
                track.remaining -= step;
            }
        }

        info!(
            "Playback {} after {} events",
            if cancelled { "cancelled" } else { "finished" },
            self.dispatched
        );
        PlaybackReport {
            events: self.dispatched,
            cancelled,
            controls: self.controls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::drivers::mcp3008::CHANNELS;
    use crate::osc::{MemorySink, OutboundMessage};
    use crate::playback::smf::tests::smf;
    use std::sync::Arc;

    fn controls() -> PlayerControls {
        PlayerControls::new([0; CHANNELS], [0; 3], -1, 0)
    }

    fn play(data: &[u8]) -> (Vec<(u64, OutboundMessage)>, PlaybackReport) {
        let performance = Performance::parse(data).unwrap();
        let clock = VirtualClock::new();
        let sink = MemorySink::with_clock(Arc::new(clock.clone()));
        let mut keep_going = |_: &PlayerControls| ControlFlow::Continue(());
        let report = Player::new(&performance, controls()).run(&mut keep_going, &sink, &clock);
        (sink.timed(), report)
    }

    #[test]
    fn test_ticks_to_micros() {
        let mut tempo = Tempo::new(96);
        assert_eq!(tempo.micros_per_quarter, 500_000);
        assert_eq!(tempo.ticks_to_micros(48), 250_000);
        assert_eq!(tempo.ticks_to_micros(96), 500_000);
        tempo.micros_per_quarter = 250_000;
        assert_eq!(tempo.ticks_to_micros(48), 125_000);
        assert_eq!(Tempo::new(480).ticks_to_micros(1), 1041);
    }

    #[test]
    fn test_events_land_on_absolute_deadlines() {
        // Four quarter notes at 120 bpm, 96 ticks per quarter
        let track = [
            0x00, 0x90, 0x30, 0x64, //
            0x60, 0x90, 0x32, 0x64, //
            0x60, 0x90, 0x34, 0x64, //
            0x60, 0x90, 0x35, 0x64, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let (messages, report) = play(&smf(96, &[&track]));

        let times: Vec<u64> = messages.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0, 500_000, 1_000_000, 1_500_000]);
        assert_eq!(report.events, 5);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_tracks_interleave_by_smallest_delta() {
        let a = [0x00, 0x90, 0x30, 0x64, 0x60, 0x90, 0x32, 0x64, 0x00, 0xFF, 0x2F, 0x00];
        let b = [0x30, 0x90, 0x31, 0x64, 0x00, 0xFF, 0x2F, 0x00];
        let (messages, _) = play(&smf(96, &[&a, &b]));

        let notes: Vec<(u64, i32)> = messages
            .iter()
            .map(|(t, m)| match m {
                OutboundMessage::Key { note, .. } => (*t, *note),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(notes, vec![(0, 12), (250_000, 13), (500_000, 14)]);
    }

    #[test]
    fn test_tempo_change_applies_to_following_waits() {
        let track = [
            0x00, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // 250000
            0x60, 0x90, 0x3C, 0x64, //
            0x60, 0x80, 0x3C, 0x40, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let (messages, _) = play(&smf(96, &[&track]));
        assert_eq!(
            messages,
            vec![
                (250_000, OutboundMessage::Key { note: 24, sounding: true }),
                (500_000, OutboundMessage::Key { note: 24, sounding: false }),
            ]
        );
    }

    #[test]
    fn test_cancel_stops_playback() {
        let track = [0x00, 0x90, 0x30, 0x64, 0x83, 0x60, 0x90, 0x32, 0x64, 0x00, 0xFF, 0x2F, 0x00];
        let performance = Performance::parse(&smf(96, &[&track])).unwrap();
        let clock = VirtualClock::new();
        let sink = MemorySink::new();

        let mut polls = 0;
        let mut cancel_third = |_: &PlayerControls| {
            polls += 1;
            if polls == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let report = Player::new(&performance, controls()).run(&mut cancel_third, &sink, &clock);

        assert!(report.cancelled);
        assert_eq!(sink.messages().len(), 1);
        assert!(clock.now_micros() < 2_000_000);
    }

    #[test]
    fn test_report_carries_final_controls() {
        let track = [0x00, 0xB0, 0x53, 0x10, 0x00, 0xB0, 0x51, 0x7F, 0x00, 0xFF, 0x2F, 0x00];
        let (_, report) = play(&smf(96, &[&track]));
        assert_eq!(report.controls.analog[7], 0x80);
        assert!(report.controls.ruban());
    }
}
