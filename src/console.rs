//! The console main loop
//!
//! [`Console`] is the single owner of the instrument state. It runs the
//! sensing cadences, applies requests forwarded by the OSC listener, and
//! switches into exclusive playback when asked to replay a performance.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::osc::{MessageSink, OutboundMessage, Request};
use crate::paths;
use crate::playback::{Performance, PlaybackReport, Player, PlayerControls};
use crate::sensing::{Cadence, Peripherals};
use crate::state::keys::KEYBOARD_BASE_NOTE;
use crate::state::types::{session_id, BANK2_SENT};
use crate::state::ConsoleState;

/// Argument of `/record` that ends a session
const RECORD_STOP: &str = "stop";

/// Messages that bring the engine up to date with the console
///
/// While a performance is playing its controls stand in for the live
/// transducers and switches.
fn refresh_messages(state: &ConsoleState, playing: Option<&PlayerControls>) -> Vec<OutboundMessage> {
    let (analog, vibrato, switches) = match playing {
        Some(controls) => {
            let [b0, b1, b2] = controls.switches;
            (controls.analog, controls.vibrato, [b0 & 0xFE, b1, b2 & BANK2_SENT])
        }
        None => (
            state.analog.values(),
            state.vibrato,
            state.switches.refresh_view(),
        ),
    };
    vec![
        OutboundMessage::Tuning(state.tuning),
        OutboundMessage::Key {
            note: i32::from(state.keys.last()) - KEYBOARD_BASE_NOTE,
            sounding: false,
        },
        OutboundMessage::Analog(analog),
        OutboundMessage::Vibrato(vibrato),
        OutboundMessage::Octave(state.octave.semitones()),
        OutboundMessage::Switches(switches),
    ]
}

fn apply_request(
    request: Request,
    state: &mut ConsoleState,
    hw: &Peripherals,
    sink: &dyn MessageSink,
    playing: Option<&PlayerControls>,
) {
    debug!("Request {:?}", request);
    match request {
        Request::SetLedColour(index) => {
            if state.leds.set_colour(index) {
                hw.render_leds(state);
            } else {
                warn!("No LED colour {}", index);
            }
        }
        Request::Refresh => {
            for message in refresh_messages(state, playing) {
                sink.send(&message);
            }
        }
    }
}

pub struct Console {
    state: ConsoleState,
    hw: Peripherals,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    requests: Receiver<Request>,
    shutdown: Arc<AtomicBool>,
    analog_cadence: Cadence,
    switch_cadence: Cadence,
    refresh_iterations: u32,
    iterations_since_render: u32,
    loop_pause: Duration,
    midi_dir: PathBuf,
}

impl Console {
    pub fn new(
        config: &AppConfig,
        hw: Peripherals,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        requests: Receiver<Request>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let now = clock.now_millis();
        Self {
            state: ConsoleState::new(config),
            hw,
            sink,
            analog_cadence: Cadence::new(config.timing.analog_interval_ms, now),
            switch_cadence: Cadence::new(config.timing.switch_interval_ms, now),
            clock,
            requests,
            shutdown,
            refresh_iterations: config.timing.led_refresh_iterations,
            iterations_since_render: 0,
            loop_pause: Duration::from_millis(config.timing.loop_pause_ms),
            midi_dir: config.playback.midi_dir.clone(),
        }
    }

    pub fn state(&self) -> &ConsoleState {
        &self.state
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Blank the LEDs, then show the initial pattern and announce the tuning
    pub fn start(&mut self) {
        self.hw.clear_leds();
        self.render_leds();
        self.sink.send(&OutboundMessage::Tuning(self.state.tuning));
        info!("Console started (tuning {} Hz)", self.state.tuning);
    }

    /// One loop iteration: requests, then whichever cadences are due
    pub fn tick(&mut self) {
        self.service_requests();

        let now = self.clock.now_millis();
        if self.analog_cadence.due(now) {
            self.hw.analog_cycle(&mut self.state, self.sink.as_ref());
        }
        if self.switch_cadence.due(now) {
            if self.hw.switch_cycle(&mut self.state, self.sink.as_ref()) {
                self.iterations_since_render = 0;
            }
            self.hw.keyboard_cycle(&mut self.state, self.sink.as_ref());
        }

        self.iterations_since_render += 1;
        if self.iterations_since_render >= self.refresh_iterations {
            self.render_leds();
        }
    }

    /// Loop until the shutdown flag is raised, then close
    pub fn run(&mut self) {
        info!("Entering main loop");
        while !self.is_shutting_down() {
            self.tick();
            self.clock.sleep(self.loop_pause);
        }
        self.close();
    }

    pub fn service_requests(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            apply_request(request, &mut self.state, &self.hw, self.sink.as_ref(), None);
        }
    }

    pub fn render_leds(&mut self) {
        self.hw.render_leds(&self.state);
        self.iterations_since_render = 0;
    }

    /// Start a recording session named after the current local time
    pub fn start_recording(&mut self) {
        if let Some(session) = self.state.recording.session() {
            debug!("Already recording session {}", session);
            return;
        }
        let session = session_id(&Local::now());
        info!("Recording session {}", session);
        self.sink.send(&OutboundMessage::Record(session.clone()));
        self.state.recording.start(session);
        self.render_leds();
    }

    pub fn stop_recording(&mut self) {
        if let Some(session) = self.state.recording.stop() {
            info!("Recording session {} stopped", session);
            self.sink.send(&OutboundMessage::Record(RECORD_STOP.to_string()));
            self.render_leds();
        }
    }

    pub fn toggle_recording(&mut self) {
        if self.state.recording.is_active() {
            self.stop_recording();
        } else {
            self.start_recording();
        }
    }

    /// Replay a performance file through the control stream
    ///
    /// Relative names are looked up in the MIDI directory. Sensing is
    /// suspended until the performance ends or shutdown is requested.
    pub fn play_file(&mut self, name: impl AsRef<Path>) -> Result<PlaybackReport> {
        let path = paths::resolve_performance(&self.midi_dir, name.as_ref());
        let performance = Performance::load(&path)?;
        info!(
            "Playing {} ({} tracks, {} ticks per quarter)",
            path.display(),
            performance.track_count(),
            performance.ticks_per_quarter()
        );

        let controls = PlayerControls::new(
            self.state.analog.values(),
            self.state.switches.banks(),
            self.state.vibrato,
            self.state.octave.semitones(),
        );

        let report = {
            let state = &mut self.state;
            let hw = &self.hw;
            let requests = &self.requests;
            let shutdown = &self.shutdown;
            let sink = self.sink.as_ref();
            let mut control = |controls: &PlayerControls| {
                while let Ok(request) = requests.try_recv() {
                    apply_request(request, state, hw, sink, Some(controls));
                }
                if shutdown.load(Ordering::Relaxed) {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            };
            Player::new(&performance, controls).run(&mut control, sink, self.clock.as_ref())
        };

        self.stop_recording();
        self.state.analog.adopt(report.controls.analog);
        self.state.vibrato = report.controls.vibrato;
        self.state.switches.force_resend();
        let now = self.clock.now_millis();
        self.analog_cadence.reset(now);
        self.switch_cadence.reset(now);

        Ok(report)
    }

    /// Tell the engine to quit and leave the LEDs dark
    pub fn close(&mut self) {
        self.stop_recording();
        self.sink.send(&OutboundMessage::Shutdown(1));
        self.hw.clear_leds();
        info!("Console closed");
    }
}
