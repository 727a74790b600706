//! Sensor polling pipeline
//!
//! [`Peripherals`] owns every device handle. Each cycle reads one group of
//! sensors, folds the readings into the [`ConsoleState`] and sends whatever
//! changed. Timing is the console's business (see [`Cadence`]).

pub mod cadence;

pub use cadence::Cadence;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::drivers::keyboard::KeyboardSource;
use crate::drivers::{
    open_keyboard, Adxl362, GpioRegisters, Level, LedEncoder, Mcp23s08, Mcp3008, PinIo, PinMode,
    SpiDevice, SpiEndpoint,
};
use crate::midi::MidiMessage;
use crate::osc::{MessageSink, OutboundMessage};
use crate::state::types::{condition_touche, octave_markers};
use crate::state::ConsoleState;

/// Analog channel carrying the touche
const TOUCHE_CHANNEL: usize = 0;

pub struct Peripherals {
    adc: Mcp3008,
    expander: Mcp23s08,
    accelerometer: Adxl362,
    pins: Arc<dyn PinIo>,
    bank_select: [u8; 3],
    leds: LedEncoder,
    keyboard: Box<dyn KeyboardSource>,
    midi_buffer: Vec<MidiMessage>,
}

fn open_spi(config: &AppConfig, name: &'static str, path: &std::path::Path) -> Result<SpiEndpoint> {
    let device = SpiDevice::open(path, &config.spi)
        .with_context(|| format!("{} unavailable on {}", name, path.display()))?;
    Ok(SpiEndpoint::new(name, Box::new(device)))
}

impl Peripherals {
    /// Open and initialise the console hardware
    ///
    /// The register block and the three SPI devices are required; the
    /// keyboard is optional and falls back to silence.
    pub fn open(config: &AppConfig, clock: &dyn Clock) -> Result<Self> {
        let gpio = GpioRegisters::open(&config.gpio.device)
            .context("GPIO register block unavailable")?;
        let pins: Arc<dyn PinIo> = Arc::new(gpio);

        let adc = Mcp3008::new(open_spi(config, "ADC", &config.spi.adc_device)?);
        let expander = Mcp23s08::new(
            open_spi(config, "expander", &config.spi.expander_device)?,
            config.spi.expander_address,
        );
        let accelerometer =
            Adxl362::new(open_spi(config, "accelerometer", &config.spi.accelerometer_device)?);
        let leds = LedEncoder::new(pins.clone(), config.gpio.led_pins());
        let keyboard = open_keyboard(&config.keyboard);

        info!("Console hardware opened");
        Ok(Self::from_parts(
            adc,
            expander,
            accelerometer,
            pins,
            config.gpio.bank_select,
            leds,
            keyboard,
            clock,
        ))
    }

    /// Assemble from already opened devices and initialise them
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        adc: Mcp3008,
        mut expander: Mcp23s08,
        mut accelerometer: Adxl362,
        pins: Arc<dyn PinIo>,
        bank_select: [u8; 3],
        leds: LedEncoder,
        keyboard: Box<dyn KeyboardSource>,
        clock: &dyn Clock,
    ) -> Self {
        for pin in bank_select {
            pins.set_mode(pin, PinMode::Output);
            pins.write(pin, Level::High);
        }
        expander.init();
        accelerometer.init(clock);

        Self {
            adc,
            expander,
            accelerometer,
            pins,
            bank_select,
            leds,
            keyboard,
            midi_buffer: Vec::with_capacity(16),
        }
    }

    /// Transducers and accelerometer
    ///
    /// The analog snapshot goes out only when a channel moved; the
    /// accelerometer is sent every time.
    pub fn analog_cycle(&mut self, state: &mut ConsoleState, sink: &dyn MessageSink) {
        let mut samples = self.adc.read_all();
        samples[TOUCHE_CHANNEL] = condition_touche(samples[TOUCHE_CHANNEL]);
        if state.analog.update(samples) {
            sink.send(&OutboundMessage::Analog(state.analog.values()));
        }

        state.vibrato = i32::from(self.accelerometer.read_x());
        sink.send(&OutboundMessage::Vibrato(state.vibrato));
    }

    /// Read the three switch banks, pressed = 1
    pub fn scan_switches(&mut self) -> [u8; 3] {
        let mut banks = [0u8; 3];
        for (bank, &select) in banks.iter_mut().zip(self.bank_select.iter()) {
            self.pins.write(select, Level::Low);
            *bank = !self.expander.read_port();
            self.pins.write(select, Level::High);
        }
        banks
    }

    /// Switch banks and octave buttons; true when the LEDs were redrawn
    pub fn switch_cycle(&mut self, state: &mut ConsoleState, sink: &dyn MessageSink) -> bool {
        let scanned = self.scan_switches();
        if !state.switches.update(scanned) {
            return false;
        }
        sink.send(&OutboundMessage::Switches(state.switches.emitted()));

        let presses = state.octave.apply_buttons(scanned[2]);
        for &shift in &presses {
            debug!("Octave shift {}", shift);
            state.leds.set_markers(octave_markers(shift));
            sink.send(&OutboundMessage::Octave(shift));
        }
        if presses.is_empty() {
            return false;
        }
        self.render_leds(state);
        true
    }

    /// Drain the keyboard and report the lowest held note
    pub fn keyboard_cycle(&mut self, state: &mut ConsoleState, sink: &dyn MessageSink) {
        self.midi_buffer.clear();
        self.keyboard.poll(&mut self.midi_buffer);

        let mut notes_changed = false;
        for message in &self.midi_buffer {
            notes_changed |= state.keys.apply(message);
        }
        if !notes_changed {
            return;
        }
        if let Some(event) = state.keys.resolve(state.switches.claquement()) {
            sink.send(&OutboundMessage::Key {
                note: event.relative_note(),
                sounding: event.sounding(),
            });
        }
    }

    pub fn render_leds(&self, state: &ConsoleState) {
        self.leds
            .render(state.leds.pattern(), state.leds.mask(), state.recording.is_active());
    }

    pub fn clear_leds(&self) {
        self.leds.clear();
    }
}
