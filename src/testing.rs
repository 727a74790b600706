//! Test doubles for the hardware seams

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::drivers::adxl362::{self, Adxl362};
use crate::drivers::keyboard::KeyboardSource;
use crate::drivers::mcp23s08::{registers, Mcp23s08};
use crate::drivers::mcp3008::{Mcp3008, CHANNELS};
use crate::drivers::shift_register::{LedEncoder, LedPins};
use crate::drivers::{Frame, Level, PinIo, PinMode, SpiEndpoint, SpiTransfer};
use crate::midi::MidiMessage;
use crate::sensing::Peripherals;

type Responder = Box<dyn FnMut(&Frame) -> io::Result<Frame> + Send>;

struct SpiScript {
    responder: Responder,
    sent: Vec<Frame>,
    failures: usize,
}

/// SPI transport answering from a closure and logging every frame sent
///
/// Clones share the script and the log.
#[derive(Clone)]
pub struct ScriptedSpi {
    inner: Arc<Mutex<SpiScript>>,
}

impl ScriptedSpi {
    pub fn new(responder: impl FnMut(&Frame) -> io::Result<Frame> + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpiScript {
                responder: Box::new(responder),
                sent: Vec::new(),
                failures: 0,
            })),
        }
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.inner.lock().sent.clone()
    }

    /// Make the next `count` transfers fail
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().failures = count;
    }
}

impl SpiTransfer for ScriptedSpi {
    fn transfer(&mut self, tx: &Frame) -> io::Result<Frame> {
        let mut script = self.inner.lock();
        script.sent.push(*tx);
        if script.failures > 0 {
            script.failures -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "scripted failure"));
        }
        (script.responder)(tx)
    }
}

#[derive(Default)]
struct PinState {
    writes: Vec<(u8, Level)>,
    modes: HashMap<u8, PinMode>,
    outputs: HashMap<u8, Level>,
}

/// GPIO double that records writes; inputs always read high
#[derive(Default)]
pub struct FakePins {
    state: Mutex<PinState>,
}

impl FakePins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.state.lock().writes.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().writes.clear();
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.state.lock().modes.get(&pin).copied()
    }

    /// Level last driven on an output
    pub fn output(&self, pin: u8) -> Option<Level> {
        self.state.lock().outputs.get(&pin).copied()
    }
}

impl PinIo for FakePins {
    fn set_mode(&self, pin: u8, mode: PinMode) {
        self.state.lock().modes.insert(pin, mode);
    }

    fn write(&self, pin: u8, level: Level) {
        let mut state = self.state.lock();
        state.writes.push((pin, level));
        state.outputs.insert(pin, level);
    }

    fn read(&self, _pin: u8) -> Level {
        Level::High
    }
}

/// Keyboard fed by the test, one batch of messages per poll
#[derive(Clone, Default)]
pub struct FakeKeyboard {
    batches: Arc<Mutex<VecDeque<Vec<MidiMessage>>>>,
}

impl FakeKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue messages to be returned by one future poll
    pub fn push(&self, messages: Vec<MidiMessage>) {
        self.batches.lock().push_back(messages);
    }
}

impl KeyboardSource for FakeKeyboard {
    fn poll(&mut self, out: &mut Vec<MidiMessage>) {
        if let Some(batch) = self.batches.lock().pop_front() {
            out.extend(batch);
        }
    }
}

pub fn note_on(note: u8) -> MidiMessage {
    MidiMessage::NoteOn {
        channel: 0,
        note,
        velocity: 100,
    }
}

pub fn note_off(note: u8) -> MidiMessage {
    MidiMessage::NoteOff {
        channel: 0,
        note,
        velocity: 0,
    }
}

/// Rebuild the last word shifted into the LED registers from pin activity
pub fn latched_word(pins: &FakePins, lines: LedPins) -> u16 {
    let mut word = 0u16;
    let mut data = Level::Low;
    let mut last_clock = Level::Low;
    for (pin, level) in pins.writes() {
        if pin == lines.data {
            data = level;
        } else if pin == lines.clock {
            if last_clock == Level::Low && level == Level::High {
                word = (word << 1) | u16::from(data == Level::Low);
            }
            last_clock = level;
        }
    }
    word & 0x7FFF
}

#[derive(Default)]
struct Panel {
    samples: [u16; CHANNELS],
    /// Pressed switches per bank
    banks: [u8; 3],
    tilt: i8,
}

/// A whole console wired to fakes: ADC channels, switch banks behind the
/// bank select lines, accelerometer and keyboard
pub struct FakeHardware {
    pub pins: Arc<FakePins>,
    pub adc: ScriptedSpi,
    pub expander: ScriptedSpi,
    pub accelerometer: ScriptedSpi,
    pub keyboard: FakeKeyboard,
    pub bank_select: [u8; 3],
    pub led_pins: LedPins,
    panel: Arc<Mutex<Panel>>,
}

impl FakeHardware {
    pub fn new() -> Self {
        let pins = Arc::new(FakePins::new());
        let panel = Arc::new(Mutex::new(Panel::default()));
        let bank_select = [19, 20, 21];

        let adc = {
            let panel = panel.clone();
            ScriptedSpi::new(move |tx| {
                let sample = panel.lock().samples[usize::from((tx[1] >> 4) & 0x07)];
                Ok([0, (sample >> 8) as u8 & 0x03, sample as u8])
            })
        };

        let expander = {
            let panel = panel.clone();
            let pins = pins.clone();
            ScriptedSpi::new(move |tx| {
                if tx[0] & 0x01 == 0 || tx[1] != registers::GPIO {
                    return Ok([0; 3]);
                }
                let selected = bank_select
                    .iter()
                    .position(|&pin| pins.output(pin) == Some(Level::Low));
                let port = match selected {
                    Some(bank) => !panel.lock().banks[bank],
                    None => 0xFF,
                };
                Ok([0, 0, port])
            })
        };

        let accelerometer = {
            let panel = panel.clone();
            ScriptedSpi::new(move |tx| {
                if tx[0] == adxl362::CMD_READ && tx[1] == adxl362::REG_XDATA {
                    Ok([0, 0, panel.lock().tilt as u8])
                } else {
                    Ok([0; 3])
                }
            })
        };

        Self {
            pins,
            adc,
            expander,
            accelerometer,
            keyboard: FakeKeyboard::new(),
            bank_select,
            led_pins: LedPins {
                data: 27,
                latch: 22,
                clock: 23,
            },
            panel,
        }
    }

    pub fn set_samples(&self, samples: [u16; CHANNELS]) {
        self.panel.lock().samples = samples;
    }

    /// Switches held down, one byte per bank
    pub fn set_banks(&self, banks: [u8; 3]) {
        self.panel.lock().banks = banks;
    }

    pub fn set_tilt(&self, tilt: i8) {
        self.panel.lock().tilt = tilt;
    }

    pub fn peripherals(&self, clock: &dyn Clock) -> Peripherals {
        let pins: Arc<dyn PinIo> = self.pins.clone();
        Peripherals::from_parts(
            Mcp3008::new(SpiEndpoint::new("ADC", Box::new(self.adc.clone()))),
            Mcp23s08::new(SpiEndpoint::new("expander", Box::new(self.expander.clone())), 0),
            Adxl362::new(SpiEndpoint::new(
                "accelerometer",
                Box::new(self.accelerometer.clone()),
            )),
            pins.clone(),
            self.bank_select,
            LedEncoder::new(pins, self.led_pins),
            Box::new(self.keyboard.clone()),
            clock,
        )
    }
}
