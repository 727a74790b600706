//! MIDI keyboard input
//!
//! The keyboard is optional. It is read either from a raw ALSA MIDI device
//! node opened non-blocking, or through a midir input port whose callback
//! buffers bytes for the polling loop. Either way the loop drains whatever
//! has arrived once per switch cycle and never waits.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::KeyboardConfig;
use crate::midi::{find_port_by_substring, format_hex, MidiMessage, MidiStreamDecoder};

/// Source of live keyboard messages
pub trait KeyboardSource: Send {
    /// Append every message completed since the last poll to `out`
    fn poll(&mut self, out: &mut Vec<MidiMessage>);
}

/// Stand-in when no keyboard is connected
pub struct NoKeyboard;

impl KeyboardSource for NoKeyboard {
    fn poll(&mut self, _out: &mut Vec<MidiMessage>) {}
}

/// Raw MIDI device node such as `/dev/snd/midiC1D0`
pub struct RawMidiDevice {
    file: File,
    path: PathBuf,
    decoder: MidiStreamDecoder,
    failed: bool,
}

impl RawMidiDevice {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            decoder: MidiStreamDecoder::new(),
            failed: false,
        })
    }
}

impl KeyboardSource for RawMidiDevice {
    fn poll(&mut self, out: &mut Vec<MidiMessage>) {
        let mut buf = [0u8; 64];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    debug!("Keyboard RX: {}", format_hex(&buf[..n]));
                    self.decoder.feed(&buf[..n], out);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Report once; an unplugged keyboard keeps failing every cycle
                    if !self.failed {
                        warn!("Keyboard read from {} failed: {}", self.path.display(), e);
                        self.failed = true;
                    }
                    break;
                }
            }
        }
    }
}

/// Keyboard reached through a midir input port
pub struct PortKeyboard {
    // Held to keep the callback alive
    _connection: midir::MidiInputConnection<()>,
    pending: Arc<Mutex<Vec<u8>>>,
    decoder: MidiStreamDecoder,
}

impl PortKeyboard {
    /// Connect to the first input port whose name contains `pattern`
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_in = midir::MidiInput::new("Ondes-GW-Keyboard")?;

        let port = find_port_by_substring(&midi_in, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;
        let port_name = midi_in.port_name(&port).unwrap_or_else(|_| pattern.to_string());

        let pending = Arc::new(Mutex::new(Vec::new()));
        let buffer = pending.clone();

        let connection = midi_in
            .connect(
                &port,
                "ondes-gw-keyboard",
                move |_timestamp, data, _| {
                    buffer.lock().extend_from_slice(data);
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to '{}': {}", port_name, e))?;

        info!("Keyboard connected on MIDI port '{}'", port_name);
        Ok(Self {
            _connection: connection,
            pending,
            decoder: MidiStreamDecoder::new(),
        })
    }
}

impl KeyboardSource for PortKeyboard {
    fn poll(&mut self, out: &mut Vec<MidiMessage>) {
        let bytes = std::mem::take(&mut *self.pending.lock());
        if !bytes.is_empty() {
            debug!("Keyboard RX: {}", format_hex(&bytes));
            self.decoder.feed(&bytes, out);
        }
    }
}

/// Open the configured keyboard, falling back to [`NoKeyboard`]
pub fn open_keyboard(config: &KeyboardConfig) -> Box<dyn KeyboardSource> {
    if !config.enabled {
        info!("Keyboard disabled in configuration");
        return Box::new(NoKeyboard);
    }

    if let Some(pattern) = &config.port {
        return match PortKeyboard::connect(pattern) {
            Ok(keyboard) => Box::new(keyboard),
            Err(e) => {
                warn!("Keyboard unavailable: {:#}", e);
                Box::new(NoKeyboard)
            }
        };
    }

    match RawMidiDevice::open(&config.device) {
        Ok(keyboard) => {
            info!("Keyboard connected on {}", config.device.display());
            Box::new(keyboard)
        }
        Err(e) => {
            warn!("Keyboard unavailable: cannot open {}: {}", config.device.display(), e);
            Box::new(NoKeyboard)
        }
    }
}
