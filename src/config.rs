//! Configuration management for Ondes GW
//!
//! Handles loading, defaulting and validation of the YAML configuration file.
//! Every field has a default matching the stock console wiring, so an empty
//! file (or no file at all) describes a working setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::drivers::shift_register::LedPins;
use crate::drivers::GpioRegisters;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub osc: OscConfig,
    pub spi: SpiConfig,
    pub gpio: GpioConfig,
    pub timing: TimingConfig,
    pub keyboard: KeyboardConfig,
    pub playback: PlaybackConfig,
    pub leds: LedConfig,
    pub tuning: TuningConfig,
    pub logging: LoggingConfig,
}

/// OSC transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OscConfig {
    /// UDP port for inbound requests from the synthesis engine
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Where the outbound control stream is sent
    #[serde(default = "default_engine_addr")]
    pub engine_addr: SocketAddr,
}

/// SPI bus configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpiConfig {
    /// MCP3008 ADC endpoint
    #[serde(default = "default_adc_device")]
    pub adc_device: PathBuf,
    /// MCP23S08 port expander endpoint
    #[serde(default = "default_expander_device")]
    pub expander_device: PathBuf,
    /// ADXL362 accelerometer endpoint
    #[serde(default = "default_accelerometer_device")]
    pub accelerometer_device: PathBuf,
    #[serde(default = "default_spi_speed")]
    pub speed_hz: u32,
    #[serde(default)]
    pub mode: u8,
    #[serde(default = "default_bits_per_word")]
    pub bits_per_word: u8,
    /// Hardware address strapped on the expander
    #[serde(default)]
    pub expander_address: u8,
}

/// GPIO configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GpioConfig {
    #[serde(default = "default_gpio_device")]
    pub device: PathBuf,
    #[serde(default = "default_led_data_pin")]
    pub led_data: u8,
    #[serde(default = "default_led_latch_pin")]
    pub led_latch: u8,
    #[serde(default = "default_led_clock_pin")]
    pub led_clock: u8,
    /// Switch bank select lines, bank 0 first
    #[serde(default = "default_bank_select")]
    pub bank_select: [u8; 3],
}

/// Polling cadences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_analog_interval")]
    pub analog_interval_ms: u64,
    #[serde(default = "default_switch_interval")]
    pub switch_interval_ms: u64,
    /// Loop iterations between unconditional LED refreshes
    #[serde(default = "default_led_refresh")]
    pub led_refresh_iterations: u32,
    #[serde(default = "default_loop_pause")]
    pub loop_pause_ms: u64,
}

/// MIDI keyboard source
///
/// `port` (a midir input port name substring) takes precedence over the raw
/// `device`. Setting `enabled: false` runs without a keyboard.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keyboard_device")]
    pub device: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Stored performance configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_midi_dir")]
    pub midi_dir: PathBuf,
}

/// Octave marker LED display mode
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OctaveLedMode {
    Off,
    #[default]
    All,
    MiddleC,
    ShiftedOnly,
}

/// LED display preferences
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedConfig {
    /// Colour LED in the touche button
    #[serde(default = "default_true")]
    pub touche: bool,
    #[serde(default)]
    pub octave_mode: OctaveLedMode,
}

/// Reference pitch
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TuningConfig {
    #[serde(default = "default_tuning")]
    pub reference_hz: f32,
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Also write daily rolling log files here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.spi.speed_hz == 0 {
            anyhow::bail!("spi.speed_hz must be greater than zero");
        }
        if self.spi.mode > 3 {
            anyhow::bail!("spi.mode {} is invalid (must be 0-3)", self.spi.mode);
        }
        if self.spi.bits_per_word == 0 {
            anyhow::bail!("spi.bits_per_word must be greater than zero");
        }
        if self.spi.expander_address > 7 {
            anyhow::bail!(
                "spi.expander_address {} is invalid (must be 0-7)",
                self.spi.expander_address
            );
        }

        let mut pins = vec![self.gpio.led_data, self.gpio.led_latch, self.gpio.led_clock];
        pins.extend_from_slice(&self.gpio.bank_select);
        for pin in &pins {
            GpioRegisters::validate_pin(*pin)?;
        }
        let mut unique = pins.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != pins.len() {
            anyhow::bail!("GPIO pins must be distinct: {:?}", pins);
        }

        if self.timing.analog_interval_ms == 0 || self.timing.switch_interval_ms == 0 {
            anyhow::bail!("Polling intervals must be greater than zero");
        }
        if self.timing.led_refresh_iterations == 0 {
            anyhow::bail!("timing.led_refresh_iterations must be greater than zero");
        }

        if let Some(port) = &self.keyboard.port {
            if port.is_empty() {
                anyhow::bail!("keyboard.port cannot be empty");
            }
        }

        if !(self.tuning.reference_hz.is_finite() && self.tuning.reference_hz > 0.0) {
            anyhow::bail!("tuning.reference_hz must be a positive frequency");
        }

        Ok(())
    }
}

impl GpioConfig {
    pub fn led_pins(&self) -> LedPins {
        LedPins {
            data: self.led_data,
            latch: self.led_latch,
            clock: self.led_clock,
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            engine_addr: default_engine_addr(),
        }
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            adc_device: default_adc_device(),
            expander_device: default_expander_device(),
            accelerometer_device: default_accelerometer_device(),
            speed_hz: default_spi_speed(),
            mode: 0,
            bits_per_word: default_bits_per_word(),
            expander_address: 0,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            device: default_gpio_device(),
            led_data: default_led_data_pin(),
            led_latch: default_led_latch_pin(),
            led_clock: default_led_clock_pin(),
            bank_select: default_bank_select(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            analog_interval_ms: default_analog_interval(),
            switch_interval_ms: default_switch_interval(),
            led_refresh_iterations: default_led_refresh(),
            loop_pause_ms: default_loop_pause(),
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: default_keyboard_device(),
            port: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            midi_dir: default_midi_dir(),
        }
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            touche: true,
            octave_mode: OctaveLedMode::default(),
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            reference_hz: default_tuning(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_listen_port() -> u16 { 4001 }
fn default_engine_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 4000)) }
fn default_adc_device() -> PathBuf { PathBuf::from("/dev/spidev0.0") }
fn default_expander_device() -> PathBuf { PathBuf::from("/dev/spidev0.1") }
fn default_accelerometer_device() -> PathBuf { PathBuf::from("/dev/spidev0.2") }
fn default_spi_speed() -> u32 { 3_000_000 }
fn default_bits_per_word() -> u8 { 8 }
fn default_gpio_device() -> PathBuf { PathBuf::from("/dev/gpiomem") }
fn default_led_data_pin() -> u8 { 27 }
fn default_led_latch_pin() -> u8 { 22 }
fn default_led_clock_pin() -> u8 { 23 }
fn default_bank_select() -> [u8; 3] { [19, 20, 21] }
fn default_analog_interval() -> u64 { 5 }
fn default_switch_interval() -> u64 { 15 }
fn default_led_refresh() -> u32 { 50 }
fn default_loop_pause() -> u64 { 1 }
fn default_keyboard_device() -> PathBuf { PathBuf::from("/dev/snd/midiC1D0") }
fn default_midi_dir() -> PathBuf { PathBuf::from("/home/pi/Ondes/MIDI") }
fn default_tuning() -> f32 { 440.0 }
