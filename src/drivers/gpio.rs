//! Memory-mapped GPIO register driver
//!
//! Maps the SoC's GPIO controller (through `/dev/gpiomem`, which exposes only
//! the GPIO block and needs no root) and drives pins through the function
//! select, set, clear and level registers. This is the only module in the
//! crate that dereferences raw pointers.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use tracing::{debug, info};

use super::{HardwareError, Level, PinIo, PinMode};

/// Size of the mapped register block in bytes
const BLOCK_LEN: usize = 0xB4;

/// Highest pin number on the controller
pub const MAX_PIN: u8 = 53;

// ── Register word offsets ──────────────────────────────────────────────────

/// Function select registers, ten pins per word, three bits per pin.
const GPFSEL0: usize = 0;
/// Output set registers (write 1 to drive high).
const GPSET0: usize = 7;
/// Output clear registers (write 1 to drive low).
const GPCLR0: usize = 10;
/// Pin level registers (read-only).
const GPLEV0: usize = 13;

// ── Function select codes ──────────────────────────────────────────────────

const FSEL_INPUT: u32 = 0b000;
const FSEL_OUTPUT: u32 = 0b001;
const FSEL_MASK: u32 = 0b111;

/// Word offset and bit shift of a pin's function select field
pub fn function_select_field(pin: u8) -> (usize, u32) {
    (GPFSEL0 + usize::from(pin / 10), u32::from(pin % 10) * 3)
}

/// Bank (0 or 1) and bit mask of a pin in the set/clear/level registers
pub fn bank_bit(pin: u8) -> (usize, u32) {
    (usize::from(pin >> 5), 1 << (pin & 0x1F))
}

/// The mapped GPIO register block
pub struct GpioRegisters {
    base: NonNull<u32>,
    path: PathBuf,
}

// The mapping lives for the lifetime of the struct and every access is a
// single volatile word read or write.
unsafe impl Send for GpioRegisters {}
unsafe impl Sync for GpioRegisters {}

impl GpioRegisters {
    /// Map the register block from `path` (normally `/dev/gpiomem`)
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HardwareError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&path)
            .map_err(|source| HardwareError::Open {
                path: path.clone(),
                source,
            })?;

        // SAFETY: mapping a device file we hold open; the result is checked
        // against MAP_FAILED before use. The mapping outlives the descriptor.
        let mapped = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if mapped == libc::MAP_FAILED {
            return Err(HardwareError::Map {
                path,
                source: std::io::Error::last_os_error(),
            });
        }

        let base = NonNull::new(mapped.cast::<u32>()).ok_or_else(|| HardwareError::Map {
            path: path.clone(),
            source: std::io::Error::other("mmap returned a null mapping"),
        })?;

        info!("GPIO registers mapped from {}", path.display());
        Ok(Self { base, path })
    }

    /// Check that a pin exists before it is handed to the typed operations
    pub fn validate_pin(pin: u8) -> Result<u8, HardwareError> {
        if pin > MAX_PIN {
            Err(HardwareError::InvalidPin(pin))
        } else {
            Ok(pin)
        }
    }

    fn read_word(&self, offset: usize) -> u32 {
        debug_assert!(offset * 4 < BLOCK_LEN);
        // SAFETY: offset is within the mapped block (asserted above; all
        // callers derive it from a validated pin number).
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset)) }
    }

    fn write_word(&self, offset: usize, value: u32) {
        debug_assert!(offset * 4 < BLOCK_LEN);
        // SAFETY: as for read_word.
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset), value) }
    }
}

impl PinIo for GpioRegisters {
    fn set_mode(&self, pin: u8, mode: PinMode) {
        let (word, shift) = function_select_field(pin);
        let code = match mode {
            PinMode::Input => FSEL_INPUT,
            PinMode::Output => FSEL_OUTPUT,
        };
        let current = self.read_word(word);
        self.write_word(word, (current & !(FSEL_MASK << shift)) | (code << shift));
        debug!("GPIO{} set to {:?}", pin, mode);
    }

    fn write(&self, pin: u8, level: Level) {
        let (bank, bit) = bank_bit(pin);
        match level {
            Level::Low => self.write_word(GPCLR0 + bank, bit),
            Level::High => self.write_word(GPSET0 + bank, bit),
        }
    }

    fn read(&self, pin: u8) -> Level {
        let (bank, bit) = bank_bit(pin);
        Level::from(self.read_word(GPLEV0 + bank) & bit != 0)
    }
}

impl Drop for GpioRegisters {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly the region mapped in `open`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), BLOCK_LEN);
        }
        debug!("GPIO registers unmapped ({})", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_select_field() {
        // Shift register data line and bank selects
        assert_eq!(function_select_field(27), (2, 21));
        assert_eq!(function_select_field(19), (1, 27));
        assert_eq!(function_select_field(20), (2, 0));
        assert_eq!(function_select_field(9), (0, 27));
    }

    #[test]
    fn test_bank_bit() {
        assert_eq!(bank_bit(0), (0, 1));
        assert_eq!(bank_bit(23), (0, 1 << 23));
        assert_eq!(bank_bit(31), (0, 1 << 31));
        assert_eq!(bank_bit(32), (1, 1));
        assert_eq!(bank_bit(53), (1, 1 << 21));
    }

    #[test]
    fn test_registers_fit_in_block() {
        let (fsel, _) = function_select_field(MAX_PIN);
        let (bank, _) = bank_bit(MAX_PIN);
        assert!(fsel * 4 < BLOCK_LEN);
        assert!((GPLEV0 + bank) * 4 < BLOCK_LEN);
    }

    #[test]
    fn test_validate_pin() {
        assert!(GpioRegisters::validate_pin(27).is_ok());
        assert!(matches!(
            GpioRegisters::validate_pin(54),
            Err(HardwareError::InvalidPin(54))
        ));
    }

    #[test]
    fn test_open_missing_device_is_reported() {
        let err = GpioRegisters::open("/nonexistent/gpiomem").err().unwrap();
        assert!(matches!(err, HardwareError::Open { .. }));
    }
}
