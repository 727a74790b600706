//! spidev transaction driver
//!
//! Opens an SPI endpoint through the kernel's spidev interface, fixes its
//! mode, word size and clock at open time, and performs 3-byte full-duplex
//! transactions with `SPI_IOC_MESSAGE(1)`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{Frame, HardwareError, SpiTransfer, FRAME_LEN};
use crate::config::SpiConfig;

// ── spidev ioctl numbers ───────────────────────────────────────────────────

const SPI_IOC_MAGIC: u32 = b'k' as u32;
const IOC_WRITE: u32 = 1;

const fn iow(nr: u32, size: usize) -> u32 {
    (IOC_WRITE << 30) | ((size as u32) << 16) | (SPI_IOC_MAGIC << 8) | nr
}

const SPI_IOC_WR_MODE: u32 = iow(1, std::mem::size_of::<u8>());
const SPI_IOC_WR_BITS_PER_WORD: u32 = iow(3, std::mem::size_of::<u8>());
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = iow(4, std::mem::size_of::<u32>());
const SPI_IOC_MESSAGE_1: u32 = iow(0, std::mem::size_of::<SpiIocTransfer>());

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

/// An open spidev endpoint
pub struct SpiDevice {
    file: File,
    path: PathBuf,
    speed_hz: u32,
    bits_per_word: u8,
}

impl SpiDevice {
    /// Open and configure the endpoint at `path`
    pub fn open(path: impl AsRef<Path>, settings: &SpiConfig) -> Result<Self, HardwareError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| HardwareError::Open {
                path: path.clone(),
                source,
            })?;

        let device = Self {
            file,
            path,
            speed_hz: settings.speed_hz,
            bits_per_word: settings.bits_per_word,
        };

        device.configure("mode", SPI_IOC_WR_MODE, &settings.mode)?;
        device.configure("bits per word", SPI_IOC_WR_BITS_PER_WORD, &settings.bits_per_word)?;
        device.configure("max speed", SPI_IOC_WR_MAX_SPEED_HZ, &settings.speed_hz)?;

        info!(
            "SPI endpoint {} open (mode {}, {} bits, {} Hz)",
            device.path.display(),
            settings.mode,
            settings.bits_per_word,
            settings.speed_hz
        );
        Ok(device)
    }

    fn configure<T>(&self, setting: &'static str, request: u32, value: &T) -> Result<(), HardwareError> {
        // SAFETY: the request number encodes size_of::<T>() and `value` is a
        // valid reference for the duration of the call.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, value as *const T) };
        if rc < 0 {
            return Err(HardwareError::Configure {
                setting,
                path: self.path.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl SpiTransfer for SpiDevice {
    fn transfer(&mut self, tx: &Frame) -> io::Result<Frame> {
        let mut rx: Frame = [0; FRAME_LEN];
        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: FRAME_LEN as u32,
            speed_hz: self.speed_hz,
            bits_per_word: self.bits_per_word,
            ..Default::default()
        };

        // SAFETY: tx and rx are live FRAME_LEN-byte buffers for the whole call.
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                SPI_IOC_MESSAGE_1 as _,
                &transfer as *const SpiIocTransfer,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rx)
    }
}

/// An SPI transport that degrades to the last good reply on failure
///
/// A failed transaction is logged and answered with the previous successful
/// frame, so a transient bus error shows up as one stale sample instead of
/// stopping the instrument mid-performance.
pub struct SpiEndpoint {
    name: &'static str,
    transport: Box<dyn SpiTransfer>,
    last_rx: Frame,
    failures: u64,
}

impl SpiEndpoint {
    pub fn new(name: &'static str, transport: Box<dyn SpiTransfer>) -> Self {
        Self {
            name,
            transport,
            last_rx: [0; FRAME_LEN],
            failures: 0,
        }
    }

    /// Perform one transaction, falling back to the last good reply
    pub fn transact(&mut self, tx: &Frame) -> Frame {
        match self.transport.transfer(tx) {
            Ok(rx) => {
                self.last_rx = rx;
                rx
            }
            Err(e) => {
                self.failures += 1;
                warn!(
                    "{}: SPI transaction {:02X?} failed ({}), reusing last reply",
                    self.name, tx, e
                );
                self.last_rx
            }
        }
    }

    /// Number of failed transactions since the endpoint was created
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSpi;

    #[test]
    fn test_ioctl_numbers_match_kernel_headers() {
        assert_eq!(SPI_IOC_WR_MODE, 0x4001_6B01);
        assert_eq!(SPI_IOC_WR_BITS_PER_WORD, 0x4001_6B03);
        assert_eq!(SPI_IOC_WR_MAX_SPEED_HZ, 0x4004_6B04);
        assert_eq!(SPI_IOC_MESSAGE_1, 0x4020_6B00);
    }

    #[test]
    fn test_transfer_struct_layout() {
        assert_eq!(std::mem::size_of::<SpiIocTransfer>(), 32);
    }

    #[test]
    fn test_failed_transaction_returns_last_good_reply() {
        let spi = ScriptedSpi::new(|tx| Ok([tx[0], 0x02, 0x7F]));
        let handle = spi.clone();
        let mut endpoint = SpiEndpoint::new("adc", Box::new(spi));

        assert_eq!(endpoint.transact(&[0x01, 0x80, 0x00]), [0x01, 0x02, 0x7F]);

        handle.fail_next(1);
        assert_eq!(endpoint.transact(&[0x09, 0x90, 0x00]), [0x01, 0x02, 0x7F]);
        assert_eq!(endpoint.failures(), 1);

        // Recovers on the next good transaction
        assert_eq!(endpoint.transact(&[0x09, 0x90, 0x00]), [0x09, 0x02, 0x7F]);
    }

    #[test]
    fn test_open_missing_device_is_fatal() {
        let settings = SpiConfig::default();
        let err = SpiDevice::open("/nonexistent/spidev9.9", &settings).err().unwrap();
        assert!(matches!(err, HardwareError::Open { .. }));
    }
}
