//! Serial tty line source (Unix).
//!
//! The port is opened in raw 8N1 mode with a read timeout (`VMIN = 0`,
//! `VTIME = timeout`). A read that times out yields an empty line, which the
//! collector skips; this also gives the collector a chance to observe a
//! pending cancellation while the device is silent.

use super::{decode_line, LineSource, TransportError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace};

/// Default line speed (matches the firmware's `Serial.begin(115200)`).
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes requested per read.
const READ_CHUNK: usize = 256;

/// A line longer than this without a terminator is flushed as-is.
const MAX_LINE_BYTES: usize = 4096;

/// Serial port settings.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device node, e.g. `/dev/ttyUSB0`.
    pub path: PathBuf,
    pub baud: u32,
    /// Per-read timeout; rounded up to tenths of a second, max 25.5 s.
    pub read_timeout: Duration,
}

impl SerialConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SerialConfig {
            path: path.into(),
            baud: DEFAULT_BAUD,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Baud rates accepted by [`SerialPort::open`].
pub const SUPPORTED_BAUD_RATES: [u32; 9] = [
    1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200, 230_400,
];

/// An open serial device delivering `\n`-terminated lines.
pub struct SerialPort {
    file: File,
    config: SerialConfig,
    pending: Vec<u8>,
}

impl SerialPort {
    /// Open and configure the device.
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let speed = baud_constant(config.baud).ok_or(TransportError::UnsupportedBaud(config.baud))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&config.path)
            .map_err(|e| TransportError::Open {
                path: config.path.clone(),
                source: e,
            })?;

        configure_raw(&file, speed, config.read_timeout).map_err(|e| {
            TransportError::Configure {
                path: config.path.clone(),
                source: e,
            }
        })?;

        debug!(
            path = %config.path.display(),
            baud = config.baud,
            timeout_ms = config.read_timeout.as_millis() as u64,
            "Serial port configured"
        );

        Ok(SerialPort {
            file,
            config,
            pending: Vec::with_capacity(READ_CHUNK),
        })
    }

    fn take_line(&mut self) -> Option<String> {
        if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            return Some(decode_line(&line));
        }
        if self.pending.len() >= MAX_LINE_BYTES {
            trace!(bytes = self.pending.len(), "Flushing unterminated line");
            let line = std::mem::take(&mut self.pending);
            return Some(decode_line(&line));
        }
        None
    }
}

impl LineSource for SerialPort {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            match self.file.read(&mut chunk) {
                // VMIN = 0: zero bytes means the read timed out.
                Ok(0) => return Ok(Some(String::new())),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Ok(Some(String::new()))
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        self.pending.clear();
        // SAFETY: the descriptor is owned by `self.file` and open.
        let rc = unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.config.path.display(), self.config.baud)
    }
}

/// Map a numeric baud rate to its termios constant.
pub fn baud_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return None,
    };
    Some(speed)
}

/// Read timeout in termios `VTIME` units (tenths of a second, 1..=255).
fn vtime(timeout: Duration) -> libc::cc_t {
    let tenths = timeout.as_millis().div_ceil(100).clamp(1, 255);
    tenths as libc::cc_t
}

fn configure_raw(file: &File, speed: libc::speed_t, timeout: Duration) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is plain data; tcgetattr fills it before any read.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `tio` is a valid, initialized termios.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !(libc::CSTOPB | libc::PARENB);
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = vtime(timeout);

    // SAFETY: `tio` is valid; speed is a termios constant.
    unsafe {
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_constant_supported() {
        for baud in SUPPORTED_BAUD_RATES {
            assert!(baud_constant(baud).is_some(), "baud {} unmapped", baud);
        }
        assert_eq!(baud_constant(115_200), Some(libc::B115200));
    }

    #[test]
    fn test_baud_constant_unsupported() {
        assert!(baud_constant(0).is_none());
        assert!(baud_constant(115_201).is_none());
        assert!(baud_constant(250_000).is_none());
    }

    #[test]
    fn test_vtime_rounding() {
        assert_eq!(vtime(Duration::from_millis(1)), 1);
        assert_eq!(vtime(Duration::from_millis(1000)), 10);
        assert_eq!(vtime(Duration::from_millis(1050)), 11);
        assert_eq!(vtime(Duration::from_secs(60)), 255);
        assert_eq!(vtime(Duration::ZERO), 1);
    }

    #[test]
    fn test_open_unsupported_baud() {
        let mut config = SerialConfig::new("/dev/null");
        config.baud = 12345;
        assert!(matches!(
            SerialPort::open(config),
            Err(TransportError::UnsupportedBaud(12345))
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let config = SerialConfig::new("/nonexistent/al-core-test-tty");
        let err = SerialPort::open(config).err().unwrap();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn test_open_regular_file_is_not_a_tty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = SerialConfig::new(file.path());
        let err = SerialPort::open(config).err().unwrap();
        assert!(matches!(err, TransportError::Configure { .. }));
    }
}
