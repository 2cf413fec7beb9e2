//! Line sources feeding the sample collector.
//!
//! A [`LineSource`] yields one text line per call:
//! - `Ok(Some(line))`: a line (possibly empty, e.g. on a read timeout)
//! - `Ok(None)`: the source has ended (EOF on a file or pipe)
//!
//! # Sources
//! - [`ReaderSource`]: any `BufRead` (capture files, stdin, tests)
//! - [`FnSource`]: a closure
//! - [`serial::SerialPort`]: a tty device configured via termios (Unix)

#[cfg(unix)]
pub mod serial;

use std::io::{self, BufRead};
use std::path::PathBuf;
use thiserror::Error;

/// Errors opening or configuring a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    #[error("serial ports are not supported on this platform")]
    UnsupportedPlatform,
}

impl TransportError {
    /// True when the failure is a permission problem on the device node.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            TransportError::Open { source, .. } | TransportError::Configure { source, .. } => {
                source.kind() == io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

/// A blocking, line-oriented input.
pub trait LineSource {
    /// Read the next line. May block.
    fn next_line(&mut self) -> io::Result<Option<String>>;

    /// Drop any input buffered before this call.
    fn discard_pending(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Short description for logs and the session manifest.
    fn describe(&self) -> String {
        "line source".to_string()
    }
}

impl<S: LineSource + ?Sized> LineSource for &mut S {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line()
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        (**self).discard_pending()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line()
    }

    fn discard_pending(&mut self) -> io::Result<()> {
        (**self).discard_pending()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Decode raw line bytes: invalid UTF-8 sequences are dropped, line
/// terminators are stripped.
pub fn decode_line(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                // A truncated sequence at the end has no error length.
                let skip = e.error_len().unwrap_or(invalid.len());
                rest = &invalid[skip..];
            }
        }
    }
    text.trim_end_matches(['\r', '\n']).to_string()
}

/// Line source over any buffered reader.
pub struct ReaderSource<R> {
    reader: R,
    label: String,
    buf: Vec<u8>,
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        ReaderSource {
            reader,
            label: label.into(),
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for ReaderSource<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(decode_line(&self.buf)))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Line source backed by a closure.
pub struct FnSource<F>(pub F);

impl<F> LineSource for FnSource<F>
where
    F: FnMut() -> io::Result<Option<String>>,
{
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (self.0)()
    }

    fn describe(&self) -> String {
        "closure".to_string()
    }
}

/// Line source yielding the given lines in order, then ending.
pub fn from_lines<I>(lines: I) -> FnSource<impl FnMut() -> io::Result<Option<String>>>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let mut iter = lines.into_iter();
    FnSource(move || Ok(iter.next().map(Into::into)))
}
