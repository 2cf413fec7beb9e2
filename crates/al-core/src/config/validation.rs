//! Semantic validation for logger configuration.

use super::LoggerConfig;
use thiserror::Error;

/// Read timeouts outside this range cannot be expressed with termios `VTIME`.
pub const READ_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=25_500;

/// Upper bound on the settle delay after opening the port.
pub const MAX_SETTLE_MS: u64 = 60_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("samples per round must be positive")]
    SamplesZero,

    #[error("unsupported baud rate {value}")]
    UnsupportedBaud { value: u32 },

    #[error("read timeout must be within {min}..={max} ms (got {value})")]
    ReadTimeoutRange { value: u64, min: u64, max: u64 },

    #[error("settle delay must be at most {max} ms (got {value})")]
    SettleTooLong { value: u64, max: u64 },

    #[error("serial port path must not be empty")]
    PortEmpty,

    #[error("reference label must be non-empty and single-line")]
    LabelInvalid,

    #[error("file prefix must be non-empty and must not contain path separators (got {value:?})")]
    PrefixInvalid { value: String },
}

/// Baud rates the serial transport can configure.
pub fn is_supported_baud(baud: u32) -> bool {
    #[cfg(unix)]
    {
        crate::transport::serial::SUPPORTED_BAUD_RATES.contains(&baud)
    }
    #[cfg(not(unix))]
    {
        baud > 0
    }
}

/// Check a configuration for values the session cannot run with.
pub fn validate_config(config: &LoggerConfig) -> Result<(), ValidationError> {
    let transport = &config.transport;
    if transport.port.trim().is_empty() {
        return Err(ValidationError::PortEmpty);
    }
    if !is_supported_baud(transport.baud) {
        return Err(ValidationError::UnsupportedBaud {
            value: transport.baud,
        });
    }
    if !READ_TIMEOUT_RANGE_MS.contains(&transport.read_timeout_ms) {
        return Err(ValidationError::ReadTimeoutRange {
            value: transport.read_timeout_ms,
            min: *READ_TIMEOUT_RANGE_MS.start(),
            max: *READ_TIMEOUT_RANGE_MS.end(),
        });
    }
    if transport.settle_ms > MAX_SETTLE_MS {
        return Err(ValidationError::SettleTooLong {
            value: transport.settle_ms,
            max: MAX_SETTLE_MS,
        });
    }

    let session = &config.session;
    if session.samples == Some(0) {
        return Err(ValidationError::SamplesZero);
    }
    let label = &session.reference_label;
    if label.trim().is_empty() || label.contains(['\r', '\n']) {
        return Err(ValidationError::LabelInvalid);
    }
    let prefix = &session.file_prefix;
    if prefix.trim().is_empty() || prefix.contains(['/', '\\']) {
        return Err(ValidationError::PrefixInvalid {
            value: prefix.clone(),
        });
    }
    Ok(())
}
