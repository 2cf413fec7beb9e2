//! Process exit codes for `adc-logger`.
//!
//! Ranges:
//! - 0-9: session outcomes
//! - 10-19: user or environment errors
//! - 20-29: internal errors

use crate::collect::CollectError;
use crate::config::ConfigError;
use crate::session::{SessionError, SessionOutcome};
use crate::transport::TransportError;
use al_table::TableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operator quit normally (or the command succeeded).
    Clean = 0,
    /// A round was aborted with Ctrl-C.
    Interrupted = 1,
    /// A finite line source ended mid-round.
    SourceExhausted = 2,

    /// Invalid arguments.
    ArgsError = 10,
    /// Configuration could not be loaded or validated.
    ConfigError = 11,
    /// The serial device could not be opened or configured.
    TransportError = 12,
    /// Permission denied on the device or output directory.
    PermissionError = 13,

    /// Internal error (bug).
    InternalError = 20,
    /// I/O error on the table, manifest, or line source.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-9.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20 and above.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Stable name for JSON output.
    pub fn code_name(self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::Interrupted => "OK_INTERRUPTED",
            ExitCode::SourceExhausted => "OK_SOURCE_EXHAUSTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::TransportError => "ERR_TRANSPORT",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<SessionOutcome> for ExitCode {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Finished => ExitCode::Clean,
            SessionOutcome::Interrupted => ExitCode::Interrupted,
            SessionOutcome::Exhausted => ExitCode::SourceExhausted,
        }
    }
}

impl From<&TransportError> for ExitCode {
    fn from(err: &TransportError) -> Self {
        if err.is_permission_denied() {
            ExitCode::PermissionError
        } else {
            ExitCode::TransportError
        }
    }
}

impl From<&TableError> for ExitCode {
    fn from(err: &TableError) -> Self {
        match err {
            TableError::Io { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ExitCode::PermissionError
            }
            TableError::Io { .. } | TableError::Json { .. } | TableError::NameExhausted { .. } => {
                ExitCode::IoError
            }
            TableError::QuotaMismatch { .. } => ExitCode::InternalError,
        }
    }
}

impl From<&ConfigError> for ExitCode {
    fn from(_: &ConfigError) -> Self {
        ExitCode::ConfigError
    }
}

impl From<&SessionError> for ExitCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Table(e) => e.into(),
            SessionError::Collect(CollectError::Transport(_)) | SessionError::Console(_) => {
                ExitCode::IoError
            }
            SessionError::Collect(_) | SessionError::Row(_) | SessionError::Signal(_) => {
                ExitCode::InternalError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_operational());
        assert!(ExitCode::SourceExhausted.is_operational());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::PermissionError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::ArgsError.is_internal_error());
    }

    #[test]
    fn test_values_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::Interrupted.as_i32(), 1);
        assert_eq!(ExitCode::SourceExhausted.as_i32(), 2);
        assert_eq!(ExitCode::ArgsError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::TransportError.as_i32(), 12);
        assert_eq!(ExitCode::InternalError.as_i32(), 20);
        assert_eq!(i32::from(ExitCode::IoError), 21);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::Interrupted.to_string(), "OK_INTERRUPTED (1)");
    }

    #[test]
    fn test_from_outcome() {
        assert_eq!(ExitCode::from(SessionOutcome::Finished), ExitCode::Clean);
        assert_eq!(ExitCode::from(SessionOutcome::Interrupted), ExitCode::Interrupted);
        assert_eq!(ExitCode::from(SessionOutcome::Exhausted), ExitCode::SourceExhausted);
    }

    #[test]
    fn test_from_transport_error() {
        let denied = TransportError::Open {
            path: PathBuf::from("/dev/ttyUSB0"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(ExitCode::from(&denied), ExitCode::PermissionError);
        assert_eq!(
            ExitCode::from(&TransportError::UnsupportedBaud(7)),
            ExitCode::TransportError
        );
    }

    #[test]
    fn test_from_table_error() {
        let err = TableError::Io {
            path: PathBuf::from("/x"),
            source: io::Error::from(io::ErrorKind::Other),
        };
        assert_eq!(ExitCode::from(&err), ExitCode::IoError);
        let err = TableError::QuotaMismatch {
            expected: 1,
            actual: 2,
        };
        assert_eq!(ExitCode::from(&err), ExitCode::InternalError);
    }
}
