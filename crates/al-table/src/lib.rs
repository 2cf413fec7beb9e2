//! Append-only CSV table writer for ADC logging sessions.
//!
//! A session produces two artifacts side by side:
//! - `<prefix>_YYYYmmdd_HHMMSS.csv`: header plus one row per completed round
//! - `<prefix>_YYYYmmdd_HHMMSS.session.json`: the session manifest
//!
//! Rows are flushed as soon as they are appended so that a crash or an
//! interrupted session never loses a completed round.

pub mod error;
pub mod manifest;
pub mod writer;

pub use error::TableError;
pub use manifest::{SessionManifest, SessionState};
pub use writer::{encode_record, TableConfig, TableWriter};
