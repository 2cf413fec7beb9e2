//! ADC logger common types and IDs.
//!
//! This crate provides the data model shared by the collector, the table
//! writer, and the CLI:
//! - Channel tags and per-line samples
//! - Fixed-quota sample sets (one collection round)
//! - Persisted rows and the table header layout
//! - Session identifiers and schema versioning

pub mod error;
pub mod id;
pub mod row;
pub mod sample;
pub mod schema;

pub use error::{Error, Result};
pub use id::SessionId;
pub use row::{table_header, Row, DEFAULT_REFERENCE_LABEL};
pub use sample::{Channel, Sample, SampleSet};
pub use schema::SCHEMA_VERSION;
