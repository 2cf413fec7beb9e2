//! Schema versioning for persisted artifacts.

/// Schema version stamped into session manifests and JSON payloads.
pub const SCHEMA_VERSION: &str = "1.0.0";
