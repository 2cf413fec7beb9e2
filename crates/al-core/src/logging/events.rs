//! Structured event vocabulary.
//!
//! Every event carries the run ID, the session ID once a session exists, and
//! the stage of the logging pipeline it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event severity as it appears in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Pipeline stages of a logging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Opening the line source.
    Connect,
    /// Reading samples for a round.
    Collect,
    /// Appending rows and updating the manifest.
    Write,
    /// Finalizing the session.
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Connect => "connect",
            Stage::Collect => "collect",
            Stage::Write => "write",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Stable event names.
pub mod event_names {
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const TRANSPORT_OPENED: &str = "transport.opened";
    pub const TRANSPORT_SETTLING: &str = "transport.settling";

    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_FINISHED: &str = "session.finished";

    pub const ROUND_STARTED: &str = "round.started";
    pub const SAMPLE_ACCEPTED: &str = "sample.accepted";
    pub const ROUND_FINISHED: &str = "round.finished";
    pub const ROUND_ABORTED: &str = "round.aborted";

    pub const ROW_WRITTEN: &str = "row.written";
    pub const MANIFEST_FAILED: &str = "manifest.failed";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A structured event, serialized as one JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    pub event: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEvent {
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation IDs shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub session_id: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Build an event carrying this context.
    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: self.run_id.clone(),
            session_id: self.session_id.clone(),
            stage,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let ctx = LogContext::new("run-abc").with_session_id("al-20260101-120000-a2b3");
        let json = ctx
            .event(Level::Info, event_names::ROW_WRITTEN, Stage::Write, "Row saved")
            .with_field("index", 3)
            .to_jsonl();
        assert!(json.contains(r#""event":"row.written""#));
        assert!(json.contains(r#""stage":"write""#));
        assert!(json.contains(r#""session_id":"al-20260101-120000-a2b3""#));
        assert!(json.contains(r#""index":3"#));
    }

    #[test]
    fn test_session_id_omitted_when_absent() {
        let json = LogContext::new("run-abc")
            .event(Level::Debug, event_names::CONFIG_LOADED, Stage::Init, "x")
            .to_jsonl();
        assert!(!json.contains("session_id"));
        assert!(!json.contains("fields"));
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [
            Stage::Init,
            Stage::Connect,
            Stage::Collect,
            Stage::Write,
            Stage::Shutdown,
        ] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warn);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Trace);
    }
}
