//! Session manifest written next to the table.
//!
//! The manifest records what produced the table (source, quota, label) and
//! how the session ended. It is rewritten atomically after every row so it
//! never lags the table by more than the row in flight.

use super::error::TableError;
use al_common::{SessionId, SCHEMA_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lifecycle state of a logging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Rounds are being collected.
    Active,
    /// The operator quit normally.
    Finished,
    /// A round was aborted by the operator; its samples were discarded.
    Interrupted,
    /// A finite line source ended before a round completed.
    Exhausted,
    /// The session stopped on an error.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub schema_version: String,
    pub session_id: String,
    pub state: SessionState,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub table_path: PathBuf,
    /// Human description of the line source, e.g. `/dev/ttyUSB0 @ 115200`.
    pub source: String,
    pub samples_per_round: usize,
    pub reference_label: String,
    pub rows_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionManifest {
    pub fn new(
        session_id: &SessionId,
        table_path: impl Into<PathBuf>,
        source: impl Into<String>,
        samples_per_round: usize,
        reference_label: impl Into<String>,
    ) -> Self {
        SessionManifest {
            schema_version: SCHEMA_VERSION.to_string(),
            session_id: session_id.0.clone(),
            state: SessionState::Active,
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
            table_path: table_path.into(),
            source: source.into(),
            samples_per_round,
            reference_label: reference_label.into(),
            rows_written: 0,
            error: None,
        }
    }

    /// Manifest path for a table: `adc_log_x.csv` → `adc_log_x.session.json`.
    pub fn path_for_table(table_path: &Path) -> PathBuf {
        table_path.with_extension("session.json")
    }

    pub fn record_row(&mut self) {
        self.rows_written += 1;
        self.touch();
    }

    pub fn finish(&mut self, state: SessionState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now().to_rfc3339());
    }

    pub fn read(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path).map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| TableError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the manifest via a temp file and rename.
    pub fn write(&self, path: &Path) -> Result<(), TableError> {
        let content = serde_json::to_vec_pretty(self).map_err(|e| TableError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("session.json");
        let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(|e| TableError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
            file.write_all(&content).map_err(|e| TableError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
            let _ = file.sync_all();
        }
        std::fs::rename(&tmp_path, path).map_err(|e| TableError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
