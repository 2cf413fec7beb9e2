//! Persisted table rows and the header layout.
//!
//! Column layout:
//! `Index, Date, Time, <ReferenceLabel>, ADS(0..N-1), ARD(0..N-1), ESP(0..N-1)`

use crate::error::{Error, Result};
use crate::sample::{Channel, SampleSet};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Reference column label used when none is configured (UT203+ multimeter).
pub const DEFAULT_REFERENCE_LABEL: &str = "UT203";

/// Date column format (`19.10.2026`).
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Time column format with millisecond resolution (`14.30.22.123`).
pub const TIME_FORMAT: &str = "%H.%M.%S.%3f";

/// Column families in table order.
const COLUMN_ORDER: [Channel; 3] = [Channel::D, Channel::A, Channel::E];

/// Build the table header for a given quota and reference label.
pub fn table_header(reference_label: &str, quota: usize) -> Vec<String> {
    let mut header = vec![
        "Index".to_string(),
        "Date".to_string(),
        "Time".to_string(),
        reference_label.to_string(),
    ];
    header.reserve(quota * COLUMN_ORDER.len());
    for channel in COLUMN_ORDER {
        for i in 0..quota {
            header.push(format!("{}({})", channel.column_family(), i));
        }
    }
    header
}

/// One completed round, ready to be appended to the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    /// Sequence index, starting at 1 for the first row of a session.
    pub index: u64,
    /// Local capture time of the round.
    pub captured_at: NaiveDateTime,
    /// Reference value exactly as entered.
    pub reference: String,
    samples: SampleSet,
}

impl Row {
    /// Assemble a row. The sample set must be complete.
    pub fn new(
        index: u64,
        captured_at: NaiveDateTime,
        reference: impl Into<String>,
        samples: SampleSet,
    ) -> Result<Self> {
        if !samples.is_complete() {
            return Err(Error::SetIncomplete {
                filled: samples.filled(),
                quota: samples.quota(),
            });
        }
        Ok(Row {
            index,
            captured_at,
            reference: reference.into(),
            samples,
        })
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    pub fn date(&self) -> String {
        self.captured_at.format(DATE_FORMAT).to_string()
    }

    pub fn time(&self) -> String {
        self.captured_at.format(TIME_FORMAT).to_string()
    }

    /// Row cells in header order. Unset readings become empty cells.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(4 + self.samples.quota() * 3);
        cells.push(self.index.to_string());
        cells.push(self.date());
        cells.push(self.time());
        cells.push(self.reference.clone());
        cells.extend(
            self.samples
                .columns()
                .map(|v| v.map(|n| n.to_string()).unwrap_or_default()),
        );
        cells
    }
}
