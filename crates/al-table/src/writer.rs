//! CSV table writer.
//!
//! The header is written once when the table is created; each completed
//! round appends exactly one record. Records use minimal quoting and `\r\n`
//! line terminators.

use super::error::TableError;
use al_common::{table_header, Row};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Line terminator for every record.
const LINE_TERMINATOR: &str = "\r\n";

/// Label used in errors when the table is not backed by a file.
const STREAM_PATH: &str = "-";

/// Maximum numeric suffix tried when the timestamped name is taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Where and how to create a table file.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Directory that receives the table (created if missing).
    pub output_dir: PathBuf,
    /// File name prefix, e.g. `adc_log`.
    pub prefix: String,
    /// Samples per channel in each row.
    pub quota: NonZeroUsize,
    /// Header label of the reference column.
    pub reference_label: String,
}

/// Append-only CSV table.
pub struct TableWriter<W: Write = BufWriter<File>> {
    writer: W,
    path: PathBuf,
    quota: usize,
    reference_label: String,
    rows_written: u64,
}

impl TableWriter<BufWriter<File>> {
    /// Create a new timestamped table file in the configured directory.
    pub fn create(config: &TableConfig) -> Result<Self, TableError> {
        std::fs::create_dir_all(&config.output_dir).map_err(|e| TableError::Io {
            path: config.output_dir.clone(),
            source: e,
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let (file, path) = create_unique(&config.output_dir, &config.prefix, &stamp)?;
        info!(path = %path.display(), quota = config.quota.get(), "Created table file");

        let mut table = TableWriter::new(
            BufWriter::new(file),
            config.quota,
            &config.reference_label,
        )
        .map_err(|e| retarget(e, &path))?;
        table.path = path;
        Ok(table)
    }
}

impl<W: Write> TableWriter<W> {
    /// Wrap an arbitrary writer and emit the header.
    pub fn new(
        writer: W,
        quota: NonZeroUsize,
        reference_label: impl Into<String>,
    ) -> Result<Self, TableError> {
        let mut table = TableWriter {
            writer,
            path: PathBuf::from(STREAM_PATH),
            quota: quota.get(),
            reference_label: reference_label.into(),
            rows_written: 0,
        };
        let header = table_header(&table.reference_label, table.quota);
        table.write_record(&header)?;
        Ok(table)
    }

    /// Append one row and flush it to the underlying writer.
    pub fn append(&mut self, row: &Row) -> Result<(), TableError> {
        let actual = row.samples().quota();
        if actual != self.quota {
            return Err(TableError::QuotaMismatch {
                expected: self.quota,
                actual,
            });
        }
        self.write_record(&row.cells())?;
        self.rows_written += 1;
        debug!(index = row.index, rows_written = self.rows_written, "Appended row");
        Ok(())
    }

    /// Path of the table file (`-` for in-memory or stream tables).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn reference_label(&self) -> &str {
        &self.reference_label
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W, TableError> {
        self.writer.flush().map_err(|e| TableError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(self.writer)
    }

    fn write_record(&mut self, cells: &[String]) -> Result<(), TableError> {
        let line = encode_record(cells);
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| TableError::Io {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Encode one CSV record, including the line terminator.
///
/// A cell is quoted when it contains a comma, a double quote, or a line
/// break; embedded quotes are doubled.
pub fn encode_record(cells: &[String]) -> String {
    let mut out = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\r', '\n']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push_str(LINE_TERMINATOR);
    out
}

/// Open `<dir>/<prefix>_<stamp>.csv` without clobbering an existing file.
fn create_unique(dir: &Path, prefix: &str, stamp: &str) -> Result<(File, PathBuf), TableError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}_{}.csv", prefix, stamp)
        } else {
            format!("{}_{}_{}.csv", prefix, stamp, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(TableError::Io { path, source: e }),
        }
    }
    Err(TableError::NameExhausted {
        dir: dir.to_path_buf(),
    })
}

fn retarget(err: TableError, path: &Path) -> TableError {
    match err {
        TableError::Io { source, .. } => TableError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}
