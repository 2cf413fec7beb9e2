//! No-mock table tests: real files in a temp directory.

use al_common::{Row, Sample, SampleSet, SessionId};
use al_table::{SessionManifest, SessionState, TableConfig, TableWriter};
use chrono::NaiveDate;
use std::num::NonZeroUsize;
use tempfile::TempDir;

fn config(dir: &TempDir, quota: usize) -> TableConfig {
    TableConfig {
        output_dir: dir.path().join("logs"),
        prefix: "adc_log".to_string(),
        quota: NonZeroUsize::new(quota).unwrap(),
        reference_label: "UT203".to_string(),
    }
}

fn row(index: u64, reference: &str, value: i64) -> Row {
    let mut set = SampleSet::new(NonZeroUsize::new(2).unwrap());
    set.push(Sample::new(Some(value), Some(value + 1), Some(value + 2)))
        .unwrap();
    set.push(Sample::new(Some(value), None, Some(value + 2)))
        .unwrap();
    let at = NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_milli_opt(12, 0, 1, 250)
        .unwrap();
    Row::new(index, at, reference, set).unwrap()
}

#[test]
fn create_writes_header_and_rows_to_timestamped_file() {
    let dir = TempDir::new().unwrap();
    let mut table = TableWriter::create(&config(&dir, 2)).unwrap();
    let path = table.path().to_path_buf();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("adc_log_"));
    assert!(name.ends_with(".csv"));
    assert_eq!(path.parent().unwrap(), dir.path().join("logs"));

    table.append(&row(1, "1.00", 100)).unwrap();
    table.append(&row(2, "2,50", 200)).unwrap();

    // Rows are flushed on append; readable before the writer is dropped.
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.split_terminator("\r\n").collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "Index,Date,Time,UT203,ADS(0),ADS(1),ARD(0),ARD(1),ESP(0),ESP(1)"
    );
    assert_eq!(lines[1], "1,19.10.2026,12.00.01.250,1.00,102,102,100,100,101,");
    assert_eq!(lines[2], "2,19.10.2026,12.00.01.250,\"2,50\",202,202,200,200,201,");
}

#[test]
fn manifest_tracks_table() {
    let dir = TempDir::new().unwrap();
    let mut table = TableWriter::create(&config(&dir, 2)).unwrap();
    let manifest_path = SessionManifest::path_for_table(table.path());

    let mut manifest = SessionManifest::new(
        &SessionId::new(),
        table.path(),
        "capture.txt",
        table.quota(),
        table.reference_label(),
    );
    manifest.write(&manifest_path).unwrap();

    table.append(&row(1, "0.5", 1)).unwrap();
    manifest.record_row();
    manifest.finish(SessionState::Finished, None);
    manifest.write(&manifest_path).unwrap();

    let back = SessionManifest::read(&manifest_path).unwrap();
    assert_eq!(back.state, SessionState::Finished);
    assert_eq!(back.rows_written, table.rows_written());
    assert_eq!(back.samples_per_round, 2);
    assert_eq!(back.table_path, table.path());
}
