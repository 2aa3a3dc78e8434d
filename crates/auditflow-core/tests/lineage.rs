use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use auditflow_core::config::{PipelineConfig, Strictness};
use auditflow_core::error::PipelineError;
use auditflow_core::hashing::{hash_row, ColumnOrder};
use auditflow_core::lineage::{LineageLog, LineageRecord, LineageRecorder};
use auditflow_core::row::{Row, Value};
use chrono::{DateTime, TimeZone, Utc};

const REFERENCE_DIGEST: &str = "80dc1fe5af4d25df3651e265ba8f5ac900a54b4a9074e9c6aa5a5ab4becb511a";

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn reference_row() -> Row {
    Row::new().with("amount", 100.00f64).with("account", "A1")
}

fn temp_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn reference_row_scenario_writes_header_and_one_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::new("0.1.0", dir.path()).expect("config");
    let mut recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");

    let record = recorder
        .record_row(&reference_row(), fixed_time())
        .expect("record row");
    assert_eq!(record.row_hash, REFERENCE_DIGEST);

    let summary = recorder.finalize().expect("finalize");
    assert_eq!(summary.records_appended, 1);
    assert_eq!(summary.path, dir.path().join("audit_lineage.csv"));

    let content = fs::read_to_string(&summary.path).expect("read log");
    assert_eq!(
        content,
        format!(
            "row_hash,processed_at,pipeline_version\n{REFERENCE_DIGEST},2025-01-01T12:00:00.000000Z,0.1.0\n"
        )
    );
}

#[test]
fn records_keep_append_order_and_header_is_written_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit_lineage.csv");
    let mut log = LineageLog::open(&path).expect("open");

    let expected: Vec<LineageRecord> = (0..5)
        .map(|i| {
            let row = Row::new().with("seq", i as i64);
            let hash = hash_row(&row, &ColumnOrder::Sorted).expect("hash");
            LineageRecord::new(hash, fixed_time(), "0.1.0")
        })
        .collect();

    for record in &expected[..3] {
        log.append_record(record).expect("append");
    }
    log.append_records(&expected[3..]).expect("append batch");
    assert_eq!(log.appended(), 5);
    log.finalize().expect("finalize");

    let content = fs::read_to_string(&path).expect("read log");
    assert_eq!(content.matches("row_hash,processed_at").count(), 1);
    assert_eq!(content.lines().count(), 6);

    let reread = LineageLog::read_records(&path).expect("read records");
    assert_eq!(reread, expected);
}

#[test]
fn reopening_an_existing_log_appends_without_new_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::new("0.1.0", dir.path()).expect("config");

    for version_run in 0..2 {
        let mut recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");
        let row = Row::new().with("run", version_run as i64);
        recorder.record_row(&row, fixed_time()).expect("record");
        recorder.finalize().expect("finalize");
    }

    let records = LineageLog::read_records(&config.lineage_path()).expect("read");
    assert_eq!(records.len(), 2);
}

#[test]
fn interrupted_append_leaves_prior_complete_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit_lineage.csv");
    let mut log = LineageLog::open(&path).expect("open");

    let first = LineageRecord::new(REFERENCE_DIGEST, fixed_time(), "0.1.0");
    log.append_record(&first).expect("first append");
    let before = fs::read(&path).expect("read before");

    {
        let second = LineageRecord::new("f".repeat(64), fixed_time(), "0.1.0");
        let staged = log.stage(&[second]).expect("stage");
        assert!(staged.staged_path().exists());
        // interrupted: the guard goes out of scope without commit
    }

    assert_eq!(fs::read(&path).expect("read after"), before);
    assert!(temp_files(dir.path()).is_empty());
    assert_eq!(log.appended(), 1);

    let second = LineageRecord::new("e".repeat(64), fixed_time(), "0.1.0");
    log.stage(std::slice::from_ref(&second))
        .expect("stage again")
        .commit()
        .expect("commit");
    let records = LineageLog::read_records(&path).expect("read");
    assert_eq!(records, vec![first, second]);
}

#[test]
fn unsupported_value_fails_and_leaves_log_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::new("0.1.0", dir.path()).expect("config");
    let mut recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");

    recorder
        .record_row(&reference_row(), fixed_time())
        .expect("first row");
    let before = fs::read(config.lineage_path()).expect("read before");

    let blob_row = reference_row().with("attachment", Value::Bytes(vec![0x89, 0x50, 0x4e, 0x47]));
    let err = recorder
        .record_row(&blob_row, fixed_time())
        .expect_err("binary blob must not encode");
    assert!(matches!(err, PipelineError::Encoding { .. }));

    let batch = [reference_row(), blob_row.clone()];
    let err = recorder
        .record_rows(batch.iter(), fixed_time())
        .expect_err("strict batch aborts");
    assert!(err.is_encoding());

    assert_eq!(fs::read(config.lineage_path()).expect("read after"), before);
}

#[test]
fn unsupported_value_never_creates_a_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::new("0.1.0", dir.path()).expect("config");
    let mut recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");

    let blob_row = Row::new().with("payload", Value::Bytes(vec![1, 2, 3]));
    assert!(recorder.record_row(&blob_row, fixed_time()).is_err());
    assert!(!config.lineage_path().exists());
}

#[test]
fn lenient_mode_skips_rows_that_cannot_be_encoded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::new("0.2.0", dir.path())
        .expect("config")
        .with_strictness(Strictness::Lenient);
    let mut recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");

    let rows = [
        reference_row(),
        Row::new().with("blob", Value::Bytes(vec![0])),
        Row::new().with("account", "B2"),
    ];
    let outcome = recorder
        .record_rows(rows.iter(), fixed_time())
        .expect("lenient batch");
    assert_eq!(outcome.skipped, vec![1]);
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome
        .records
        .iter()
        .all(|record| record.pipeline_version == "0.2.0"));

    let summary = recorder.finalize().expect("finalize");
    assert_eq!(summary.records_appended, 2);
}

#[test]
fn foreign_file_at_log_path_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit_lineage.csv");
    fs::write(&path, "index,station_id\n0,CT\n").expect("seed foreign file");

    let err = LineageLog::open(&path).expect_err("foreign header");
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[test]
fn recorder_rejects_unusable_out_dir_as_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("not-a-dir");
    fs::write(&file, b"x").expect("seed file");
    let config = PipelineConfig::new("0.1.0", &file).expect("config");

    let err = LineageRecorder::new(&config, ColumnOrder::Sorted).expect_err("out_dir is a file");
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn recorder_creates_missing_out_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("nested/outputs");
    let config = PipelineConfig::new("0.1.0", &out).expect("config");

    let recorder = LineageRecorder::new(&config, ColumnOrder::Sorted).expect("recorder");
    assert!(out.is_dir());
    assert!(!recorder.log().path().exists());
}

#[test]
fn missing_directory_is_a_storage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = LineageLog::open(dir.path().join("nope/audit_lineage.csv")).expect_err("no dir");
    assert!(matches!(err, PipelineError::Storage { .. }));
}

#[test]
fn concurrent_writers_leave_a_well_formed_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Arc::new(dir.path().join("audit_lineage.csv"));
    let writers = 4;
    let barrier = Arc::new(Barrier::new(writers));

    let handles: Vec<_> = (0..writers)
        .map(|id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut log = LineageLog::open(path.as_path()).expect("open");
                let row = Row::new().with("writer", id as i64);
                let hash = hash_row(&row, &ColumnOrder::Sorted).expect("hash");
                barrier.wait();
                log.append_record(&LineageRecord::new(hash, fixed_time(), "0.1.0"))
                    .expect("append");
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }

    let records = LineageLog::read_records(&path).expect("log parses");
    assert!(!records.is_empty() && records.len() <= writers);
    for record in &records {
        assert_eq!(record.row_hash.len(), 64);
        assert_eq!(record.pipeline_version, "0.1.0");
    }
    assert!(temp_files(dir.path()).is_empty());
}
