use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use tempfile::TempDir;

use crate::detect::{detect_dataset_kinds, score_columns, DatasetKind};
use crate::errors::ParserError;
use crate::formats::{parse_datetime, parse_optional_f64};
use crate::{read_header, read_table};

fn fixture(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents)
        .unwrap_or_else(|err| panic!("failed to write fixture {}: {}", path.display(), err));
    path
}

#[test]
fn reads_csv_into_string_columns() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(
        &dir,
        "raw.csv",
        "Station_ID,Date_Time,PCode,Result\nCT,2021-01-01 00:00:00,Data 1,10.5\nTUS,2021-01-02,Data 2,\n",
    );

    let table = read_table(&path).expect("csv read failed");
    assert_eq!(table.reader, "csv");
    assert_eq!(
        table.column_names(),
        vec!["Station_ID", "Date_Time", "PCode", "Result"]
    );
    assert_eq!(table.height(), 2);

    let result = table.frame.column("Result").expect("Result column");
    let result = result.str().expect("Result is string");
    assert_eq!(result.get(0), Some("10.5"));
    assert_eq!(result.get(1), None);
}

#[test]
fn pads_short_rows_and_skips_blank_lines() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "ragged.csv", "a,b,c\n1,2\n,,\n4,5,6\n");

    let table = read_table(&path).expect("csv read failed");
    assert_eq!(table.height(), 2);
    let c = table.frame.column("c").expect("c column");
    let c = c.str().expect("c is string");
    assert_eq!(c.get(0), None);
    assert_eq!(c.get(1), Some("6"));
}

#[test]
fn reads_tab_separated_exports() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "raw.tsv", "Station_ID\tResult\nCT\t1\n");

    let table = read_table(&path).expect("tsv read failed");
    assert_eq!(table.reader, "tsv");
    assert_eq!(table.column_names(), vec!["Station_ID", "Result"]);
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let err = read_table(&dir.path().join("absent.csv")).expect_err("should fail");
    assert!(matches!(err, ParserError::NotFound { .. }));
}

#[test]
fn spreadsheets_are_rejected_with_guidance() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "1 Raw Data.xlsx", "not really a workbook");

    let err = read_table(&path).expect_err("xlsx should be unsupported");
    match err {
        ParserError::UnsupportedFormat { extension, reason } => {
            assert_eq!(extension, "xlsx");
            assert!(reason.contains("CSV"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_file_reports_missing_header() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "empty.csv", "");
    let err = read_table(&path).expect_err("empty input");
    assert!(matches!(err, ParserError::EmptyInput { reader: "csv" }));
}

#[test]
fn duplicate_headers_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "dup.csv", "a,a\n1,2\n");
    let err = read_table(&path).expect_err("duplicate header");
    assert!(matches!(err, ParserError::InvalidHeader { .. }));
}

#[test]
fn header_only_read_for_templates() {
    let dir = TempDir::new().expect("tempdir");
    let path = fixture(&dir, "ct.csv", "\u{feff}Station,Dates,Data 1,Data 2\n");
    let header = read_header(&path).expect("header read");
    assert_eq!(header, vec!["Station", "Dates", "Data 1", "Data 2"]);
}

#[test]
fn parses_common_timestamp_spellings() {
    let expected = NaiveDate::from_ymd_opt(2021, 3, 4)
        .and_then(|d| d.and_hms_opt(5, 6, 7))
        .expect("valid datetime");

    assert_eq!(parse_datetime("2021-03-04 05:06:07"), Some(expected));
    assert_eq!(parse_datetime("2021-03-04T05:06:07"), Some(expected));
    assert_eq!(parse_datetime("2021-03-04T05:06:07Z"), Some(expected));
    assert_eq!(parse_datetime("2021-03-04T07:06:07+02:00"), Some(expected));
    assert_eq!(parse_datetime("03/04/2021 05:06:07"), Some(expected));

    let midnight = NaiveDate::from_ymd_opt(2021, 3, 4)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    assert_eq!(parse_datetime(" 2021-03-04 "), Some(midnight));
    assert_eq!(parse_datetime("not a date"), None);
    assert_eq!(parse_datetime(""), None);
}

#[test]
fn coercing_float_parse() {
    assert_eq!(parse_optional_f64(" 12.5 "), Some(12.5));
    assert_eq!(parse_optional_f64("NaN"), None);
    assert_eq!(parse_optional_f64("$12"), None);
    assert_eq!(parse_optional_f64(""), None);
}

#[test]
fn detects_raw_measurement_tables() {
    let columns = ["Station_ID", "Date_Time", "PCode", "Result"];
    let scores = score_columns(&columns);
    assert!(scores.raw >= 3, "raw score {scores:?}");
    assert!(detect_dataset_kinds(&columns).contains(&DatasetKind::RawData));
}

#[test]
fn detects_transaction_tables_as_ct() {
    let columns = ["Dates", "Customer", "Amount", "Status"];
    let kinds = detect_dataset_kinds(&columns);
    assert_eq!(kinds[0], DatasetKind::CtAnalysis);
}

#[test]
fn falls_back_to_best_score_or_unknown() {
    assert_eq!(detect_dataset_kinds(&["score"]), vec![DatasetKind::TusAnalysis]);
    assert_eq!(detect_dataset_kinds(&["zzz", "qqq"]), vec![DatasetKind::Unknown]);
}
