use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn auditflow(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_auditflow"))
        .current_dir(cwd)
        .env_remove("PIPELINE_VERSION")
        .env_remove("OUT_DIR")
        .env_remove("AUDITFLOW_STRICTNESS")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("run auditflow binary")
}

#[test]
fn synth_then_process_writes_outputs_and_lineage() {
    let dir = tempfile::tempdir().expect("tempdir");

    let synth = auditflow(
        dir.path(),
        &["synth", "--days", "3", "--pcodes", "2", "--out", "raw.csv"],
    );
    assert!(synth.status.success(), "{}", String::from_utf8_lossy(&synth.stderr));

    let process = auditflow(
        dir.path(),
        &[
            "process",
            "--raw",
            "raw.csv",
            "--out-dir",
            "out",
            "--pipeline-version",
            "0.1.0",
            "--agg",
            "median",
        ],
    );
    assert!(process.status.success(), "{}", String::from_utf8_lossy(&process.stderr));

    let summary: serde_json::Value =
        serde_json::from_slice(&process.stdout).expect("summary is json");
    assert_eq!(summary["rows"], 12);
    assert_eq!(summary["lineage"]["records_appended"], 12);
    assert_eq!(summary["pipeline_version"], "0.1.0");

    let lineage = fs::read_to_string(dir.path().join("out/audit_lineage.csv")).expect("lineage");
    assert!(lineage.starts_with("row_hash,processed_at,pipeline_version\n"));
    assert_eq!(lineage.lines().count(), 13);
    assert!(dir.path().join("out/CT_Analysis_Output.csv").exists());
    assert!(dir.path().join("out/TUS_Analysis_Output.csv").exists());
}

#[test]
fn process_without_version_fails_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("raw.csv"),
        "Station_ID,Date_Time,PCode,Result\nCT,2021-01-01,Data 1,1\n",
    )
    .expect("write raw");

    let output = auditflow(dir.path(), &["process", "--raw", "raw.csv", "--out-dir", "out"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PIPELINE_VERSION"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn unknown_aggregation_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = auditflow(
        dir.path(),
        &["process", "--raw", "raw.csv", "--pipeline-version", "1", "--agg", "max"],
    );
    assert!(!output.status.success());
}

#[test]
fn detect_and_preprocess_report_on_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("upload.csv"),
        "Station_ID,Date_Time,PCode,Result\nCT,2021-01-01,Data 1,\"1,200\"\n",
    )
    .expect("write upload");

    let detect = auditflow(dir.path(), &["detect", "upload.csv"]);
    assert!(detect.status.success());
    assert!(String::from_utf8_lossy(&detect.stdout).contains("raw_data"));

    let preprocess = auditflow(dir.path(), &["preprocess", "upload.csv"]);
    assert!(preprocess.status.success(), "{}", String::from_utf8_lossy(&preprocess.stderr));
    let printed = String::from_utf8_lossy(&preprocess.stdout);
    assert!(printed.trim().ends_with("upload_cleaned.csv"));
    assert!(dir.path().join("uploads/upload_cleaned.csv").exists());
}

#[test]
fn dq_prints_alerts_as_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("raw.csv"),
        "Station_ID,Date_Time,PCode,Result\nCT,2021-01-01,Data 1,\nCT,2021-01-02,Data 1,2\n",
    )
    .expect("write raw");

    let output = auditflow(dir.path(), &["dq", "raw.csv"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"type\": \"missing_rate\""));
    assert!(stdout.contains("\"column\": \"Result\""));
}

#[test]
fn info_events_are_logged_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_auditflow"))
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("LOG_LEVEL")
        .args(["synth", "--days", "1", "--pcodes", "1", "--out", "raw.csv"])
        .output()
        .expect("run auditflow binary");

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("synthetic data written"), "stderr: {stderr}");
    assert!(stderr.contains("\"level\":\"INFO\""), "stderr: {stderr}");
}
