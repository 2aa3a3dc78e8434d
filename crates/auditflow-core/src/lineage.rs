use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::atomic::{parent_dir, sync_dir, AtomicFile};
use crate::config::{PipelineConfig, Strictness};
use crate::error::{PipelineError, Result};
use crate::hashing::{hash_row, ColumnOrder};
use crate::row::Row;

pub const LINEAGE_HEADER: [&str; 3] = ["row_hash", "processed_at", "pipeline_version"];

/// Provenance of one processed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageRecord {
    pub row_hash: String,
    #[serde(serialize_with = "serialize_utc", deserialize_with = "deserialize_utc")]
    pub processed_at: DateTime<Utc>,
    pub pipeline_version: String,
}

impl LineageRecord {
    pub fn new(
        row_hash: impl Into<String>,
        processed_at: DateTime<Utc>,
        pipeline_version: impl Into<String>,
    ) -> Self {
        Self {
            row_hash: row_hash.into(),
            processed_at,
            pipeline_version: pipeline_version.into(),
        }
    }
}

/// ISO-8601, UTC, microsecond precision, `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_utc<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

fn deserialize_utc<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Append-only CSV log of [`LineageRecord`]s.
///
/// Every append rewrites the whole file through [`AtomicFile`], so a reader
/// only ever sees the previous complete log or the new complete log.
/// [`LineageLog::finalize`] consumes the log.
#[derive(Debug)]
pub struct LineageLog {
    path: PathBuf,
    appended: usize,
}

impl LineageLog {
    /// Opens (without creating) the log at `path`. An existing file must carry
    /// the lineage header.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dir = parent_dir(&path);
        if !dir.is_dir() {
            return Err(PipelineError::storage(
                "opening lineage log",
                &path,
                std::io::Error::new(ErrorKind::NotFound, "parent directory does not exist"),
            ));
        }
        read_existing(&path)?;
        Ok(Self { path, appended: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn append_record(&mut self, record: &LineageRecord) -> Result<()> {
        self.append_records(std::slice::from_ref(record))
    }

    /// Appends a batch under a single atomic replace.
    pub fn append_records(&mut self, records: &[LineageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.stage(records)?.commit()
    }

    /// Stages `records` after the current content without publishing them.
    ///
    /// The returned guard owns the temporary file; it is released on every
    /// path, and only [`StagedAppend::commit`] makes the new content visible.
    pub fn stage(&mut self, records: &[LineageRecord]) -> Result<StagedAppend<'_>> {
        let existing = read_existing(&self.path)?;

        let mut file = AtomicFile::create(&self.path)?;
        file.write_all(&existing)?;
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(existing.is_empty())
            .from_writer(Vec::new());
        for record in records {
            writer.serialize(record)?;
        }
        let encoded = writer
            .into_inner()
            .map_err(|err| PipelineError::storage("encoding records for", &self.path, err.into_error()))?;
        file.write_all(&encoded)?;

        Ok(StagedAppend {
            log: self,
            file,
            count: records.len(),
        })
    }

    /// Flushes the directory entry and closes the log.
    pub fn finalize(self) -> Result<LineageSummary> {
        sync_dir(parent_dir(&self.path))?;
        info!(
            path = %self.path.display(),
            records = self.appended,
            "lineage log finalized"
        );
        Ok(LineageSummary {
            path: self.path,
            records_appended: self.appended,
        })
    }

    /// Parses a lineage log back into records (compliance export, tests).
    pub fn read_records(path: &Path) -> Result<Vec<LineageRecord>> {
        let existing = read_existing(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(existing.as_slice());
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }
}

/// An append that has been written to a temporary file but not published.
#[derive(Debug)]
pub struct StagedAppend<'a> {
    log: &'a mut LineageLog,
    file: AtomicFile,
    count: usize,
}

impl StagedAppend<'_> {
    pub fn staged_path(&self) -> &Path {
        self.file.staged_path()
    }

    pub fn commit(self) -> Result<()> {
        self.file.commit()?;
        self.log.appended += self.count;
        debug!(path = %self.log.path.display(), records = self.count, "lineage records appended");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageSummary {
    pub path: PathBuf,
    pub records_appended: usize,
}

/// Reads the current log bytes; a missing file is an empty log.
fn read_existing(path: &Path) -> Result<Vec<u8>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PipelineError::storage("reading lineage log", path, err)),
    };

    if !bytes.is_empty() {
        let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
        let first_line = first_line.strip_suffix(b"\r").unwrap_or(first_line);
        if first_line != LINEAGE_HEADER.join(",").as_bytes() {
            return Err(PipelineError::Validation(format!(
                "{} is not a lineage log (unexpected header '{}')",
                path.display(),
                String::from_utf8_lossy(first_line)
            )));
        }
    }

    Ok(bytes)
}

/// Hashes rows and records their lineage for one pipeline run.
#[derive(Debug)]
pub struct LineageRecorder {
    pipeline_version: String,
    strictness: Strictness,
    order: ColumnOrder,
    log: LineageLog,
}

/// Result of recording a batch of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    pub records: Vec<LineageRecord>,
    /// Zero-based positions of rows skipped in lenient mode.
    pub skipped: Vec<usize>,
}

impl LineageRecorder {
    /// Fails with a config error when `out_dir` is unusable.
    pub fn new(config: &PipelineConfig, order: ColumnOrder) -> Result<Self> {
        config.ensure_out_dir()?;
        let log = LineageLog::open(config.lineage_path())?;
        Ok(Self {
            pipeline_version: config.pipeline_version.clone(),
            strictness: config.strictness,
            order,
            log,
        })
    }

    pub fn log(&self) -> &LineageLog {
        &self.log
    }

    pub fn hash(&self, row: &Row) -> Result<String> {
        hash_row(row, &self.order)
    }

    /// Hashes one row and appends its record.
    pub fn record_row(&mut self, row: &Row, processed_at: DateTime<Utc>) -> Result<LineageRecord> {
        let record = LineageRecord::new(self.hash(row)?, processed_at, self.pipeline_version.as_str());
        self.log.append_record(&record)?;
        Ok(record)
    }

    /// Hashes every row first, then appends all records under one replace.
    ///
    /// In strict mode the first encoding failure aborts the batch before
    /// anything is written. In lenient mode failing rows are skipped.
    pub fn record_rows<'r, I>(&mut self, rows: I, processed_at: DateTime<Utc>) -> Result<RecordOutcome>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let mut outcome = RecordOutcome::default();

        for (idx, row) in rows.into_iter().enumerate() {
            match self.hash(row) {
                Ok(row_hash) => outcome.records.push(LineageRecord::new(
                    row_hash,
                    processed_at,
                    self.pipeline_version.as_str(),
                )),
                Err(err) if err.is_encoding() && self.strictness == Strictness::Lenient => {
                    warn!(row = idx, error = %err, "skipping row that cannot be encoded");
                    outcome.skipped.push(idx);
                }
                Err(err) => {
                    warn!(row = idx, error = %err, "aborting lineage batch");
                    return Err(err);
                }
            }
        }

        self.log.append_records(&outcome.records)?;
        Ok(outcome)
    }

    pub fn finalize(self) -> Result<LineageSummary> {
        self.log.finalize()
    }
}
