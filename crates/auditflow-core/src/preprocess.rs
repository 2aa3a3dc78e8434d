use std::fs;
use std::path::{Path, PathBuf};

use auditflow_parser::{parse_datetime, read_table};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::normalize::{rename_columns, text_values, DATE_TIME, PCODE, RESULT};
use crate::outputs::write_frame_csv;

/// Columns an upload must carry before it can be processed.
pub const REQUIRED_UPLOAD_COLUMNS: [&str; 3] = [DATE_TIME, RESULT, PCODE];

pub const PLACEHOLDER: &str = "Unknown";

const DATETIME_HINTS: [&str; 5] = ["date", "time", "timestamp", "created", "datetime"];
const DATETIME_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NUMERIC_NOISE: [char; 4] = [',', '₹', '$', '%'];

/// How `Date_Time` came to exist in a cleaned upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "column", rename_all = "snake_case")]
pub enum DateTimeSource {
    Existing,
    Mapped(String),
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreprocessReport {
    pub date_time: DateTimeSource,
    pub numeric_columns: Vec<String>,
    pub placeholders: Vec<String>,
    /// Rows lost because the mapped timestamp did not parse.
    pub unparsed_timestamps: usize,
    pub dropped_rows: usize,
    pub dropped_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreprocessOutput {
    pub path: PathBuf,
    pub rows: usize,
    pub report: PreprocessReport,
}

/// Collapses every run of non-alphanumeric characters into `_` and trims `_`.
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_gap = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Cleans an upload table so that the pipeline's required columns exist.
pub fn preprocess_frame(df: &DataFrame) -> Result<(DataFrame, PreprocessReport)> {
    let mut frame = rename_columns(df, normalize_column_name)?;

    let (date_time, unparsed_timestamps) = ensure_datetime_column(&mut frame)?;
    let numeric_columns = clean_numeric_columns(&mut frame)?;

    let mut placeholders = Vec::new();
    for name in REQUIRED_UPLOAD_COLUMNS {
        if frame.column(name).is_err() {
            warn!(column = name, "required column missing; filling placeholder");
            frame.with_column(Series::new(name.into(), vec![PLACEHOLDER; frame.height()]))?;
            placeholders.push(name.to_string());
        }
    }

    let before = frame.height();
    let frame = drop_null_rows(&frame)?;
    let dropped_rows = before - frame.height();
    let (frame, dropped_columns) = drop_null_columns(frame)?;

    Ok((
        frame,
        PreprocessReport {
            date_time,
            numeric_columns,
            placeholders,
            unparsed_timestamps,
            dropped_rows,
            dropped_columns,
        },
    ))
}

/// Reads `path`, cleans it, and writes `<uploads_dir>/<stem>_cleaned.csv`.
pub fn preprocess_file(path: &Path, uploads_dir: &Path) -> Result<PreprocessOutput> {
    let table = read_table(path)?;
    let (cleaned, report) = preprocess_frame(&table.frame)?;

    fs::create_dir_all(uploads_dir)
        .map_err(|err| PipelineError::storage("creating uploads directory", uploads_dir, err))?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let target = uploads_dir.join(format!("{stem}_cleaned.csv"));
    write_frame_csv(&cleaned, &target)?;

    info!(
        source = %path.display(),
        path = %target.display(),
        rows = cleaned.height(),
        "upload preprocessed"
    );

    Ok(PreprocessOutput {
        path: target,
        rows: cleaned.height(),
        report,
    })
}

/// Guarantees a `Date_Time` column. Returns where it came from and how many
/// rows were dropped for an unparseable mapped timestamp.
fn ensure_datetime_column(df: &mut DataFrame) -> Result<(DateTimeSource, usize)> {
    if df.column(DATE_TIME).is_ok() {
        return Ok((DateTimeSource::Existing, 0));
    }

    let candidate = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .find(|name| {
            let lower = name.to_lowercase();
            DATETIME_HINTS.iter().any(|hint| lower.contains(hint))
        });

    let Some(source) = candidate else {
        warn!("no timestamp column found; generating hourly Date_Time");
        let start = synthetic_start();
        let values: Vec<String> = (0..df.height())
            .map(|i| (start + Duration::hours(i as i64)).format(DATETIME_OUTPUT_FORMAT).to_string())
            .collect();
        df.with_column(Series::new(DATE_TIME.into(), values))?;
        return Ok((DateTimeSource::Synthetic, 0));
    };

    let parsed: Vec<Option<String>> = text_values(df, &source)?
        .into_iter()
        .map(|value| {
            value
                .as_deref()
                .and_then(parse_datetime)
                .map(|dt| dt.format(DATETIME_OUTPUT_FORMAT).to_string())
        })
        .collect();
    let keep: Vec<bool> = parsed.iter().map(Option::is_some).collect();
    let unparsed = keep.iter().filter(|ok| !**ok).count();

    df.with_column(Series::new(DATE_TIME.into(), parsed))?;
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    *df = df.filter(&mask)?;

    info!(source = %source, dropped = unparsed, "mapped timestamp column to Date_Time");
    Ok((DateTimeSource::Mapped(source), unparsed))
}

fn synthetic_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts text columns that hold only (decorated) numbers into floats.
fn clean_numeric_columns(df: &mut DataFrame) -> Result<Vec<String>> {
    let candidates: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|column| column.dtype() == &DataType::String && column.name().as_str() != DATE_TIME)
        .map(|column| column.name().to_string())
        .collect();

    let mut converted = Vec::new();
    for name in candidates {
        let values = text_values(df, &name)?;
        let mut parsed = Vec::with_capacity(values.len());
        let mut numeric = values.iter().any(Option::is_some);
        for value in &values {
            match value {
                None => parsed.push(None),
                Some(text) => match strip_numeric_noise(text).parse::<f64>() {
                    Ok(number) => parsed.push(Some(number)),
                    Err(_) => {
                        numeric = false;
                        break;
                    }
                },
            }
        }
        if numeric {
            df.with_column(Series::new(name.as_str().into(), parsed))?;
            converted.push(name);
        }
    }
    Ok(converted)
}

fn strip_numeric_noise(text: &str) -> String {
    text.chars()
        .filter(|ch| !NUMERIC_NOISE.contains(ch))
        .collect::<String>()
        .trim()
        .to_string()
}

fn drop_null_rows(df: &DataFrame) -> Result<DataFrame> {
    if df.width() == 0 {
        return Ok(df.clone());
    }
    let mut keep = vec![false; df.height()];
    for column in df.get_columns() {
        for (idx, is_null) in column.is_null().into_iter().enumerate() {
            if is_null == Some(false) {
                keep[idx] = true;
            }
        }
    }
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Drops columns with no values. An empty table keeps its columns.
fn drop_null_columns(df: DataFrame) -> Result<(DataFrame, Vec<String>)> {
    if df.height() == 0 {
        return Ok((df, Vec::new()));
    }
    let height = df.height();
    let (kept, dropped): (Vec<Column>, Vec<Column>) = df
        .get_columns()
        .iter()
        .cloned()
        .partition(|column| column.null_count() < height);
    let dropped = dropped.iter().map(|c| c.name().to_string()).collect();
    Ok((DataFrame::new(kept)?, dropped))
}
