use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::atomic::AtomicFile;
use crate::error::Result;
use crate::lineage::format_timestamp;

pub const GENERATED_AT: &str = "generated_at";
pub const PIPELINE_VERSION: &str = "pipeline_version";

/// Where a published analysis table landed.
#[derive(Debug, Clone, Serialize)]
pub struct OutputArtifact {
    pub station: String,
    pub path: PathBuf,
    pub row_count: usize,
}

/// Appends `generated_at` and `pipeline_version` columns to every row.
pub fn stamp_run_metadata(
    df: &DataFrame,
    generated_at: DateTime<Utc>,
    pipeline_version: &str,
) -> Result<DataFrame> {
    let rows = df.height();
    let generated = format_timestamp(&generated_at);

    let mut out = df.clone();
    out.with_column(Series::new(
        GENERATED_AT.into(),
        vec![generated.as_str(); rows],
    ))?;
    out.with_column(Series::new(
        PIPELINE_VERSION.into(),
        vec![pipeline_version; rows],
    ))?;
    Ok(out)
}

/// Writes `df` as CSV (with header) through an atomic replace.
pub fn write_frame_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut frame = df.clone();
    let mut file = AtomicFile::create(path)?;
    CsvWriter::new(file.file_mut())
        .include_header(true)
        .finish(&mut frame)?;
    file.commit()
}

/// Stamps and writes one station's analysis table.
pub fn publish_analysis(
    station: &str,
    pivot: &DataFrame,
    path: &Path,
    generated_at: DateTime<Utc>,
    pipeline_version: &str,
) -> Result<OutputArtifact> {
    let stamped = stamp_run_metadata(pivot, generated_at, pipeline_version)?;
    write_frame_csv(&stamped, path)?;

    info!(
        station,
        path = %path.display(),
        rows = stamped.height(),
        "analysis output written"
    );

    Ok(OutputArtifact {
        station: station.to_string(),
        path: path.to_path_buf(),
        row_count: stamped.height(),
    })
}
