use std::fs;
use std::path::{Path, PathBuf};

use auditflow_parser::{read_header, read_table};
use blake3::Hasher;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::hashing::ColumnOrder;
use crate::lineage::{LineageRecorder, LineageSummary};
use crate::normalize::{normalize, RAW_COLUMNS, RESULT};
use crate::outputs::{publish_analysis, OutputArtifact};
use crate::pivot::{pivot_station, Aggregation, DATES, STATION};
use crate::quality::{assess, Alert, DqRules};
use crate::row::{frame_rows, Row};

pub const CT_OUTPUT_NAME: &str = "CT_Analysis_Output.csv";
pub const TUS_OUTPUT_NAME: &str = "TUS_Analysis_Output.csv";

/// One analysis table to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationOutput {
    pub station: String,
    /// A table whose header (minus `Station` and `Dates`) fixes the columns.
    pub template: Option<PathBuf>,
    pub output_name: String,
}

impl StationOutput {
    pub fn new(station: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            template: None,
            output_name: output_name.into(),
        }
    }

    pub fn with_template(mut self, template: Option<PathBuf>) -> Self {
        self.template = template;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub raw: PathBuf,
    pub stations: Vec<StationOutput>,
    pub aggregation: Aggregation,
    pub dq_rules: DqRules,
}

impl RunRequest {
    /// The CT and TUS tables with default file names.
    pub fn standard(raw: impl Into<PathBuf>) -> Self {
        Self {
            raw: raw.into(),
            stations: vec![
                StationOutput::new("CT", CT_OUTPUT_NAME),
                StationOutput::new("TUS", TUS_OUTPUT_NAME),
            ],
            aggregation: Aggregation::default(),
            dq_rules: DqRules::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline_version: String,
    pub input_hash: String,
    pub rows: usize,
    pub lineage: LineageSummary,
    pub skipped_rows: Vec<usize>,
    pub alerts: Vec<Alert>,
    pub outputs: Vec<OutputArtifact>,
}

/// Processes one raw table end to end.
///
/// Configuration, the output directory and station templates are checked
/// before any input is read. Lineage for every row is committed before the analysis tables are
/// written, and every file is replaced atomically.
pub fn run(config: &PipelineConfig, request: &RunRequest, now: DateTime<Utc>) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline_run", %run_id, version = %config.pipeline_version);
    let _guard = span.enter();

    config.ensure_out_dir()?;
    validate_outputs(request)?;
    let templates = request
        .stations
        .iter()
        .map(|station| station.template.as_deref().map(template_columns).transpose())
        .collect::<Result<Vec<Option<Vec<String>>>>>()?;

    let table = read_table(&request.raw)?;
    let input_hash = fingerprint(&request.raw)?;
    info!(
        raw = %request.raw.display(),
        rows = table.height(),
        input_hash = %input_hash,
        "raw table loaded"
    );

    let frame = normalize(&table.frame)?;

    let dq_columns = vec![RESULT.to_string()];
    let alerts = assess(&frame, &dq_columns, &request.dq_rules)?;

    let rows = frame_rows(&frame).collect::<Result<Vec<Row>>>()?;
    let mut recorder = LineageRecorder::new(config, ColumnOrder::schema(RAW_COLUMNS))?;
    let outcome = recorder.record_rows(rows.iter(), now)?;
    let lineage = recorder.finalize()?;

    let mut outputs = Vec::with_capacity(request.stations.len());
    for (station, template) in request.stations.iter().zip(&templates) {
        let pivot = pivot_station(
            &frame,
            &station.station,
            template.as_deref(),
            request.aggregation,
        )?;
        let path = config.out_dir.join(&station.output_name);
        outputs.push(publish_analysis(
            &station.station,
            &pivot,
            &path,
            now,
            &config.pipeline_version,
        )?);
    }

    info!(
        rows = rows.len(),
        records = lineage.records_appended,
        skipped = outcome.skipped.len(),
        alerts = alerts.len(),
        "pipeline run complete"
    );

    Ok(RunSummary {
        run_id,
        pipeline_version: config.pipeline_version.clone(),
        input_hash,
        rows: rows.len(),
        lineage,
        skipped_rows: outcome.skipped,
        alerts,
        outputs,
    })
}

/// Header of a template table, without the `Station` and `Dates` columns.
pub fn template_columns(path: &Path) -> Result<Vec<String>> {
    Ok(read_header(path)?
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| name != STATION && name != DATES)
        .collect())
}

fn validate_outputs(request: &RunRequest) -> Result<()> {
    for station in &request.stations {
        let name = Path::new(&station.output_name);
        if station.output_name.trim().is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(PipelineError::Config(format!(
                "output name for station {} must be a plain file name, got '{}'",
                station.station, station.output_name
            )));
        }
    }
    Ok(())
}

fn fingerprint(path: &Path) -> Result<String> {
    let contents =
        fs::read(path).map_err(|err| PipelineError::storage("fingerprinting input", path, err))?;
    let mut hasher = Hasher::new();
    hasher.update(&contents);
    Ok(hasher.finalize().to_hex().to_string())
}
