use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use auditflow_core::config::{PipelineConfig, ENV_OUT_DIR, ENV_PIPELINE_VERSION, ENV_STRICTNESS};
use auditflow_core::pipeline::{self, RunRequest, CT_OUTPUT_NAME, TUS_OUTPUT_NAME};
use auditflow_core::pivot::Aggregation;
use auditflow_core::preprocess::preprocess_file;
use auditflow_core::quality::{self, Alert, DqRules};
use auditflow_core::synthetic::{generate, SyntheticSpec};
use auditflow_core::{normalize::RESULT, outputs::write_frame_csv};
use auditflow_parser::{detect_dataset_kinds, read_table};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUT_DIR: &str = "outputs";

#[derive(Parser, Debug)]
#[command(author, version, about = "Measurement pipeline with row-level audit lineage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the CT and TUS analysis tables and record lineage for every raw row
    Process(ProcessArgs),
    /// Clean an upload so that Date_Time, Result and PCode exist
    Preprocess(PreprocessArgs),
    /// Report missing rates and outliers for a table
    Dq(DqArgs),
    /// Guess which kind of dataset a table holds from its columns
    Detect(DetectArgs),
    /// Write a reproducible synthetic raw table
    Synth(SynthArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Raw measurements (Station_ID, Date_Time, PCode, Result)
    #[arg(long)]
    raw: PathBuf,
    /// Table whose header fixes the CT output columns
    #[arg(long)]
    ct_template: Option<PathBuf>,
    /// Table whose header fixes the TUS output columns
    #[arg(long)]
    tus_template: Option<PathBuf>,
    /// Output directory (falls back to OUT_DIR, then ./outputs)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long, default_value = CT_OUTPUT_NAME)]
    ct_out: String,
    #[arg(long, default_value = TUS_OUTPUT_NAME)]
    tus_out: String,
    /// mean, median, sum or first
    #[arg(long, default_value = "mean")]
    agg: Aggregation,
    /// Version stamped on lineage and outputs (falls back to PIPELINE_VERSION)
    #[arg(long)]
    pipeline_version: Option<String>,
    /// Skip rows that cannot be hashed instead of aborting
    #[arg(long)]
    lenient: bool,
    /// TOML file with data-quality thresholds
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreprocessArgs {
    path: PathBuf,
    #[arg(long, default_value = "uploads")]
    uploads_dir: PathBuf,
}

#[derive(Args, Debug)]
struct DqArgs {
    path: PathBuf,
    #[arg(long)]
    rules: Option<PathBuf>,
    /// Columns to scan for outliers (default: Result)
    #[arg(long, num_args = 1..)]
    columns: Vec<String>,
}

#[derive(Args, Debug)]
struct DetectArgs {
    path: PathBuf,
}

#[derive(Args, Debug)]
struct SynthArgs {
    #[arg(long, default_value_t = 60)]
    days: u32,
    #[arg(long, default_value_t = 12)]
    pcodes: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value = "outputs/synthetic_raw_data.csv")]
    out: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => process(args),
        Command::Preprocess(args) => {
            let output = preprocess_file(&args.path, &args.uploads_dir)
                .with_context(|| format!("failed to preprocess {}", args.path.display()))?;
            println!("{}", output.path.display());
            Ok(())
        }
        Command::Dq(args) => dq(args),
        Command::Detect(args) => {
            let table = read_table(&args.path)
                .with_context(|| format!("failed to read {}", args.path.display()))?;
            for kind in detect_dataset_kinds(&table.column_names()) {
                println!("{kind}");
            }
            Ok(())
        }
        Command::Synth(args) => {
            let spec = SyntheticSpec {
                days: args.days,
                pcode_count: args.pcodes,
                seed: args.seed,
                ..SyntheticSpec::default()
            };
            let df = generate(&spec)?;
            if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            write_frame_csv(&df, &args.out)?;
            info!(path = %args.out.display(), rows = df.height(), "synthetic data written");
            println!("{}", args.out.display());
            Ok(())
        }
    }
}

/// JSON logs on stderr; stdout carries command results.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .filter(|level| !level.trim().is_empty())
                .and_then(|level| EnvFilter::try_new(level).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();
}

fn process(args: ProcessArgs) -> Result<()> {
    let config = PipelineConfig::from_lookup(|key| match key {
        ENV_PIPELINE_VERSION => args
            .pipeline_version
            .clone()
            .or_else(|| std::env::var(key).ok()),
        ENV_OUT_DIR => args
            .out_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .or_else(|| std::env::var(key).ok())
            .or_else(|| Some(DEFAULT_OUT_DIR.to_string())),
        ENV_STRICTNESS if args.lenient => Some("lenient".to_string()),
        _ => std::env::var(key).ok(),
    })
    .context("invalid pipeline configuration")?;

    let mut request = RunRequest::standard(&args.raw);
    request.aggregation = args.agg;
    request.dq_rules = load_rules(args.rules.as_deref())?;
    request.stations[0].output_name = args.ct_out;
    request.stations[0].template = args.ct_template;
    request.stations[1].output_name = args.tus_out;
    request.stations[1].template = args.tus_template;

    let summary = pipeline::run(&config, &request, Utc::now())
        .with_context(|| format!("pipeline run failed for {}", args.raw.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn dq(args: DqArgs) -> Result<()> {
    let rules = load_rules(args.rules.as_deref())?;
    let table = read_table(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let columns = if args.columns.is_empty() {
        vec![RESULT.to_string()]
    } else {
        args.columns
    };

    let missing = quality::compute_missing_rates(&table.frame);
    let outliers = quality::detect_outliers_zscore(&table.frame, &columns, rules.z_threshold)?;
    let alerts = quality::check_thresholds(&missing, &outliers, &rules);
    quality::emit_alerts(&alerts);

    let mut report = Table::new();
    report.load_preset(UTF8_FULL_CONDENSED);
    report.set_content_arrangement(ContentArrangement::Dynamic);
    report.set_header(vec![Cell::new("Column"), Cell::new("Missing"), Cell::new("Outliers")]);
    for (column, rate) in &missing {
        let outlier_cell = outliers
            .get(column)
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        report.add_row(vec![
            Cell::new(column),
            Cell::new(format!("{:.1}%", rate * 100.0)),
            Cell::new(outlier_cell),
        ]);
    }
    println!("{report}");
    print_alerts(&alerts)
}

fn print_alerts(alerts: &[Alert]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(alerts)?);
    Ok(())
}

fn load_rules(path: Option<&Path>) -> Result<DqRules> {
    match path {
        Some(path) => DqRules::from_toml_file(path)
            .with_context(|| format!("failed to load rules from {}", path.display())),
        None => Ok(DqRules::default()),
    }
}
