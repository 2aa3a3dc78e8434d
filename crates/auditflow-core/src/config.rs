use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{PipelineError, Result};

pub const ENV_PIPELINE_VERSION: &str = "PIPELINE_VERSION";
pub const ENV_OUT_DIR: &str = "OUT_DIR";
pub const ENV_STRICTNESS: &str = "AUDITFLOW_STRICTNESS";

pub const LINEAGE_FILE_NAME: &str = "audit_lineage.csv";

/// What the recorder does with a row that cannot be canonically encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Abort the batch; nothing from it is written.
    #[default]
    Strict,
    /// Log and skip the offending row.
    Lenient,
}

impl Strictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Lenient => "lenient",
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strictness {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Strictness::Strict),
            "lenient" | "skip" => Ok(Strictness::Lenient),
            other => Err(PipelineError::Config(format!(
                "{ENV_STRICTNESS} must be 'strict' or 'lenient', got '{other}'"
            ))),
        }
    }
}

/// Per-run settings. Passed explicitly so that runs with different versions or
/// output directories can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub pipeline_version: String,
    pub out_dir: PathBuf,
    pub strictness: Strictness,
}

impl PipelineConfig {
    pub fn new(pipeline_version: impl Into<String>, out_dir: impl Into<PathBuf>) -> Result<Self> {
        let pipeline_version = validate_version(pipeline_version.into())?;
        let out_dir = out_dir.into();
        if out_dir.as_os_str().is_empty() {
            return Err(PipelineError::Config("out_dir must not be empty".to_string()));
        }
        Ok(Self {
            pipeline_version,
            out_dir,
            strictness: Strictness::default(),
        })
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Reads `PIPELINE_VERSION`, `OUT_DIR` and `AUDITFLOW_STRICTNESS` from the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] against an arbitrary lookup, so
    /// callers can layer flags over the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let version = lookup(ENV_PIPELINE_VERSION)
            .ok_or_else(|| PipelineError::Config(format!("{ENV_PIPELINE_VERSION} is not set")))?;
        let out_dir = lookup(ENV_OUT_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .ok_or_else(|| PipelineError::Config(format!("{ENV_OUT_DIR} is not set")))?;
        let strictness = match lookup(ENV_STRICTNESS) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Strictness::default(),
        };

        Ok(Self::new(version, out_dir)?.with_strictness(strictness))
    }

    pub fn lineage_path(&self) -> PathBuf {
        self.out_dir.join(LINEAGE_FILE_NAME)
    }

    /// Creates `out_dir` if needed and proves it is writable by creating and
    /// removing a probe file. Failures here are configuration errors: nothing
    /// has been processed yet.
    pub fn ensure_out_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.out_dir).map_err(|err| {
            PipelineError::Config(format!(
                "cannot create out_dir {}: {err}",
                self.out_dir.display()
            ))
        })?;
        probe_writable(&self.out_dir)
    }
}

fn validate_version(version: String) -> Result<String> {
    let trimmed = version.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::Config(
            "pipeline_version must not be blank".to_string(),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(PipelineError::Config(
            "pipeline_version must not contain control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn probe_writable(dir: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(".auditflow-probe")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|err| {
            PipelineError::Config(format!("out_dir {} is not writable: {err}", dir.display()))
        })
}
