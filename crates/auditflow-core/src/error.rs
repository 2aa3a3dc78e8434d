// crates/auditflow-core/src/error.rs

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot encode column '{column}': {reason}")]
    Encoding { column: String, reason: String },

    #[error("Storage failure while {operation} {}: {source}", path.display())]
    Storage {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Input table error: {0}")]
    Input(#[from] auditflow_parser::ParserError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Rules file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn storage(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        PipelineError::Storage {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn encoding(column: &str, reason: impl Into<String>) -> Self {
        PipelineError::Encoding {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_encoding(&self) -> bool {
        matches!(self, PipelineError::Encoding { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
