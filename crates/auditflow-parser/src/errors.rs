use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("input not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("unsupported input extension '{extension}': {reason}")]
    UnsupportedFormat { extension: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{reader} CSV error: {source}")]
    Csv {
        reader: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{reader} header invalid: {message}")]
    InvalidHeader {
        reader: &'static str,
        message: String,
    },

    #[error("{reader} input did not contain a header row")]
    EmptyInput { reader: &'static str },

    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),
}
