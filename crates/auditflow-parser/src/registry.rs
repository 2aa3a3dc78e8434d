use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use polars::prelude::DataFrame;

use crate::errors::ParserError;
use crate::formats::DelimitedReader;
use crate::model::RawTable;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm"];

pub trait TableReader {
    fn name(&self) -> &'static str;
    fn accepts(&self, extension: &str) -> bool;
    fn read(&self, content: &[u8]) -> Result<DataFrame, ParserError>;
    fn read_header(&self, content: &[u8]) -> Result<Vec<String>, ParserError>;
}

/// Reads an input table, picking the reader by file extension.
pub fn read_table(path: &Path) -> Result<RawTable, ParserError> {
    let csv = DelimitedReader::csv();
    let tsv = DelimitedReader::tsv();
    let readers: [&dyn TableReader; 2] = [&csv, &tsv];
    read_with_readers(path, &readers)
}

/// Column names of a table without materializing its rows (template files).
pub fn read_header(path: &Path) -> Result<Vec<String>, ParserError> {
    let csv = DelimitedReader::csv();
    let tsv = DelimitedReader::tsv();
    let readers: [&dyn TableReader; 2] = [&csv, &tsv];
    let content = read_bytes(path)?;
    let reader = select_reader(path, &readers)?;
    reader.read_header(&content)
}

pub fn read_with_readers(
    path: &Path,
    readers: &[&dyn TableReader],
) -> Result<RawTable, ParserError> {
    let content = read_bytes(path)?;
    let reader = select_reader(path, readers)?;
    let frame = reader.read(&content)?;
    Ok(RawTable {
        path: path.to_path_buf(),
        reader: reader.name(),
        frame,
    })
}

fn select_reader<'a>(
    path: &Path,
    readers: &[&'a dyn TableReader],
) -> Result<&'a dyn TableReader, ParserError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if let Some(reader) = readers.iter().find(|reader| reader.accepts(&extension)) {
        return Ok(*reader);
    }

    let reason = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        "spreadsheet workbooks must be exported to CSV before processing".to_string()
    } else {
        let known: Vec<&str> = readers.iter().map(|reader| reader.name()).collect();
        format!("expected one of: {}", known.join(", "))
    };

    Err(ParserError::UnsupportedFormat { extension, reason })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ParserError> {
    fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ParserError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ParserError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}
