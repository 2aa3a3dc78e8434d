use std::collections::HashSet;

use csv::ReaderBuilder;
use polars::prelude::DataFrame;

use crate::errors::ParserError;
use crate::formats::common::{build_string_frame, clean_optional};
use crate::registry::TableReader;

/// Reads comma- or tab-separated exports into a frame of nullable string columns.
///
/// Type coercion is left to the caller; short rows are padded with nulls and
/// surplus cells are dropped.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedReader {
    name: &'static str,
    delimiter: u8,
    extensions: &'static [&'static str],
}

impl DelimitedReader {
    pub const fn csv() -> Self {
        Self {
            name: "csv",
            delimiter: b',',
            extensions: &["csv"],
        }
    }

    pub const fn tsv() -> Self {
        Self {
            name: "tsv",
            delimiter: b'\t',
            extensions: &["tsv", "tab"],
        }
    }

    fn headers(&self, record: &csv::StringRecord) -> Result<Vec<String>, ParserError> {
        let headers: Vec<String> = record
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ParserError::EmptyInput { reader: self.name });
        }

        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(ParserError::InvalidHeader {
                    reader: self.name,
                    message: format!("duplicate column '{header}'"),
                });
            }
        }
        Ok(headers)
    }
}

impl TableReader for DelimitedReader {
    fn name(&self) -> &'static str {
        self.name
    }

    fn accepts(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    fn read(&self, content: &[u8]) -> Result<DataFrame, ParserError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(content);

        let mut records = reader.records();
        let header_rec = records
            .next()
            .ok_or(ParserError::EmptyInput { reader: self.name })?
            .map_err(|source| ParserError::Csv {
                reader: self.name,
                source,
            })?;
        let headers = self.headers(&header_rec)?;

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in records {
            let record = record.map_err(|source| ParserError::Csv {
                reader: self.name,
                source,
            })?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            for (idx, column) in columns.iter_mut().enumerate() {
                column.push(clean_optional(record.get(idx)));
            }
        }

        build_string_frame(self.name, &headers, columns)
    }

    fn read_header(&self, content: &[u8]) -> Result<Vec<String>, ParserError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(content);

        let header_rec = reader
            .records()
            .next()
            .ok_or(ParserError::EmptyInput { reader: self.name })?
            .map_err(|source| ParserError::Csv {
                reader: self.name,
                source,
            })?;
        self.headers(&header_rec)
    }
}
