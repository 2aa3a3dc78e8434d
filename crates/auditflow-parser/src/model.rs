use std::path::PathBuf;

use polars::prelude::DataFrame;

/// A table as it came off disk: every column is a nullable string.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub reader: &'static str,
    pub frame: DataFrame,
}

impl RawTable {
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }
}
