pub mod detect;
pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use detect::{detect_dataset_kinds, score_columns, DatasetKind, DetectionScores};
pub use errors::ParserError;
pub use formats::{parse_datetime, parse_optional_f64, DelimitedReader};
pub use model::RawTable;
pub use registry::{read_header, read_table, read_with_readers, TableReader};

#[cfg(test)]
mod tests;
