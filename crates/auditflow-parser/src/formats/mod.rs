mod common;
mod delimited;

pub use common::{parse_datetime, parse_optional_f64};
pub use delimited::DelimitedReader;
