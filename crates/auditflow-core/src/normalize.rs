use auditflow_parser::{parse_datetime, parse_optional_f64};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub const STATION_ID: &str = "Station_ID";
pub const DATE_TIME: &str = "Date_Time";
pub const PCODE: &str = "PCode";
pub const RESULT: &str = "Result";

/// Columns every raw measurement table must provide.
pub const RAW_COLUMNS: [&str; 4] = [STATION_ID, DATE_TIME, PCODE, RESULT];

/// Coerces a raw table into the typed measurement layout.
///
/// Column names are trimmed. `Date_Time` becomes a microsecond datetime and
/// `Result` a float, both null where the text does not parse. `PCode` and
/// `Station_ID` are trimmed strings. Other columns pass through untouched.
pub fn normalize(df: &DataFrame) -> Result<DataFrame> {
    let mut out = rename_columns(df, |name| name.trim().to_string())?;

    let missing: Vec<&str> = RAW_COLUMNS
        .iter()
        .copied()
        .filter(|name| out.column(name).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Validation(format!(
            "raw table is missing required columns: {}",
            missing.join(", ")
        )));
    }

    let timestamps = text_values(&out, DATE_TIME)?
        .into_iter()
        .map(|value| {
            value
                .as_deref()
                .and_then(parse_datetime)
                .map(|dt| dt.and_utc().timestamp_micros())
        })
        .collect::<Vec<Option<i64>>>();
    let date_time = Series::new(DATE_TIME.into(), timestamps)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    out.with_column(date_time)?;

    let results = text_values(&out, RESULT)?
        .into_iter()
        .map(|value| value.as_deref().and_then(parse_optional_f64))
        .collect::<Vec<Option<f64>>>();
    out.with_column(Series::new(RESULT.into(), results))?;

    for name in [PCODE, STATION_ID] {
        let trimmed = text_values(&out, name)?
            .into_iter()
            .map(|value| value.map(|v| v.trim().to_string()))
            .collect::<Vec<Option<String>>>();
        out.with_column(Series::new(name.into(), trimmed))?;
    }

    Ok(out)
}

/// Rebuilds `df` with every column renamed by `rename`; clashing names fail.
pub(crate) fn rename_columns<F>(df: &DataFrame, rename: F) -> Result<DataFrame>
where
    F: Fn(&str) -> String,
{
    let columns: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|column| {
            let mut column = column.clone();
            let name = rename(column.name().as_str());
            column.rename(name.as_str().into());
            column
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Reads any column as optional text.
pub(crate) fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column.str()?;
    Ok(values
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}
