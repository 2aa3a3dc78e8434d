use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::{AnyValue, DataFrame, TimeUnit};

use crate::error::Result;

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A single cell. `Bytes` and `Unsupported` exist so that frames can be turned
/// into rows losslessly; neither has a canonical encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
    Unsupported(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
            Value::Unsupported(_) => "unsupported",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Unsupported(dtype) => write!(f, "<{dtype}>"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<AnyValue<'_>> for Value {
    fn from(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Value::Null,
            AnyValue::Boolean(v) => Value::Bool(v),
            AnyValue::String(v) => Value::Text(v.to_string()),
            AnyValue::StringOwned(v) => Value::Text(v.to_string()),
            AnyValue::Int32(v) => Value::Int(v.into()),
            AnyValue::Int64(v) => Value::Int(v),
            AnyValue::UInt32(v) => Value::Int(v.into()),
            AnyValue::UInt64(v) => match i64::try_from(v) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Unsupported(format!("u64 out of range ({v})")),
            },
            AnyValue::Float32(v) => Value::Float(v.into()),
            AnyValue::Float64(v) => Value::Float(v),
            AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
                .map(Value::Date)
                .unwrap_or_else(|| Value::Unsupported(format!("date out of range ({days})"))),
            AnyValue::Datetime(ts, unit, _) => {
                let parsed = match unit {
                    TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(ts)),
                    TimeUnit::Microseconds => DateTime::from_timestamp_micros(ts),
                    TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ts),
                };
                parsed
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .unwrap_or_else(|| Value::Unsupported(format!("datetime out of range ({ts})")))
            }
            AnyValue::Binary(bytes) => Value::Bytes(bytes.to_vec()),
            AnyValue::BinaryOwned(bytes) => Value::Bytes(bytes),
            other => Value::Unsupported(other.dtype().to_string()),
        }
    }
}

/// Ordered column-name to value mapping for one processed record.
///
/// Insertion order is kept for display; hashing never relies on it (see
/// [`crate::hashing::ColumnOrder`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Row::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a column, replacing the value in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Materializes row `idx` of a frame, columns in frame order.
    pub fn from_frame(df: &DataFrame, idx: usize) -> Result<Self> {
        let mut row = Row::new();
        for column in df.get_columns() {
            let value = column.get(idx)?;
            row.insert(column.name().as_str(), Value::from(value));
        }
        Ok(row)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

/// Iterates every row of a frame in order.
pub fn frame_rows(df: &DataFrame) -> impl Iterator<Item = Result<Row>> + '_ {
    (0..df.height()).map(move |idx| Row::from_frame(df, idx))
}
