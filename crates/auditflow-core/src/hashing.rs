//! Canonical row encoding and SHA-256 row digests.
//!
//! The byte form is versioned and length-prefixed so that no two distinct
//! (name, type, value) sequences share an encoding:
//!
//! ```text
//! "auditflow-row-v1" | u64be(field_count)
//!   then per field: u64be(len) name | type tag | u64be(len) payload
//! ```

use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::row::{Row, Value};

const ENCODING_TAG: &[u8] = b"auditflow-row-v1";

static NULL: Value = Value::Null;

/// Hex digest length of a SHA-256 row hash.
pub const DIGEST_HEX_LEN: usize = 64;

/// Column order used to serialize a row before hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnOrder {
    /// All columns, sorted by name (byte order).
    #[default]
    Sorted,
    /// Exactly these columns, in this order; absent columns encode as null and
    /// columns outside the schema are ignored.
    Schema(Vec<String>),
}

impl ColumnOrder {
    pub fn schema<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnOrder::Schema(columns.into_iter().map(Into::into).collect())
    }

    fn arrange<'a>(&'a self, row: &'a Row) -> Vec<(&'a str, &'a Value)> {
        match self {
            ColumnOrder::Sorted => {
                let mut fields: Vec<(&str, &Value)> = row.iter().collect();
                fields.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
                fields
            }
            ColumnOrder::Schema(columns) => columns
                .iter()
                .map(|name| (name.as_str(), row.get(name).unwrap_or(&NULL)))
                .collect(),
        }
    }
}

/// Deterministic SHA-256 over the canonical encoding of `row`.
pub fn hash_row(row: &Row, order: &ColumnOrder) -> Result<String> {
    let bytes = canonical_bytes(row, order)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

pub fn canonical_bytes(row: &Row, order: &ColumnOrder) -> Result<Vec<u8>> {
    let fields = order.arrange(row);

    let mut buf = Vec::with_capacity(ENCODING_TAG.len() + 8 + fields.len() * 32);
    buf.extend_from_slice(ENCODING_TAG);
    put_len(&mut buf, fields.len());

    for (name, value) in fields {
        let (tag, payload) = encode_value(name, value)?;
        put_bytes(&mut buf, name.as_bytes());
        buf.push(tag);
        put_bytes(&mut buf, &payload);
    }

    Ok(buf)
}

fn encode_value(column: &str, value: &Value) -> Result<(u8, Vec<u8>)> {
    let encoded = match value {
        Value::Null => (0x00, Vec::new()),
        Value::Bool(v) => (0x01, vec![u8::from(*v)]),
        Value::Int(v) => (0x02, v.to_be_bytes().to_vec()),
        Value::Float(v) => (0x03, canonical_float(*v).into_bytes()),
        Value::Text(v) => (0x04, v.as_bytes().to_vec()),
        Value::Date(v) => (0x05, v.format("%Y-%m-%d").to_string().into_bytes()),
        Value::Timestamp(v) => (
            0x06,
            v.format("%Y-%m-%dT%H:%M:%S%.9f").to_string().into_bytes(),
        ),
        Value::Bytes(v) => {
            return Err(PipelineError::encoding(
                column,
                format!("raw binary value ({} bytes) has no defined encoding", v.len()),
            ))
        }
        Value::Unsupported(dtype) => {
            return Err(PipelineError::encoding(
                column,
                format!("unsupported value type {dtype}"),
            ))
        }
    };
    Ok(encoded)
}

fn canonical_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == 0.0 {
        // folds -0.0
        "0".to_string()
    } else {
        v.to_string()
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    buf.extend_from_slice(&(len as u64).to_be_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_len(buf, bytes.len());
    buf.extend_from_slice(bytes);
}
