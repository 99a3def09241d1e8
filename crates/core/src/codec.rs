//! JSON wire format for rosters.
//!
//! ```json
//! { "students": [ { "id": 1, "last_name": "Ivanov", "first_name": "Ivan", "birth_date": "01.01.1990" } ] }
//! ```

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ROSTER_KEY: &str = "students";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed roster payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("roster payload has no 'students' array")]
    MissingRoster,
}

#[derive(Serialize)]
struct WireDocument<'a> {
    students: Vec<WireRecordRef<'a>>,
}

#[derive(Serialize)]
struct WireRecordRef<'a> {
    id: i64,
    last_name: &'a str,
    first_name: &'a str,
    birth_date: String,
}

#[derive(Deserialize)]
struct WireRecord {
    id: i64,
    last_name: String,
    first_name: String,
    birth_date: String,
}

pub fn encode(records: &[Record]) -> Result<Vec<u8>, CodecError> {
    let doc = WireDocument {
        students: records
            .iter()
            .map(|r| WireRecordRef {
                id: r.id(),
                last_name: r.last_name(),
                first_name: r.first_name(),
                birth_date: r.birth_date_text(),
            })
            .collect(),
    };
    Ok(serde_json::to_vec_pretty(&doc)?)
}

/// Decodes a roster payload. Entries with a missing field or a mistyped field
/// are skipped; only a broken document or a missing roster array is an error.
pub fn decode(payload: &[u8]) -> Result<Vec<Record>, CodecError> {
    let doc: Value = serde_json::from_slice(payload)?;
    let entries = doc
        .get(ROSTER_KEY)
        .and_then(Value::as_array)
        .ok_or(CodecError::MissingRoster)?;

    let records = entries
        .iter()
        .filter_map(|entry| WireRecord::deserialize(entry).ok())
        .map(|w| Record::new(w.id, w.last_name, w.first_name, &w.birth_date))
        .collect();
    Ok(records)
}
