//! Pull result parser.
//!
//! Turns the decoded JSON of a `(pull ?e [*])` result into a typed
//! [`AttributeRecord`]. Pure: no lookups, no I/O.
//!
//! Classification, per attribute:
//!
//! | JSON shape                         | Variant                         |
//! |------------------------------------|---------------------------------|
//! | `{"id": <int>}` (only field)       | `Reference(Stub)`               |
//! | array of such stubs (or empty)     | `ReferenceList`, array order    |
//! | array mixing stubs and non-stubs   | `MalformedResult` error         |
//! | string / number / bool / null      | `Scalar`                        |
//! | anything else                      | `Structured`, verbatim          |

use serde_json::Value as Json;

use crate::model::*;
use crate::{Error, Result};

/// Parse one pulled entity.
pub fn parse_pull(raw: &Json) -> Result<AttributeRecord> {
    let obj = raw.as_object().ok_or_else(|| {
        Error::MalformedResult(format!("pull result must be an object, got {}", json_type(raw)))
    })?;

    obj.iter()
        .map(|(key, value)| -> Result<(String, AttributeValue)> {
            Ok((key.clone(), classify(key, value)?))
        })
        .collect()
}

/// Parse the rows of a Datalog `:find (pull ...)` result.
///
/// `:find` returns an array of rows; the pulled object is the first element
/// of each row. Bare objects are accepted as already-flattened rows.
pub fn parse_rows(rows: &[Json]) -> Result<Vec<PullRecord>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| -> Result<PullRecord> {
            let pulled = match row {
                Json::Array(cols) => cols.first().ok_or_else(|| {
                    Error::MalformedResult(format!("result row {i} is empty"))
                })?,
                Json::Object(_) => row,
                other => {
                    return Err(Error::MalformedResult(format!(
                        "result row {i} must be an array or object, got {}",
                        json_type(other)
                    )));
                }
            };
            PullRecord::from_json(pulled)
        })
        .collect()
}

fn classify(key: &str, value: &Json) -> Result<AttributeValue> {
    if let Some(id) = stub_id(value) {
        return Ok(AttributeValue::Reference(Reference::Stub(id)));
    }
    match value {
        Json::Array(items) => classify_array(key, items),
        Json::Object(_) => Ok(AttributeValue::Structured(value.clone())),
        leaf => Ok(Scalar::from_json(leaf)
            .map(AttributeValue::Scalar)
            .unwrap_or_else(|| AttributeValue::Structured(leaf.clone()))),
    }
}

fn classify_array(key: &str, items: &[Json]) -> Result<AttributeValue> {
    let stubs: Vec<InternalId> = items.iter().filter_map(stub_id).collect();
    if stubs.len() == items.len() {
        Ok(AttributeValue::ReferenceList(stubs.into_iter().map(Reference::Stub).collect()))
    } else if stubs.is_empty() {
        Ok(AttributeValue::Structured(Json::Array(items.to_vec())))
    } else {
        Err(Error::MalformedResult(format!(
            "attribute '{key}' mixes {} stub references with {} other elements",
            stubs.len(),
            items.len() - stubs.len()
        )))
    }
}

/// `Some(id)` iff `value` is an object whose only field is an integer `id`.
pub fn stub_id(value: &Json) -> Option<InternalId> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(attr::ID)?.as_u64().map(InternalId)
}

fn json_type(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
