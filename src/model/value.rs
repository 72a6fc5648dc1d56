//! Attribute values as classified from a raw pull result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use super::Reference;

/// A JSON leaf value, kept lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// Closed classification of a pull attribute.
///
/// - `Scalar`: string, number, boolean or null
/// - `Reference`: a single `{"id": n}` stub (rewritten by normalization)
/// - `ReferenceList`: an array made only of stubs, in array order
/// - `Structured`: anything else, preserved verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    Scalar(Scalar),
    Reference(Reference),
    ReferenceList(Vec<Reference>),
    Structured(Json),
}

// ============================================================================
// Scalar
// ============================================================================

impl Scalar {
    /// Classify a JSON leaf. Returns `None` for arrays and objects.
    pub fn from_json(v: &Json) -> Option<Self> {
        match v {
            Json::Null => Some(Scalar::Null),
            Json::Bool(b) => Some(Scalar::Bool(*b)),
            Json::Number(n) => Some(Scalar::Number(n.clone())),
            Json::String(s) => Some(Scalar::String(s.clone())),
            Json::Array(_) | Json::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Scalar::Null => Json::Null,
            Scalar::Bool(b) => Json::Bool(*b),
            Scalar::Number(n) => Json::Number(n.clone()),
            Scalar::String(s) => Json::String(s.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Scalar { fn from(v: bool) -> Self { Scalar::Bool(v) } }
impl From<i64> for Scalar { fn from(v: i64) -> Self { Scalar::Number(v.into()) } }
impl From<u64> for Scalar { fn from(v: u64) -> Self { Scalar::Number(v.into()) } }
impl From<String> for Scalar { fn from(v: String) -> Self { Scalar::String(v) } }
impl From<&str> for Scalar { fn from(v: &str) -> Self { Scalar::String(v.to_owned()) } }

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

// ============================================================================
// AttributeValue
// ============================================================================

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Scalar(s) => s.type_name(),
            AttributeValue::Reference(_) => "reference",
            AttributeValue::ReferenceList(_) => "reference list",
            AttributeValue::Structured(_) => "structured",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            AttributeValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Reference view of the value: a single reference reads as a
    /// one-element list.
    pub fn references(&self) -> Option<&[Reference]> {
        match self {
            AttributeValue::Reference(r) => Some(std::slice::from_ref(r)),
            AttributeValue::ReferenceList(rs) => Some(rs),
            _ => None,
        }
    }

    /// Re-serialize to the wire shape. Stubs and unresolved references
    /// come back as `{"id": n}`, resolved ones as `{"uid": "..."}`.
    pub fn to_json(&self) -> Json {
        match self {
            AttributeValue::Scalar(s) => s.to_json(),
            AttributeValue::Reference(r) => reference_to_json(r),
            AttributeValue::ReferenceList(rs) => Json::Array(rs.iter().map(reference_to_json).collect()),
            AttributeValue::Structured(v) => v.clone(),
        }
    }
}

fn reference_to_json(r: &Reference) -> Json {
    let mut obj = Map::new();
    match r {
        Reference::Stub(id) | Reference::Unresolved(id) => {
            obj.insert("id".into(), Json::from(id.0));
        }
        Reference::Resolved(uid) => {
            obj.insert("uid".into(), Json::from(uid.as_str()));
        }
    }
    Json::Object(obj)
}

impl From<Scalar> for AttributeValue {
    fn from(v: Scalar) -> Self { AttributeValue::Scalar(v) }
}

impl From<Reference> for AttributeValue {
    fn from(v: Reference) -> Self { AttributeValue::Reference(v) }
}

impl From<Vec<Reference>> for AttributeValue {
    fn from(v: Vec<Reference>) -> Self { AttributeValue::ReferenceList(v) }
}

// ============================================================================
// AttributeRecord
// ============================================================================

/// Attribute name → value, ordered by name.
///
/// Names are kept exactly as the server sent them (`"string"`,
/// `"block/string"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeRecord(BTreeMap<String, AttributeValue>);

impl AttributeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Option<AttributeValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Apply `f` to every value, keeping keys.
    pub fn map_values(&self, mut f: impl FnMut(&AttributeValue) -> AttributeValue) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), f(v))).collect())
    }

    /// String scalar at `key`, if that is what the key holds.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_scalar()?.as_str()
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeRecord {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AttributeRecord {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InternalId, StableId};

    #[test]
    fn test_scalar_from_json() {
        assert_eq!(Scalar::from_json(&Json::from("x")), Some(Scalar::from("x")));
        assert_eq!(Scalar::from_json(&Json::from(42)), Some(Scalar::from(42i64)));
        assert_eq!(Scalar::from_json(&Json::Null), Some(Scalar::Null));
        assert_eq!(Scalar::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_single_reference_reads_as_list() {
        let v = AttributeValue::Reference(Reference::Stub(InternalId(7)));
        assert_eq!(v.references(), Some(&[Reference::Stub(InternalId(7))][..]));
        assert_eq!(AttributeValue::from(Scalar::Null).references(), None);
    }

    #[test]
    fn test_reference_to_json() {
        let v = AttributeValue::ReferenceList(vec![
            Reference::Stub(InternalId(1)),
            Reference::Resolved(StableId::from("abc")),
        ]);
        assert_eq!(v.to_json(), serde_json::json!([{"id": 1}, {"uid": "abc"}]));
    }
}
