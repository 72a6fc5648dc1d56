//! One pulled entity, as parsed but not yet normalized.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{AttributeRecord, AttributeValue, InternalId, Scalar, StableId};
use crate::{Error, Result};

/// Attribute names of the modeled fields, as they appear in a flattened
/// pull result.
pub mod attr {
    pub const ID: &str = "id";
    pub const UID: &str = "uid";
    pub const TITLE: &str = "title";
    pub const STRING: &str = "string";
    pub const ORDER: &str = "order";
    pub const HEADING: &str = "heading";
    pub const CHILDREN: &str = "children";
    pub const PARENTS: &str = "parents";
    pub const REFS: &str = "refs";
    pub const PAGE: &str = "page";
    pub const TIME: &str = "time";
}

/// A single `(pull ?e [*])` result: its internal id (from the record's own
/// `id` field, when present) and its classified attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRecord {
    pub internal_id: Option<InternalId>,
    pub attributes: AttributeRecord,
}

impl PullRecord {
    pub fn new(internal_id: Option<InternalId>, attributes: AttributeRecord) -> Self {
        Self { internal_id, attributes }
    }

    /// Parse a raw pull object. See [`crate::pull::parse_pull`].
    pub fn from_json(raw: &Json) -> Result<Self> {
        let attributes = crate::pull::parse_pull(raw)?;
        let internal_id = match attributes.get(attr::ID) {
            None | Some(AttributeValue::Scalar(Scalar::Null)) => None,
            Some(AttributeValue::Scalar(s)) => {
                let id = s.as_u64().ok_or_else(|| {
                    Error::MalformedResult(format!("entity id must be a non-negative integer, got {s}"))
                })?;
                Some(InternalId(id))
            }
            Some(other) => {
                return Err(Error::MalformedResult(format!(
                    "entity id must be a scalar, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(Self { internal_id, attributes })
    }

    /// The server-provided stable id.
    ///
    /// `Ok(None)` when the record has no `uid`; an error when `uid` is
    /// present but not a non-empty string.
    pub fn stable_id(&self) -> Result<Option<StableId>> {
        match self.attributes.get(attr::UID) {
            None | Some(AttributeValue::Scalar(Scalar::Null)) => Ok(None),
            Some(AttributeValue::Scalar(Scalar::String(s))) if !s.is_empty() => Ok(Some(StableId::from(s.as_str()))),
            Some(other) => Err(Error::MalformedResult(format!(
                "uid must be a non-empty string, got {}",
                other.type_name()
            ))),
        }
    }
}
