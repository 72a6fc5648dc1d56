//! Entity identifiers: the ephemeral internal id and the durable stable id.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Datomic internal entity id (`:db/id`).
///
/// Only meaningful inside the session that produced it. Never persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(pub u64);

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable entity identifier (`:block/uid`), shared by pages and blocks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Length of the uids Roam generates.
    pub const CANONICAL_LEN: usize = 9;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for nine characters drawn from `[A-Za-z0-9_-]`.
    ///
    /// Construction does not enforce this; the validation pass reports
    /// non-canonical ids as warnings.
    pub fn is_canonical(&self) -> bool {
        self.0.len() == Self::CANONICAL_LEN
            && self.0.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StableId {
    fn from(v: &str) -> Self { Self(v.to_owned()) }
}

impl From<String> for StableId {
    fn from(v: String) -> Self { Self(v) }
}

impl PartialEq<str> for StableId {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for StableId {
    fn eq(&self, other: &&str) -> bool { self.0 == *other }
}
