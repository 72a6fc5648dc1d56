//! References between entities, before and after normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{InternalId, StableId};

/// A reference attribute value.
///
/// The parser only ever produces `Stub`. Normalization rewrites every stub
/// into `Resolved` when the batch knows the target's stable id, or into
/// `Unresolved` when it does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "id")]
pub enum Reference {
    Stub(InternalId),
    Resolved(StableId),
    Unresolved(InternalId),
}

impl Reference {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Reference::Resolved(_))
    }

    pub fn to_node_ref(&self) -> NodeRef {
        match self {
            Reference::Resolved(id) => NodeRef::Stable(id.clone()),
            Reference::Stub(id) | Reference::Unresolved(id) => NodeRef::Pending(*id),
        }
    }
}

/// An edge endpoint inside a resolved node.
///
/// `Pending` is a stub whose stable id is still unknown; the link follower
/// can fetch it by internal id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Stable(StableId),
    Pending(InternalId),
}

impl NodeRef {
    pub fn stable_id(&self) -> Option<&StableId> {
        match self {
            NodeRef::Stable(id) => Some(id),
            NodeRef::Pending(_) => None,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Stable(id) => write!(f, "{id}"),
            NodeRef::Pending(id) => write!(f, "#{id}"),
        }
    }
}

impl From<StableId> for NodeRef {
    fn from(v: StableId) -> Self { NodeRef::Stable(v) }
}

impl From<InternalId> for NodeRef {
    fn from(v: InternalId) -> Self { NodeRef::Pending(v) }
}
