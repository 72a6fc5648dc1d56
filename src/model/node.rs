//! Resolved node in the page/block graph.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::attr;
use super::{AttributeRecord, NodeRef, StableId};

/// Markdown heading level of a block (`:block/heading`). Roam emits 1-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for HeadingLevel {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::new(v).ok_or_else(|| format!("heading level {v} outside 1..=6"))
    }
}

impl From<HeadingLevel> for u8 {
    fn from(v: HeadingLevel) -> Self { v.0 }
}

/// Page vs. block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Page,
    Block,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Page => f.write_str("page"),
            NodeKind::Block => f.write_str("block"),
        }
    }
}

/// What is known about a node's own data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeContent {
    /// Referenced by stable id, record not fetched yet.
    Placeholder,
    Page { title: String },
    Block { text: String, heading: Option<HeadingLevel> },
}

/// A node of the resolved graph.
///
/// Owns its scalar data and its ordered children; `parents`, `references`
/// and `page` are keys into the owning [`crate::graph::NodeGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub stable_id: StableId,
    pub content: NodeContent,
    /// Position among siblings (`:block/order`).
    pub order: Option<u32>,
    /// Sorted ascending by the children's `order`.
    pub children: Vec<NodeRef>,
    pub parents: BTreeSet<NodeRef>,
    /// Cross-links (`:block/refs`).
    pub references: BTreeSet<NodeRef>,
    /// Containing page of a block (`:block/page`).
    pub page: Option<NodeRef>,
    /// Attributes without a dedicated field.
    pub raw_attributes: AttributeRecord,
}

impl Node {
    /// An unexpanded node carrying only its stable id.
    pub fn placeholder(stable_id: StableId) -> Self {
        Self {
            stable_id,
            content: NodeContent::Placeholder,
            order: None,
            children: Vec::new(),
            parents: BTreeSet::new(),
            references: BTreeSet::new(),
            page: None,
            raw_attributes: AttributeRecord::new(),
        }
    }

    /// `None` for placeholders.
    pub fn kind(&self) -> Option<NodeKind> {
        match self.content {
            NodeContent::Placeholder => None,
            NodeContent::Page { .. } => Some(NodeKind::Page),
            NodeContent::Block { .. } => Some(NodeKind::Block),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, NodeContent::Placeholder)
    }

    pub fn is_page(&self) -> bool {
        matches!(self.content, NodeContent::Page { .. })
    }

    pub fn title(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Page { title } => Some(title),
            _ => None,
        }
    }

    /// Block body text.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            NodeContent::Block { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn heading(&self) -> Option<HeadingLevel> {
        match &self.content {
            NodeContent::Block { heading, .. } => *heading,
            _ => None,
        }
    }

    /// Stable ids of the children, in order. Pending children are skipped.
    pub fn child_ids(&self) -> impl Iterator<Item = &StableId> {
        self.children.iter().filter_map(NodeRef::stable_id)
    }

    /// Last-edit timestamp (`:edit/time`, epoch milliseconds).
    pub fn edit_time(&self) -> Option<DateTime<Utc>> {
        let millis = self.raw_attributes.get(attr::TIME)?.as_scalar()?.as_i64()?;
        DateTime::from_timestamp_millis(millis)
    }
}
