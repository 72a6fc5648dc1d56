//! Vertex export.
//!
//! Projects resolved nodes into portable [`Vertex`] records: internal ids are
//! gone, every link is a uid, and each vertex carries a `vertex-type`
//! classification.
//!
//! ```text
//! NodeGraph → export_vertices() → Vec<Vertex> → write_json_lines()
//! ```

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::graph::NodeGraph;
use crate::model::{HeadingLevel, Node, NodeContent, NodeRef, StableId};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexType {
    #[serde(rename = "roam/page")]
    Page,
    #[serde(rename = "roam/block-content")]
    BlockContent,
    #[serde(rename = "roam/block-heading")]
    BlockHeading,
}

impl VertexType {
    pub fn as_str(self) -> &'static str {
        match self {
            VertexType::Page => "roam/page",
            VertexType::BlockContent => "roam/block-content",
            VertexType::BlockHeading => "roam/block-heading",
        }
    }

    /// `None` for placeholders.
    pub fn of(node: &Node) -> Option<Self> {
        match &node.content {
            NodeContent::Placeholder => None,
            NodeContent::Page { .. } => Some(VertexType::Page),
            NodeContent::Block { heading: Some(_), .. } => Some(VertexType::BlockHeading),
            NodeContent::Block { heading: None, .. } => Some(VertexType::BlockContent),
        }
    }
}

impl fmt::Display for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exported page or block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub uid: StableId,
    #[serde(rename = "vertex-type")]
    pub vertex_type: VertexType,
    /// Page title for pages, block string for blocks.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<HeadingLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StableId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<StableId>,
}

impl Vertex {
    /// Project a full node. Links still pending are dropped, since a vertex
    /// only speaks in uids.
    pub fn from_node(node: &Node, graph: &NodeGraph) -> Option<Self> {
        let vertex_type = VertexType::of(node)?;
        let uid_of = |r: &NodeRef| match r {
            NodeRef::Stable(id) => Some(id.clone()),
            NodeRef::Pending(internal) => graph.ids().get(*internal).cloned(),
        };
        Some(Self {
            uid: node.stable_id.clone(),
            vertex_type,
            text: node.title().or(node.text()).unwrap_or_default().to_owned(),
            heading: node.heading(),
            children: node.children.iter().filter_map(uid_of).collect(),
            refs: node.references.iter().filter_map(uid_of).collect(),
        })
    }
}

/// Every full node as a vertex.
///
/// Top-level nodes come first, each followed by its subtree in pre-order;
/// nodes not reachable that way follow in uid order.
pub fn export_vertices(graph: &NodeGraph) -> Vec<Vertex> {
    let mut ordered: Vec<&Node> = Vec::with_capacity(graph.len());
    let mut seen = std::collections::HashSet::new();
    for top in graph.top_level() {
        for node in graph.walk(top.as_str()) {
            if seen.insert(&node.stable_id) {
                ordered.push(node);
            }
        }
    }
    let mut rest: Vec<&Node> = graph.nodes().filter(|n| !seen.contains(&n.stable_id)).collect();
    rest.sort_by(|a, b| a.stable_id.cmp(&b.stable_id));
    ordered.extend(rest);

    let vertices: Vec<Vertex> = ordered.into_iter().filter_map(|n| Vertex::from_node(n, graph)).collect();
    tracing::debug!(vertices = vertices.len(), "exported vertices");
    vertices
}

/// Write one JSON object per line.
pub fn write_json_lines(vertices: &[Vertex], writer: &mut dyn Write) -> Result<()> {
    for vertex in vertices {
        serde_json::to_writer(&mut *writer, vertex)?;
        writeln!(writer)?;
    }
    Ok(())
}
