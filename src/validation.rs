//! Accumulating validation of resolved graphs.
//!
//! Validators are pure functions that each detect one kind of problem.
//! Every validator runs on every input; nothing short-circuits, so a caller
//! sees all warnings from one pass. Warnings never fail a resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeGraph;
use crate::model::{Node, NodeRef, StableId};

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// The node the finding is about.
    pub subject: Option<StableId>,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(subject: &StableId, message: impl Into<String>) -> Self {
        Self { subject: Some(subject.clone()), message: message.into() }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(uid) => write!(f, "{uid}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// All warnings of one run. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.warnings.extend(other.warnings);
    }
}

/// A pure check over `T`.
pub type Validator<T> = fn(&T) -> Option<ValidationWarning>;

/// Run every validator over `input`.
pub fn validate_all<T>(input: &T, validators: &[Validator<T>]) -> ValidationResult {
    ValidationResult {
        warnings: validators.iter().filter_map(|v| v(input)).collect(),
    }
}

// ============================================================================
// Node validators
// ============================================================================

/// A full node seen together with the graph that owns it.
#[derive(Debug, Clone, Copy)]
pub struct NodeInGraph<'g> {
    pub graph: &'g NodeGraph,
    pub node: &'g Node,
}

/// The checks [`validate_graph`] runs on every full node.
pub fn node_validators<'g>() -> Vec<Validator<NodeInGraph<'g>>> {
    vec![
        canonical_uid as Validator<NodeInGraph<'g>>,
        page_title_present as _,
        sibling_orders_contiguous as _,
        children_resolved as _,
    ]
}

pub fn canonical_uid(input: &NodeInGraph<'_>) -> Option<ValidationWarning> {
    let uid = &input.node.stable_id;
    (!uid.is_canonical()).then(|| {
        ValidationWarning::new(
            uid,
            format!("uid is not {} characters of [A-Za-z0-9_-]", StableId::CANONICAL_LEN),
        )
    })
}

pub fn page_title_present(input: &NodeInGraph<'_>) -> Option<ValidationWarning> {
    let title = input.node.title()?;
    title
        .trim()
        .is_empty()
        .then(|| ValidationWarning::new(&input.node.stable_id, "page title is empty"))
}

/// Sibling orders should read `0..n` once sorted.
pub fn sibling_orders_contiguous(input: &NodeInGraph<'_>) -> Option<ValidationWarning> {
    let orders: Vec<u32> = input
        .graph
        .children_of(input.node.stable_id.as_str())
        .filter_map(|child| child.order)
        .collect();
    let contiguous = orders.iter().zip(0u32..).all(|(order, expected)| *order == expected);
    (!contiguous).then(|| {
        ValidationWarning::new(
            &input.node.stable_id,
            format!("child orders {orders:?} are not contiguous from 0"),
        )
    })
}

pub fn children_resolved(input: &NodeInGraph<'_>) -> Option<ValidationWarning> {
    let pending: Vec<String> = input
        .node
        .children
        .iter()
        .filter(|r| matches!(r, NodeRef::Pending(_)))
        .map(ToString::to_string)
        .collect();
    (!pending.is_empty()).then(|| {
        ValidationWarning::new(
            &input.node.stable_id,
            format!("children without a known uid: {}", pending.join(", ")),
        )
    })
}

/// Validate every full node of `graph`, in uid order.
pub fn validate_graph(graph: &NodeGraph) -> ValidationResult {
    let mut nodes: Vec<&Node> = graph.nodes().filter(|n| !n.is_placeholder()).collect();
    nodes.sort_by(|a, b| a.stable_id.cmp(&b.stable_id));

    let validators = node_validators();
    let mut result = ValidationResult::default();
    for node in nodes {
        result.extend(validate_all(&NodeInGraph { graph, node }, &validators));
    }
    for warning in &result.warnings {
        tracing::warn!(%warning, "validation");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PullRecord;
    use serde_json::json;

    fn graph_of(raw: &[serde_json::Value]) -> NodeGraph {
        NodeGraph::resolve(raw.iter().map(|r| PullRecord::from_json(r).unwrap()).collect()).unwrap()
    }

    #[test]
    fn test_validate_all_runs_every_validator() {
        fn positive(n: &i32) -> Option<ValidationWarning> {
            (*n <= 0).then(|| ValidationWarning { subject: None, message: "not positive".into() })
        }
        fn even(n: &i32) -> Option<ValidationWarning> {
            (n % 2 != 0).then(|| ValidationWarning { subject: None, message: "odd".into() })
        }
        let result = validate_all(&-3, &[positive, even]);
        assert_eq!(result.len(), 2);
        assert!(validate_all(&4, &[positive, even]).is_valid());
    }

    #[test]
    fn test_clean_graph_is_valid() {
        let graph = graph_of(&[
            json!({"uid": "6olpFWiw1", "id": 1, "title": "Test Article", "children": [{"id": 2}, {"id": 3}]}),
            json!({"uid": "0EgPyHSZi", "id": 2, "string": "one", "order": 0}),
            json!({"uid": "wdMgyBiP9", "id": 3, "string": "two", "order": 1}),
        ]);
        let result = validate_graph(&graph);
        assert!(result.is_valid(), "{:?}", result.warnings);
    }

    #[test]
    fn test_flags_short_uid_gap_and_empty_title() {
        let graph = graph_of(&[
            json!({"uid": "pg001", "id": 1, "title": "  ", "children": [{"id": 2}, {"id": 3}]}),
            json!({"uid": "0EgPyHSZi", "id": 2, "string": "one", "order": 0}),
            json!({"uid": "wdMgyBiP9", "id": 3, "string": "two", "order": 2}),
        ]);
        let result = validate_graph(&graph);
        let messages: Vec<String> = result.warnings.iter().map(ToString::to_string).collect();
        assert_eq!(result.len(), 3, "{messages:?}");
        assert!(messages.iter().all(|m| m.starts_with("pg001: ")));
        assert!(messages.iter().any(|m| m.contains("[0, 2]")));
    }

    #[test]
    fn test_node_validators_run_per_node() {
        let graph = graph_of(&[json!({"uid": "short", "id": 1, "title": "", "children": [{"id": 9}]})]);
        let node = graph.get("short").unwrap();
        let validators = node_validators();
        assert_eq!(validators.len(), 4);
        let result = validate_all(&NodeInGraph { graph: &graph, node }, &validators);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_flags_pending_children() {
        let graph = graph_of(&[json!({"uid": "6olpFWiw1", "id": 1, "title": "T", "children": [{"id": 42}]})]);
        let result = validate_graph(&graph);
        assert_eq!(result.len(), 1);
        assert!(result.warnings[0].message.contains("#42"));
    }
}
