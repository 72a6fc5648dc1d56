//! Link follower.
//!
//! Expands placeholder nodes and pending stubs by querying the remote graph,
//! one breadth-first layer at a time. Within a layer fetches run
//! concurrently; merging is sequential and rebuilds the graph from the
//! accumulated records with the carried id table, so every newly learned
//! stable id is applied to stubs fetched earlier.
//!
//! Termination does not depend on `max_depth`: a reference is fetched at
//! most once and fully resolved nodes are never re-queued, so the number of
//! executor calls is bounded by the number of distinct entities reached.

use std::collections::{HashSet, VecDeque};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::graph::NodeGraph;
use crate::model::{Node, NodeRef, PullRecord, StableId};
use crate::pull::parse_rows;
use crate::query::{Query, QueryExecutor};
use crate::{Error, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Whether reference expansion recurses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowDirective {
    /// Leave placeholders and stubs as they are.
    #[default]
    Shallow,
    /// Fetch referenced entities, then theirs, and so on.
    Deep,
}

/// Which link kinds the follower walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkKinds {
    pub children: bool,
    pub references: bool,
}

impl Default for LinkKinds {
    fn default() -> Self {
        Self { children: true, references: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Maximum hop distance from the roots. `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Fetches in flight per layer.
    pub concurrency: usize,
    pub links: LinkKinds,
}

impl FollowConfig {
    pub const DEFAULT_CONCURRENCY: usize = 8;

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("follow.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            concurrency: Self::DEFAULT_CONCURRENCY,
            links: LinkKinds::default(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// A reference whose fetch came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unresolvable {
    pub reference: NodeRef,
    /// The node that holds the reference.
    pub referenced_by: StableId,
    /// Hop distance from the roots.
    pub depth: usize,
}

impl From<Unresolvable> for Error {
    fn from(u: Unresolvable) -> Self {
        Error::UnresolvableReference(u.reference)
    }
}

#[derive(Debug, Clone)]
pub struct FollowOutcome {
    pub graph: NodeGraph,
    pub unresolved: Vec<Unresolvable>,
    /// Fetch layers that were merged.
    pub layers: usize,
    /// Individual fetches issued.
    pub fetches: usize,
    /// Set when the token fired before expansion finished.
    pub cancelled: bool,
}

impl FollowOutcome {
    fn unchanged(graph: NodeGraph) -> Self {
        Self { graph, unresolved: Vec::new(), layers: 0, fetches: 0, cancelled: false }
    }
}

// ============================================================================
// LinkFollower
// ============================================================================

#[derive(Debug, Clone)]
struct Candidate {
    reference: NodeRef,
    referenced_by: StableId,
    depth: usize,
}

/// Expands a [`NodeGraph`] through a [`QueryExecutor`].
pub struct LinkFollower<'e, E: QueryExecutor + ?Sized> {
    executor: &'e E,
    config: FollowConfig,
}

impl<'e, E: QueryExecutor + ?Sized> LinkFollower<'e, E> {
    pub fn new(executor: &'e E, config: FollowConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    /// Follow links out of `graph` according to `directive`.
    ///
    /// `cancel` is checked before each fetch layer; a cancelled run returns
    /// the graph as merged so far. Executor errors abort the run.
    pub async fn follow(
        &self,
        graph: NodeGraph,
        directive: FollowDirective,
        cancel: &CancellationToken,
    ) -> Result<FollowOutcome> {
        self.config.validate()?;
        if directive == FollowDirective::Shallow {
            return Ok(FollowOutcome::unchanged(graph));
        }

        let mut outcome = FollowOutcome::unchanged(graph);
        let mut visited: HashSet<NodeRef> = HashSet::new();
        let mut scanned: HashSet<StableId> = HashSet::new();
        let mut queue: VecDeque<Candidate> = VecDeque::new();

        let roots: Vec<StableId> = outcome.graph.roots().iter().cloned().collect();
        for root in &roots {
            self.scan(&outcome.graph, root, 0, &mut scanned, &mut visited, &mut queue);
        }

        while let Some(depth) = queue.front().map(|c| c.depth) {
            if self.config.max_depth.is_some_and(|max| depth > max) {
                tracing::debug!(depth, "depth limit reached");
                break;
            }

            // Full nodes in this layer only need scanning; the rest are fetched.
            let mut layer = Vec::new();
            while queue.front().is_some_and(|c| c.depth == depth) {
                let Some(candidate) = queue.pop_front() else { break };
                match outcome.graph.lookup(&candidate.reference) {
                    Some(node) if !node.is_placeholder() => {
                        let id = node.stable_id.clone();
                        self.scan(&outcome.graph, &id, depth, &mut scanned, &mut visited, &mut queue);
                    }
                    _ => layer.push(candidate),
                }
            }
            if layer.is_empty() {
                continue;
            }

            if cancel.is_cancelled() {
                tracing::debug!(depth, pending = layer.len(), "link following cancelled");
                outcome.cancelled = true;
                break;
            }

            let fetched = self.fetch_layer(&layer).await?;
            outcome.fetches += layer.len();

            let mut records = Vec::new();
            let mut expanded = Vec::new();
            for (candidate, batch) in layer.into_iter().zip(fetched) {
                if batch.iter().any(|r| answers(r, &candidate.reference)) {
                    records.extend(batch);
                    expanded.push(candidate.reference);
                } else {
                    tracing::warn!(
                        reference = %candidate.reference,
                        referenced_by = %candidate.referenced_by,
                        depth,
                        "reference did not resolve"
                    );
                    outcome.unresolved.push(Unresolvable {
                        reference: candidate.reference,
                        referenced_by: candidate.referenced_by,
                        depth,
                    });
                }
            }

            if !records.is_empty() {
                outcome.graph = outcome.graph.merge(records)?;
                outcome.layers += 1;
            }
            tracing::debug!(
                depth,
                expanded = expanded.len(),
                nodes = outcome.graph.len(),
                "merged follow layer"
            );

            for reference in &expanded {
                let Some(id) = outcome.graph.lookup(reference).map(|n| n.stable_id.clone()) else {
                    continue;
                };
                self.scan(&outcome.graph, &id, depth, &mut scanned, &mut visited, &mut queue);
            }
        }

        tracing::info!(
            layers = outcome.layers,
            fetches = outcome.fetches,
            unresolved = outcome.unresolved.len(),
            cancelled = outcome.cancelled,
            "link following finished"
        );
        Ok(outcome)
    }

    /// Queue the outgoing links of a full node found at `depth`.
    fn scan(
        &self,
        graph: &NodeGraph,
        id: &StableId,
        depth: usize,
        scanned: &mut HashSet<StableId>,
        visited: &mut HashSet<NodeRef>,
        queue: &mut VecDeque<Candidate>,
    ) {
        let Some(node) = graph.get(id.as_str()) else { return };
        if node.is_placeholder() || !scanned.insert(id.clone()) {
            return;
        }
        for link in links(self.config.links, node) {
            let reference = canonical(graph, link);
            if visited.insert(reference.clone()) {
                queue.push_back(Candidate { reference, referenced_by: id.clone(), depth: depth + 1 });
            }
        }
    }

    async fn fetch_layer(&self, layer: &[Candidate]) -> Result<Vec<Vec<PullRecord>>> {
        stream::iter(layer.iter().map(|c| self.fetch(&c.reference)))
            .buffered(self.config.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    async fn fetch(&self, reference: &NodeRef) -> Result<Vec<PullRecord>> {
        let query = match reference {
            NodeRef::Stable(uid) => Query::pull_by_uid(uid),
            NodeRef::Pending(id) => Query::pull_by_id(*id),
        };
        let rows = query.run(self.executor).await?;
        parse_rows(&rows)
    }
}

fn links(kinds: LinkKinds, node: &Node) -> impl Iterator<Item = &NodeRef> {
    let children = kinds.children.then_some(node.children.iter());
    let references = kinds.references.then_some(node.references.iter());
    children.into_iter().flatten().chain(references.into_iter().flatten())
}

/// A pending stub whose stable id is already known is followed by stable id.
fn canonical(graph: &NodeGraph, link: &NodeRef) -> NodeRef {
    match link {
        NodeRef::Pending(internal) => graph
            .ids()
            .get(*internal)
            .map_or_else(|| link.clone(), |stable| NodeRef::Stable(stable.clone())),
        NodeRef::Stable(_) => link.clone(),
    }
}

/// Whether `record` is the entity `reference` asked for.
fn answers(record: &PullRecord, reference: &NodeRef) -> bool {
    match reference {
        NodeRef::Stable(uid) => record.stable_id().is_ok_and(|s| s.as_ref() == Some(uid)),
        NodeRef::Pending(id) => record.internal_id == Some(*id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MemoryExecutor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn graph_of(raw: &[serde_json::Value]) -> NodeGraph {
        NodeGraph::resolve(raw.iter().map(|r| PullRecord::from_json(r).unwrap()).collect()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = FollowConfig::default();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_depth, None);
        assert!(config.links.children && config.links.references);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = FollowConfig { concurrency: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_directive_serde() {
        assert_eq!(serde_json::to_string(&FollowDirective::Deep).unwrap(), "\"deep\"");
        assert_eq!(FollowDirective::default(), FollowDirective::Shallow);
    }

    #[tokio::test]
    async fn test_shallow_issues_no_queries() {
        let store = MemoryExecutor::new();
        let graph = graph_of(&[json!({"uid": "a", "id": 1, "refs": [{"id": 2}]})]);
        let outcome = LinkFollower::new(&store, FollowConfig::default())
            .follow(graph, FollowDirective::Shallow, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.executions(), 0);
        assert_eq!(outcome.fetches, 0);
        assert_eq!(outcome.graph.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_stub_fetched_by_internal_id() {
        let store = MemoryExecutor::new();
        store.insert(json!({"uid": "b", "id": 2, "string": "target"})).unwrap();
        let graph = graph_of(&[json!({"uid": "a", "id": 1, "refs": [{"id": 2}]})]);

        let outcome = LinkFollower::new(&store, FollowConfig::default())
            .follow(graph, FollowDirective::Deep, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.graph.get("b").and_then(Node::text), Some("target"));
        let a = outcome.graph.get("a").unwrap();
        assert!(a.references.contains(&NodeRef::Stable("b".into())));
        assert_eq!(outcome.fetches, 1);
        assert!(outcome.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_link_kinds_can_be_disabled() {
        let store = MemoryExecutor::new();
        store.insert(json!({"uid": "b", "id": 2, "string": "target"})).unwrap();
        let graph = graph_of(&[json!({"uid": "a", "id": 1, "refs": [{"id": 2}]})]);
        let config = FollowConfig {
            links: LinkKinds { children: true, references: false },
            ..Default::default()
        };

        let outcome = LinkFollower::new(&store, config)
            .follow(graph, FollowDirective::Deep, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.executions(), 0);
        assert!(outcome.graph.get("b").is_none());
    }
}
