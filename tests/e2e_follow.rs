//! End-to-end integration tests for deep link following.
//!
//! Graphs are resolved from a partial batch, then expanded by
//! `LinkFollower` / `Resolver::follow()` against MemoryExecutor.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use roam_graph::{
    build, normalize, Binding, CancellationToken, Error, FollowConfig, FollowDirective, IdTable,
    InternalId, LinkFollower, MemoryExecutor, NodeGraph, NodeRef, PullRecord, QueryExecutor, Resolver,
    ResolverConfig, StableId, Unresolvable,
};
use serde_json::{json, Value as Json};

fn graph_of(raw: &[Json]) -> NodeGraph {
    NodeGraph::resolve(raw.iter().map(|r| PullRecord::from_json(r).unwrap()).collect()).unwrap()
}

fn deep(store: &MemoryExecutor, config: FollowConfig) -> LinkFollower<'_, MemoryExecutor> {
    LinkFollower::new(store, config)
}

/// a -> b -> c -> d through `refs`, each only known by internal id.
fn chain() -> MemoryExecutor {
    let store = MemoryExecutor::new();
    store
        .insert_all([
            json!({"uid": "aaaaaaaaa", "id": 1, "string": "a", "refs": [{"id": 2}]}),
            json!({"uid": "bbbbbbbbb", "id": 2, "string": "b", "refs": [{"id": 3}]}),
            json!({"uid": "ccccccccc", "id": 3, "string": "c", "refs": [{"id": 4}]}),
            json!({"uid": "ddddddddd", "id": 4, "string": "d"}),
        ])
        .unwrap();
    store
}

fn chain_start() -> NodeGraph {
    graph_of(&[json!({"uid": "aaaaaaaaa", "id": 1, "string": "a", "refs": [{"id": 2}]})])
}

fn is_full(graph: &NodeGraph, uid: &str) -> bool {
    graph.get(uid).is_some_and(|n| !n.is_placeholder())
}

// ============================================================================
// 1. Cycles terminate
// ============================================================================

#[tokio::test]
async fn test_reference_cycle_terminates() {
    let store = MemoryExecutor::new();
    store
        .insert_all([
            json!({"uid": "aaaaaaaaa", "id": 1, "string": "see ((b))", "refs": [{"id": 2}]}),
            json!({"uid": "bbbbbbbbb", "id": 2, "string": "see ((a))", "refs": [{"id": 1}]}),
        ])
        .unwrap();
    let graph = graph_of(&[json!({"uid": "aaaaaaaaa", "id": 1, "string": "see ((b))", "refs": [{"id": 2}]})]);

    let outcome = deep(&store, FollowConfig::default())
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();

    let a = outcome.graph.get("aaaaaaaaa").unwrap();
    let b = outcome.graph.get("bbbbbbbbb").unwrap();
    assert!(a.references.contains(&NodeRef::Stable("bbbbbbbbb".into())));
    assert!(b.references.contains(&NodeRef::Stable("aaaaaaaaa".into())));
    assert!(!b.is_placeholder());
    assert_eq!(store.executions(), 1);
    assert_eq!(outcome.fetches, 1);
    assert!(outcome.unresolved.is_empty());
}

#[tokio::test]
async fn test_block_referencing_its_own_page() {
    let store = MemoryExecutor::new();
    store
        .insert(json!({"uid": "pagepage1", "id": 10, "title": "P", "children": [{"id": 11}]}))
        .unwrap();
    let graph = graph_of(&[
        json!({"uid": "pagepage1", "id": 10, "title": "P", "children": [{"id": 11}]}),
        json!({"uid": "blockblk1", "id": 11, "string": "[[P]]", "order": 0, "refs": [{"id": 10}], "page": {"id": 10}}),
    ]);

    let outcome = deep(&store, FollowConfig::default())
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.executions(), 0);
    assert_eq!(outcome.graph.len(), 2);
}

// ============================================================================
// 2. Depth bound
// ============================================================================

#[tokio::test]
async fn test_unbounded_follows_whole_chain() {
    let store = chain();
    let outcome = deep(&store, FollowConfig::default())
        .follow(chain_start(), FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();
    for uid in ["aaaaaaaaa", "bbbbbbbbb", "ccccccccc", "ddddddddd"] {
        assert!(is_full(&outcome.graph, uid), "{uid} not expanded");
    }
    assert_eq!(outcome.layers, 3);
    assert_eq!(outcome.fetches, 3);
}

#[tokio::test]
async fn test_max_depth_bounds_expansion() {
    let store = chain();
    let config = FollowConfig { max_depth: Some(1), ..Default::default() };
    let outcome = deep(&store, config)
        .follow(chain_start(), FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();

    assert!(is_full(&outcome.graph, "bbbbbbbbb"));
    assert!(outcome.graph.get("ccccccccc").is_none());
    let b = outcome.graph.get("bbbbbbbbb").unwrap();
    assert_eq!(b.references.iter().collect::<Vec<_>>(), vec![&NodeRef::Pending(InternalId(3))]);
    assert_eq!(outcome.fetches, 1);
}

#[tokio::test]
async fn test_max_depth_zero_fetches_nothing() {
    let store = chain();
    let config = FollowConfig { max_depth: Some(0), ..Default::default() };
    let outcome = deep(&store, config)
        .follow(chain_start(), FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(store.executions(), 0);
    assert_eq!(outcome.graph.len(), 1);
}

// ============================================================================
// 3. Unresolvable references
// ============================================================================

#[tokio::test]
async fn test_deleted_entity_leaves_placeholder_and_diagnostic() {
    // The session saw `ghostghst` earlier, so the new batch resolves the stub
    // to a uid; the entity has since been deleted upstream.
    let earlier = graph_of(&[json!({"uid": "ghostghst", "id": 50, "string": "gone soon"})]);
    let records = vec![
        PullRecord::from_json(&json!({"uid": "aaaaaaaaa", "id": 1, "string": "x", "refs": [{"id": 50}, {"id": 2}]}))
            .unwrap(),
    ];
    let graph = NodeGraph::resolve_with(records, earlier.ids().clone()).unwrap();
    assert_eq!(graph.placeholders().into_iter().map(StableId::as_str).collect::<Vec<_>>(), vec!["ghostghst"]);

    let store = MemoryExecutor::new();
    store.insert(json!({"uid": "bbbbbbbbb", "id": 2, "string": "still here"})).unwrap();

    let outcome = deep(&store, FollowConfig::default())
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.unresolved,
        vec![Unresolvable {
            reference: NodeRef::Stable("ghostghst".into()),
            referenced_by: "aaaaaaaaa".into(),
            depth: 1,
        }]
    );
    assert!(outcome.graph.get("ghostghst").unwrap().is_placeholder());
    assert!(is_full(&outcome.graph, "bbbbbbbbb"));
    assert!(matches!(
        Error::from(outcome.unresolved[0].clone()),
        Error::UnresolvableReference(NodeRef::Stable(_))
    ));
}

#[tokio::test]
async fn test_unknown_internal_id_is_unresolvable() {
    let store = MemoryExecutor::new();
    let graph = graph_of(&[json!({"uid": "aaaaaaaaa", "id": 1, "string": "x", "refs": [{"id": 404}]})]);
    let outcome = deep(&store, FollowConfig::default())
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.unresolved.len(), 1);
    assert_eq!(outcome.unresolved[0].reference, NodeRef::Pending(InternalId(404)));
    assert_eq!(outcome.layers, 0);
}

#[tokio::test]
async fn test_entity_without_uid_is_unresolvable() {
    let store = MemoryExecutor::new();
    store.insert(json!({"id": 2, "string": "no uid"})).unwrap();
    let outcome = deep(&store, FollowConfig::default())
        .follow(chain_start(), FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.unresolved.len(), 1);
    assert_eq!(outcome.unresolved[0].reference, NodeRef::Pending(InternalId(2)));
    assert!(is_full(&outcome.graph, "aaaaaaaaa"));
}

// ============================================================================
// 4. Children fetched later are re-sorted
// ============================================================================

#[tokio::test]
async fn test_fetched_children_sorted_after_merge() {
    let store = MemoryExecutor::new();
    store
        .insert_all([
            json!({"uid": "second000", "id": 11, "string": "2nd", "order": 1}),
            json!({"uid": "first0000", "id": 12, "string": "1st", "order": 0}),
        ])
        .unwrap();
    let graph = graph_of(&[json!({"uid": "pagepage1", "id": 10, "title": "P", "children": [{"id": 11}, {"id": 12}]})]);

    let outcome = deep(&store, FollowConfig { concurrency: 1, ..Default::default() })
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();

    let children: Vec<&str> = outcome.graph.get("pagepage1").unwrap().child_ids().map(StableId::as_str).collect();
    assert_eq!(children, vec!["first0000", "second000"]);
    assert_eq!(outcome.layers, 1);
    assert_eq!(outcome.fetches, 2);
    assert_eq!(outcome.graph.roots().len(), 1);
}

#[tokio::test]
async fn test_follow_graph_from_build_keeps_roots() {
    let records = vec![
        PullRecord::from_json(&json!({"uid": "aaaaaaaaa", "id": 1, "string": "a", "refs": [{"id": 2}]})).unwrap(),
    ];
    let mut ids = IdTable::new();
    let normalized = normalize(&records, &mut ids).unwrap();
    let graph = build(&normalized, ids).unwrap();

    let store = MemoryExecutor::new();
    store.insert(json!({"uid": "bbbbbbbbb", "id": 2, "string": "b"})).unwrap();

    let outcome = deep(&store, FollowConfig::default())
        .follow(graph, FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap();

    assert!(is_full(&outcome.graph, "aaaaaaaaa"));
    assert!(is_full(&outcome.graph, "bbbbbbbbb"));
    assert_eq!(outcome.graph.len(), 2);
    let a = outcome.graph.get("aaaaaaaaa").unwrap();
    assert!(a.references.contains(&NodeRef::Stable("bbbbbbbbb".into())));
}

// ============================================================================
// 5. Cancellation and errors
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_start() {
    let store = chain();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = deep(&store, FollowConfig::default())
        .follow(chain_start(), FollowDirective::Deep, &cancel)
        .await
        .unwrap();
    assert!(outcome.cancelled);
    assert_eq!(store.executions(), 0);
    assert_eq!(outcome.graph.len(), 1);
}

/// Fires the token after the first query it serves.
struct CancelAfterFirst {
    inner: MemoryExecutor,
    cancel: CancellationToken,
}

#[async_trait]
impl QueryExecutor for CancelAfterFirst {
    async fn execute(&self, query: &str, bindings: &[Binding]) -> roam_graph::Result<Vec<Json>> {
        let rows = self.inner.execute(query, bindings).await;
        self.cancel.cancel();
        rows
    }
}

#[tokio::test]
async fn test_cancelled_mid_run_returns_partial_graph() {
    let cancel = CancellationToken::new();
    let executor = CancelAfterFirst { inner: chain(), cancel: cancel.clone() };

    let outcome = LinkFollower::new(&executor, FollowConfig::default())
        .follow(chain_start(), FollowDirective::Deep, &cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(is_full(&outcome.graph, "bbbbbbbbb"));
    assert!(outcome.graph.get("ccccccccc").is_none());
    assert_eq!(outcome.fetches, 1);
    assert_eq!(executor.inner.executions(), 1);
}

#[tokio::test]
async fn test_transport_error_aborts_follow() {
    let store = chain();
    store.fail_next("connection reset");
    let err = deep(&store, FollowConfig::default())
        .follow(chain_start(), FollowDirective::Deep, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

// ============================================================================
// 6. Through the Resolver handle
// ============================================================================

#[tokio::test]
async fn test_resolver_follows_with_configured_directive() {
    let store = chain();
    let resolver = Resolver::with_config(store, ResolverConfig::default().deep().with_max_depth(2)).unwrap();
    let graph = resolver.resolve_rows(&[json!([{"uid": "aaaaaaaaa", "id": 1, "string": "a", "refs": [{"id": 2}]}])]).unwrap();

    let outcome = resolver.follow(graph, &CancellationToken::new()).await.unwrap();
    assert!(is_full(&outcome.graph, "ccccccccc"));
    assert!(outcome.graph.get("ddddddddd").is_none());
    assert_eq!(outcome.layers, 2);
}

#[tokio::test]
async fn test_shallow_resolver_leaves_stubs() {
    let resolver = Resolver::with_executor(chain());
    let graph = resolver.resolve_rows(&[json!([{"uid": "aaaaaaaaa", "id": 1, "string": "a", "refs": [{"id": 2}]}])]).unwrap();
    let outcome = resolver.follow(graph, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.graph.len(), 1);
    assert_eq!(resolver.executor().executions(), 0);
}

#[tokio::test]
async fn test_zero_concurrency_rejected() {
    let config = ResolverConfig {
        follow: FollowConfig { concurrency: 0, ..Default::default() },
        ..Default::default()
    };
    assert!(matches!(Resolver::with_config(chain(), config), Err(Error::Config(_))));
}
