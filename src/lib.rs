//! # roam-graph-rs: Graph Result Resolver for Roam Research
//!
//! Turns raw Roam Local API pull results, whose cross references are
//! unstable `:db/id` stubs, into a node graph keyed by stable `:block/uid`s,
//! with deterministically ordered children and optional, cycle-safe link
//! following.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `QueryExecutor` is the contract between the resolver and the remote graph
//! 2. **Clean DTOs**: `Node`, `NodeRef`, `Vertex` cross all boundaries
//! 3. **Pure pipeline**: parse → normalize → build are synchronous functions
//! 4. **Arena graph**: every link is a `StableId` key, so cycles need no special care
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roam_graph::{CancellationToken, Resolver};
//!
//! # async fn example() -> roam_graph::Result<()> {
//! // In-memory executor; HTTP executors implement the same trait
//! let resolver = Resolver::open_memory().await?;
//! resolver.executor().insert(serde_json::json!({
//!     "uid": "6olpFWiw1", "title": "Test Article"
//! }))?;
//!
//! let resolution = resolver.fetch_page("Test Article", &CancellationToken::new()).await?;
//! for id in resolution.graph.top_level() {
//!     println!("{id}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Executors
//!
//! | Executor | Module | Description |
//! |----------|--------|-------------|
//! | Memory | `query::memory` | In-process entity table for testing/embedding |
//! | Local API | (external) | HTTP client for a running Roam desktop app |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod pull;
pub mod normalize;
pub mod graph;
pub mod follow;
pub mod query;
pub mod schema;
pub mod validation;
pub mod vertex;
pub mod config;

use parking_lot::Mutex;
use serde_json::Value as Json;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    AttributeRecord, AttributeValue, HeadingLevel, InternalId, Node, NodeContent, NodeKind,
    NodeRef, PullRecord, Reference, Scalar, StableId,
};

// ============================================================================
// Re-exports: Pipeline
// ============================================================================

pub use pull::{parse_pull, parse_rows};
pub use normalize::{normalize, IdTable, NormalizedRecord};
pub use graph::{build, NodeGraph};
pub use follow::{FollowConfig, FollowDirective, FollowOutcome, LinkFollower, LinkKinds, Unresolvable};

// ============================================================================
// Re-exports: Queries, schema, output
// ============================================================================

pub use query::{Binding, Bindings, MemoryExecutor, Query, QueryExecutor};
pub use schema::{fetch_schema, Attribute, Namespace, Schema};
pub use validation::{validate_all, validate_graph, ValidationResult, ValidationWarning};
pub use vertex::{export_vertices, Vertex, VertexType};
pub use config::ResolverConfig;
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Top-level Resolver handle
// ============================================================================

/// Everything one resolution produced.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub graph: NodeGraph,
    /// References the follower could not fetch.
    pub unresolved: Vec<Unresolvable>,
    pub warnings: ValidationResult,
    /// Link following stopped early on cancellation.
    pub cancelled: bool,
}

/// The primary entry point. A `Resolver` wraps a query executor and runs
/// the parse → normalize → build → follow pipeline over its results.
///
/// One `Resolver` is one session: the id table grows with every batch it
/// resolves, so later batches resolve stubs to entities seen earlier.
pub struct Resolver<E: QueryExecutor> {
    executor: E,
    config: ResolverConfig,
    schema: Option<Schema>,
    session: Mutex<IdTable>,
}

impl<E: QueryExecutor> Resolver<E> {
    /// Create a Resolver with the default configuration.
    pub fn with_executor(executor: E) -> Self {
        Self { executor, config: ResolverConfig::default(), schema: None, session: Mutex::default() }
    }

    /// Create a Resolver with an explicit, validated configuration.
    pub fn with_config(executor: E, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { executor, config, schema: None, session: Mutex::default() })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Access the underlying executor (for advanced use).
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Fetch the graph's schema and keep it for diagnostics.
    pub async fn load_schema(&mut self) -> Result<&Schema> {
        let schema = fetch_schema(&self.executor).await?;
        Ok(self.schema.insert(schema))
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Snapshot of the session's id table.
    pub fn session_ids(&self) -> IdTable {
        self.session.lock().clone()
    }

    /// Forget every id mapping learned so far.
    pub fn reset_session(&self) {
        *self.session.lock() = IdTable::new();
    }

    /// Resolve already-fetched `:find (pull ...)` rows against the session's
    /// id table. No queries are issued. A failed batch leaves the table as
    /// it was.
    pub fn resolve_rows(&self, rows: &[Json]) -> Result<NodeGraph> {
        let records = parse_rows(rows)?;
        let graph = {
            let mut session = self.session.lock();
            let graph = NodeGraph::resolve_with(records, session.clone())?;
            *session = graph.ids().clone();
            graph
        };
        self.log_unmodeled(&graph);
        Ok(graph)
    }

    /// Expand `graph` with the configured directive. Ids learned while
    /// following are added to the session.
    pub async fn follow(&self, graph: NodeGraph, cancel: &CancellationToken) -> Result<FollowOutcome> {
        let outcome = LinkFollower::new(&self.executor, self.config.follow.clone())
            .follow(graph, self.config.directive, cancel)
            .await?;
        self.remember(outcome.graph.ids());
        Ok(outcome)
    }

    /// Fetch the page titled `title` with all its descendants, then follow
    /// links and validate as configured.
    ///
    /// An unknown title yields an empty graph.
    pub async fn fetch_page(&self, title: &str, cancel: &CancellationToken) -> Result<Resolution> {
        let rows = Query::page_with_descendants(title).run(&self.executor).await?;
        if rows.is_empty() {
            tracing::warn!(title, "page not found");
        }
        let graph = self.resolve_rows(&rows)?;
        let outcome = self.follow(graph, cancel).await?;

        let warnings = if self.config.validate {
            validate_graph(&outcome.graph)
        } else {
            ValidationResult::default()
        };

        tracing::info!(
            title,
            nodes = outcome.graph.len(),
            unresolved = outcome.unresolved.len(),
            warnings = warnings.len(),
            "resolved page"
        );
        Ok(Resolution {
            graph: outcome.graph,
            unresolved: outcome.unresolved,
            warnings,
            cancelled: outcome.cancelled,
        })
    }

    fn remember(&self, ids: &IdTable) {
        let mut session = self.session.lock();
        for (internal, stable) in ids.iter() {
            if let Err(e) = session.register(*internal, stable) {
                tracing::warn!(error = %e, "session id table kept its earlier mapping");
            }
        }
    }

    fn log_unmodeled(&self, graph: &NodeGraph) {
        let Some(schema) = &self.schema else { return };
        let keys: std::collections::BTreeSet<&str> = graph
            .nodes()
            .flat_map(|n| n.raw_attributes.keys())
            .map(String::as_str)
            .collect();
        for key in keys {
            tracing::debug!(attribute = %schema.describe(key), "unmodeled attribute kept raw");
        }
    }
}

/// In-memory resolver for testing and embedding.
impl Resolver<MemoryExecutor> {
    pub async fn open_memory() -> Result<Self> {
        Ok(Self::with_executor(MemoryExecutor::new()))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    #[error("Record at position {position} has no stable id (internal id {internal_id:?})")]
    MissingStableId { internal_id: Option<InternalId>, position: usize },

    #[error("Identity conflict: {0}")]
    IdentityConflict(String),

    #[error("Unresolvable reference: {0}")]
    UnresolvableReference(NodeRef),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
