//! # Query Executor Trait
//!
//! The contract between the resolver and whatever runs Datalog against the
//! remote graph. The resolver never builds requests or speaks HTTP; it hands
//! a query text plus [`Binding`]s to a [`QueryExecutor`] and parses the rows
//! that come back.
//!
//! ## Implementations
//!
//! | Executor | Module | Description |
//! |----------|--------|-------------|
//! | `MemoryExecutor` | `memory` | In-process entity table for testing/embedding |
//!
//! HTTP clients for the Roam Local API live outside this crate and implement
//! the same trait.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::model::{InternalId, StableId};
use crate::Result;

pub use memory::MemoryExecutor;

// ============================================================================
// Bindings
// ============================================================================

/// One `:in` input of a Datalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Binding {
    /// The implicit database (`$`). Always first.
    Database,
    /// `?x`
    Scalar(Json),
    /// `[?x ?y]`: a fixed-size group bound together.
    Tuple(Vec<Json>),
    /// `[?x ...]`: one logical execution per element.
    Collection(Vec<Json>),
}

/// Ordered query inputs, starting with [`Binding::Database`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bindings(Vec<Binding>);

impl Bindings {
    pub fn new() -> Self {
        Self(vec![Binding::Database])
    }

    pub fn scalar(mut self, value: impl Into<Json>) -> Self {
        self.0.push(Binding::Scalar(value.into()));
        self
    }

    pub fn tuple<T: Into<Json>>(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.0.push(Binding::Tuple(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn collection<T: Into<Json>>(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.0.push(Binding::Collection(values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn as_slice(&self) -> &[Binding] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Query catalogue
// ============================================================================

/// Page entity plus every block reachable through `:block/children`.
///
/// `?page` must appear in the `or-join` variable list and be re-bound in
/// each branch; otherwise `descendant` matches every pair in the graph.
pub const PAGE_WITH_DESCENDANTS: &str = "\
[:find (pull ?node [*])
 :in $ ?title %
 :where
 [?page :node/title ?title]
 (or-join [?page ?node]
   (and [?page :node/title ?title]
        [?node :node/title ?title])
   (and [?page :node/title ?title]
        (descendant ?page ?node)))]";

/// Rule set bound to `%` in [`PAGE_WITH_DESCENDANTS`].
pub const DESCENDANT_RULE: &str = "\
[[(descendant ?parent ?child)
  [?parent :block/children ?child]]
 [(descendant ?parent ?child)
  [?parent :block/children ?mid]
  (descendant ?mid ?child)]]";

/// One entity by `:block/uid`.
pub const PULL_BY_UID: &str = "\
[:find (pull ?e [*])
 :in $ ?uid
 :where
 [?e :block/uid ?uid]]";

/// One entity by `:db/id`. Empty when the entity no longer exists.
pub const PULL_BY_ID: &str = "\
[:find (pull ?e [*])
 :in $ ?e
 :where
 [?e :block/uid _]]";

/// Every attribute in use, as `[namespace, attr]` rows.
pub const SCHEMA: &str = "\
[:find ?namespace ?attr
 :where
 [_ ?attr]
 [(namespace ?attr) ?namespace]]";

/// A catalogue query with its bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: &'static str,
    pub bindings: Bindings,
}

impl Query {
    pub fn page_with_descendants(title: &str) -> Self {
        Self {
            text: PAGE_WITH_DESCENDANTS,
            bindings: Bindings::new().scalar(title).scalar(DESCENDANT_RULE),
        }
    }

    pub fn pull_by_uid(uid: &StableId) -> Self {
        Self { text: PULL_BY_UID, bindings: Bindings::new().scalar(uid.as_str()) }
    }

    pub fn pull_by_id(id: InternalId) -> Self {
        Self { text: PULL_BY_ID, bindings: Bindings::new().scalar(id.0) }
    }

    pub fn schema() -> Self {
        Self { text: SCHEMA, bindings: Bindings::new() }
    }

    pub async fn run<E: QueryExecutor + ?Sized>(&self, executor: &E) -> Result<Vec<Json>> {
        executor.execute(self.text, self.bindings.as_slice()).await
    }
}

// ============================================================================
// QueryExecutor Trait
// ============================================================================

/// Runs one Datalog query and returns its raw result rows.
///
/// `bindings[0]` is always [`Binding::Database`]. Transport and
/// authentication failures are returned as [`crate::Error::Transport`] and
/// reach the caller unchanged.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str, bindings: &[Binding]) -> Result<Vec<Json>>;
}
