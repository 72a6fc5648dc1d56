//! In-memory query executor.
//!
//! This is the reference implementation of `QueryExecutor`.
//! It holds raw pull objects in HashMaps protected by RwLock.
//!
//! ## Limitations
//!
//! - **No Datalog engine**: only the catalogue queries in `query` are
//!   answered, matched by exact text. Anything else is rejected with
//!   `Error::UnsupportedQuery`.
//! - **No schema inference**: the schema query returns whatever was set with
//!   `set_schema()`.
//!
//! Use this executor for:
//! - Testing parsing, normalization, graph building and link following
//! - Embedding the resolver over a pre-exported graph
//! - Simulating deleted entities (`remove()`) and transport failures
//!   (`fail_next()`)

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::model::{attr, InternalId};
use crate::pull::stub_id;
use crate::{Error, Result};
use super::{Binding, QueryExecutor, PAGE_WITH_DESCENDANTS, PULL_BY_ID, PULL_BY_UID, SCHEMA};

// ============================================================================
// MemoryExecutor
// ============================================================================

/// In-memory entity store answering the catalogue queries.
#[derive(Clone, Default)]
pub struct MemoryExecutor {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    /// internal id → raw pull object (including its own `id`)
    entities: RwLock<BTreeMap<InternalId, Json>>,
    /// uid → internal id
    uid_index: RwLock<HashMap<String, InternalId>>,
    schema: RwLock<Vec<(String, String)>>,
    /// One-shot transport failure for the next `execute()`.
    failure: RwLock<Option<String>>,
    next_id: AtomicU64,
    executions: AtomicU64,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw pull object. Uses its `id` when present, otherwise
    /// assigns the next free internal id and writes it into the object.
    pub fn insert(&self, mut entity: Json) -> Result<InternalId> {
        let obj = entity
            .as_object_mut()
            .ok_or_else(|| Error::MalformedResult("entity must be a JSON object".into()))?;

        let id = match obj.get(attr::ID).and_then(Json::as_u64) {
            Some(id) => {
                self.inner.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
                InternalId(id)
            }
            None => {
                let id = InternalId(self.inner.next_id.fetch_add(1, Ordering::Relaxed).max(1));
                self.inner.next_id.fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
                obj.insert(attr::ID.into(), Json::from(id.0));
                id
            }
        };

        if let Some(uid) = obj.get(attr::UID).and_then(Json::as_str) {
            self.inner.uid_index.write().insert(uid.to_owned(), id);
        }
        self.inner.entities.write().insert(id, entity);
        Ok(id)
    }

    /// Store many entities.
    pub fn insert_all(&self, entities: impl IntoIterator<Item = Json>) -> Result<Vec<InternalId>> {
        entities.into_iter().map(|e| self.insert(e)).collect()
    }

    /// Delete an entity by uid, as if it were removed upstream.
    pub fn remove(&self, uid: &str) -> bool {
        let Some(id) = self.inner.uid_index.write().remove(uid) else {
            return false;
        };
        self.inner.entities.write().remove(&id).is_some()
    }

    pub fn set_schema(&self, rows: impl IntoIterator<Item = (String, String)>) {
        *self.inner.schema.write() = rows.into_iter().collect();
    }

    /// Make the next `execute()` fail with `Error::Transport(message)`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.inner.failure.write() = Some(message.into());
    }

    /// Number of `execute()` calls served so far.
    pub fn executions(&self) -> u64 {
        self.inner.executions.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entities.read().is_empty()
    }

    fn by_uid(&self, uid: &str) -> Option<Json> {
        let id = *self.inner.uid_index.read().get(uid)?;
        self.inner.entities.read().get(&id).cloned()
    }

    /// Entities without a `uid` do not match `[?e :block/uid _]`.
    fn by_id(&self, id: InternalId) -> Option<Json> {
        self.inner
            .entities
            .read()
            .get(&id)
            .filter(|e| e.get(attr::UID).is_some_and(Json::is_string))
            .cloned()
    }

    /// The page titled `title` followed by its descendants, breadth-first.
    fn page_with_descendants(&self, title: &str) -> Vec<Json> {
        let entities = self.inner.entities.read();
        let Some((page_id, _)) = entities
            .iter()
            .find(|(_, e)| e.get(attr::TITLE).and_then(Json::as_str) == Some(title))
        else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*page_id]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(entity) = entities.get(&id) else { continue };
            out.push(entity.clone());
            if let Some(children) = entity.get(attr::CHILDREN).and_then(Json::as_array) {
                queue.extend(children.iter().filter_map(stub_id));
            }
        }
        out
    }
}

// ============================================================================
// QueryExecutor impl
// ============================================================================

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn execute(&self, query: &str, bindings: &[Binding]) -> Result<Vec<Json>> {
        self.inner.executions.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = self.inner.failure.write().take() {
            return Err(Error::Transport(message));
        }

        let Some((Binding::Database, inputs)) = bindings.split_first() else {
            return Err(Error::UnsupportedQuery("first binding must be the database".into()));
        };

        let pulled: Vec<Json> = match query {
            PULL_BY_UID => scalars(inputs, 0)?
                .iter()
                .filter_map(Json::as_str)
                .filter_map(|uid| self.by_uid(uid))
                .collect(),
            PULL_BY_ID => scalars(inputs, 0)?
                .iter()
                .filter_map(Json::as_u64)
                .filter_map(|id| self.by_id(InternalId(id)))
                .collect(),
            PAGE_WITH_DESCENDANTS => scalars(inputs, 0)?
                .iter()
                .filter_map(Json::as_str)
                .flat_map(|title| self.page_with_descendants(title))
                .collect(),
            SCHEMA => {
                let schema = self.inner.schema.read();
                return Ok(schema
                    .iter()
                    .map(|(ns, name)| Json::Array(vec![Json::from(ns.as_str()), Json::from(name.as_str())]))
                    .collect());
            }
            other => {
                return Err(Error::UnsupportedQuery(format!(
                    "memory executor cannot run: {}",
                    other.lines().next().unwrap_or_default()
                )));
            }
        };

        tracing::trace!(rows = pulled.len(), "memory executor answered");
        // `:find (pull ...)` rows are single-column.
        Ok(pulled.into_iter().map(|e| Json::Array(vec![e])).collect())
    }
}

/// Values of the input at `index`: one for a scalar, each element for a
/// collection.
fn scalars(inputs: &[Binding], index: usize) -> Result<Vec<Json>> {
    match inputs.get(index) {
        Some(Binding::Scalar(v)) => Ok(vec![v.clone()]),
        Some(Binding::Collection(vs)) => Ok(vs.clone()),
        Some(Binding::Tuple(_)) => Err(Error::UnsupportedQuery(format!("input {index} cannot be a tuple"))),
        Some(Binding::Database) => Err(Error::UnsupportedQuery("database bound twice".into())),
        None => Err(Error::UnsupportedQuery(format!("missing input {index}"))),
    }
}
