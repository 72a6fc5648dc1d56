//! Identifier normalizer.
//!
//! Indexes every record's server-provided stable id under its internal id,
//! then rewrites each stub reference into `Resolved(StableId)` or
//! `Unresolved(InternalId)`. Never invents identifiers.
//!
//! A batch is all-or-nothing: if any record lacks a stable id or conflicts
//! with the table, the whole batch fails and the caller's table is left
//! untouched.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::{Error, Result};

/// Internal id → stable id, kept injective in both directions.
///
/// Carried across batches of one session so later batches can resolve
/// stubs to entities seen earlier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTable {
    forward: HashMap<InternalId, StableId>,
    reverse: HashMap<StableId, InternalId>,
}

impl IdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `internal → stable`. Re-registering the same pair is a no-op.
    pub fn register(&mut self, internal: InternalId, stable: &StableId) -> Result<()> {
        if let Some(existing) = self.forward.get(&internal) {
            if existing != stable {
                return Err(Error::IdentityConflict(format!(
                    "internal id {internal} maps to both {existing} and {stable}"
                )));
            }
            return Ok(());
        }
        if let Some(other) = self.reverse.get(stable) {
            return Err(Error::IdentityConflict(format!(
                "stable id {stable} claimed by internal ids {other} and {internal}"
            )));
        }
        self.forward.insert(internal, stable.clone());
        self.reverse.insert(stable.clone(), internal);
        Ok(())
    }

    pub fn get(&self, internal: InternalId) -> Option<&StableId> {
        self.forward.get(&internal)
    }

    pub fn internal_id_of(&self, stable: &str) -> Option<InternalId> {
        self.reverse.get(stable).copied()
    }

    /// Rewrite one reference against the table.
    pub fn resolve(&self, reference: &Reference) -> Reference {
        match reference {
            Reference::Stub(id) | Reference::Unresolved(id) => match self.get(*id) {
                Some(stable) => Reference::Resolved(stable.clone()),
                None => Reference::Unresolved(*id),
            },
            Reference::Resolved(stable) => Reference::Resolved(stable.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InternalId, &StableId)> {
        self.forward.iter()
    }
}

/// A pull record with its stable id established and every stub rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub stable_id: StableId,
    pub internal_id: Option<InternalId>,
    pub attributes: AttributeRecord,
}

impl NormalizedRecord {
    /// Rewrite references still `Unresolved` against a grown table.
    pub fn refresh(&mut self, table: &IdTable) {
        self.attributes = self.attributes.map_values(|v| rewrite(v, table));
    }
}

/// Normalize one batch against `table`.
///
/// Output is in input order, one record per input record.
pub fn normalize(records: &[PullRecord], table: &mut IdTable) -> Result<Vec<NormalizedRecord>> {
    let mut staged = table.clone();
    let mut stable_ids = Vec::with_capacity(records.len());

    for (position, record) in records.iter().enumerate() {
        let stable_id = record
            .stable_id()?
            .ok_or(Error::MissingStableId { internal_id: record.internal_id, position })?;
        if let Some(internal) = record.internal_id {
            staged.register(internal, &stable_id)?;
        }
        stable_ids.push(stable_id);
    }

    let normalized: Vec<NormalizedRecord> = records
        .iter()
        .zip(stable_ids)
        .map(|(record, stable_id)| NormalizedRecord {
            stable_id,
            internal_id: record.internal_id,
            attributes: record.attributes.map_values(|v| rewrite(v, &staged)),
        })
        .collect();

    tracing::debug!(
        records = normalized.len(),
        known_ids = staged.len(),
        "normalized pull batch"
    );

    *table = staged;
    Ok(normalized)
}

fn rewrite(value: &AttributeValue, table: &IdTable) -> AttributeValue {
    match value {
        AttributeValue::Reference(r) => AttributeValue::Reference(table.resolve(r)),
        AttributeValue::ReferenceList(rs) => {
            AttributeValue::ReferenceList(rs.iter().map(|r| table.resolve(r)).collect())
        }
        other => other.clone(),
    }
}
