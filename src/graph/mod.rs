//! Node graph builder.
//!
//! Assembles normalized records into a [`NodeGraph`]: an arena of [`Node`]s
//! keyed by [`StableId`]. Every cross reference is a key into the arena, so
//! cycles (a block referencing its own page) need no special handling here.

use std::collections::{BTreeSet, HashSet, VecDeque};

use hashbrown::HashMap;

use crate::model::*;
use crate::normalize::{self, IdTable, NormalizedRecord};
use crate::{Error, Result};

/// Attributes that become dedicated [`Node`] fields.
const MODELED: &[&str] = &[
    attr::ID,
    attr::UID,
    attr::TITLE,
    attr::STRING,
    attr::ORDER,
    attr::HEADING,
    attr::PARENTS,
    attr::REFS,
    attr::PAGE,
];

/// The resolved graph of one resolution batch.
///
/// Owns exactly one [`Node`] per stable id. Nodes only referenced by stable
/// id get a placeholder.
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    nodes: HashMap<StableId, Node>,
    roots: BTreeSet<StableId>,
    ids: IdTable,
    records: Vec<NormalizedRecord>,
}

impl NodeGraph {
    /// Normalize and build `records` with a fresh id table.
    pub fn resolve(records: Vec<PullRecord>) -> Result<Self> {
        Self::resolve_with(records, IdTable::new())
    }

    /// Normalize and build `records`, reusing a session's id table.
    pub fn resolve_with(records: Vec<PullRecord>, mut ids: IdTable) -> Result<Self> {
        let normalized = normalize::normalize(&records, &mut ids)?;
        assemble(normalized, ids)
    }

    /// Rebuild with extra records appended, keeping the current roots.
    ///
    /// Returns a new graph; `self` is consumed, not mutated in place. On
    /// error nothing is merged. References the earlier records left
    /// unresolved are resolved against the grown id table.
    pub fn merge(self, records: Vec<PullRecord>) -> Result<Self> {
        let NodeGraph { roots, mut ids, records: mut all, .. } = self;
        let fetched = normalize::normalize(&records, &mut ids)?;
        for record in &mut all {
            record.refresh(&ids);
        }
        all.extend(fetched);
        let mut merged = assemble(all, ids)?;
        merged.roots = roots;
        Ok(merged)
    }

    pub fn get(&self, stable_id: &str) -> Option<&Node> {
        self.nodes.get(stable_id)
    }

    pub fn contains(&self, stable_id: &str) -> bool {
        self.nodes.contains_key(stable_id)
    }

    /// Resolve a [`NodeRef`] to its node, if the arena has one.
    pub fn lookup(&self, r: &NodeRef) -> Option<&Node> {
        match r {
            NodeRef::Stable(id) => self.nodes.get(id),
            NodeRef::Pending(internal) => self.nodes.get(self.ids.get(*internal)?),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Entities whose full record was part of the queried batch.
    pub fn roots(&self) -> &BTreeSet<StableId> {
        &self.roots
    }

    pub fn ids(&self) -> &IdTable {
        &self.ids
    }

    /// Normalized records the graph was built from.
    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    /// Stable ids known only as placeholders, sorted.
    pub fn placeholders(&self) -> BTreeSet<&StableId> {
        self.nodes
            .values()
            .filter(|n| n.is_placeholder())
            .map(|n| &n.stable_id)
            .collect()
    }

    /// Roots that no fully resolved node of this graph claims, neither as a
    /// parent nor through `children`.
    ///
    /// For a page fetched with its descendants this is just the page.
    pub fn top_level(&self) -> BTreeSet<&StableId> {
        let claimed: HashSet<&StableId> = self
            .nodes
            .values()
            .filter(|n| !n.is_placeholder())
            .flat_map(|n| n.children.iter())
            .filter_map(|r| self.lookup(r).map(|child| &child.stable_id))
            .collect();
        self.roots
            .iter()
            .filter(|id| !claimed.contains(*id))
            .filter(|id| {
                self.nodes.get(*id).is_some_and(|node| {
                    !node
                        .parents
                        .iter()
                        .any(|p| self.lookup(p).is_some_and(|parent| !parent.is_placeholder()))
                })
            })
            .collect()
    }

    /// Resolved children of `stable_id`, in order.
    pub fn children_of<'a>(&'a self, stable_id: &str) -> impl Iterator<Item = &'a Node> + use<'a> {
        self.nodes
            .get(stable_id)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|r| self.lookup(r))
    }

    /// Depth-first pre-order walk from `start` along `children`.
    ///
    /// Each node is yielded at most once, so cyclic child links terminate.
    pub fn walk(&self, start: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut seen: HashSet<&StableId> = HashSet::new();
        let mut stack: Vec<&Node> = self.nodes.get(start).into_iter().collect();
        while let Some(node) = stack.pop() {
            if !seen.insert(&node.stable_id) {
                continue;
            }
            out.push(node);
            stack.extend(node.children.iter().rev().filter_map(|r| self.lookup(r)));
        }
        out
    }

    /// Breadth-first hop distance from the top-level nodes along `children`,
    /// for every node reachable that way.
    pub fn depths(&self) -> HashMap<&StableId, usize> {
        let mut depth: HashMap<&StableId, usize> = HashMap::new();
        let mut queue: VecDeque<&StableId> = VecDeque::new();
        for root in self.top_level() {
            depth.insert(root, 0);
            queue.push_back(root);
        }
        while let Some(id) = queue.pop_front() {
            let d = depth[id];
            for child in self.children_of(id.as_str()) {
                if !depth.contains_key(&child.stable_id) {
                    depth.insert(&child.stable_id, d + 1);
                    queue.push_back(&child.stable_id);
                }
            }
        }
        depth
    }
}

/// Build the arena from normalized records.
///
/// The input is not modified. When a stable id appears in more than one
/// record, the last record wins.
pub fn build(records: &[NormalizedRecord], ids: IdTable) -> Result<NodeGraph> {
    assemble(records.to_vec(), ids)
}

fn assemble(records: Vec<NormalizedRecord>, ids: IdTable) -> Result<NodeGraph> {
    let mut orders: HashMap<&StableId, Option<u32>> = HashMap::new();
    for record in &records {
        orders.insert(&record.stable_id, order_of(&record.attributes)?);
    }

    let mut nodes: HashMap<StableId, Node> = HashMap::with_capacity(records.len());
    let mut roots = BTreeSet::new();
    for record in &records {
        let node = node_from_record(record, &orders, &ids)?;
        roots.insert(record.stable_id.clone());
        nodes.insert(record.stable_id.clone(), node);
    }
    drop(orders);

    let referenced: Vec<StableId> = nodes
        .values()
        .flat_map(|n| {
            n.children
                .iter()
                .chain(n.parents.iter())
                .chain(n.references.iter())
                .chain(n.page.iter())
        })
        .filter_map(NodeRef::stable_id)
        .filter(|id| !nodes.contains_key(*id))
        .cloned()
        .collect();
    for id in referenced {
        nodes.entry(id.clone()).or_insert_with(|| Node::placeholder(id));
    }

    tracing::debug!(
        nodes = nodes.len(),
        roots = roots.len(),
        placeholders = nodes.len() - roots.len(),
        "built node graph"
    );

    Ok(NodeGraph { nodes, roots, ids, records })
}

fn node_from_record(
    record: &NormalizedRecord,
    orders: &HashMap<&StableId, Option<u32>>,
    ids: &IdTable,
) -> Result<Node> {
    let attrs = &record.attributes;
    let uid = &record.stable_id;

    let title = optional_str(attrs, attr::TITLE, uid)?;
    let text = optional_str(attrs, attr::STRING, uid)?;
    let content = match (title, text) {
        (Some(_), Some(_)) => {
            return Err(Error::MalformedResult(format!(
                "{uid}: entity carries both a title and body text"
            )));
        }
        (Some(title), None) => NodeContent::Page { title: title.to_owned() },
        (None, text) => NodeContent::Block {
            text: text.unwrap_or_default().to_owned(),
            heading: heading_of(attrs, uid)?,
        },
    };

    let mut raw_attributes = AttributeRecord::new();
    let mut children = Vec::new();
    for (key, value) in attrs {
        if key == attr::CHILDREN {
            match value.references() {
                Some(refs) => children = refs.iter().map(Reference::to_node_ref).collect(),
                None => {
                    tracing::debug!(%uid, kind = value.type_name(), "children not in stub form; kept raw");
                    raw_attributes.insert(key.clone(), value.clone());
                }
            }
        } else if !MODELED.contains(&key.as_str()) {
            raw_attributes.insert(key.clone(), value.clone());
        }
    }
    sort_children(&mut children, |r| child_order(r, orders, ids));

    Ok(Node {
        stable_id: uid.clone(),
        content,
        order: order_of(attrs)?,
        children,
        parents: ref_set(attrs, attr::PARENTS),
        references: ref_set(attrs, attr::REFS),
        page: attrs
            .get(attr::PAGE)
            .and_then(AttributeValue::references)
            .and_then(|refs| refs.first())
            .map(Reference::to_node_ref),
        raw_attributes,
    })
}

/// Ascending by order, order-less entries last, ties in input order.
pub fn sort_children(children: &mut [NodeRef], order: impl Fn(&NodeRef) -> Option<u32>) {
    children.sort_by_cached_key(|r| {
        let o = order(r);
        (o.is_none(), o)
    });
}

fn child_order(r: &NodeRef, orders: &HashMap<&StableId, Option<u32>>, ids: &IdTable) -> Option<u32> {
    let stable = match r {
        NodeRef::Stable(id) => id,
        NodeRef::Pending(internal) => ids.get(*internal)?,
    };
    orders.get(stable).copied().flatten()
}

fn ref_set(attrs: &AttributeRecord, key: &str) -> BTreeSet<NodeRef> {
    attrs
        .get(key)
        .and_then(AttributeValue::references)
        .map(|refs| refs.iter().map(Reference::to_node_ref).collect())
        .unwrap_or_default()
}

fn optional_str<'a>(attrs: &'a AttributeRecord, key: &str, uid: &StableId) -> Result<Option<&'a str>> {
    match attrs.get(key) {
        None | Some(AttributeValue::Scalar(Scalar::Null)) => Ok(None),
        Some(AttributeValue::Scalar(Scalar::String(s))) => Ok(Some(s)),
        Some(other) => Err(Error::MalformedResult(format!(
            "{uid}: '{key}' must be a string, got {}",
            other.type_name()
        ))),
    }
}

fn optional_int(attrs: &AttributeRecord, key: &str) -> Result<Option<i64>> {
    match attrs.get(key) {
        None | Some(AttributeValue::Scalar(Scalar::Null)) => Ok(None),
        Some(AttributeValue::Scalar(s)) => s
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::MalformedResult(format!("'{key}' must be an integer, got {s}"))),
        Some(other) => Err(Error::MalformedResult(format!(
            "'{key}' must be an integer, got {}",
            other.type_name()
        ))),
    }
}

fn order_of(attrs: &AttributeRecord) -> Result<Option<u32>> {
    optional_int(attrs, attr::ORDER)?
        .map(|o| {
            u32::try_from(o).map_err(|_| Error::MalformedResult(format!("order {o} out of range")))
        })
        .transpose()
}

/// `0` is how Roam records a heading that was switched off.
fn heading_of(attrs: &AttributeRecord, uid: &StableId) -> Result<Option<HeadingLevel>> {
    match optional_int(attrs, attr::HEADING)? {
        None | Some(0) => Ok(None),
        Some(level) => u8::try_from(level)
            .ok()
            .and_then(HeadingLevel::new)
            .map(Some)
            .ok_or_else(|| Error::MalformedResult(format!("{uid}: heading {level} outside 1..=6"))),
    }
}
