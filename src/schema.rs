//! Roam attribute schema.
//!
//! The live graph reports its attributes through the schema query as
//! `[namespace, attr]` pairs. The resolver never needs the schema to be
//! correct; it only uses it to label unmodeled attributes in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::query::{Query, QueryExecutor};
use crate::{Error, Result};

/// Attribute namespaces of the Roam Datomic schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Attrs,
    Block,
    Children,
    Create,
    Edit,
    Entity,
    Graph,
    Log,
    Node,
    Page,
    Restrictions,
    Token,
    User,
    Vc,
    Version,
    Window,
    /// A namespace this crate does not know yet (schema drift).
    Other(String),
}

impl Namespace {
    pub fn as_str(&self) -> &str {
        match self {
            Namespace::Attrs => "attrs",
            Namespace::Block => "block",
            Namespace::Children => "children",
            Namespace::Create => "create",
            Namespace::Edit => "edit",
            Namespace::Entity => "entity",
            Namespace::Graph => "graph",
            Namespace::Log => "log",
            Namespace::Node => "node",
            Namespace::Page => "page",
            Namespace::Restrictions => "restrictions",
            Namespace::Token => "token",
            Namespace::User => "user",
            Namespace::Vc => "vc",
            Namespace::Version => "version",
            Namespace::Window => "window",
            Namespace::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Namespace::Other(_))
    }
}

impl FromStr for Namespace {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim_start_matches(':') {
            "attrs" => Namespace::Attrs,
            "block" => Namespace::Block,
            "children" => Namespace::Children,
            "create" => Namespace::Create,
            "edit" => Namespace::Edit,
            "entity" => Namespace::Entity,
            "graph" => Namespace::Graph,
            "log" => Namespace::Log,
            "node" => Namespace::Node,
            "page" => Namespace::Page,
            "restrictions" => Namespace::Restrictions,
            "token" => Namespace::Token,
            "user" => Namespace::User,
            "vc" => Namespace::Vc,
            "version" => Namespace::Version,
            "window" => Namespace::Window,
            other => Namespace::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(namespace, name)` attribute, e.g. `:block/uid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub namespace: Namespace,
    pub name: String,
}

impl Attribute {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self { namespace, name: name.into() }
    }

    /// Parse `:block/uid` or `block/uid`. `None` without a namespace.
    pub fn parse(key: &str) -> Option<Self> {
        let (ns, name) = key.trim_start_matches(':').split_once('/')?;
        if ns.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(ns.parse().unwrap_or_else(|never| match never {}), name))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}/{}", self.namespace, self.name)
    }
}

/// The attribute set of one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(mut attributes: Vec<Attribute>) -> Self {
        attributes.sort();
        attributes.dedup();
        Self { attributes }
    }

    /// Build from schema-query rows.
    ///
    /// Each row is `[namespace, attr]`; `attr` may arrive bare (`"uid"`) or
    /// qualified (`":block/uid"`).
    pub fn from_rows(rows: &[Json]) -> Result<Self> {
        let attributes = rows
            .iter()
            .map(|row| -> Result<Attribute> {
                let (Some(ns), Some(attr)) = (row.get(0).and_then(Json::as_str), row.get(1).and_then(Json::as_str))
                else {
                    return Err(Error::MalformedResult(format!("schema row must be [namespace, attr], got {row}")));
                };
                let name = attr.rsplit_once('/').map_or(attr, |(_, n)| n).trim_start_matches(':');
                Ok(Attribute::new(ns.parse().unwrap_or_else(|never| match never {}), name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(attributes))
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Namespaces that declare an attribute named `name`.
    ///
    /// Flattened pull keys drop the namespace, so `"time"` maps to both
    /// `create` and `edit`.
    pub fn namespaces_of(&self, name: &str) -> Vec<&Namespace> {
        self.attributes
            .iter()
            .filter(|a| a.name == name)
            .map(|a| &a.namespace)
            .collect()
    }

    /// Human-readable label for a flattened key, for logs.
    pub fn describe(&self, key: &str) -> String {
        if let Some(attr) = Attribute::parse(key) {
            return attr.to_string();
        }
        match self.namespaces_of(key).as_slice() {
            [] => format!("{key} (not in schema)"),
            nss => {
                let joined: Vec<&str> = nss.iter().map(|ns| ns.as_str()).collect();
                format!("{key} ({})", joined.join("|"))
            }
        }
    }

    /// Attributes in namespaces this crate does not know.
    pub fn unknown(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| !a.namespace.is_known())
    }
}

/// Run the schema query through `executor`.
pub async fn fetch_schema<E: QueryExecutor + ?Sized>(executor: &E) -> Result<Schema> {
    let rows = Query::schema().run(executor).await?;
    let schema = Schema::from_rows(&rows)?;
    for attr in schema.unknown() {
        tracing::warn!(attribute = %attr, "schema reports an unknown namespace");
    }
    tracing::debug!(attributes = schema.len(), "fetched schema");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_parse() {
        let a = Attribute::parse(":block/uid").unwrap();
        assert_eq!(a.namespace, Namespace::Block);
        assert_eq!(a.name, "uid");
        assert_eq!(a.to_string(), ":block/uid");
        assert_eq!(Attribute::parse("uid"), None);
        assert_eq!(Attribute::parse("/uid"), None);
    }

    #[test]
    fn test_unknown_namespace_kept() {
        let a = Attribute::parse("hologram/depth").unwrap();
        assert_eq!(a.namespace, Namespace::Other("hologram".into()));
        assert!(!a.namespace.is_known());
    }

    #[test]
    fn test_from_rows_accepts_bare_and_qualified() {
        let schema = Schema::from_rows(&[
            json!(["block", "uid"]),
            json!(["edit", ":edit/time"]),
            json!(["create", "time"]),
            json!(["block", "uid"]),
        ])
        .unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.describe("time"), "time (create|edit)");
        assert_eq!(schema.describe("sidebar"), "sidebar (not in schema)");
        assert_eq!(schema.describe("block/string"), ":block/string");
    }

    #[test]
    fn test_from_rows_rejects_bad_row() {
        assert!(matches!(Schema::from_rows(&[json!(["block"])]), Err(Error::MalformedResult(_))));
    }
}
