//! # Graph Model
//!
//! DTOs shared by every stage of resolution: parser → normalizer →
//! builder → link follower → user.
//!
//! Design rule: this module is pure data. No I/O, no state, no async.

pub mod ids;
pub mod reference;
pub mod value;
pub mod record;
pub mod node;

pub use ids::{InternalId, StableId};
pub use reference::{NodeRef, Reference};
pub use value::{AttributeRecord, AttributeValue, Scalar};
pub use record::{attr, PullRecord};
pub use node::{HeadingLevel, Node, NodeContent, NodeKind};
