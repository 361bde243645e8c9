//! Dense identifiers for entities and relations.
//!
//! Ids are contiguous `0..N` indices into embedding tables. Lookup tables
//! refer to them through tagged references: `ent_<n>` and `rel_<n>`, where
//! `<n>` is 1-based, so `ent_1` is `EntityId(0)`. Leading zeros are accepted
//! (`ent_000123`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix marking an entity reference in a lookup-table cell.
pub const ENTITY_TAG: &str = "ent_";

/// Prefix marking a relation reference in a lookup-table cell.
pub const RELATION_TAG: &str = "rel_";

/// Common behaviour of dense vocabulary ids.
pub trait DenseId: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    /// Human-readable kind, used in error messages.
    const KIND: &'static str;
    /// Tag prefix used in lookup tables.
    const TAG: &'static str;

    /// Build from a raw index.
    fn from_index(index: usize) -> Self;

    /// Raw index into the embedding table.
    fn index(self) -> usize;

    /// Parse a tagged reference such as `ent_12`.
    ///
    /// Returns `None` for anything that is not `TAG` followed by a positive
    /// decimal number.
    fn from_tag(cell: &str) -> Option<Self> {
        let digits = cell.trim().strip_prefix(Self::TAG)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: usize = digits.parse().ok()?;
        n.checked_sub(1).map(Self::from_index)
    }

    /// Render as a tagged reference (`ent_<index + 1>`).
    fn to_tag(self) -> String {
        format!("{}{}", Self::TAG, self.index() + 1)
    }
}

/// Identifier of an entity (row of the entity embedding table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub usize);

/// Identifier of a relation (row of the relation embedding table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(pub usize);

impl DenseId for EntityId {
    const KIND: &'static str = "entity";
    const TAG: &'static str = ENTITY_TAG;

    fn from_index(index: usize) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0
    }
}

impl DenseId for RelationId {
    const KIND: &'static str = "relation";
    const TAG: &'static str = RELATION_TAG;

    fn from_index(index: usize) -> Self {
        Self(index)
    }

    fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tag())
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tag())
    }
}
