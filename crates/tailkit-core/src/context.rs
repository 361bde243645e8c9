//! All lookup tables needed to turn a leaf category into model inputs.
//!
//! A [`LinkingContext`] is built once (usually from an [`AssetConfig`]) and
//! then shared read-only; it holds no interior mutability.

use crate::config::AssetConfig;
use crate::error::Result;
use crate::ids::{EntityId, RelationId};
use crate::linking::LinkingTable;
use crate::relations::{CategoryTable, RelationTable};
use crate::taxonomy::{BucketId, Taxonomy};
use std::collections::BTreeSet;

/// Model inputs derived from one leaf category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedCategory {
    /// Bucket from the category table, if the leaf has a row there.
    pub bucket: Option<BucketId>,
    /// Linked head entities.
    pub entities: BTreeSet<EntityId>,
    /// Relations to score, bucket 24's set included.
    pub relations: BTreeSet<RelationId>,
}

/// Taxonomy plus linking, category and relation tables.
#[derive(Debug, Clone, Default)]
pub struct LinkingContext {
    taxonomy: Taxonomy,
    linking: LinkingTable,
    categories: CategoryTable,
    relations: RelationTable,
}

impl LinkingContext {
    /// Assemble from already loaded tables.
    pub fn new(
        taxonomy: Taxonomy,
        linking: LinkingTable,
        categories: CategoryTable,
        relations: RelationTable,
    ) -> Self {
        Self {
            taxonomy,
            linking,
            categories,
            relations,
        }
    }

    /// Load every table named by `assets`. Missing files become empty
    /// tables; unreadable or malformed files are errors.
    pub fn load(assets: &AssetConfig) -> Result<Self> {
        let taxonomy = Taxonomy::standard();
        let linking = LinkingTable::load(assets.resolve(&assets.linking_table))?;
        let categories = CategoryTable::load(assets.resolve(&assets.category_table), &taxonomy)?;
        let relations = RelationTable::load(assets.resolve(&assets.relation_table))?;
        tracing::info!(
            linked_categories = linking.len(),
            categories = categories.len(),
            relation_buckets = relations.len(),
            "linking context ready"
        );
        Ok(Self::new(taxonomy, linking, categories, relations))
    }

    /// Fuzzy-match free text to a top-level bucket.
    pub fn resolve_bucket(&self, category: &str) -> BucketId {
        self.taxonomy.resolve_bucket(category)
    }

    /// Entities linked to a leaf category; `None` if the category is unknown.
    pub fn link_entities(&self, leaf: &str) -> Option<BTreeSet<EntityId>> {
        self.linking.link_entities(leaf)
    }

    /// Relations to ask about for a leaf category. Never empty-handed:
    /// bucket 24's relations are always included.
    pub fn related_relations(&self, leaf: &str) -> BTreeSet<RelationId> {
        self.relations.related(self.categories.bucket_of(leaf))
    }

    /// Entities and relations for a leaf category, or `None` when entity
    /// linking does not know it.
    pub fn link(&self, leaf: &str) -> Option<LinkedCategory> {
        let entities = self.link_entities(leaf)?;
        Some(LinkedCategory {
            bucket: self.categories.bucket_of(leaf),
            entities,
            relations: self.related_relations(leaf),
        })
    }

    /// The taxonomy.
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// The entity linking table.
    pub fn linking(&self) -> &LinkingTable {
        &self.linking
    }

    /// The category table.
    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// The relation table.
    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }
}
