#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

//! Category linking and vocabularies for product knowledge graphs.
//!
//! This crate turns a free-text leaf product category into the inputs of a
//! tail-prediction model:
//!
//! - [`Taxonomy`] - the 24 top-level buckets and the fuzzy bucket matcher
//! - [`LinkingTable`] - leaf category → linked entity ids
//! - [`CategoryTable`] / [`RelationTable`] - leaf → bucket → relation ids
//! - [`LinkingContext`] - all of the above, loaded once from an [`AssetConfig`]
//! - [`GraphVocab`] - id↔text maps for entities and relations
//! - [`TripleFeed`] - reader for tab/comma separated training triples
//!
//! # Lookup semantics
//!
//! | Question | Unknown input gives |
//! |----------|---------------------|
//! | `resolve_bucket` | bucket 24 ("その他") |
//! | `link_entities` | `None` (never an empty set) |
//! | `related_relations` | bucket 24's relations |
//!
//! # Example
//!
//! ```rust
//! use tailkit_core::{CategoryTable, LinkingContext, LinkingTable, RelationTable, Taxonomy};
//!
//! let tax = Taxonomy::standard();
//! let linking = LinkingTable::from_reader("ヘルメット,ent_1\n".as_bytes()).unwrap();
//! let categories = CategoryTable::from_reader("ヘルメット,1\n".as_bytes(), &tax).unwrap();
//! let relations = RelationTable::from_reader("1,rel_1\n24,rel_2\n".as_bytes()).unwrap();
//! let ctx = LinkingContext::new(tax, linking, categories, relations);
//!
//! let linked = ctx.link("ヘルメット").unwrap();
//! assert_eq!(linked.entities.len(), 1);
//! assert_eq!(linked.relations.len(), 2);
//! assert!(ctx.link("ドリル").is_none());
//! ```

pub mod config;
pub mod context;
mod error;
pub mod ids;
pub mod linking;
pub mod relations;
pub mod taxonomy;
mod triple;
pub mod vocab;

pub use config::AssetConfig;
pub use context::{LinkedCategory, LinkingContext};
pub use error::{Error, Result};
pub use ids::{DenseId, EntityId, RelationId};
pub use linking::{LinkingTable, MAX_LINK_SLOTS};
pub use relations::{CategoryTable, RelationTable};
pub use taxonomy::{BucketId, Taxonomy, TOP_LEVEL_CATEGORIES};
pub use triple::{Fact, FeedReport, Triple, TripleFeed};
pub use vocab::{EntityVocab, GraphVocab, RelationVocab, Vocabulary};
