//! `tailkit` links product categories to a knowledge graph and suggests
//! keywords by predicting missing tails.
//!
//! This crate re-exports the workspace:
//!
//! - [`core`] - taxonomy, linking tables, ids and vocabularies
//! - [`kge`] - the TuckER model, training, evaluation and keyword retrieval
//!
//! ```rust,ignore
//! use tailkit::prelude::*;
//!
//! let context = LinkingContext::load(&AssetConfig::with_base_dir("assets"))?;
//! let engine = KeywordEngine::new(context, ModelState::load("model.bin")?);
//!
//! match engine.predict_keywords("ヘルメット")? {
//!     KeywordLookup::Found(keywords) => println!("{keywords:?}"),
//!     KeywordLookup::CategoryNotFound => println!("unknown category"),
//! }
//! ```

pub use tailkit_core as core;
pub use tailkit_kge as kge;

/// The types most callers need.
pub mod prelude {
    pub use tailkit_core::{
        AssetConfig, BucketId, EntityId, Fact, GraphVocab, LinkedCategory, LinkingContext,
        RelationId, Taxonomy, Triple, TripleFeed,
    };
    pub use tailkit_kge::{
        KeywordEngine, KeywordLookup, KeywordMap, ModelState, Predictor, TailScorer, Trainer,
        TrainingConfig, TrainingOutcome, UntrainedPolicy,
    };
}
