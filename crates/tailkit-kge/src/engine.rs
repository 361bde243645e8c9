//! Category → keyword lookups over a frozen model.
//!
//! [`KeywordEngine`] composes the linking tables with a [`Predictor`]:
//!
//! 1. entity linking for the leaf category (unknown → [`KeywordLookup::CategoryNotFound`])
//! 2. relation linking through the category and relation tables
//! 3. [`predict_keywords`] over entities × relations
//!
//! The engine holds no interior mutability; share it behind an `Arc` and
//! query from any thread.

use crate::error::{Error, Result};
use crate::retrieval::{predict_keywords, KeywordMap, DEFAULT_TOP_K};
use crate::store::ModelState;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tailkit_core::LinkingContext;

/// What to do when no trained model is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UntrainedPolicy {
    /// Fail with [`Error::ModelUnavailable`].
    #[default]
    Reject,
    /// Answer known categories with an empty mapping.
    EmptyKeywords,
}

/// Trained model, or the policy standing in for one.
#[derive(Debug, Clone)]
pub enum Predictor {
    Trained(Arc<ModelState>),
    Untrained(UntrainedPolicy),
}

impl Predictor {
    /// Load a model file; a missing file falls back to `policy`.
    ///
    /// A file that exists but fails to parse or validate is an error.
    pub fn load_or(path: impl AsRef<Path>, policy: UntrainedPolicy) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), ?policy, "model file not found, running untrained");
            return Ok(Predictor::Untrained(policy));
        }
        Ok(Predictor::Trained(Arc::new(ModelState::load(path)?)))
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, Predictor::Trained(_))
    }

    pub fn model(&self) -> Option<&Arc<ModelState>> {
        match self {
            Predictor::Trained(model) => Some(model),
            Predictor::Untrained(_) => None,
        }
    }
}

impl From<ModelState> for Predictor {
    fn from(state: ModelState) -> Self {
        Predictor::Trained(Arc::new(state))
    }
}

impl From<Arc<ModelState>> for Predictor {
    fn from(state: Arc<ModelState>) -> Self {
        Predictor::Trained(state)
    }
}

/// Outcome of a category lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordLookup {
    /// Relation name → keywords. Empty sets are possible; an untrained
    /// engine with [`UntrainedPolicy::EmptyKeywords`] returns an empty map.
    Found(KeywordMap),
    /// The category has no row in the entity linking table.
    CategoryNotFound,
}

impl KeywordLookup {
    pub fn keywords(&self) -> Option<&KeywordMap> {
        match self {
            KeywordLookup::Found(map) => Some(map),
            KeywordLookup::CategoryNotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, KeywordLookup::Found(_))
    }
}

/// `Found` serializes as the map itself, `CategoryNotFound` as `"NOT_FOUND"`.
impl Serialize for KeywordLookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeywordLookup::Found(map) => map.serialize(serializer),
            KeywordLookup::CategoryNotFound => serializer.serialize_str("NOT_FOUND"),
        }
    }
}

/// Linking context plus predictor.
#[derive(Debug, Clone)]
pub struct KeywordEngine {
    context: LinkingContext,
    predictor: Predictor,
    top_k: usize,
}

impl KeywordEngine {
    pub fn new(context: LinkingContext, predictor: impl Into<Predictor>) -> Self {
        Self {
            context,
            predictor: predictor.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Tails kept per (entity, relation) pair.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn context(&self) -> &LinkingContext {
        &self.context
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Keywords for one leaf category.
    pub fn predict_keywords(&self, category: &str) -> Result<KeywordLookup> {
        let Some(linked) = self.context.link(category) else {
            tracing::debug!(category, "category not in linking table");
            return Ok(KeywordLookup::CategoryNotFound);
        };
        let model = match &self.predictor {
            Predictor::Trained(model) => model,
            Predictor::Untrained(UntrainedPolicy::Reject) => return Err(Error::ModelUnavailable),
            Predictor::Untrained(UntrainedPolicy::EmptyKeywords) => {
                return Ok(KeywordLookup::Found(KeywordMap::new()))
            }
        };
        tracing::debug!(
            category,
            bucket = ?linked.bucket,
            entities = linked.entities.len(),
            relations = linked.relations.len(),
            "linked category"
        );
        let keywords = predict_keywords(
            model.as_ref(),
            model.vocab(),
            &linked.entities,
            &linked.relations,
            self.top_k,
        )?;
        Ok(KeywordLookup::Found(keywords))
    }

    /// Keywords for many categories, keyed by category. Duplicates collapse.
    pub fn predict_all<S: AsRef<str> + Sync>(&self, categories: &[S]) -> Result<BTreeMap<String, KeywordLookup>> {
        categories
            .par_iter()
            .map(|c| -> Result<(String, KeywordLookup)> {
                let c = c.as_ref();
                Ok((c.to_owned(), self.predict_keywords(c)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tailkit_core::{
        BucketId, CategoryTable, EntityVocab, GraphVocab, LinkingTable, RelationId,
        RelationTable, RelationVocab, Taxonomy,
    };

    fn context() -> LinkingContext {
        let mut linking = LinkingTable::new();
        linking.insert_row("ヘルメット", &["ent_1", "ent_2", "", "ent_3"]);
        linking.insert_row("謎の品", &["memo"]);
        let mut categories = CategoryTable::new();
        categories.insert("ヘルメット", BucketId::new(1).unwrap());
        let mut relations = RelationTable::new();
        relations.extend(BucketId::new(1).unwrap(), [RelationId(0)]);
        relations.extend(BucketId::OTHER, [RelationId(1)]);
        LinkingContext::new(Taxonomy::standard(), linking, categories, relations)
    }

    fn model() -> ModelState {
        let vocab = GraphVocab {
            entities: EntityVocab::from_names(["ヘルメット", "耐衝撃性", "軽量", "JIS"]).unwrap(),
            relations: RelationVocab::from_names(["属性", "規格"]).unwrap(),
        };
        ModelState::init(vocab, 4, 3, false, &mut ChaCha8Rng::seed_from_u64(7))
    }

    #[test]
    fn test_found_has_every_relation_key() {
        let engine = KeywordEngine::new(context(), model()).with_top_k(2);
        let lookup = engine.predict_keywords("ヘルメット").unwrap();
        let map = lookup.keywords().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["属性", "規格"]);
        assert!(map.values().all(|v| !v.is_empty() && v.len() <= 2 * 2));
    }

    #[test]
    fn test_unknown_category() {
        let engine = KeywordEngine::new(context(), model());
        assert_eq!(
            engine.predict_keywords("存在しない").unwrap(),
            KeywordLookup::CategoryNotFound
        );
    }

    #[test]
    fn test_known_category_without_entities() {
        let engine = KeywordEngine::new(context(), model());
        let lookup = engine.predict_keywords("謎の品").unwrap();
        let map = lookup.keywords().unwrap();
        // fallback relation only, nothing to score
        assert_eq!(map.len(), 1);
        assert!(map["規格"].is_empty());
    }

    #[test]
    fn test_untrained_policies() {
        let reject = KeywordEngine::new(context(), Predictor::Untrained(UntrainedPolicy::Reject));
        assert!(matches!(
            reject.predict_keywords("ヘルメット"),
            Err(Error::ModelUnavailable)
        ));
        assert_eq!(
            reject.predict_keywords("存在しない").unwrap(),
            KeywordLookup::CategoryNotFound
        );

        let empty = KeywordEngine::new(context(), Predictor::Untrained(UntrainedPolicy::EmptyKeywords));
        assert_eq!(
            empty.predict_keywords("ヘルメット").unwrap(),
            KeywordLookup::Found(KeywordMap::new())
        );
    }

    #[test]
    fn test_linked_id_outside_model() {
        let mut linking = LinkingTable::new();
        linking.insert_row("ヘルメット", &["ent_99"]);
        let ctx = LinkingContext::new(
            Taxonomy::standard(),
            linking,
            CategoryTable::new(),
            RelationTable::new(),
        );
        let engine = KeywordEngine::new(ctx, model());
        // no relations to pair with, so only the entity check can fail
        assert!(matches!(
            engine.predict_keywords("ヘルメット"),
            Err(Error::VocabularyMismatch { kind: "entity", id: 98 })
        ));
    }

    #[test]
    fn test_predict_all_and_json() {
        let engine = KeywordEngine::new(context(), model()).with_top_k(1);
        let all = engine.predict_all(&["ヘルメット", "存在しない"]).unwrap();
        assert_eq!(all.len(), 2);
        let json = serde_json::to_value(&all).unwrap();
        assert_eq!(json["存在しない"], "NOT_FOUND");
        assert!(json["ヘルメット"]["属性"].is_array());
    }

    #[test]
    fn test_missing_model_file_uses_policy() {
        let p = Predictor::load_or("/nonexistent/tailkit/model.bin", UntrainedPolicy::EmptyKeywords)
            .unwrap();
        assert!(!p.is_trained());
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KeywordEngine>();
    }
}
