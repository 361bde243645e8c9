//! Keyword assembly: top-k tails for every (linked entity, related relation)
//! pair, grouped by relation name.

use crate::error::{Error, Result};
use crate::linalg::top_k;
use crate::model::TailScorer;
use std::collections::{BTreeMap, BTreeSet};
use tailkit_core::{DenseId, EntityId, GraphVocab, RelationId};

/// Number of tails kept per (entity, relation) pair unless configured.
pub const DEFAULT_TOP_K: usize = 5;

/// Relation name → predicted tail names.
pub type KeywordMap = BTreeMap<String, BTreeSet<String>>;

/// Predict keywords for one linked category.
///
/// Every relation in `relations` becomes a key, even when no entity was
/// linked. For each (entity, relation) pair the `top_k` highest-scoring tails
/// are added to that relation's set, so a set holds at most
/// `top_k · entities.len()` names.
///
/// Ids missing from `vocab` or beyond the scorer's range fail with
/// [`Error::VocabularyMismatch`].
pub fn predict_keywords<S: TailScorer + ?Sized>(
    scorer: &S,
    vocab: &GraphVocab,
    entities: &BTreeSet<EntityId>,
    relations: &BTreeSet<RelationId>,
    top_k_per_pair: usize,
) -> Result<KeywordMap> {
    let mut keywords = KeywordMap::new();
    for &relation in relations {
        check(relation, scorer.num_relations(), vocab.relations.contains(relation))?;
        let name = vocab.relations.require_text(relation)?;
        keywords.entry(name.to_owned()).or_default();
    }
    for &entity in entities {
        check(entity, scorer.num_entities(), vocab.entities.contains(entity))?;
    }
    if entities.is_empty() || relations.is_empty() || top_k_per_pair == 0 {
        return Ok(keywords);
    }

    let pairs: Vec<(EntityId, RelationId)> = entities
        .iter()
        .flat_map(|&e| relations.iter().map(move |&r| (e, r)))
        .collect();
    let scores = scorer.score_tails_batch(&pairs)?;

    for (row, &(_, relation)) in scores.rows().into_iter().zip(&pairs) {
        let name = vocab.relations.require_text(relation)?;
        let tails = keywords.entry(name.to_owned()).or_default();
        for (index, _) in top_k(row, top_k_per_pair) {
            let tail = EntityId(index);
            check(tail, scorer.num_entities(), vocab.entities.contains(tail))?;
            tails.insert(vocab.entities.require_text(tail)?.to_owned());
        }
    }
    Ok(keywords)
}

fn check<I: DenseId>(id: I, bound: usize, known: bool) -> Result<()> {
    if known && id.index() < bound {
        Ok(())
    } else {
        Err(Error::VocabularyMismatch {
            kind: I::KIND,
            id: id.index(),
        })
    }
}
