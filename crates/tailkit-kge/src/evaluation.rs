//! Filtered rank evaluation for tail prediction.
//!
//! Given a test triple (h, r, t), every entity is scored as a tail of
//! (h, r, ?) and the true tail is ranked among them. Other tails known to be
//! true for the same pair are removed first, so a model is not penalized for
//! ranking a different correct answer higher.
//!
//! | Metric | Range | Description |
//! |--------|-------|-------------|
//! | MRR | (0, 1] | Mean Reciprocal Rank: average of 1/rank |
//! | MR | [1, N] | Mean Rank |
//! | Hits@k | [0, 1] | Fraction with rank <= k |
//!
//! Models with inverse relations are also scored on head prediction through
//! (t, r⁻¹, ?); the combined report merges both directions.

use crate::error::Result;
use crate::model::TailScorer;
use ndarray::ArrayView1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tailkit_core::{EntityId, RelationId, Triple};

/// Rank-based evaluation results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mrr: f64,
    /// Mean Rank: E\[rank\]
    pub mr: f64,
    /// Hits@1: P(rank = 1)
    pub hits_at_1: f64,
    /// Hits@3: P(rank <= 3)
    pub hits_at_3: f64,
    /// Hits@10: P(rank <= 10)
    pub hits_at_10: f64,
    /// Number of test triples evaluated
    pub num_triples: usize,
}

impl RankMetrics {
    /// Compute metrics from a list of 1-based ranks.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }

        let n = ranks.len() as f64;
        let hits = |k: usize| ranks.iter().filter(|&&r| r <= k).count() as f64 / n;
        Self {
            mrr: ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n,
            mr: ranks.iter().map(|&r| r as f64).sum::<f64>() / n,
            hits_at_1: hits(1),
            hits_at_3: hits(3),
            hits_at_10: hits(10),
            num_triples: ranks.len(),
        }
    }

    /// Merge metrics from several runs, weighted by triple count.
    pub fn merge(metrics: &[Self]) -> Self {
        let total: usize = metrics.iter().map(|m| m.num_triples).sum();
        if total == 0 {
            return Self::default();
        }
        let weighted = |f: fn(&Self) -> f64| {
            metrics
                .iter()
                .map(|m| f(m) * m.num_triples as f64)
                .sum::<f64>()
                / total as f64
        };
        Self {
            mrr: weighted(|m| m.mrr),
            mr: weighted(|m| m.mr),
            hits_at_1: weighted(|m| m.hits_at_1),
            hits_at_3: weighted(|m| m.hits_at_3),
            hits_at_10: weighted(|m| m.hits_at_10),
            num_triples: total,
        }
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        format!(
            "MRR: {:.4} | MR: {:.1} | H@1: {:.3} | H@3: {:.3} | H@10: {:.3} (n={})",
            self.mrr, self.mr, self.hits_at_1, self.hits_at_3, self.hits_at_10, self.num_triples
        )
    }
}

/// Metrics per prediction direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// (h, r, ?) ranking.
    pub tail: RankMetrics,
    /// (?, r, t) ranking, when the model supports it.
    pub head: Option<RankMetrics>,
}

impl EvaluationReport {
    /// Both directions merged.
    pub fn combined(&self) -> RankMetrics {
        match &self.head {
            Some(head) => RankMetrics::merge(&[self.tail.clone(), head.clone()]),
            None => self.tail.clone(),
        }
    }
}

/// Link prediction evaluator with the known-triple filter.
#[derive(Debug, Clone, Default)]
pub struct FilteredEvaluator {
    tails: HashMap<(EntityId, RelationId), HashSet<EntityId>>,
    heads: HashMap<(RelationId, EntityId), HashSet<EntityId>>,
}

impl FilteredEvaluator {
    /// Evaluator with no known triples (raw ranking).
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator filtering every triple in `known` (typically train + test).
    pub fn from_triples<'a>(known: impl IntoIterator<Item = &'a Triple>) -> Self {
        let mut eval = Self::new();
        for t in known {
            eval.add_known(*t);
        }
        eval
    }

    /// Mark a triple as true.
    pub fn add_known(&mut self, t: Triple) {
        self.tails.entry((t.head, t.relation)).or_default().insert(t.tail);
        self.heads.entry((t.relation, t.tail)).or_default().insert(t.head);
    }

    /// Filtered rank of the true tail of `triple`.
    pub fn rank_tail<S: TailScorer + ?Sized>(&self, scorer: &S, triple: &Triple) -> Result<usize> {
        let scores = scorer.score_tails(triple.head, triple.relation)?;
        let known = self.tails.get(&(triple.head, triple.relation));
        Ok(filtered_rank(scores.view(), triple.tail, known))
    }

    /// Filtered rank of the true head of `triple`.
    pub fn rank_head<S: TailScorer + ?Sized>(&self, scorer: &S, triple: &Triple) -> Result<usize> {
        let scores = scorer.score_heads(triple.relation, triple.tail)?;
        let known = self.heads.get(&(triple.relation, triple.tail));
        Ok(filtered_rank(scores.view(), triple.head, known))
    }

    /// Evaluate a test set. Head prediction is included when the scorer
    /// supports it.
    pub fn evaluate<S: TailScorer + ?Sized>(&self, scorer: &S, test: &[Triple]) -> Result<EvaluationReport> {
        let tail_ranks = test
            .par_iter()
            .map(|t| self.rank_tail(scorer, t))
            .collect::<Result<Vec<_>>>()?;
        let head = if scorer.supports_head_prediction() {
            let ranks = test
                .par_iter()
                .map(|t| self.rank_head(scorer, t))
                .collect::<Result<Vec<_>>>()?;
            Some(RankMetrics::from_ranks(&ranks))
        } else {
            None
        };
        Ok(EvaluationReport {
            tail: RankMetrics::from_ranks(&tail_ranks),
            head,
        })
    }
}

/// 1 + number of non-filtered candidates scoring strictly higher than the
/// target.
fn filtered_rank(scores: ArrayView1<'_, f32>, target: EntityId, known: Option<&HashSet<EntityId>>) -> usize {
    let Some(&target_score) = scores.get(target.0) else {
        return scores.len().max(1);
    };
    let better = scores
        .iter()
        .enumerate()
        .filter(|&(i, &s)| {
            i != target.0 && s > target_score && !known.is_some_and(|k| k.contains(&EntityId(i)))
        })
        .count();
    better + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::{array, Array1};

    /// Fixed score table: scores[h][r] is the tail vector.
    struct TableScorer {
        scores: Vec<Vec<Array1<f32>>>,
    }

    impl TailScorer for TableScorer {
        fn num_entities(&self) -> usize {
            self.scores.len()
        }

        fn num_relations(&self) -> usize {
            self.scores[0].len()
        }

        fn score_tails(&self, head: EntityId, relation: RelationId) -> Result<Array1<f32>> {
            self.scores
                .get(head.0)
                .and_then(|r| r.get(relation.0))
                .cloned()
                .ok_or(Error::VocabularyMismatch {
                    kind: "entity",
                    id: head.0,
                })
        }
    }

    fn triple(h: usize, r: usize, t: usize) -> Triple {
        Triple::new(EntityId(h), RelationId(r), EntityId(t))
    }

    #[test]
    fn test_metrics_from_ranks() {
        let m = RankMetrics::from_ranks(&[1, 2, 4, 20]);
        assert!((m.mrr - (1.0 + 0.5 + 0.25 + 0.05) / 4.0).abs() < 1e-12);
        assert!((m.hits_at_1 - 0.25).abs() < 1e-12);
        assert!((m.hits_at_3 - 0.5).abs() < 1e-12);
        assert!((m.hits_at_10 - 0.75).abs() < 1e-12);
        assert_eq!(m.num_triples, 4);
        assert_eq!(RankMetrics::from_ranks(&[]), RankMetrics::default());
    }

    #[test]
    fn test_merge_weights_by_count() {
        let a = RankMetrics::from_ranks(&[1]);
        let b = RankMetrics::from_ranks(&[2, 2, 2]);
        let merged = RankMetrics::merge(&[a, b]);
        assert_eq!(merged.num_triples, 4);
        assert!((merged.mrr - (1.0 + 1.5) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_filter_removes_other_true_tails() {
        let scorer = TableScorer {
            scores: vec![vec![array![0.1f32, 0.9, 0.8, 0.2]]; 4],
        };
        let test = triple(0, 0, 2);

        let raw = FilteredEvaluator::new();
        assert_eq!(raw.rank_tail(&scorer, &test).unwrap(), 2);

        let filtered = FilteredEvaluator::from_triples(&[triple(0, 0, 1), test]);
        assert_eq!(filtered.rank_tail(&scorer, &test).unwrap(), 1);
    }

    #[test]
    fn test_evaluate_without_head_support() {
        let scorer = TableScorer {
            scores: vec![vec![array![0.9f32, 0.1, 0.5]]; 3],
        };
        let eval = FilteredEvaluator::new();
        let report = eval
            .evaluate(&scorer, &[triple(0, 0, 0), triple(1, 0, 1)])
            .unwrap();
        assert!(report.head.is_none());
        assert_eq!(report.tail.num_triples, 2);
        assert!((report.tail.mrr - (1.0 + 1.0 / 3.0) / 2.0).abs() < 1e-9);
        assert_eq!(report.combined(), report.tail);
    }

    #[test]
    fn test_scorer_errors_propagate() {
        let scorer = TableScorer {
            scores: vec![vec![array![0.5f32]]],
        };
        let eval = FilteredEvaluator::new();
        assert!(eval.evaluate(&scorer, &[triple(5, 0, 0)]).is_err());
    }
}
