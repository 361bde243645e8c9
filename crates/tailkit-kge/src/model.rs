//! TuckER scoring: forward and backward passes over a [`ModelState`].
//!
//! TuckER ([Balažević et al. 2019](https://arxiv.org/abs/1901.09590)) scores a
//! (head, relation) pair against every entity at once through a shared core
//! tensor:
//!
//! ```text
//! W_r    = W ×₁ r                       (d_e × d_e, one per relation)
//! x      = bn1(bn0(e_h) · W_r)
//! logits = x · Eᵀ                       (one score per candidate tail)
//! p      = σ(logits)
//! ```
//!
//! | Stage | Training | Inference |
//! |-------|----------|-----------|
//! | `bn0`, `bn1` | batch statistics, running stats updated | running statistics |
//! | input dropout (after `bn0`) | active | off |
//! | hidden dropout 1 (on `W_r`) | active | off |
//! | hidden dropout 2 (after `bn1`) | active | off |
//!
//! Inference has no randomness and no mutable state, so the same input always
//! yields bit-identical scores. Ranking by logits and by probabilities is the
//! same since `σ` is monotone.

use crate::error::{Error, Result};
use crate::linalg::{
    batched_vecmat, batched_vecmat_backward, contract_relation, contract_relation_backward,
    sigmoid, top_k,
};
use crate::nn::{apply_mask, BatchNormCache, BatchNormGrad, Dropout};
use crate::store::ModelState;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use tailkit_core::{EntityId, RelationId};

/// Link prediction result with entity and score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted entity.
    pub entity: EntityId,
    /// Probability that the completed triple holds.
    pub score: f32,
}

/// Anything that scores every candidate tail of a (head, relation) pair.
///
/// Implementations must be shareable across threads; scoring takes `&self`.
pub trait TailScorer: Send + Sync {
    /// Number of candidate entities (length of every score vector).
    fn num_entities(&self) -> usize;

    /// Number of relations that can be queried.
    fn num_relations(&self) -> usize;

    /// Per-tail probabilities for `(head, relation, ?)`.
    fn score_tails(&self, head: EntityId, relation: RelationId) -> Result<Array1<f32>>;

    /// Per-head probabilities for `(?, relation, tail)`.
    ///
    /// Only models that learned inverse relations support this.
    fn score_heads(&self, _relation: RelationId, _tail: EntityId) -> Result<Array1<f32>> {
        Err(Error::UnsupportedOperation(
            "head prediction needs inverse relations".into(),
        ))
    }

    /// Whether [`TailScorer::score_heads`] is available.
    fn supports_head_prediction(&self) -> bool {
        false
    }

    /// Score many pairs; row `i` belongs to `pairs[i]`.
    fn score_tails_batch(&self, pairs: &[(EntityId, RelationId)]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((pairs.len(), self.num_entities()));
        for (mut row, &(h, r)) in out.rows_mut().into_iter().zip(pairs) {
            row.assign(&self.score_tails(h, r)?);
        }
        Ok(out)
    }

    /// Top-k tails, best first, ties broken by the lower id.
    fn predict_tails(&self, head: EntityId, relation: RelationId, k: usize) -> Result<Vec<Prediction>> {
        let scores = self.score_tails(head, relation)?;
        Ok(top_k(scores.view(), k)
            .into_iter()
            .map(|(i, score)| Prediction {
                entity: EntityId(i),
                score,
            })
            .collect())
    }
}

/// The three dropout layers of the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuckerDropout {
    /// Applied to the normalized head embedding.
    pub input: Dropout,
    /// Applied to the relation-specific core `W_r`.
    pub hidden1: Dropout,
    /// Applied after the second batch norm.
    pub hidden2: Dropout,
}

impl TuckerDropout {
    /// Dropout rates for the three layers.
    pub fn new(input: f32, hidden1: f32, hidden2: f32) -> Self {
        Self {
            input: Dropout::new(input),
            hidden1: Dropout::new(hidden1),
            hidden2: Dropout::new(hidden2),
        }
    }

    /// All layers disabled.
    pub fn none() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Intermediate values of a training forward pass.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    heads: Vec<usize>,
    rels: Vec<usize>,
    bn0: BatchNormCache,
    mask_in: Option<Array2<f32>>,
    x0: Array2<f32>,
    r: Array2<f32>,
    mask_h1: Option<Array3<f32>>,
    wr: Array3<f32>,
    bn1: BatchNormCache,
    mask_h2: Option<Array2<f32>>,
    x1: Array2<f32>,
}

/// Gradients of the mean loss with respect to every parameter.
#[derive(Debug, Clone)]
pub struct Gradients {
    /// Entity table, `(N, d_e)`.
    pub entities: Array2<f32>,
    /// Relation table, `(R, d_r)`.
    pub relations: Array2<f32>,
    /// Core tensor, `(d_r, d_e, d_e)`.
    pub core: Array3<f32>,
    /// Input batch norm.
    pub bn0: BatchNormGrad,
    /// Hidden batch norm.
    pub bn1: BatchNormGrad,
}

impl ModelState {
    /// Inference-mode logits for rows of the entity and relation tables.
    ///
    /// Indices are table rows (inverse relations included) and must be in
    /// range; the public entry points check them.
    pub(crate) fn logits(&self, heads: &[usize], rels: &[usize]) -> Result<Array2<f32>> {
        let e_h = self.entities.data().select(Axis(0), heads);
        let x0 = self.bn0.forward_eval(e_h.view());
        let r = self.relations.data().select(Axis(0), rels);
        let wr = contract_relation(self.core.data().view(), r.view())?;
        let a = batched_vecmat(x0.view(), wr.view());
        let x1 = self.bn1.forward_eval(a.view());
        Ok(x1.dot(&self.entities.data().t()))
    }

    /// Training-mode forward pass. Updates batch-norm running statistics.
    pub(crate) fn forward_train<R: Rng + ?Sized>(
        &mut self,
        heads: &[usize],
        rels: &[usize],
        dropout: &TuckerDropout,
        rng: &mut R,
    ) -> Result<(Array2<f32>, ForwardCache)> {
        let e_h = self.entities.data().select(Axis(0), heads);
        let (mut x0, bn0) = self.bn0.forward_train(e_h.view());
        let mask_in = dropout.input.sample_mask(x0.raw_dim(), rng);
        apply_mask(&mut x0, mask_in.as_ref());

        let r = self.relations.data().select(Axis(0), rels);
        let mut wr = contract_relation(self.core.data().view(), r.view())?;
        let mask_h1 = dropout.hidden1.sample_mask(wr.raw_dim(), rng);
        apply_mask(&mut wr, mask_h1.as_ref());

        let a = batched_vecmat(x0.view(), wr.view());
        let (mut x1, bn1) = self.bn1.forward_train(a.view());
        let mask_h2 = dropout.hidden2.sample_mask(x1.raw_dim(), rng);
        apply_mask(&mut x1, mask_h2.as_ref());

        let logits = x1.dot(&self.entities.data().t());
        let cache = ForwardCache {
            heads: heads.to_vec(),
            rels: rels.to_vec(),
            bn0,
            mask_in,
            x0,
            r,
            mask_h1,
            wr,
            bn1,
            mask_h2,
            x1,
        };
        Ok((logits, cache))
    }

    /// Back-propagate `dlogits` (gradient of the loss w.r.t. the logits).
    pub(crate) fn backward(&self, cache: &ForwardCache, dlogits: ArrayView2<'_, f32>) -> Result<Gradients> {
        // logits = x1 · Eᵀ: E receives gradient as the tail side
        let mut d_entities = dlogits.t().dot(&cache.x1);
        let mut dx1 = dlogits.dot(self.entities.data());
        apply_mask(&mut dx1, cache.mask_h2.as_ref());

        let bn1 = self.bn1.backward(&cache.bn1, dx1.view());
        let (mut dx0, mut dwr) = batched_vecmat_backward(cache.x0.view(), cache.wr.view(), bn1.input.view());
        apply_mask(&mut dwr, cache.mask_h1.as_ref());
        let (core, dr) = contract_relation_backward(self.core.data().view(), cache.r.view(), dwr.view())?;

        apply_mask(&mut dx0, cache.mask_in.as_ref());
        let bn0 = self.bn0.backward(&cache.bn0, dx0.view());

        // head side
        for (grad, &h) in bn0.input.rows().into_iter().zip(&cache.heads) {
            let mut row = d_entities.row_mut(h);
            row += &grad;
        }
        let mut relations = Array2::zeros(self.relations.data().raw_dim());
        for (grad, &r) in dr.rows().into_iter().zip(&cache.rels) {
            let mut row = relations.row_mut(r);
            row += &grad;
        }

        Ok(Gradients {
            entities: d_entities,
            relations,
            core,
            bn0,
            bn1,
        })
    }

    fn checked_rows(&self, pairs: &[(EntityId, RelationId)]) -> Result<(Vec<usize>, Vec<usize>)> {
        let mut heads = Vec::with_capacity(pairs.len());
        let mut rels = Vec::with_capacity(pairs.len());
        for &(h, r) in pairs {
            self.check_entity(h)?;
            self.check_relation(r)?;
            heads.push(h.0);
            rels.push(self.relation_row(r));
        }
        Ok((heads, rels))
    }
}

impl TailScorer for ModelState {
    fn num_entities(&self) -> usize {
        self.meta().num_entities
    }

    fn num_relations(&self) -> usize {
        self.meta().num_relations
    }

    fn score_tails(&self, head: EntityId, relation: RelationId) -> Result<Array1<f32>> {
        let (heads, rels) = self.checked_rows(&[(head, relation)])?;
        let logits = self.logits(&heads, &rels)?;
        Ok(logits.row(0).mapv(sigmoid))
    }

    fn score_heads(&self, relation: RelationId, tail: EntityId) -> Result<Array1<f32>> {
        self.check_entity(tail)?;
        self.check_relation(relation)?;
        let inverse = self.inverse_row(relation).ok_or_else(|| {
            Error::UnsupportedOperation("head prediction needs inverse relations".into())
        })?;
        let logits = self.logits(&[tail.0], &[inverse])?;
        Ok(logits.row(0).mapv(sigmoid))
    }

    fn supports_head_prediction(&self) -> bool {
        self.meta().reciprocal
    }

    fn score_tails_batch(&self, pairs: &[(EntityId, RelationId)]) -> Result<Array2<f32>> {
        let (heads, rels) = self.checked_rows(pairs)?;
        Ok(self.logits(&heads, &rels)?.mapv(sigmoid))
    }
}
