//! Training loop for the TuckER model.
//!
//! Training is 1-N scoring: each (head, relation) pair in a batch is scored
//! against every entity at once, and the target row has a 1 at every tail
//! observed for that pair anywhere in the training set.
//!
//! The loop:
//! 1. Build vocabularies (first-seen order, optionally pre-seeded)
//! 2. Per epoch, shuffle the triples and split them into batches
//! 3. Group each batch by unique (head, relation) pair, build multi-hot targets
//! 4. Forward pass, mean binary cross-entropy, backward pass, Adam step
//! 5. Track the best epoch (validation MRR, else training loss) and stop
//!    after `early_stopping` epochs without improvement
//!
//! # Example
//!
//! ```rust,ignore
//! use tailkit_kge::training::{Trainer, TrainingConfig};
//! use tailkit_core::Fact;
//!
//! let facts = vec![
//!     Fact::from_strs("ヘルメット", "属性", "耐衝撃性"),
//!     Fact::from_strs("安全靴", "属性", "滑り止め"),
//! ];
//!
//! let config = TrainingConfig::default()
//!     .with_entity_dim(64)
//!     .with_learning_rate(0.003)
//!     .with_epochs(100);
//!
//! let outcome = Trainer::new(config).train(&facts)?;
//! outcome.state.save("model.bin")?;
//! ```

use crate::error::{Error, Result};
use crate::evaluation::FilteredEvaluator;
use crate::linalg::bce_with_logits;
use crate::model::TuckerDropout;
use crate::optim::{Adam, ModelOptimizer};
use crate::store::ModelState;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tailkit_core::{Fact, GraphVocab};

/// Smallest change in the tracked quality that counts as an improvement.
const MIN_IMPROVEMENT: f32 = 1e-6;

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Entity embedding dimension (default: 200).
    pub entity_dim: usize,
    /// Relation embedding dimension (default: 200).
    pub relation_dim: usize,
    /// Learning rate (default: 0.003).
    pub learning_rate: f32,
    /// Number of training epochs (default: 100).
    pub epochs: usize,
    /// Batch size (default: 128).
    pub batch_size: usize,
    /// Per-epoch learning-rate multiplier (default: 1.0, no decay).
    pub decay_rate: f32,
    /// Label smoothing (default: 0.0).
    pub label_smoothing: f32,
    /// Dropout after the input batch norm (default: 0.3).
    pub input_dropout: f32,
    /// Dropout on the relation-specific core (default: 0.4).
    pub hidden_dropout1: f32,
    /// Dropout after the hidden batch norm (default: 0.5).
    pub hidden_dropout2: f32,
    /// Learn an inverse for every relation (default: false).
    pub reciprocal: bool,
    /// Random seed (default: 42).
    pub seed: u64,
    /// Early stopping patience (None = no early stopping).
    pub early_stopping: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            entity_dim: 200,
            relation_dim: 200,
            learning_rate: 0.003,
            epochs: 100,
            batch_size: 128,
            decay_rate: 1.0,
            label_smoothing: 0.0,
            input_dropout: 0.3,
            hidden_dropout1: 0.4,
            hidden_dropout2: 0.5,
            reciprocal: false,
            seed: 42,
            early_stopping: Some(10),
        }
    }
}

impl TrainingConfig {
    pub fn with_entity_dim(mut self, dim: usize) -> Self {
        self.entity_dim = dim;
        self
    }

    pub fn with_relation_dim(mut self, dim: usize) -> Self {
        self.relation_dim = dim;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_decay_rate(mut self, decay_rate: f32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    pub fn with_label_smoothing(mut self, label_smoothing: f32) -> Self {
        self.label_smoothing = label_smoothing;
        self
    }

    /// Set all three dropout rates.
    pub fn with_dropout(mut self, input: f32, hidden1: f32, hidden2: f32) -> Self {
        self.input_dropout = input;
        self.hidden_dropout1 = hidden1;
        self.hidden_dropout2 = hidden2;
        self
    }

    pub fn with_reciprocal(mut self, reciprocal: bool) -> Self {
        self.reciprocal = reciprocal;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_early_stopping(mut self, patience: Option<usize>) -> Self {
        self.early_stopping = patience;
        self
    }

    /// Reject values the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidConfig(msg));
        if self.entity_dim == 0 || self.relation_dim == 0 {
            return fail("embedding dimensions must be positive".into());
        }
        if self.epochs == 0 {
            return fail("epoch count must be positive".into());
        }
        if self.batch_size == 0 {
            return fail("batch size must be positive".into());
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return fail(format!("learning rate {} is not a finite non-negative number", self.learning_rate));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return fail(format!("decay rate {} outside (0, 1]", self.decay_rate));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return fail(format!("label smoothing {} outside [0, 1)", self.label_smoothing));
        }
        for (name, p) in [
            ("input dropout", self.input_dropout),
            ("hidden dropout 1", self.hidden_dropout1),
            ("hidden dropout 2", self.hidden_dropout2),
        ] {
            if !(0.0..1.0).contains(&p) {
                return fail(format!("{name} {p} outside [0, 1)"));
            }
        }
        Ok(())
    }

    fn dropout(&self) -> TuckerDropout {
        TuckerDropout::new(self.input_dropout, self.hidden_dropout1, self.hidden_dropout2)
    }
}

/// Training metrics from one epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochMetrics {
    /// Average batch loss for this epoch.
    pub loss: f32,
    /// MRR on validation set (if provided).
    pub val_mrr: Option<f32>,
    /// Hits@10 on validation set (if provided).
    pub val_hits_at_10: Option<f32>,
    /// Learning rate used during this epoch.
    pub learning_rate: f32,
}

/// Callback for training progress, called after every epoch with the
/// 0-based epoch index.
pub type ProgressCallback = Box<dyn Fn(usize, &EpochMetrics) + Send + Sync>;

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Best model seen (not necessarily the last epoch's).
    pub state: ModelState,
    /// Training loss per completed epoch.
    pub loss_history: Vec<f32>,
    /// Validation MRR per completed epoch (empty without a validation set).
    pub validation_mrr: Vec<f32>,
    /// 0-based epoch the returned state comes from.
    pub best_epoch: usize,
    /// Patience ran out before the epoch budget.
    pub stopped_early: bool,
    /// The interrupt flag was raised.
    pub interrupted: bool,
    /// Facts skipped because a field was empty.
    pub skipped: usize,
}

impl TrainingOutcome {
    /// Freeze the model for shared, read-only scoring.
    pub fn into_shared(self) -> Arc<ModelState> {
        Arc::new(self.state)
    }
}

/// TuckER trainer.
pub struct Trainer {
    config: TrainingConfig,
    vocab: GraphVocab,
    validation: Vec<Fact>,
    interrupt: Option<Arc<AtomicBool>>,
    callback: Option<ProgressCallback>,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            vocab: GraphVocab::new(),
            validation: Vec::new(),
            interrupt: None,
            callback: None,
        }
    }

    /// Pre-seed the vocabularies (e.g. from entity/relation catalogs) so ids
    /// match the ones used by the linking tables. Names first seen in the
    /// training facts are appended after the seeded ones.
    pub fn with_vocab(mut self, vocab: GraphVocab) -> Self {
        self.vocab = vocab;
        self
    }

    /// Validation facts; their filtered MRR selects the best epoch. Facts
    /// naming entities or relations absent from training are ignored.
    pub fn with_validation(mut self, facts: Vec<Fact>) -> Self {
        self.validation = facts;
        self
    }

    /// Stop between epochs once `flag` is set; the best state so far is
    /// returned. Raising the flag before the first epoch finishes makes
    /// [`Trainer::train`] fail with [`Error::NoCompletedEpoch`].
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Train on `facts`.
    ///
    /// Fails with [`Error::EmptyTrainingSet`] when no fact has three
    /// non-empty fields, and with [`Error::NoCompletedEpoch`] when the
    /// interrupt flag stops the run before an epoch finishes.
    pub fn train(&self, facts: &[Fact]) -> Result<TrainingOutcome> {
        let config = &self.config;
        config.validate()?;

        let mut vocab = self.vocab.clone();
        let (triples, skipped) = vocab.encode(facts);
        if triples.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let (valid, valid_skipped) = vocab.encode_known(&self.validation);
        if valid_skipped > 0 {
            tracing::warn!(skipped = valid_skipped, "validation facts with unknown names ignored");
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut state = ModelState::init(
            vocab,
            config.entity_dim,
            config.relation_dim,
            config.reciprocal,
            &mut rng,
        );
        let num_entities = state.meta().num_entities;
        tracing::info!(
            triples = triples.len(),
            skipped,
            entities = num_entities,
            relations = state.meta().num_relations,
            reciprocal = config.reciprocal,
            "starting training"
        );

        let mut examples: Vec<(usize, usize, usize)> = Vec::with_capacity(triples.len() * 2);
        for t in &triples {
            examples.push((t.head.0, state.relation_row(t.relation), t.tail.0));
            if let Some(inv) = state.inverse_row(t.relation) {
                examples.push((t.tail.0, inv, t.head.0));
            }
        }
        let known_tails = tail_index(&examples);
        let evaluator = FilteredEvaluator::from_triples(triples.iter().chain(valid.iter()));
        let dropout = config.dropout();
        let mut optimizer = ModelOptimizer::new(
            Adam::new(config.learning_rate).with_decay(config.decay_rate),
            &state,
        );

        let mut loss_history = Vec::new();
        let mut validation_mrr = Vec::new();
        let mut best: Option<(ModelState, usize)> = None;
        let mut best_quality = f32::NEG_INFINITY;
        let mut stale = 0usize;
        let mut stopped_early = false;
        let mut interrupted = false;

        for epoch in 0..config.epochs {
            if self.interrupted() {
                interrupted = true;
                tracing::warn!(epoch, "training interrupted");
                break;
            }
            let learning_rate = optimizer.lr();
            examples.shuffle(&mut rng);

            let mut batch_losses = Vec::new();
            for chunk in examples.chunks(config.batch_size) {
                let pairs = unique_pairs(chunk);
                let targets = multi_hot(&pairs, &known_tails, num_entities, config.label_smoothing);
                let heads: Vec<usize> = pairs.iter().map(|p| p.0).collect();
                let rels: Vec<usize> = pairs.iter().map(|p| p.1).collect();

                let (logits, cache) = state.forward_train(&heads, &rels, &dropout, &mut rng)?;
                let (loss, dlogits) = bce_with_logits(logits.view(), targets.view());
                let grads = state.backward(&cache, dlogits.view())?;
                optimizer.step(&mut state, &grads);
                batch_losses.push(loss);
            }
            optimizer.end_epoch();

            let loss = batch_losses.iter().sum::<f32>() / batch_losses.len().max(1) as f32;
            loss_history.push(loss);

            let mut metrics = EpochMetrics {
                loss,
                learning_rate,
                ..Default::default()
            };
            let quality = if valid.is_empty() {
                -loss
            } else {
                let report = evaluator.evaluate(&state, &valid)?.combined();
                let mrr = report.mrr as f32;
                metrics.val_mrr = Some(mrr);
                metrics.val_hits_at_10 = Some(report.hits_at_10 as f32);
                validation_mrr.push(mrr);
                mrr
            };

            if quality > best_quality + MIN_IMPROVEMENT {
                best_quality = quality;
                best = Some((state.clone(), epoch));
                stale = 0;
            } else {
                stale += 1;
            }

            tracing::debug!(epoch, loss, val_mrr = ?metrics.val_mrr, lr = learning_rate, "epoch done");
            if let Some(cb) = &self.callback {
                cb(epoch, &metrics);
            }

            if config.early_stopping.is_some_and(|patience| stale >= patience) {
                stopped_early = true;
                tracing::info!(epoch, "early stopping");
                break;
            }
        }

        if loss_history.is_empty() {
            return Err(Error::NoCompletedEpoch);
        }
        let last_epoch = loss_history.len() - 1;
        let (state, best_epoch) = best.unwrap_or((state, last_epoch));
        tracing::info!(
            epochs = loss_history.len(),
            best_epoch,
            final_loss = loss_history.last().copied().unwrap_or(f32::NAN),
            "training finished"
        );
        Ok(TrainingOutcome {
            state,
            loss_history,
            validation_mrr,
            best_epoch,
            stopped_early,
            interrupted,
            skipped,
        })
    }
}

/// (head row, relation row) → every observed tail.
fn tail_index(examples: &[(usize, usize, usize)]) -> HashMap<(usize, usize), Vec<usize>> {
    let mut index: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for &(h, r, t) in examples {
        let tails = index.entry((h, r)).or_default();
        if !tails.contains(&t) {
            tails.push(t);
        }
    }
    index
}

/// Unique (head, relation) pairs of a batch in first-seen order.
fn unique_pairs(chunk: &[(usize, usize, usize)]) -> Vec<(usize, usize)> {
    let mut seen = HashSet::new();
    chunk
        .iter()
        .map(|&(h, r, _)| (h, r))
        .filter(|pair| seen.insert(*pair))
        .collect()
}

/// Multi-hot target rows with optional label smoothing
/// (`t' = (1 - ε)·t + 1/N`).
fn multi_hot(
    pairs: &[(usize, usize)],
    known_tails: &HashMap<(usize, usize), Vec<usize>>,
    num_entities: usize,
    label_smoothing: f32,
) -> Array2<f32> {
    let mut targets = Array2::zeros((pairs.len(), num_entities));
    for (i, pair) in pairs.iter().enumerate() {
        for &t in known_tails.get(pair).map(Vec::as_slice).unwrap_or_default() {
            targets[[i, t]] = 1.0;
        }
    }
    if label_smoothing > 0.0 {
        let uniform = 1.0 / num_entities as f32;
        targets.mapv_inplace(|t| (1.0 - label_smoothing) * t + uniform);
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TailScorer;
    use std::sync::Mutex;
    use tailkit_core::{EntityId, RelationId};

    fn corpus() -> Vec<Fact> {
        vec![
            Fact::from_strs("ヘルメット", "属性", "耐衝撃性"),
            Fact::from_strs("ヘルメット", "規格", "JIS_T8131"),
            Fact::from_strs("安全靴", "属性", "滑り止め"),
            Fact::from_strs("安全靴", "属性", "耐油性"),
            Fact::from_strs("ノギス", "規格", "JIS_B7507"),
        ]
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::default()
            .with_entity_dim(8)
            .with_relation_dim(6)
            .with_dropout(0.0, 0.0, 0.0)
            .with_batch_size(64)
            .with_learning_rate(1e-3)
            .with_early_stopping(None)
    }

    #[test]
    fn test_loss_strictly_decreases() {
        let outcome = Trainer::new(small_config().with_epochs(3))
            .train(&corpus())
            .unwrap();
        let h = &outcome.loss_history;
        assert_eq!(h.len(), 3);
        assert!(h[0] > h[1] && h[1] > h[2], "loss history {h:?}");
    }

    #[test]
    fn test_empty_training_set() {
        let facts = vec![Fact::from_strs("", "属性", "x"), Fact::from_strs("a", " ", "b")];
        assert!(matches!(
            Trainer::new(small_config()).train(&facts),
            Err(Error::EmptyTrainingSet)
        ));
        assert!(matches!(
            Trainer::new(small_config()).train(&[]),
            Err(Error::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_vocab_roundtrip_for_training_ids() {
        let outcome = Trainer::new(small_config().with_epochs(1))
            .train(&corpus())
            .unwrap();
        let vocab = outcome.state.vocab();
        for fact in corpus() {
            let h = vocab.entities.id_of(&fact.head).unwrap();
            assert_eq!(vocab.entities.text_of(h), Some(fact.head.as_str()));
            let r = vocab.relations.id_of(&fact.relation).unwrap();
            assert_eq!(vocab.relations.text_of(r), Some(fact.relation.as_str()));
        }
        assert_eq!(vocab.entities.len(), 8);
        assert_eq!(vocab.relations.len(), 2);
    }

    #[test]
    fn test_seeded_vocab_keeps_ids() {
        let seed = GraphVocab {
            entities: tailkit_core::EntityVocab::from_names(["安全靴", "未使用"]).unwrap(),
            relations: tailkit_core::RelationVocab::from_names(["規格"]).unwrap(),
        };
        let outcome = Trainer::new(small_config().with_epochs(1))
            .with_vocab(seed)
            .train(&corpus())
            .unwrap();
        let vocab = outcome.state.vocab();
        assert_eq!(vocab.entities.id_of("安全靴"), Some(EntityId(0)));
        assert_eq!(vocab.entities.id_of("未使用"), Some(EntityId(1)));
        assert_eq!(vocab.relations.id_of("規格"), Some(RelationId(0)));
        assert_eq!(outcome.state.num_entities(), 9);
    }

    #[test]
    fn test_skipped_facts_are_counted() {
        let mut facts = corpus();
        facts.push(Fact::from_strs("ヘルメット", "", "x"));
        let outcome = Trainer::new(small_config().with_epochs(1)).train(&facts).unwrap();
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_patience_returns_best_epoch() {
        // lr 0: nothing changes, so only the first epoch counts as improvement
        let config = small_config()
            .with_learning_rate(0.0)
            .with_epochs(20)
            .with_early_stopping(Some(2));
        let outcome = Trainer::new(config).train(&corpus()).unwrap();
        assert!(outcome.stopped_early);
        assert_eq!(outcome.loss_history.len(), 3);
        assert_eq!(outcome.best_epoch, 0);
    }

    #[test]
    fn test_interrupt_before_first_epoch() {
        let flag = Arc::new(AtomicBool::new(true));
        let result = Trainer::new(small_config().with_epochs(5))
            .with_interrupt(flag)
            .train(&corpus());
        assert!(matches!(result, Err(Error::NoCompletedEpoch)));
    }

    #[test]
    fn test_interrupt_after_first_epoch_keeps_it() {
        let flag = Arc::new(AtomicBool::new(false));
        let raise = Arc::clone(&flag);
        let outcome = Trainer::new(small_config().with_epochs(5))
            .with_interrupt(flag)
            .with_callback(Box::new(move |_, _| raise.store(true, Ordering::Relaxed)))
            .train(&corpus())
            .unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.loss_history.len(), 1);
        assert_eq!(outcome.best_epoch, 0);
    }

    #[test]
    fn test_callback_and_validation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let outcome = Trainer::new(small_config().with_epochs(2).with_reciprocal(true))
            .with_validation(vec![
                Fact::from_strs("安全靴", "属性", "耐油性"),
                Fact::from_strs("未知", "属性", "x"),
            ])
            .with_callback(Box::new(move |epoch, m| {
                if let Ok(mut v) = sink.lock() {
                    v.push((epoch, m.val_mrr.is_some()));
                }
            }))
            .train(&corpus())
            .unwrap();
        assert_eq!(outcome.validation_mrr.len(), 2);
        assert!(outcome.validation_mrr.iter().all(|m| *m > 0.0 && *m <= 1.0));
        assert_eq!(*seen.lock().unwrap(), vec![(0, true), (1, true)]);
    }

    #[test]
    fn test_training_is_reproducible() {
        let a = Trainer::new(small_config().with_epochs(2).with_dropout(0.3, 0.4, 0.5))
            .train(&corpus())
            .unwrap();
        let b = Trainer::new(small_config().with_epochs(2).with_dropout(0.3, 0.4, 0.5))
            .train(&corpus())
            .unwrap();
        assert_eq!(a.loss_history, b.loss_history);
        assert_eq!(a.state, b.state);
    }

    #[test]
    fn test_multi_hot_uses_all_known_tails() {
        let examples = [(0, 0, 1), (0, 0, 2), (1, 0, 2)];
        let index = tail_index(&examples);
        let pairs = unique_pairs(&examples);
        assert_eq!(pairs, vec![(0, 0), (1, 0)]);
        let t = multi_hot(&pairs, &index, 3, 0.0);
        assert_eq!(t, ndarray::array![[0.0, 1.0, 1.0], [0.0, 0.0, 1.0]]);

        let smoothed = multi_hot(&pairs, &index, 4, 0.1);
        assert!((smoothed[[0, 1]] - (0.9 + 0.25)).abs() < 1e-6);
        assert!((smoothed[[0, 0]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config() {
        assert!(TrainingConfig::default().with_batch_size(0).validate().is_err());
        assert!(TrainingConfig::default().with_epochs(0).validate().is_err());
        assert!(TrainingConfig::default().with_dropout(1.0, 0.0, 0.0).validate().is_err());
        assert!(TrainingConfig::default().with_label_smoothing(-0.1).validate().is_err());
        assert!(TrainingConfig::default().validate().is_ok());
    }
}
