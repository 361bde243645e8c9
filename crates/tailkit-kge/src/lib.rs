//! TuckER tail prediction for product knowledge graphs.
//!
//! A fact `(ヘルメット, 属性, 耐衝撃性)` is a (head, relation, tail) triple.
//! Given a head and a relation, the model scores **every** entity as a
//! possible tail at once; the best-scoring tails become keyword candidates.
//!
//! ## TuckER
//!
//! [Balažević et al. 2019](https://arxiv.org/abs/1901.09590) factorizes the
//! binary tensor of true triples with a Tucker decomposition: an entity
//! table `E`, a relation table `R` and a shared core tensor `W`.
//!
//! ```text
//! φ(h, r, t) = W ×₁ r ×₂ e_h ×₃ e_t
//! ```
//!
//! The core is contracted with the relation first, giving a relation-specific
//! `d_e × d_e` matrix `W_r`; the head row times `W_r` is then compared with
//! every entity row:
//!
//! | Step | Operation | Module |
//! |------|-----------|--------|
//! | 1 | `bn0(e_h)`, dropout | [`nn`] |
//! | 2 | `W_r = W ×₁ r`, dropout | [`linalg::contract_relation`] |
//! | 3 | `x = e_h · W_r`, `bn1`, dropout | [`linalg::batched_vecmat`] |
//! | 4 | `logits = x · Eᵀ`, sigmoid | [`model`] |
//!
//! Dropout only runs during training; scoring uses batch-norm running
//! statistics and is deterministic.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tailkit_kge::{KeywordEngine, Trainer, TrainingConfig};
//! use tailkit_core::{AssetConfig, LinkingContext, TripleFeed};
//!
//! let feed = TripleFeed::read_file("kg_triples.txt")?;
//! let outcome = Trainer::new(TrainingConfig::default()).train(&feed.facts)?;
//!
//! let context = LinkingContext::load(&AssetConfig::with_base_dir("assets"))?;
//! let engine = KeywordEngine::new(context, outcome.into_shared());
//! let keywords = engine.predict_keywords("ヘルメット")?;
//! ```
//!
//! ## References
//!
//! - Balažević, Allen, Hospedales (2019). "TuckER: Tensor Factorization for
//!   Knowledge Graph Completion." EMNLP.
//! - Dettmers et al. (2018). "Convolutional 2D Knowledge Graph Embeddings."
//!   AAAI. (1-N scoring, reciprocal relations)

mod error;

pub mod engine;
pub mod evaluation;
pub mod linalg;
pub mod model;
pub mod nn;
pub mod optim;
pub mod retrieval;
pub mod store;
pub mod training;

pub use engine::{KeywordEngine, KeywordLookup, Predictor, UntrainedPolicy};
pub use error::{Error, Result};
pub use evaluation::{EvaluationReport, FilteredEvaluator, RankMetrics};
pub use model::{Prediction, TailScorer, TuckerDropout};
pub use optim::Adam;
pub use retrieval::{predict_keywords, KeywordMap, DEFAULT_TOP_K};
pub use store::{CoreTensor, EmbeddingTable, ModelMeta, ModelState, MODEL_FORMAT};
pub use training::{EpochMetrics, ProgressCallback, Trainer, TrainingConfig, TrainingOutcome};
