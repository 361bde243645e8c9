//! Embedding tables, the core tensor, and model persistence.
//!
//! A saved model is a single bincode blob:
//!
//! | Field | Content |
//! |-------|---------|
//! | `format` | [`MODEL_FORMAT`] |
//! | `meta` | sizes, dims, reciprocal flag |
//! | `vocab` | entity and relation names in id order |
//! | parameter buffers | row-major `f32` vectors |
//!
//! Loading checks the format tag, every buffer length against the metadata,
//! and the vocabulary sizes, so a truncated or mismatched file is rejected
//! before any scoring happens.

use crate::error::{Error, Result};
use crate::nn::BatchNorm;
use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tailkit_core::{EntityId, GraphVocab, RelationId};

/// Format tag written at the head of every model file.
pub const MODEL_FORMAT: &str = "tailkit-tucker/1";

/// Dense embedding rows, one per id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    data: Array2<f32>,
}

impl EmbeddingTable {
    /// Wrap an existing `(rows, dim)` matrix.
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Xavier-normal initialized table.
    pub fn xavier_normal<R: Rng + ?Sized>(rows: usize, dim: usize, rng: &mut R) -> Self {
        Self::new(xavier_rows(rows, dim, rows, rng))
    }

    /// Append `extra` freshly initialized rows. Existing rows keep their
    /// values and the dimension never changes.
    pub fn grow<R: Rng + ?Sized>(&mut self, extra: usize, rng: &mut R) {
        if extra == 0 {
            return;
        }
        let (rows, dim) = self.data.dim();
        let fresh = xavier_rows(extra, dim, rows + extra, rng);
        let mut data = Array2::zeros((rows + extra, dim));
        data.slice_mut(s![..rows, ..]).assign(&self.data);
        data.slice_mut(s![rows.., ..]).assign(&fresh);
        self.data = data;
    }

    /// Row of one id.
    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.rows()).then(|| self.data.row(index))
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// The underlying matrix.
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Mutable access to the underlying matrix.
    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }
}

fn xavier_rows<R: Rng + ?Sized>(rows: usize, dim: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
    let std = (2.0 / (dim + fan_out).max(1) as f32).sqrt();
    match Normal::new(0.0f32, std) {
        Ok(normal) => Array2::from_shape_simple_fn((rows, dim), || normal.sample(rng)),
        Err(_) => Array2::zeros((rows, dim)),
    }
}

/// The shared interaction tensor `W` of shape `(d_rel, d_ent, d_ent)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreTensor {
    data: Array3<f32>,
}

impl CoreTensor {
    /// Wrap an existing tensor.
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// Uniform(-1, 1) initialized tensor.
    pub fn uniform<R: Rng + ?Sized>(relation_dim: usize, entity_dim: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-1.0f32, 1.0);
        Self::new(Array3::from_shape_simple_fn(
            (relation_dim, entity_dim, entity_dim),
            || dist.sample(rng),
        ))
    }

    /// `(d_rel, d_ent, d_ent)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// The underlying tensor.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Mutable access to the underlying tensor.
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }
}

/// Sizes and layout of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Rows of the entity table.
    pub num_entities: usize,
    /// Relations in the vocabulary (inverse relations not counted).
    pub num_relations: usize,
    /// Entity embedding dimension.
    pub entity_dim: usize,
    /// Relation embedding dimension.
    pub relation_dim: usize,
    /// Whether every relation has a learned inverse.
    pub reciprocal: bool,
}

impl ModelMeta {
    /// Rows of the relation table: twice the relation count when inverse
    /// relations are learned.
    pub fn relation_rows(&self) -> usize {
        if self.reciprocal {
            self.num_relations * 2
        } else {
            self.num_relations
        }
    }
}

/// Complete trained (or training) model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub(crate) meta: ModelMeta,
    pub(crate) entities: EmbeddingTable,
    pub(crate) relations: EmbeddingTable,
    pub(crate) core: CoreTensor,
    pub(crate) bn0: BatchNorm,
    pub(crate) bn1: BatchNorm,
    pub(crate) vocab: GraphVocab,
}

impl ModelState {
    /// Randomly initialize a model for a vocabulary.
    pub fn init<R: Rng + ?Sized>(
        vocab: GraphVocab,
        entity_dim: usize,
        relation_dim: usize,
        reciprocal: bool,
        rng: &mut R,
    ) -> Self {
        let meta = ModelMeta {
            num_entities: vocab.entities.len(),
            num_relations: vocab.relations.len(),
            entity_dim,
            relation_dim,
            reciprocal,
        };
        Self {
            entities: EmbeddingTable::xavier_normal(meta.num_entities, entity_dim, rng),
            relations: EmbeddingTable::xavier_normal(meta.relation_rows(), relation_dim, rng),
            core: CoreTensor::uniform(relation_dim, entity_dim, rng),
            bn0: BatchNorm::new(entity_dim),
            bn1: BatchNorm::new(entity_dim),
            meta,
            vocab,
        }
    }

    /// Sizes and layout.
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// Entity and relation names.
    pub fn vocab(&self) -> &GraphVocab {
        &self.vocab
    }

    /// Entity embedding table.
    pub fn entities(&self) -> &EmbeddingTable {
        &self.entities
    }

    /// Relation embedding table (inverse rows interleaved when reciprocal).
    pub fn relations(&self) -> &EmbeddingTable {
        &self.relations
    }

    /// The core tensor.
    pub fn core(&self) -> &CoreTensor {
        &self.core
    }

    /// Add entities to the vocabulary, appending a fresh embedding row for
    /// each new name. Known names keep their ids and rows.
    pub fn add_entities<R: Rng + ?Sized>(
        &mut self,
        names: impl IntoIterator<Item = impl AsRef<str>>,
        rng: &mut R,
    ) -> Vec<EntityId> {
        let ids: Vec<EntityId> = names
            .into_iter()
            .map(|n| self.vocab.entities.insert(n.as_ref()))
            .collect();
        let extra = self.vocab.entities.len() - self.entities.rows();
        self.entities.grow(extra, rng);
        self.meta.num_entities = self.vocab.entities.len();
        ids
    }

    /// Row of the relation table holding `relation`.
    pub fn relation_row(&self, relation: RelationId) -> usize {
        if self.meta.reciprocal {
            relation.0 * 2
        } else {
            relation.0
        }
    }

    /// Row of the relation table holding the inverse of `relation`.
    pub fn inverse_row(&self, relation: RelationId) -> Option<usize> {
        self.meta.reciprocal.then_some(relation.0 * 2 + 1)
    }

    /// Check an entity id against the model.
    pub fn check_entity(&self, entity: EntityId) -> Result<()> {
        if entity.0 < self.meta.num_entities {
            Ok(())
        } else {
            Err(Error::VocabularyMismatch {
                kind: "entity",
                id: entity.0,
            })
        }
    }

    /// Check a relation id against the model.
    pub fn check_relation(&self, relation: RelationId) -> Result<()> {
        if relation.0 < self.meta.num_relations {
            Ok(())
        } else {
            Err(Error::VocabularyMismatch {
                kind: "relation",
                id: relation.0,
            })
        }
    }

    /// Verify that every table agrees with the metadata.
    pub fn validate(&self) -> Result<()> {
        let m = &self.meta;
        let checks = [
            ("entity rows", self.entities.rows(), m.num_entities),
            ("entity dim", self.entities.dim(), m.entity_dim),
            ("relation rows", self.relations.rows(), m.relation_rows()),
            ("relation dim", self.relations.dim(), m.relation_dim),
            ("entity vocabulary", self.vocab.entities.len(), m.num_entities),
            ("relation vocabulary", self.vocab.relations.len(), m.num_relations),
            ("bn0 features", self.bn0.dim(), m.entity_dim),
            ("bn1 features", self.bn1.dim(), m.entity_dim),
        ];
        for (what, actual, expected) in checks {
            if actual != expected {
                return Err(Error::InvalidModel(format!(
                    "{what}: expected {expected}, found {actual}"
                )));
            }
        }
        if self.core.dim() != (m.relation_dim, m.entity_dim, m.entity_dim) {
            return Err(Error::InvalidModel(format!(
                "core tensor: expected {:?}, found {:?}",
                (m.relation_dim, m.entity_dim, m.entity_dim),
                self.core.dim()
            )));
        }
        Ok(())
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&ModelFile::from_state(self))?)
    }

    /// Deserialize and validate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: ModelFile = bincode::deserialize(bytes)?;
        file.into_state()
    }

    /// Save to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &ModelFile::from_state(self))?;
        tracing::info!(
            path = %path.display(),
            entities = self.meta.num_entities,
            relations = self.meta.num_relations,
            "saved model"
        );
        Ok(())
    }

    /// Load and validate a saved model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let state = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            entities = state.meta.num_entities,
            relations = state.meta.num_relations,
            "loaded model"
        );
        Ok(state)
    }
}

#[derive(Serialize, Deserialize)]
struct BatchNormFile {
    weight: Vec<f32>,
    bias: Vec<f32>,
    running_mean: Vec<f32>,
    running_var: Vec<f32>,
}

impl BatchNormFile {
    fn from_layer(bn: &BatchNorm) -> Self {
        Self {
            weight: bn.weight.to_vec(),
            bias: bn.bias.to_vec(),
            running_mean: bn.running_mean.to_vec(),
            running_var: bn.running_var.to_vec(),
        }
    }

    fn into_layer(self, dim: usize, name: &str) -> Result<BatchNorm> {
        for (field, len) in [
            ("weight", self.weight.len()),
            ("bias", self.bias.len()),
            ("running_mean", self.running_mean.len()),
            ("running_var", self.running_var.len()),
        ] {
            if len != dim {
                return Err(Error::InvalidModel(format!(
                    "{name}.{field}: expected {dim} values, found {len}"
                )));
            }
        }
        Ok(BatchNorm {
            weight: Array1::from(self.weight),
            bias: Array1::from(self.bias),
            running_mean: Array1::from(self.running_mean),
            running_var: Array1::from(self.running_var),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ModelFile {
    format: String,
    meta: ModelMeta,
    vocab: GraphVocab,
    entities: Vec<f32>,
    relations: Vec<f32>,
    core: Vec<f32>,
    bn0: BatchNormFile,
    bn1: BatchNormFile,
}

impl ModelFile {
    fn from_state(state: &ModelState) -> Self {
        Self {
            format: MODEL_FORMAT.to_string(),
            meta: state.meta,
            vocab: state.vocab.clone(),
            entities: state.entities.data.iter().copied().collect(),
            relations: state.relations.data.iter().copied().collect(),
            core: state.core.data.iter().copied().collect(),
            bn0: BatchNormFile::from_layer(&state.bn0),
            bn1: BatchNormFile::from_layer(&state.bn1),
        }
    }

    fn into_state(self) -> Result<ModelState> {
        if self.format != MODEL_FORMAT {
            return Err(Error::InvalidModel(format!(
                "unknown format '{}', expected '{MODEL_FORMAT}'",
                self.format
            )));
        }
        let m = self.meta;
        let expect = |name: &str, len: usize, dims: &[usize]| -> Result<()> {
            let expected = dims
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| Error::InvalidModel(format!("{name}: size overflows")))?;
            if len == expected {
                Ok(())
            } else {
                Err(Error::InvalidModel(format!(
                    "{name}: expected {expected} values, found {len}"
                )))
            }
        };
        let relation_rows = m
            .num_relations
            .checked_mul(if m.reciprocal { 2 } else { 1 })
            .ok_or_else(|| Error::InvalidModel("relation rows: size overflows".into()))?;
        expect("entities", self.entities.len(), &[m.num_entities, m.entity_dim])?;
        expect("relations", self.relations.len(), &[relation_rows, m.relation_dim])?;
        expect("core", self.core.len(), &[m.relation_dim, m.entity_dim, m.entity_dim])?;

        let state = ModelState {
            entities: EmbeddingTable::new(Array2::from_shape_vec(
                (m.num_entities, m.entity_dim),
                self.entities,
            )?),
            relations: EmbeddingTable::new(Array2::from_shape_vec(
                (m.relation_rows(), m.relation_dim),
                self.relations,
            )?),
            core: CoreTensor::new(Array3::from_shape_vec(
                (m.relation_dim, m.entity_dim, m.entity_dim),
                self.core,
            )?),
            bn0: self.bn0.into_layer(m.entity_dim, "bn0")?,
            bn1: self.bn1.into_layer(m.entity_dim, "bn1")?,
            vocab: self.vocab,
            meta: m,
        };
        state.validate()?;
        Ok(state)
    }
}

/// Number of learned parameters.
pub fn parameter_count(meta: &ModelMeta) -> usize {
    meta.num_entities * meta.entity_dim
        + meta.relation_rows() * meta.relation_dim
        + meta.relation_dim * meta.entity_dim * meta.entity_dim
        + 4 * meta.entity_dim
}
