//! Locations of the lookup tables and catalogs.

use crate::error::Result;
use crate::relations::open_or_warn;
use crate::vocab::{EntityVocab, GraphVocab, RelationVocab};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths of the linking assets.
///
/// Relative paths are resolved against `base_dir`. Fields missing from a
/// JSON file take the conventional names below.
///
/// ```rust,ignore
/// let assets = AssetConfig::from_json_file("assets.json")?;
/// let ctx = LinkingContext::load(&assets)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory relative paths are resolved against.
    pub base_dir: PathBuf,
    /// Linking table (`leaf, cell, ...`).
    pub linking_table: PathBuf,
    /// Category table (`leaf, top_level`).
    pub category_table: PathBuf,
    /// Relation table (`bucket, rel_<n>, ...`).
    pub relation_table: PathBuf,
    /// Entity catalog (`name, ent_<n>`).
    pub entity_catalog: PathBuf,
    /// Relation catalog (`name, rel_<n>`).
    pub relation_catalog: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            linking_table: PathBuf::from("Entity_linking/product_to_entity.csv"),
            category_table: PathBuf::from("category_table.csv"),
            relation_table: PathBuf::from("relation_table.csv"),
            entity_catalog: PathBuf::from("E&R/entity.csv"),
            relation_catalog: PathBuf::from("E&R/relation.csv"),
        }
    }
}

impl AssetConfig {
    /// Conventional layout under `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Read from a JSON file. A relative `base_dir` in the file is taken
    /// relative to the file's own directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&text)?;
        if config.base_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.base_dir = parent.join(&config.base_dir);
            }
        }
        Ok(config)
    }

    /// Vocabularies seeded from the entity and relation catalogs, so model
    /// ids line up with the `ent_<n>`/`rel_<n>` tags of the linking tables.
    /// A missing catalog leaves its vocabulary empty.
    pub fn load_catalogs(&self) -> Result<GraphVocab> {
        let mut vocab = GraphVocab::new();
        let path = self.resolve(&self.entity_catalog);
        if let Some(file) = open_or_warn(&path, "entity catalog")? {
            let (entities, skipped) = EntityVocab::from_catalog(file)?;
            tracing::info!(path = %path.display(), names = entities.len(), skipped, "entity catalog");
            vocab.entities = entities;
        }
        let path = self.resolve(&self.relation_catalog);
        if let Some(file) = open_or_warn(&path, "relation catalog")? {
            let (relations, skipped) = RelationVocab::from_catalog(file)?;
            tracing::info!(path = %path.display(), names = relations.len(), skipped, "relation catalog");
            vocab.relations = relations;
        }
        Ok(vocab)
    }

    /// Resolve a configured path against `base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AssetConfig =
            serde_json::from_str(r#"{"relation_table": "/abs/rel.csv"}"#).unwrap();
        assert_eq!(config.relation_table, PathBuf::from("/abs/rel.csv"));
        assert_eq!(config.category_table, PathBuf::from("category_table.csv"));
    }

    #[test]
    fn test_load_catalogs() {
        let dir = std::env::temp_dir().join(format!("tailkit-catalogs-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("E&R")).unwrap();
        std::fs::write(dir.join("E&R/entity.csv"), "安全靴,ent_2\nヘルメット,ent_1\n").unwrap();

        let vocab = AssetConfig::with_base_dir(&dir).load_catalogs().unwrap();
        assert_eq!(vocab.entities.names(), ["ヘルメット", "安全靴"]);
        assert!(vocab.relations.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve() {
        let config = AssetConfig::with_base_dir("/data/kg");
        assert_eq!(
            config.resolve(&config.category_table),
            PathBuf::from("/data/kg/category_table.csv")
        );
        assert_eq!(
            config.resolve(Path::new("/elsewhere/x.csv")),
            PathBuf::from("/elsewhere/x.csv")
        );
    }
}
