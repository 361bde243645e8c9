//! id↔text maps for entities and relations.
//!
//! Ids are dense and assigned in insertion order. A vocabulary never
//! reassigns or removes an id, so tables built against it can only grow.
//!
//! Display names need not be unique in a catalog: every id keeps its own
//! text, and a repeated name resolves to its first id. Vocabularies grown
//! through [`Vocabulary::insert`] never repeat a name, so their maps are
//! exact inverses.

use crate::error::{Error, Result};
use crate::ids::{DenseId, EntityId, RelationId};
use crate::triple::{Fact, Triple};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

/// Bidirectional map between dense ids and display text.
#[derive(Debug, Clone)]
pub struct Vocabulary<I> {
    names: Vec<String>,
    index: HashMap<String, usize>,
    _id: PhantomData<I>,
}

/// Entity vocabulary.
pub type EntityVocab = Vocabulary<EntityId>;
/// Relation vocabulary.
pub type RelationVocab = Vocabulary<RelationId>;

impl<I: DenseId> Default for Vocabulary<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: DenseId> PartialEq for Vocabulary<I> {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl<I: DenseId> Vocabulary<I> {
    /// Create an empty vocabulary.
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            index: HashMap::new(),
            _id: PhantomData,
        }
    }

    /// Build from names in id order, rejecting repeated names so the maps
    /// are exact inverses. See [`Vocabulary::from_listed_names`] for
    /// catalogs that repeat names.
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut vocab = Self::new();
        for name in names {
            let name = name.into();
            if vocab.index.contains_key(&name) {
                return Err(Error::Validation(format!(
                    "duplicate {} name '{}'",
                    I::KIND,
                    name
                )));
            }
            vocab.insert(&name);
        }
        Ok(vocab)
    }

    /// Build from names in id order, keeping repeated names. `text_of` is
    /// answered per id; `id_of` returns the first id listed for a name.
    pub fn from_listed_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut vocab = Self::new();
        for name in names {
            let name = name.into();
            let i = vocab.names.len();
            vocab.index.entry(name.clone()).or_insert(i);
            vocab.names.push(name);
        }
        vocab
    }

    /// Return the id for `name`, assigning the next free id if unseen.
    pub fn insert(&mut self, name: &str) -> I {
        if let Some(&i) = self.index.get(name) {
            return I::from_index(i);
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), i);
        I::from_index(i)
    }

    /// Id of a name, if known.
    pub fn id_of(&self, name: &str) -> Option<I> {
        self.index.get(name).map(|&i| I::from_index(i))
    }

    /// Display text of an id, if known.
    pub fn text_of(&self, id: I) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Display text of an id, or a `VocabularyMismatch` error.
    pub fn require_text(&self, id: I) -> Result<&str> {
        self.text_of(id).ok_or(Error::VocabularyMismatch {
            kind: I::KIND,
            id: id.index(),
        })
    }

    /// Whether `id` falls inside this vocabulary.
    pub fn contains(&self, id: I) -> bool {
        id.index() < self.names.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (I::from_index(i), n.as_str()))
    }

    /// Load a catalog of `name,<tag>` rows (e.g. `ヘルメット,ent_1`).
    ///
    /// Rows whose second column is not a valid tag for this id kind (headers,
    /// blank lines, stray columns) are skipped and counted. The tags must
    /// cover `1..=N` without gaps. A name may appear under several tags;
    /// `id_of` then returns the lowest.
    pub fn from_catalog<R: Read>(reader: R) -> Result<(Self, usize)> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries: Vec<(usize, String)> = Vec::new();
        let mut skipped = 0;
        for record in reader.records() {
            let record = record?;
            let parsed = (record.len() == 2)
                .then(|| {
                    let name = record[0].trim_start_matches('\u{feff}').trim();
                    I::from_tag(&record[1])
                        .filter(|_| !name.is_empty())
                        .map(|id| (id.index(), name.to_string()))
                })
                .flatten();
            match parsed {
                Some(entry) => entries.push(entry),
                None => skipped += 1,
            }
        }

        entries.sort_by_key(|(i, _)| *i);
        for (expected, (i, name)) in entries.iter().enumerate() {
            if *i != expected {
                return Err(Error::Validation(format!(
                    "{} catalog is not dense: expected {} before '{}' ({})",
                    I::KIND,
                    I::from_index(expected).to_tag(),
                    name,
                    I::from_index(*i).to_tag()
                )));
            }
        }

        let vocab = Self::from_listed_names(entries.into_iter().map(|(_, n)| n));
        Ok((vocab, skipped))
    }

    /// Load a catalog file. See [`Vocabulary::from_catalog`].
    pub fn from_catalog_file(path: impl AsRef<Path>) -> Result<(Self, usize)> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_catalog(file)
    }
}

impl<I> Serialize for Vocabulary<I> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.names.serialize(serializer)
    }
}

impl<'de, I: DenseId> Deserialize<'de> for Vocabulary<I> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::from_listed_names(names))
    }
}

/// Entity and relation vocabularies of one knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphVocab {
    /// Entities (heads and tails).
    pub entities: EntityVocab,
    /// Relations.
    pub relations: RelationVocab,
}

impl GraphVocab {
    /// Empty vocabularies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode facts into id triples, growing the vocabularies in first-seen
    /// order. Facts with an empty field are skipped; the count is returned.
    pub fn encode<S: AsRef<str>>(&mut self, facts: &[Fact<S>]) -> (Vec<Triple>, usize) {
        let mut triples = Vec::with_capacity(facts.len());
        let mut skipped = 0;
        for fact in facts {
            if fact.has_empty_field() {
                skipped += 1;
                continue;
            }
            let head = self.entities.insert(fact.head.as_ref().trim());
            let relation = self.relations.insert(fact.relation.as_ref().trim());
            let tail = self.entities.insert(fact.tail.as_ref().trim());
            triples.push(Triple::new(head, relation, tail));
        }
        (triples, skipped)
    }

    /// Encode facts against the current vocabularies without growing them.
    /// Facts mentioning unknown names are skipped; the count is returned.
    pub fn encode_known<S: AsRef<str>>(&self, facts: &[Fact<S>]) -> (Vec<Triple>, usize) {
        let mut triples = Vec::with_capacity(facts.len());
        let mut skipped = 0;
        for fact in facts {
            let ids = (
                self.entities.id_of(fact.head.as_ref().trim()),
                self.relations.id_of(fact.relation.as_ref().trim()),
                self.entities.id_of(fact.tail.as_ref().trim()),
            );
            match ids {
                (Some(h), Some(r), Some(t)) => triples.push(Triple::new(h, r, t)),
                _ => skipped += 1,
            }
        }
        (triples, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_first_seen_order() {
        let mut v = EntityVocab::new();
        assert_eq!(v.insert("a"), EntityId(0));
        assert_eq!(v.insert("b"), EntityId(1));
        assert_eq!(v.insert("a"), EntityId(0));
        assert_eq!(v.len(), 2);
        assert_eq!(v.text_of(EntityId(1)), Some("b"));
        assert_eq!(v.id_of("b"), Some(EntityId(1)));
    }

    #[test]
    fn test_require_text_reports_mismatch() {
        let v = RelationVocab::from_names(["材質"]).unwrap();
        assert_eq!(v.require_text(RelationId(0)).unwrap(), "材質");
        let err = v.require_text(RelationId(3)).unwrap_err();
        assert!(matches!(
            err,
            Error::VocabularyMismatch { kind: "relation", id: 3 }
        ));
    }

    #[test]
    fn test_from_names_rejects_duplicates() {
        assert!(EntityVocab::from_names(["x", "y", "x"]).is_err());
    }

    #[test]
    fn test_catalog_loading() {
        let csv = "name,entity\nノギス,ent_2\nヘルメット,ent_1\n\n";
        let (v, skipped) = EntityVocab::from_catalog(csv.as_bytes()).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(v.text_of(EntityId(0)), Some("ヘルメット"));
        assert_eq!(v.text_of(EntityId(1)), Some("ノギス"));
    }

    #[test]
    fn test_catalog_with_repeated_name() {
        let csv = "ヘルメット,ent_1\n耐衝撃性,ent_2\nヘルメット,ent_3\n";
        let (v, _) = EntityVocab::from_catalog(csv.as_bytes()).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.text_of(EntityId(2)), Some("ヘルメット"));
        assert_eq!(v.id_of("ヘルメット"), Some(EntityId(0)));

        let json = serde_json::to_string(&v).unwrap();
        let back: EntityVocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.id_of("ヘルメット"), Some(EntityId(0)));
    }

    #[test]
    fn test_catalog_with_gap_is_rejected() {
        let csv = "a,ent_1\nb,ent_3\n";
        assert!(EntityVocab::from_catalog(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_encode_skips_empty_and_grows() {
        let facts = vec![
            Fact::from_strs("ヘルメット", "属性", "耐衝撃性"),
            Fact::from_strs("", "属性", "x"),
            Fact::from_strs("安全靴", "属性", "耐衝撃性"),
        ];
        let mut vocab = GraphVocab::new();
        let (triples, skipped) = vocab.encode(&facts);
        assert_eq!(skipped, 1);
        assert_eq!(triples.len(), 2);
        assert_eq!(vocab.entities.len(), 3);
        assert_eq!(vocab.relations.len(), 1);
        assert_eq!(triples[1].tail, triples[0].tail);
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_index() {
        let v = EntityVocab::from_names(["a", "b"]).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        let back: EntityVocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.id_of("b"), Some(EntityId(1)));
    }
}
