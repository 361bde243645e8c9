//! Relation linking: leaf category → bucket → candidate relations.
//!
//! Two tables are involved:
//!
//! | Table | Rows | Meaning |
//! |-------|------|---------|
//! | [`CategoryTable`] | `leaf, top_level` | leaf category → bucket, resolved once at load |
//! | [`RelationTable`] | `bucket, rel_1, rel_7, ...` | bucket → relations worth asking about |
//!
//! Bucket 24 ("その他") holds relations that apply to every product, so its
//! set is always part of the answer.

use crate::error::Result;
use crate::ids::{DenseId, RelationId};
use crate::taxonomy::{BucketId, Taxonomy};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

pub(crate) fn open_or_warn(path: &Path, what: &str) -> Result<Option<std::fs::File>> {
    match std::fs::File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "{what} not found, using empty table");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn headerless<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Leaf category → pre-resolved top-level bucket.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    buckets: HashMap<String, BucketId>,
    skipped: usize,
}

impl CategoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leaf's bucket. The first entry for a leaf wins.
    pub fn insert(&mut self, leaf: &str, bucket: BucketId) -> bool {
        let leaf = leaf.trim();
        if leaf.is_empty() || self.buckets.contains_key(leaf) {
            return false;
        }
        self.buckets.insert(leaf.to_string(), bucket);
        true
    }

    /// Parse `leaf, top_level` rows.
    ///
    /// `top_level` is either a bucket number (`1`..`24`) or a top-level
    /// category name, which is resolved through `taxonomy` here so lookups
    /// never re-run the matcher.
    pub fn from_reader<R: Read>(reader: R, taxonomy: &Taxonomy) -> Result<Self> {
        let mut table = Self::new();
        for record in headerless(reader).records() {
            let record = record?;
            if record.len() < 2 {
                if !(record.len() == 1 && record[0].is_empty()) {
                    table.skipped += 1;
                }
                continue;
            }
            let leaf = record[0].trim_start_matches('\u{feff}');
            let top = &record[1];
            let bucket = match top.parse::<u8>() {
                Ok(n) => BucketId::new(n),
                Err(_) if !top.is_empty() => Some(taxonomy.resolve_bucket(top)),
                Err(_) => None,
            };
            match bucket {
                Some(b) if table.insert(leaf, b) => {}
                _ => table.skipped += 1,
            }
        }
        tracing::debug!(rows = table.len(), skipped = table.skipped, "loaded category table");
        Ok(table)
    }

    /// Load from a file; a missing file yields an empty table.
    pub fn load(path: impl AsRef<Path>, taxonomy: &Taxonomy) -> Result<Self> {
        match open_or_warn(path.as_ref(), "category table")? {
            Some(file) => Self::from_reader(file, taxonomy),
            None => Ok(Self::new()),
        }
    }

    /// Bucket stored for a leaf category.
    pub fn bucket_of(&self, leaf: &str) -> Option<BucketId> {
        self.buckets.get(leaf.trim()).copied()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Rows skipped while loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Bucket → relation ids.
#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    relations: BTreeMap<BucketId, BTreeSet<RelationId>>,
    skipped: usize,
}

impl RelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add relations to a bucket. Repeated buckets accumulate.
    pub fn extend(&mut self, bucket: BucketId, relations: impl IntoIterator<Item = RelationId>) {
        self.relations.entry(bucket).or_default().extend(relations);
    }

    /// Parse `bucket, rel_<n>, ...` rows. Cells that are not relation tags
    /// are ignored; rows with an invalid bucket are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut table = Self::new();
        for record in headerless(reader).records() {
            let record = record?;
            let bucket = record
                .get(0)
                .map(|c| c.trim_start_matches('\u{feff}'))
                .and_then(|c| c.parse::<u8>().ok())
                .and_then(BucketId::new);
            match bucket {
                Some(b) => table.extend(b, record.iter().skip(1).filter_map(RelationId::from_tag)),
                None if record.len() == 1 && record[0].is_empty() => {}
                None => table.skipped += 1,
            }
        }
        tracing::debug!(
            buckets = table.relations.len(),
            skipped = table.skipped,
            "loaded relation table"
        );
        Ok(table)
    }

    /// Load from a file; a missing file yields an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match open_or_warn(path.as_ref(), "relation table")? {
            Some(file) => Self::from_reader(file),
            None => Ok(Self::new()),
        }
    }

    /// Relations stored for exactly one bucket.
    pub fn for_bucket(&self, bucket: BucketId) -> Option<&BTreeSet<RelationId>> {
        self.relations.get(&bucket)
    }

    /// Relations for a bucket, always including bucket 24's set.
    ///
    /// `None` (category unknown to the category table) yields bucket 24's set
    /// alone.
    pub fn related(&self, bucket: Option<BucketId>) -> BTreeSet<RelationId> {
        let mut out = self
            .for_bucket(BucketId::OTHER)
            .cloned()
            .unwrap_or_default();
        if let Some(set) = bucket.and_then(|b| self.for_bucket(b)) {
            out.extend(set.iter().copied());
        }
        out
    }

    /// Buckets with at least one row.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Rows skipped while loading.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
