//! Entity linking: leaf category → candidate entity ids.
//!
//! The linking table is a headerless CSV whose first column is a leaf
//! category and whose remaining columns are free-form cells. Cells holding
//! an entity reference (`ent_<n>`) name the linked entities; any other text
//! (product names, sub-category labels) is ignored.

use crate::error::Result;
use crate::ids::{DenseId, EntityId};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

/// Maximum number of cells scanned after the category column.
pub const MAX_LINK_SLOTS: usize = 19;

/// Leaf category → linked cells.
#[derive(Debug, Clone, Default)]
pub struct LinkingTable {
    rows: HashMap<String, Vec<String>>,
    skipped: usize,
}

impl LinkingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row. The first row for a category wins; later duplicates are
    /// ignored and counted as skipped.
    pub fn insert_row<S: AsRef<str>>(&mut self, category: &str, cells: &[S]) {
        let key = category.trim_start_matches('\u{feff}').trim();
        if key.is_empty() || self.rows.contains_key(key) {
            self.skipped += 1;
            return;
        }
        let cells = cells
            .iter()
            .take(MAX_LINK_SLOTS)
            .map(|c| c.as_ref().to_string())
            .collect();
        self.rows.insert(key.to_string(), cells);
    }

    /// Parse a linking table from CSV.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut table = Self::new();
        for record in reader.records() {
            let record = record?;
            let mut fields = record.iter();
            match fields.next() {
                Some(category) => {
                    let cells: Vec<&str> = fields.collect();
                    table.insert_row(category, &cells);
                }
                None => table.skipped += 1,
            }
        }
        tracing::debug!(rows = table.len(), skipped = table.skipped, "loaded linking table");
        Ok(table)
    }

    /// Load from a file. A missing file yields an empty table, so every
    /// category reports NOT_FOUND rather than the process failing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::File::open(path) {
            Ok(file) => Self::from_reader(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "linking table not found, using empty table");
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Link a leaf category to its entities.
    ///
    /// Returns `None` when the (trimmed) category has no row: the category is
    /// unknown. `Some` with an empty set means the category is known but no
    /// cell holds an entity reference. Scanning stops at the first absent
    /// (zero-length) cell; a whitespace-only cell is skipped like any other
    /// non-reference text.
    pub fn link_entities(&self, category: &str) -> Option<BTreeSet<EntityId>> {
        let cells = self.rows.get(category.trim())?;
        Some(
            cells
                .iter()
                .take_while(|c| !c.is_empty())
                .filter_map(|c| EntityId::from_tag(c))
                .collect(),
        )
    }

    /// Whether a row exists for the category.
    pub fn contains(&self, category: &str) -> bool {
        self.rows.contains_key(category.trim())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows skipped while loading (blank category or duplicate).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// All leaf categories with a row.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }
}
