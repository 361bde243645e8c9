//! Triples in text and id form, and the triple feed reader.

use crate::error::{Error, Result};
use crate::ids::{EntityId, RelationId};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// A (head, relation, tail) fact in text form.
///
/// Generic over string type to support both owned and borrowed data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact<S = String> {
    /// Head entity.
    pub head: S,
    /// Relation.
    pub relation: S,
    /// Tail entity.
    pub tail: S,
}

impl<S> Fact<S> {
    /// Create a new fact from head, relation, tail.
    pub fn new(head: S, relation: S, tail: S) -> Self {
        Self { head, relation, tail }
    }
}

impl Fact<String> {
    /// Create from string slices (cloning into owned strings).
    pub fn from_strs(head: &str, relation: &str, tail: &str) -> Self {
        Self {
            head: head.to_string(),
            relation: relation.to_string(),
            tail: tail.to_string(),
        }
    }
}

impl<S: AsRef<str>> Fact<S> {
    /// True if any field is empty (after trimming).
    pub fn has_empty_field(&self) -> bool {
        [&self.head, &self.relation, &self.tail]
            .iter()
            .any(|s| s.as_ref().trim().is_empty())
    }
}

/// A (head, relation, tail) triple over dense ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Head entity.
    pub head: EntityId,
    /// Relation.
    pub relation: RelationId,
    /// Tail entity.
    pub tail: EntityId,
}

impl Triple {
    /// Create a new id triple.
    pub fn new(head: EntityId, relation: RelationId, tail: EntityId) -> Self {
        Self { head, relation, tail }
    }
}

/// Facts read from a triple feed, with counts of what was skipped.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    /// Well-formed facts, in input order.
    pub facts: Vec<Fact<String>>,
    /// Lines with the wrong number of columns (or undecodable bytes).
    pub malformed: usize,
    /// Lines with three columns where one of them is empty.
    pub empty_fields: usize,
}

impl FeedReport {
    /// Total number of skipped lines.
    pub fn skipped(&self) -> usize {
        self.malformed + self.empty_fields
    }
}

/// Reader for three-column triple feeds.
///
/// Accepts tab- or comma-delimited text; the delimiter is sniffed from the
/// first non-blank, non-comment line (a tab anywhere in it selects TSV).
/// Lines starting with `#` are comments.
pub struct TripleFeed;

impl TripleFeed {
    /// Read triples from any reader.
    pub fn read<R: Read>(mut reader: R) -> Result<FeedReport> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse_bytes(&bytes)
    }

    /// Read triples from a file. A missing file is an error here: the
    /// training entry point cannot proceed without its triples.
    pub fn read_file(path: impl AsRef<Path>) -> Result<FeedReport> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::read(file)
    }

    /// Parse triples from an in-memory string.
    pub fn parse_str(text: &str) -> Result<FeedReport> {
        Self::parse_bytes(text.as_bytes())
    }

    /// Parse triples from raw bytes. A line that is not valid UTF-8 is
    /// counted as malformed; the lines around it are still read.
    pub fn parse_bytes(bytes: &[u8]) -> Result<FeedReport> {
        let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let tab = text
            .split(|&b| b == b'\n')
            .find(|l| match l.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(start) => l[start] != b'#',
                None => false,
            })
            .is_some_and(|l| l.contains(&b'\t'));

        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All);
        if tab {
            builder.delimiter(b'\t').quoting(false);
        }
        let mut reader = builder.from_reader(text);

        let mut report = FeedReport::default();
        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) if e.is_io_error() => return Err(Error::Csv(e)),
                Err(_) => {
                    report.malformed += 1;
                    continue;
                }
            };
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            if record.len() != 3 {
                report.malformed += 1;
                continue;
            }
            let fact = Fact::from_strs(&record[0], &record[1], &record[2]);
            if fact.has_empty_field() {
                report.empty_fields += 1;
                continue;
            }
            report.facts.push(fact);
        }

        tracing::debug!(
            facts = report.facts.len(),
            malformed = report.malformed,
            empty_fields = report.empty_fields,
            "parsed triple feed"
        );
        Ok(report)
    }
}
