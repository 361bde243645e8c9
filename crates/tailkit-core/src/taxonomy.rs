//! The fixed top-level category taxonomy and its fuzzy matcher.
//!
//! Leaf product categories are folded into 24 top-level buckets. The matcher
//! is a bidirectional substring test against each bucket's keyword set, tried
//! in enumeration order so the lowest-numbered bucket wins ties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical names of the top-level buckets, in id order (bucket 1 first).
pub const TOP_LEVEL_CATEGORIES: [&str; 24] = [
    "安全保護具・作業服・安全靴",
    "物流/保管/梱包用品/テープ",
    "安全用品/防災・防犯用品/安全標識",
    "オフィスサプライ",
    "オフィス家具/照明/清掃用品",
    "切削工具・研磨材",
    "測定・測量用品",
    "作業工具/電動・空圧工具",
    "スプレー・オイル・グリス/塗料/接着・補修/溶接",
    "配管・水廻り部材/ポンプ/空圧・油圧機器・ホース",
    "メカニカル部品/機構部品",
    "制御機器/はんだ・静電気対策用品",
    "建築金物・建材・塗装内装用品",
    "空調・電設資材/電気材料",
    "ねじ・ボルト・釘/素材",
    "自動車用品",
    "トラック用品",
    "バイク用品",
    "自転車用品",
    "科学研究・開発用品/クリーンルーム用品",
    "厨房機器・キッチン/店舗用品",
    "農業資材・園芸用品",
    "医療・介護用品",
    "その他",
];

/// Characters a bucket name is split on to derive its keywords.
pub const KEYWORD_SEPARATORS: [char; 2] = ['/', '・'];

/// Identifier of a top-level bucket, always in `1..=24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BucketId(u8);

impl BucketId {
    /// Number of buckets.
    pub const COUNT: u8 = 24;
    /// The universal fallback bucket ("その他").
    pub const OTHER: BucketId = BucketId(24);

    /// Construct from a 1-based bucket number.
    pub fn new(id: u8) -> Option<Self> {
        (1..=Self::COUNT).contains(&id).then_some(Self(id))
    }

    /// The 1-based bucket number.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Canonical bucket name.
    pub fn name(self) -> &'static str {
        TOP_LEVEL_CATEGORIES[usize::from(self.0 - 1)]
    }

    /// All buckets in enumeration order.
    pub fn all() -> impl Iterator<Item = BucketId> {
        (1..=Self::COUNT).map(BucketId)
    }
}

impl TryFrom<u8> for BucketId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BucketId::new(value).ok_or_else(|| format!("bucket id {value} outside 1..=24"))
    }
}

impl From<BucketId> for u8 {
    fn from(b: BucketId) -> u8 {
        b.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bucket with its precomputed match keywords.
#[derive(Debug, Clone)]
struct Bucket {
    id: BucketId,
    keywords: Vec<String>,
}

/// The top-level taxonomy with precomputed keyword sets.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    buckets: Vec<Bucket>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::standard()
    }
}

impl Taxonomy {
    /// The standard 24-bucket taxonomy.
    pub fn standard() -> Self {
        let buckets = BucketId::all()
            .map(|id| Bucket {
                id,
                keywords: keywords_for(id.name()),
            })
            .collect();
        Self { buckets }
    }

    /// Keywords of one bucket: the full name followed by its parts.
    pub fn keywords(&self, bucket: BucketId) -> &[String] {
        &self.buckets[usize::from(bucket.get() - 1)].keywords
    }

    /// Resolve a category string to its top-level bucket.
    ///
    /// Returns the first bucket (in id order) where the text contains one of
    /// the bucket's keywords or a keyword contains the text. Empty or
    /// whitespace-only text resolves to [`BucketId::OTHER`], as does text
    /// that matches nothing.
    pub fn resolve_bucket(&self, category: &str) -> BucketId {
        if category.trim().is_empty() {
            return BucketId::OTHER;
        }
        self.buckets
            .iter()
            .find(|b| {
                b.keywords
                    .iter()
                    .any(|kw| category.contains(kw.as_str()) || kw.contains(category))
            })
            .map_or(BucketId::OTHER, |b| b.id)
    }
}

fn keywords_for(name: &str) -> Vec<String> {
    let mut keywords = vec![name.to_string()];
    for part in name.split(KEYWORD_SEPARATORS) {
        let part = part.trim();
        if !part.is_empty() && !keywords.iter().any(|k| k == part) {
            keywords.push(part.to_string());
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_bounds() {
        assert!(BucketId::new(0).is_none());
        assert!(BucketId::new(25).is_none());
        assert_eq!(BucketId::new(24), Some(BucketId::OTHER));
        assert_eq!(BucketId::OTHER.name(), "その他");
    }

    #[test]
    fn test_keywords_split_on_separators() {
        let tax = Taxonomy::standard();
        let kws = tax.keywords(BucketId::new(1).unwrap());
        assert_eq!(kws[0], "安全保護具・作業服・安全靴");
        assert!(kws.contains(&"安全靴".to_string()));
        assert!(kws.contains(&"作業服".to_string()));

        let kws = tax.keywords(BucketId::new(2).unwrap());
        assert!(kws.contains(&"テープ".to_string()));
    }

    #[test]
    fn test_exact_and_partial_matches() {
        let tax = Taxonomy::standard();
        assert_eq!(tax.resolve_bucket("安全靴").get(), 1);
        assert_eq!(tax.resolve_bucket("自動車用品").get(), 16);
        // keyword contained in text
        assert_eq!(tax.resolve_bucket("業務用ポンプ部品").get(), 10);
        // text contained in keyword (abbreviation)
        assert_eq!(tax.resolve_bucket("研磨").get(), 6);
    }

    #[test]
    fn test_lowest_bucket_wins() {
        let tax = Taxonomy::standard();
        // "安全用品" (3) and "測定" (7) both appear; 3 is enumerated first.
        assert_eq!(tax.resolve_bucket("安全用品と測定・測量用品").get(), 3);
    }

    #[test]
    fn test_fallback_to_other() {
        let tax = Taxonomy::standard();
        assert_eq!(tax.resolve_bucket("xyz"), BucketId::OTHER);
        assert_eq!(tax.resolve_bucket(""), BucketId::OTHER);
        assert_eq!(tax.resolve_bucket("   "), BucketId::OTHER);
    }
}
