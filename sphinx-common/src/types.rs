//! # Query and Result Types
//!
//! Plain data carried across one search round trip: the query the caller
//! builds and the typed result the parser hands back.
//!
//! ## Design Principles
//!
//! 1. **Per-Call Values**: Nothing here outlives a single query.
//! 2. **Structural Invariants**: Filter payloads are a sum type, so a range
//!    filter cannot also carry a value list.
//! 3. **Schema-Aligned Attributes**: `Match::attrs[i]` is described by
//!    `SphinxResult::attributes[i]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{AttrType, MatchMode, RankMode, SortMode, DEFAULT_INDEX};

/// Paging and scan limits for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Distance from the beginning of the result set.
    pub offset: u32,
    /// Number of matches to return.
    pub limit: u32,
    /// Stop scanning after this many matches (0 = no cutoff).
    pub cutoff: u32,
    /// Result set cap kept in server memory.
    pub max_matches: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            offset: 0,
            limit: 20,
            cutoff: 0,
            max_matches: 1000,
        }
    }
}

/// Name/weight pair used for both per-field and per-index weighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWeight {
    pub name: String,
    pub weight: u32,
}

impl FieldWeight {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        FieldWeight {
            name: name.into(),
            weight,
        }
    }
}

/// Payload of a filter, selected by its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Attribute must equal one of these values. Never empty on the wire.
    Values(Vec<u64>),
    /// Inclusive integer range.
    Range { min: u64, max: u64 },
    /// Inclusive float range.
    FloatRange { min: f32, max: f32 },
}

impl FilterKind {
    /// Wire code of the filter kind.
    pub const fn code(&self) -> u32 {
        match self {
            FilterKind::Values(_) => crate::protocol::FILTER_VALUES,
            FilterKind::Range { .. } => crate::protocol::FILTER_RANGE,
            FilterKind::FloatRange { .. } => crate::protocol::FILTER_FLOATRANGE,
        }
    }
}

/// One attribute filter of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterValue {
    pub attribute: String,
    pub kind: FilterKind,
    /// Inverts the match when set.
    pub exclude: bool,
}

impl FilterValue {
    /// Filter matching any of `values`.
    pub fn values(attribute: impl Into<String>, values: Vec<u64>) -> Self {
        FilterValue {
            attribute: attribute.into(),
            kind: FilterKind::Values(values),
            exclude: false,
        }
    }

    /// Filter matching the inclusive integer range `[min, max]`.
    pub fn range(attribute: impl Into<String>, min: u64, max: u64) -> Self {
        FilterValue {
            attribute: attribute.into(),
            kind: FilterKind::Range { min, max },
            exclude: false,
        }
    }

    /// Filter matching the inclusive float range `[min, max]`.
    pub fn float_range(attribute: impl Into<String>, min: f32, max: f32) -> Self {
        FilterValue {
            attribute: attribute.into(),
            kind: FilterKind::FloatRange { min, max },
            exclude: false,
        }
    }

    /// Returns the same filter with its sense inverted.
    pub fn excluding(mut self) -> Self {
        self.exclude = true;
        self
    }
}

/// A structured search query.
///
/// Owned by the caller; the request builder only borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphinxQuery {
    pub keywords: String,
    /// Index to search; `"*"` searches all of them.
    pub index: String,
    pub match_mode: MatchMode,
    pub rank_mode: RankMode,
    pub sort_mode: SortMode,
    pub sort_by: String,
    pub filters: Vec<FilterValue>,
    pub limits: Limits,
    pub field_weights: Vec<FieldWeight>,
    pub index_weights: Vec<FieldWeight>,
    /// Inclusive document id range; `0..=0` means unbounded.
    pub min_id: u64,
    pub max_id: u64,
    /// Server-side time budget, sent in whole milliseconds (0 = no limit).
    pub max_query_time: Duration,
    pub comment: String,
}

impl Default for SphinxQuery {
    fn default() -> Self {
        SphinxQuery {
            keywords: String::new(),
            index: DEFAULT_INDEX.to_string(),
            match_mode: MatchMode::default(),
            rank_mode: RankMode::default(),
            sort_mode: SortMode::default(),
            sort_by: String::new(),
            filters: Vec::new(),
            limits: Limits::default(),
            field_weights: Vec::new(),
            index_weights: Vec::new(),
            min_id: 0,
            max_id: 0,
            max_query_time: Duration::ZERO,
            comment: String::new(),
        }
    }
}

impl SphinxQuery {
    /// Creates a query with default limits. An empty `index` means all
    /// indexes.
    pub fn new_search(
        keywords: impl Into<String>,
        index: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        let index = index.into();
        SphinxQuery {
            keywords: keywords.into(),
            index: if index.is_empty() {
                DEFAULT_INDEX.to_string()
            } else {
                index
            },
            comment: comment.into(),
            ..SphinxQuery::default()
        }
    }

    /// Replaces all filters.
    pub fn set_filters(&mut self, filters: impl IntoIterator<Item = FilterValue>) {
        self.filters = filters.into_iter().collect();
    }

    /// Replaces all per-field weights.
    pub fn set_field_weights(&mut self, weights: impl IntoIterator<Item = FieldWeight>) {
        self.field_weights = weights.into_iter().collect();
    }

    /// Replaces all per-index weights.
    pub fn set_index_weights(&mut self, weights: impl IntoIterator<Item = FieldWeight>) {
        self.index_weights = weights.into_iter().collect();
    }

    pub fn set_match_mode(&mut self, mode: MatchMode) {
        self.match_mode = mode;
    }

    pub fn set_ranking_mode(&mut self, mode: RankMode) {
        self.rank_mode = mode;
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
    }
}

/// One entry of the attribute schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrDef {
    pub name: String,
    pub attr_type: AttrType,
}

/// A single decoded attribute value.
///
/// The variant is chosen by the schema type at the same position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Integer, timestamp, ordinal, bool and unknown types.
    Int(u32),
    BigInt(i64),
    Float(f32),
    String(String),
    /// Multi-valued attribute (32-bit elements widened, 64-bit elements
    /// reduced to their low-order word).
    Multi(Vec<u64>),
}

/// One result document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub doc_id: u64,
    pub weight: u32,
    pub attrs: Vec<AttrValue>,
}

/// Per-keyword statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    /// Number of documents containing the keyword.
    pub docs: u32,
    /// Total number of occurrences.
    pub hits: u32,
}

/// Decoded result of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphinxResult {
    pub fields: Vec<String>,
    pub attributes: Vec<AttrDef>,
    pub matches: Vec<Match>,
    /// Matches retrieved before the cutoff.
    pub total: u32,
    /// Total matches found in the index.
    pub total_found: u32,
    pub time: Duration,
    pub words: Vec<Word>,
    /// Document ids were sent as 64-bit values.
    pub id64: bool,
    /// Warning text reported by the server, if any.
    pub warning: Option<String>,
}

impl SphinxResult {
    /// Looks up an attribute value of a match by attribute name.
    pub fn attr<'a>(&self, m: &'a Match, name: &str) -> Option<&'a AttrValue> {
        let idx = self.attributes.iter().position(|def| def.name == name)?;
        m.attrs.get(idx)
    }
}
