//! Record matcher.
//!
//! Pairs records across the two sources so that every input record lands
//! in exactly one [`MatchPair`]. An exact pass pairs records whose
//! normalized identifiers are equal; a fuzzy pass scores the remainder
//! with weighted string similarity and resolves ambiguity by greedy
//! maximum-weight matching with a deterministic tie-break.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::record::AssetRecord;

/// How a pair was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Normalized identifier equality only.
    Exact,
    /// Weighted string-similarity scoring only.
    Fuzzy,
    /// Exact pass first, fuzzy pass over the remainder.
    Smart,
}

impl MatchStrategy {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::Smart => "smart",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which sources a pair covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// The asset was found in both sources.
    Both,
    /// Only the monitoring system has the asset.
    LeftOnly,
    /// Only the service desk has the asset.
    RightOnly,
}

/// A pairing of records across the two sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPair {
    /// Monitoring-side record, absent for `RightOnly`.
    pub left: Option<AssetRecord>,
    /// Service-desk-side record, absent for `LeftOnly`.
    pub right: Option<AssetRecord>,
    /// Matcher certainty in [0, 1] that both denote the same asset.
    pub confidence: f64,
    /// Strategy that produced the pair.
    pub strategy: MatchStrategy,
    /// Which sources the pair covers.
    pub presence: Presence,
}

impl MatchPair {
    /// The asset identifier for this pair, preferring the left side.
    #[must_use]
    pub fn asset_id(&self) -> &str {
        self.left
            .as_ref()
            .or(self.right.as_ref())
            .map_or("", |r| r.asset_id.as_str())
    }
}

/// Matcher configuration.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Matching strategy.
    pub strategy: MatchStrategy,
    /// Minimum similarity score for a fuzzy candidate.
    pub threshold: f64,
    /// Weight given to asset-identifier similarity.
    pub id_weight: f64,
    /// Per-field weights for fuzzy scoring. Fields absent on either side
    /// contribute nothing.
    pub field_weights: Vec<(String, f64)>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::Smart,
            threshold: 0.7,
            id_weight: 1.0,
            field_weights: Vec::new(),
        }
    }
}

/// Pairs records across the two sources.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    /// Create a matcher with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a matcher with custom configuration.
    #[must_use]
    pub fn with_config(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Pair every record on either side into exactly one [`MatchPair`].
    ///
    /// Inputs must already be normalized; duplicate identifiers within a
    /// source are rejected upstream.
    #[must_use]
    pub fn match_records(
        &self,
        left: Vec<AssetRecord>,
        right: Vec<AssetRecord>,
    ) -> Vec<MatchPair> {
        let mut pairs = Vec::new();
        let mut left_pool: Vec<AssetRecord> = left;
        let mut right_pool: Vec<AssetRecord> = right;

        if matches!(
            self.config.strategy,
            MatchStrategy::Exact | MatchStrategy::Smart
        ) {
            self.exact_pass(&mut left_pool, &mut right_pool, &mut pairs);
        }

        if matches!(
            self.config.strategy,
            MatchStrategy::Fuzzy | MatchStrategy::Smart
        ) {
            self.fuzzy_pass(&mut left_pool, &mut right_pool, &mut pairs);
        }

        for record in left_pool {
            pairs.push(MatchPair {
                left: Some(record),
                right: None,
                confidence: 0.0,
                strategy: self.config.strategy,
                presence: Presence::LeftOnly,
            });
        }
        for record in right_pool {
            pairs.push(MatchPair {
                left: None,
                right: Some(record),
                confidence: 0.0,
                strategy: self.config.strategy,
                presence: Presence::RightOnly,
            });
        }

        tracing::debug!(
            pairs = pairs.len(),
            both = pairs.iter().filter(|p| p.presence == Presence::Both).count(),
            "Matched source records"
        );

        pairs
    }

    /// Pair records whose normalized identifiers are equal.
    fn exact_pass(
        &self,
        left_pool: &mut Vec<AssetRecord>,
        right_pool: &mut Vec<AssetRecord>,
        pairs: &mut Vec<MatchPair>,
    ) {
        // BTreeMap keeps the pass order-independent of input ordering.
        let mut right_index: BTreeMap<String, AssetRecord> = BTreeMap::new();
        for record in right_pool.drain(..) {
            right_index.insert(normalize_id(&record.asset_id), record);
        }

        let mut unmatched_left = Vec::new();
        for record in left_pool.drain(..) {
            match right_index.remove(&normalize_id(&record.asset_id)) {
                Some(right) => pairs.push(MatchPair {
                    left: Some(record),
                    right: Some(right),
                    confidence: 1.0,
                    strategy: MatchStrategy::Exact,
                    presence: Presence::Both,
                }),
                None => unmatched_left.push(record),
            }
        }

        *left_pool = unmatched_left;
        *right_pool = right_index.into_values().collect();
    }

    /// Greedy maximum-weight matching over the remaining records.
    fn fuzzy_pass(
        &self,
        left_pool: &mut Vec<AssetRecord>,
        right_pool: &mut Vec<AssetRecord>,
        pairs: &mut Vec<MatchPair>,
    ) {
        if left_pool.is_empty() || right_pool.is_empty() {
            return;
        }

        // Score every cross pair above the threshold.
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (li, left) in left_pool.iter().enumerate() {
            for (ri, right) in right_pool.iter().enumerate() {
                let score = self.similarity(left, right);
                if score >= self.config.threshold {
                    candidates.push((score, li, ri));
                }
            }
        }

        // Highest score first; ties break by lexicographically smaller
        // (left id, right id) so the pass is deterministic.
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| left_pool[a.1].asset_id.cmp(&left_pool[b.1].asset_id))
                .then_with(|| right_pool[a.2].asset_id.cmp(&right_pool[b.2].asset_id))
        });

        let mut left_taken = vec![false; left_pool.len()];
        let mut right_taken = vec![false; right_pool.len()];
        let mut matched: Vec<(usize, usize, f64)> = Vec::new();

        let mut iter = candidates.iter().peekable();
        while let Some(&(score, li, ri)) = iter.next() {
            if left_taken[li] || right_taken[ri] {
                continue;
            }
            if let Some(&&(next_score, nli, nri)) = iter.peek() {
                if (next_score - score).abs() < f64::EPSILON
                    && !left_taken[nli]
                    && !right_taken[nri]
                    && (nli == li || nri == ri)
                {
                    tracing::warn!(
                        left_id = %left_pool[li].asset_id,
                        score = score,
                        "Ambiguous fuzzy match resolved by identifier tie-break"
                    );
                }
            }
            left_taken[li] = true;
            right_taken[ri] = true;
            matched.push((li, ri, score));
        }

        // Drain the pools, emitting matched pairs and keeping leftovers.
        let left_records: Vec<AssetRecord> = left_pool.drain(..).collect();
        let mut right_records: Vec<Option<AssetRecord>> =
            right_pool.drain(..).map(Some).collect();

        let mut matched_by_left: BTreeMap<usize, (usize, f64)> = BTreeMap::new();
        for (li, ri, score) in matched {
            matched_by_left.insert(li, (ri, score));
        }

        for (li, record) in left_records.into_iter().enumerate() {
            if let Some(&(ri, score)) = matched_by_left.get(&li) {
                if let Some(right) = right_records[ri].take() {
                    pairs.push(MatchPair {
                        left: Some(record),
                        right: Some(right),
                        confidence: score,
                        strategy: MatchStrategy::Fuzzy,
                        presence: Presence::Both,
                    });
                    continue;
                }
            }
            left_pool.push(record);
        }
        right_pool.extend(right_records.into_iter().flatten());
    }

    /// Weighted similarity score for a candidate pair.
    ///
    /// The asset identifier and each configured field contribute a
    /// combined Levenshtein / Jaro-Winkler score scaled by their weight.
    fn similarity(&self, left: &AssetRecord, right: &AssetRecord) -> f64 {
        let mut total_weight = self.config.id_weight;
        let mut weighted_sum = self.config.id_weight
            * string_similarity(&normalize_id(&left.asset_id), &normalize_id(&right.asset_id));

        for (field, weight) in &self.config.field_weights {
            let (Some(Some(lv)), Some(Some(rv))) =
                (left.fields.get(field), right.fields.get(field))
            else {
                continue;
            };
            total_weight += weight;
            weighted_sum += weight * string_similarity(&lv.to_lowercase(), &rv.to_lowercase());
        }

        if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        }
    }
}

/// Identifier normalization for matching: case-fold and trim.
fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Combined similarity of two already-normalized strings.
fn string_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    (normalized_levenshtein(a, b) + jaro_winkler(a, b)) / 2.0
}
