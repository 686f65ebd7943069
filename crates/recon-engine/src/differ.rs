//! Field-level diffing of matched pairs.
//!
//! For a pair present in both sources, every field present in either
//! record is classified exactly once. Values were already trimmed and
//! whitespace-collapsed by the normalizer; comparison here is exact and
//! case-preserving. IP-shaped or numeric-looking values get no special
//! treatment: "10.0.0.1" and "10.0.0.01" are different strings.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::matcher::{MatchPair, Presence};

/// Classification of one field across the two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    /// Both sides agree (including both null or both absent-of-value).
    Identical,
    /// Both sides carry a value and the values differ.
    Conflict,
    /// Only the monitoring side has a value; the field is absent on the
    /// service-desk side.
    LeftOnly,
    /// Only the service-desk side has a value; the field is absent on the
    /// monitoring side.
    RightOnly,
}

impl DiffStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Identical => "identical",
            DiffStatus::Conflict => "conflict",
            DiffStatus::LeftOnly => "left_only",
            DiffStatus::RightOnly => "right_only",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One field compared across the two sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDifference {
    /// Field name.
    pub field_name: String,
    /// Monitoring-side value.
    pub left_value: Option<String>,
    /// Service-desk-side value.
    pub right_value: Option<String>,
    /// Classification.
    pub status: DiffStatus,
}

/// All field differences for one matched asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDiff {
    /// Asset identifier (unique within a reconciliation run).
    pub asset_id: String,
    /// The pair this diff was computed from.
    pub pair: MatchPair,
    /// Field classifications, in first-seen-left-then-right order.
    pub differences: Vec<FieldDifference>,
    /// Presence note when the asset exists in only one source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AssetDiff {
    /// Check whether any field needs a selection.
    #[must_use]
    pub fn has_differences(&self) -> bool {
        self.differences
            .iter()
            .any(|d| d.status != DiffStatus::Identical)
    }

    /// Count of non-identical fields.
    #[must_use]
    pub fn difference_count(&self) -> usize {
        self.differences
            .iter()
            .filter(|d| d.status != DiffStatus::Identical)
            .count()
    }
}

/// Counters accumulated over a diff run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStatistics {
    /// Assets seen in either source.
    pub total_assets: u64,
    /// Assets present in both sources.
    pub matched_assets: u64,
    /// Assets present only in the monitoring system.
    pub left_only_assets: u64,
    /// Assets present only in the service desk.
    pub right_only_assets: u64,
    /// Assets with at least one non-identical field.
    pub assets_with_differences: u64,
    /// Non-identical fields across all assets.
    pub total_differences: u64,
}

impl DiffStatistics {
    /// Percentage of assets matched across both sources.
    #[must_use]
    pub fn match_rate(&self) -> f64 {
        if self.total_assets == 0 {
            0.0
        } else {
            self.matched_assets as f64 / self.total_assets as f64 * 100.0
        }
    }

    /// Percentage of matched assets carrying differences.
    #[must_use]
    pub fn difference_rate(&self) -> f64 {
        if self.matched_assets == 0 {
            0.0
        } else {
            self.assets_with_differences as f64 / self.matched_assets as f64 * 100.0
        }
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &DiffStatistics) {
        self.total_assets += other.total_assets;
        self.matched_assets += other.matched_assets;
        self.left_only_assets += other.left_only_assets;
        self.right_only_assets += other.right_only_assets;
        self.assets_with_differences += other.assets_with_differences;
        self.total_differences += other.total_differences;
    }
}

/// Differ configuration.
#[derive(Debug, Clone, Default)]
pub struct DifferConfig {
    /// Field names excluded from comparison entirely.
    pub excluded_fields: Vec<String>,
}

/// Computes field-level differences for matched pairs.
#[derive(Debug, Clone, Default)]
pub struct Differ {
    excluded: HashSet<String>,
}

impl Differ {
    /// Create a differ with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a differ with custom configuration.
    #[must_use]
    pub fn with_config(config: DifferConfig) -> Self {
        Self {
            excluded: config.excluded_fields.into_iter().collect(),
        }
    }

    /// Diff every pair, accumulating run statistics.
    #[must_use]
    pub fn diff_all(&self, pairs: Vec<MatchPair>) -> (Vec<AssetDiff>, DiffStatistics) {
        let mut stats = DiffStatistics::default();
        let mut diffs = Vec::with_capacity(pairs.len());

        for pair in pairs {
            stats.total_assets += 1;
            match pair.presence {
                Presence::Both => stats.matched_assets += 1,
                Presence::LeftOnly => stats.left_only_assets += 1,
                Presence::RightOnly => stats.right_only_assets += 1,
            }

            let diff = self.diff_pair(pair);
            let count = diff.difference_count() as u64;
            if count > 0 {
                stats.assets_with_differences += 1;
                stats.total_differences += count;
            }
            diffs.push(diff);
        }

        tracing::debug!(
            total = stats.total_assets,
            with_differences = stats.assets_with_differences,
            "Computed asset diffs"
        );

        (diffs, stats)
    }

    /// Diff a single matched pair.
    #[must_use]
    pub fn diff_pair(&self, pair: MatchPair) -> AssetDiff {
        let asset_id = pair.asset_id().to_string();

        let (differences, note) = match pair.presence {
            Presence::Both => (self.diff_both(&pair), None),
            Presence::LeftOnly => (
                self.diff_single(&pair, DiffStatus::LeftOnly),
                Some("Asset exists only in the monitoring system".to_string()),
            ),
            Presence::RightOnly => (
                self.diff_single(&pair, DiffStatus::RightOnly),
                Some("Asset exists only in the service-desk system".to_string()),
            ),
        };

        AssetDiff {
            asset_id,
            pair,
            differences,
            note,
        }
    }

    /// Classify every field of a both-presence pair.
    ///
    /// Field order is first-seen on the left, then any left-over fields
    /// from the right.
    fn diff_both(&self, pair: &MatchPair) -> Vec<FieldDifference> {
        let (Some(left), Some(right)) = (&pair.left, &pair.right) else {
            return Vec::new();
        };

        let mut names: Vec<&str> = left.fields.names().collect();
        for name in right.fields.names() {
            if !left.fields.contains(name) {
                names.push(name);
            }
        }

        let mut differences = Vec::with_capacity(names.len());
        for name in names {
            if self.excluded.contains(name) {
                continue;
            }

            let lv = left.fields.get(name);
            let rv = right.fields.get(name);
            let status = classify(lv, rv);

            differences.push(FieldDifference {
                field_name: name.to_string(),
                left_value: lv.cloned().flatten(),
                right_value: rv.cloned().flatten(),
                status,
            });
        }
        differences
    }

    /// Every populated field on the present side of a single-presence pair.
    fn diff_single(&self, pair: &MatchPair, status: DiffStatus) -> Vec<FieldDifference> {
        let Some(record) = pair.left.as_ref().or(pair.right.as_ref()) else {
            return Vec::new();
        };

        record
            .fields
            .iter()
            .filter(|(name, value)| !self.excluded.contains(*name) && value.is_some())
            .map(|(name, value)| FieldDifference {
                field_name: name.to_string(),
                left_value: if status == DiffStatus::LeftOnly {
                    value.map(String::from)
                } else {
                    None
                },
                right_value: if status == DiffStatus::RightOnly {
                    value.map(String::from)
                } else {
                    None
                },
                status,
            })
            .collect()
    }
}

/// Classify one field given both lookups.
///
/// `None` means the field is absent entirely; `Some(None)` present but
/// null. A side with no value at all (absent or null) can never produce a
/// `Conflict` on its own: single-sided values where the other side is
/// absent become `LeftOnly`/`RightOnly`, and a null facing a value is a
/// `Conflict` only when the field exists on both sides.
fn classify(left: Option<&Option<String>>, right: Option<&Option<String>>) -> DiffStatus {
    match (left, right) {
        (Some(lv), Some(rv)) => {
            if lv == rv {
                DiffStatus::Identical
            } else {
                DiffStatus::Conflict
            }
        }
        (Some(Some(_)), None) => DiffStatus::LeftOnly,
        (None, Some(Some(_))) => DiffStatus::RightOnly,
        // Present-but-null facing an absent field: no value on either side.
        _ => DiffStatus::Identical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchStrategy, Matcher};
    use crate::record::AssetRecord;
    use recon_connector::{FieldMap, Source};

    fn fields(entries: &[(&str, Option<&str>)]) -> FieldMap {
        entries
            .iter()
            .map(|(n, v)| ((*n).to_string(), v.map(String::from)))
            .collect()
    }

    fn both_pair(left: &[(&str, Option<&str>)], right: &[(&str, Option<&str>)]) -> MatchPair {
        MatchPair {
            left: Some(AssetRecord::new(Source::Monitoring, "srv1", fields(left))),
            right: Some(AssetRecord::new(Source::ServiceDesk, "srv1", fields(right))),
            confidence: 1.0,
            strategy: MatchStrategy::Exact,
            presence: Presence::Both,
        }
    }

    #[test]
    fn test_every_field_classified_exactly_once() {
        let diff = Differ::new().diff_pair(both_pair(
            &[("a", Some("1")), ("b", Some("2"))],
            &[("b", Some("2")), ("c", Some("3"))],
        ));

        let names: Vec<&str> = diff.differences.iter().map(|d| d.field_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_field_order_is_left_first_then_right_leftovers() {
        let diff = Differ::new().diff_pair(both_pair(
            &[("z", Some("1")), ("a", Some("2"))],
            &[("m", Some("3")), ("a", Some("2"))],
        ));

        let names: Vec<&str> = diff.differences.iter().map(|d| d.field_name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_classification() {
        let diff = Differ::new().diff_pair(both_pair(
            &[
                ("same", Some("x")),
                ("differs", Some("1")),
                ("left_value", Some("l")),
                ("null_both", None),
            ],
            &[
                ("same", Some("x")),
                ("differs", Some("2")),
                ("null_both", None),
                ("right_value", Some("r")),
            ],
        ));

        let by_name = |name: &str| {
            diff.differences
                .iter()
                .find(|d| d.field_name == name)
                .map(|d| d.status)
        };
        assert_eq!(by_name("same"), Some(DiffStatus::Identical));
        assert_eq!(by_name("differs"), Some(DiffStatus::Conflict));
        assert_eq!(by_name("left_value"), Some(DiffStatus::LeftOnly));
        assert_eq!(by_name("right_value"), Some(DiffStatus::RightOnly));
        assert_eq!(by_name("null_both"), Some(DiffStatus::Identical));
    }

    #[test]
    fn test_null_facing_value_on_both_sides_is_conflict() {
        let diff = Differ::new().diff_pair(both_pair(&[("f", None)], &[("f", Some("v"))]));

        assert_eq!(diff.differences[0].status, DiffStatus::Conflict);
        assert_eq!(diff.differences[0].left_value, None);
        assert_eq!(diff.differences[0].right_value, Some("v".to_string()));
    }

    #[test]
    fn test_ip_shaped_values_compare_as_exact_strings() {
        let diff = Differ::new().diff_pair(both_pair(
            &[("ip", Some("10.0.0.1"))],
            &[("ip", Some("10.0.0.01"))],
        ));

        assert_eq!(diff.differences[0].status, DiffStatus::Conflict);
    }

    #[test]
    fn test_diff_symmetry() {
        let left = [("a", Some("1")), ("b", Some("x")), ("c", None)];
        let right = [("a", Some("2")), ("b", Some("x")), ("c", Some("v"))];

        let forward = Differ::new().diff_pair(both_pair(&left, &right));
        let swapped = Differ::new().diff_pair(both_pair(&right, &left));

        let conflicts = |d: &AssetDiff| -> Vec<String> {
            let mut names: Vec<String> = d
                .differences
                .iter()
                .filter(|fd| fd.status == DiffStatus::Conflict)
                .map(|fd| fd.field_name.clone())
                .collect();
            names.sort();
            names
        };
        assert_eq!(conflicts(&forward), conflicts(&swapped));
    }

    #[test]
    fn test_single_presence_diff_carries_note() {
        let pair = MatchPair {
            left: None,
            right: Some(AssetRecord::new(
                Source::ServiceDesk,
                "srv9",
                fields(&[("owner", Some("Alice")), ("notes", None)]),
            )),
            confidence: 0.0,
            strategy: MatchStrategy::Smart,
            presence: Presence::RightOnly,
        };

        let diff = Differ::new().diff_pair(pair);
        assert_eq!(diff.asset_id, "srv9");
        assert!(diff.note.as_deref().unwrap_or("").contains("service-desk"));
        // Only populated fields appear.
        assert_eq!(diff.differences.len(), 1);
        assert_eq!(diff.differences[0].field_name, "owner");
        assert_eq!(diff.differences[0].status, DiffStatus::RightOnly);
        assert_eq!(diff.differences[0].right_value, Some("Alice".to_string()));
    }

    #[test]
    fn test_excluded_fields_are_skipped() {
        let differ = Differ::with_config(DifferConfig {
            excluded_fields: vec!["last_updated".to_string()],
        });
        let diff = differ.diff_pair(both_pair(
            &[("last_updated", Some("a")), ("os", Some("Linux"))],
            &[("last_updated", Some("b")), ("os", Some("Linux"))],
        ));

        assert_eq!(diff.differences.len(), 1);
        assert_eq!(diff.differences[0].field_name, "os");
    }

    #[test]
    fn test_diff_all_statistics() {
        let matcher = Matcher::new();
        let pairs = matcher.match_records(
            vec![
                AssetRecord::new(Source::Monitoring, "srv1", fields(&[("ip", Some("10.0.0.1"))])),
                AssetRecord::new(Source::Monitoring, "papercut", FieldMap::new()),
            ],
            vec![AssetRecord::new(
                Source::ServiceDesk,
                "srv1",
                fields(&[("ip", Some("10.0.0.9"))]),
            )],
        );

        let (diffs, stats) = Differ::new().diff_all(pairs);
        assert_eq!(diffs.len(), 2);
        assert_eq!(stats.total_assets, 2);
        assert_eq!(stats.matched_assets, 1);
        assert_eq!(stats.left_only_assets, 1);
        assert_eq!(stats.assets_with_differences, 1);
        assert_eq!(stats.total_differences, 1);
        assert!((stats.match_rate() - 50.0).abs() < f64::EPSILON);
    }
}
