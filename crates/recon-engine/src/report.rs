//! Serializable exports of a reconciliation run.
//!
//! Serialization happens here and nowhere else: the pipeline types carry
//! serde derives, and this module is the boundary that turns a run into
//! JSON for front-ends or archival.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::apply::ApplyResult;
use crate::differ::{AssetDiff, DiffStatistics, DiffStatus, FieldDifference};
use crate::error::ReconResult;
use crate::matcher::{MatchStrategy, Presence};

/// Aggregate counts over one apply (or rollback) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// Operations in the run.
    pub total: u64,
    /// Operations that succeeded.
    pub successful: u64,
    /// Operations that failed after exhausting retries.
    pub failed: u64,
    /// Operations never attempted.
    pub skipped: u64,
}

impl ApplySummary {
    /// Tally a result list.
    #[must_use]
    pub fn from_results(results: &[ApplyResult]) -> Self {
        use crate::apply::ApplyStatus;

        let mut summary = Self {
            total: results.len() as u64,
            ..Self::default()
        };
        for result in results {
            match result.status {
                ApplyStatus::Success => summary.successful += 1,
                ApplyStatus::Failed => summary.failed += 1,
                ApplyStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Whether every operation succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.successful == self.total
    }
}

/// One asset's diff, flattened for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffExportEntry {
    /// Asset identifier.
    pub asset_id: String,
    /// Where the asset was found.
    pub presence: Presence,
    /// Match confidence (1.0 for exact, 0.0 for unmatched).
    pub confidence: f64,
    /// Strategy that produced the match.
    pub strategy: MatchStrategy,
    /// Non-identical field classifications in display order. Identical
    /// fields carry no decision to make and are not exported.
    pub differences: Vec<FieldDifference>,
    /// Presence note for single-source assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&AssetDiff> for DiffExportEntry {
    fn from(diff: &AssetDiff) -> Self {
        Self {
            asset_id: diff.asset_id.clone(),
            presence: diff.pair.presence,
            confidence: diff.pair.confidence,
            strategy: diff.pair.strategy,
            differences: diff
                .differences
                .iter()
                .filter(|d| d.status != DiffStatus::Identical)
                .cloned()
                .collect(),
            note: diff.note.clone(),
        }
    }
}

/// Full diff report for one reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffExport {
    /// When the export was produced.
    pub generated_at: DateTime<Utc>,
    /// Run counters.
    pub statistics: DiffStatistics,
    /// Per-asset entries, in the order the diffs were given (sorted when
    /// they came out of the engine).
    pub entries: Vec<DiffExportEntry>,
}

impl DiffExport {
    /// Flatten sorted diffs and their statistics into an export.
    #[must_use]
    pub fn new(diffs: &[AssetDiff], statistics: DiffStatistics) -> Self {
        Self {
            generated_at: Utc::now(),
            statistics,
            entries: diffs.iter().map(DiffExportEntry::from).collect(),
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> ReconResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// End-of-run report covering the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the report was produced.
    pub finished_at: DateTime<Utc>,
    /// Diff counters.
    pub statistics: DiffStatistics,
    /// Percentage of assets matched across both sources.
    pub match_rate: f64,
    /// Percentage of matched assets carrying differences.
    pub difference_rate: f64,
    /// Apply counts, absent when the run stopped at the diff stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplySummary>,
}

impl ReconciliationReport {
    /// Assemble a report from run outputs.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        statistics: DiffStatistics,
        apply: Option<ApplySummary>,
    ) -> Self {
        let match_rate = statistics.match_rate();
        let difference_rate = statistics.difference_rate();
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            statistics,
            match_rate,
            difference_rate,
            apply,
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> ReconResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
