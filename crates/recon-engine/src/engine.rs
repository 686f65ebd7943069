//! End-to-end orchestration of a reconciliation run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use recon_connector::{SelectionSource, Source, SourceProvider, TargetWriter};

use crate::apply::{ApplyOutcome, CancelFlag, Transaction, TransactionalApplier};
use crate::changeset::{ChangeOperation, ChangesetBuilder};
use crate::differ::{AssetDiff, DiffStatistics, Differ, DifferConfig};
use crate::error::{ReconError, ReconResult};
use crate::matcher::{Matcher, MatcherConfig};
use crate::record::normalize_records;
use crate::report::{ApplySummary, DiffExport, ReconciliationReport};
use crate::sorter::sort_diffs;

/// Configuration for a full engine instance.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Matching configuration.
    pub matcher: MatcherConfig,
    /// Diffing configuration.
    pub differ: DifferConfig,
    /// Apply configuration.
    pub applier: crate::apply::ApplierConfig,
}

/// Diff stage output: sorted diffs plus run counters.
#[derive(Debug, Clone)]
pub struct DiffRun {
    /// Run identifier, carried through to the final report.
    pub run_id: Uuid,
    /// When the fetch started.
    pub started_at: DateTime<Utc>,
    /// Sorted per-asset diffs.
    pub diffs: Vec<AssetDiff>,
    /// Counters accumulated while diffing.
    pub statistics: DiffStatistics,
}

impl DiffRun {
    /// Export the diffs as JSON.
    pub fn export(&self) -> ReconResult<String> {
        DiffExport::new(&self.diffs, self.statistics.clone()).to_json()
    }
}

/// Drives the reconciliation pipeline: fetch, normalize, match, diff,
/// sort, fold selections, apply.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    matcher: Matcher,
    differ: Differ,
    applier: TransactionalApplier,
}

impl ReconciliationEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            matcher: Matcher::with_config(config.matcher),
            differ: Differ::with_config(config.differ),
            applier: TransactionalApplier::with_config(config.applier),
        }
    }

    /// Fetch both sources, normalize, match, diff, and sort.
    pub async fn run_diff(&self, provider: &dyn SourceProvider) -> ReconResult<DiffRun> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, "Starting reconciliation diff");

        let left_raw = provider
            .fetch_records(Source::Monitoring)
            .await
            .map_err(|e| ReconError::provider(Source::Monitoring, e.to_string()))?;
        let right_raw = provider
            .fetch_records(Source::ServiceDesk)
            .await
            .map_err(|e| ReconError::provider(Source::ServiceDesk, e.to_string()))?;

        tracing::info!(
            run_id = %run_id,
            monitoring = left_raw.len(),
            service_desk = right_raw.len(),
            "Fetched records from both sources"
        );

        let left = normalize_records(Source::Monitoring, left_raw)?;
        let right = normalize_records(Source::ServiceDesk, right_raw)?;

        let pairs = self.matcher.match_records(left, right);
        let (mut diffs, statistics) = self.differ.diff_all(pairs);
        sort_diffs(&mut diffs);

        tracing::info!(
            run_id = %run_id,
            total = statistics.total_assets,
            matched = statistics.matched_assets,
            with_differences = statistics.assets_with_differences,
            "Diff stage complete"
        );

        Ok(DiffRun {
            run_id,
            started_at,
            diffs,
            statistics,
        })
    }

    /// Drain a selection source into the builder.
    ///
    /// Stops at the source's end-of-stream; a terminated source simply
    /// stops yielding, and whatever was accumulated up to that point
    /// stands. Returns the number of selections taken.
    pub async fn collect_selections(
        &self,
        source: &mut dyn SelectionSource,
        builder: &mut ChangesetBuilder,
    ) -> ReconResult<usize> {
        let mut taken = 0;
        while let Some(selection) = source
            .next_selection()
            .await
            .map_err(|e| ReconError::selection(e.to_string()))?
        {
            builder.push(selection);
            taken += 1;
        }
        tracing::debug!(selections = taken, "Selection stream drained");
        Ok(taken)
    }

    /// Fold accumulated selections into a sorted changeset.
    #[must_use]
    pub fn build_changeset(
        &self,
        builder: &ChangesetBuilder,
        diffs: &[AssetDiff],
    ) -> Vec<ChangeOperation> {
        builder.build(diffs)
    }

    /// Execute a changeset as one transaction.
    pub async fn apply(
        &self,
        operations: Vec<ChangeOperation>,
        writer: Arc<dyn TargetWriter>,
        cancel: CancelFlag,
    ) -> ReconResult<ApplyOutcome> {
        let transaction = Transaction::new(operations);
        self.applier.apply(transaction, writer, cancel).await
    }

    /// Applier in use, for rollback directives.
    #[must_use]
    pub fn applier(&self) -> &TransactionalApplier {
        &self.applier
    }

    /// Assemble the end-of-run report.
    #[must_use]
    pub fn report(&self, run: &DiffRun, apply: Option<ApplySummary>) -> ReconciliationReport {
        ReconciliationReport::new(run.run_id, run.started_at, run.statistics.clone(), apply)
    }
}
