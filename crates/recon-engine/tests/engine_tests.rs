//! End-to-end tests of the reconciliation pipeline against in-memory
//! source and target fakes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use recon_connector::{
    ConnectorError, ConnectorResult, FieldMap, RawRecord, RetryConfig, Selection, SelectionOrigin,
    SelectionSource, Source, SourceProvider, TargetWriter,
};
use recon_engine::{
    ApplierConfig, ApplyStatus, CancelFlag, ChangeKind, ChangeOperation, ChangesetBuilder,
    DiffStatus, EngineConfig, ReconciliationEngine, Transaction, TransactionState,
    TransactionalApplier,
};

fn fields(entries: &[(&str, Option<&str>)]) -> FieldMap {
    entries
        .iter()
        .map(|(n, v)| ((*n).to_string(), v.map(String::from)))
        .collect()
}

/// In-memory provider serving fixed record sets per source.
struct FakeProvider {
    monitoring: Vec<RawRecord>,
    service_desk: Vec<RawRecord>,
}

#[async_trait]
impl SourceProvider for FakeProvider {
    async fn fetch_records(&self, source: Source) -> ConnectorResult<Vec<RawRecord>> {
        Ok(match source {
            Source::Monitoring => self.monitoring.clone(),
            Source::ServiceDesk => self.service_desk.clone(),
        })
    }
}

/// Scripted selection stream.
struct ScriptedSelections {
    queue: VecDeque<Selection>,
}

impl ScriptedSelections {
    fn new(selections: Vec<Selection>) -> Self {
        Self {
            queue: selections.into(),
        }
    }
}

#[async_trait]
impl SelectionSource for ScriptedSelections {
    async fn next_selection(&mut self) -> ConnectorResult<Option<Selection>> {
        Ok(self.queue.pop_front())
    }
}

/// In-memory target with scriptable per-asset write failures and a call
/// log for asserting write order.
#[derive(Default)]
struct FakeWriter {
    store: Mutex<BTreeMap<String, FieldMap>>,
    failures: Mutex<HashMap<String, VecDeque<ConnectorError>>>,
    log: Mutex<Vec<String>>,
}

impl FakeWriter {
    fn new() -> Self {
        Self::default()
    }

    async fn seed(&self, asset_id: &str, fields: FieldMap) {
        self.store.lock().await.insert(asset_id.to_string(), fields);
    }

    /// Queue errors that the next writes for `asset_id` will return, in
    /// order, before writes start succeeding again.
    async fn fail_next(&self, asset_id: &str, errors: Vec<ConnectorError>) {
        self.failures
            .lock()
            .await
            .entry(asset_id.to_string())
            .or_default()
            .extend(errors);
    }

    async fn stored(&self, asset_id: &str) -> Option<FieldMap> {
        self.store.lock().await.get(asset_id).cloned()
    }

    async fn log(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    async fn take_failure(&self, asset_id: &str) -> Option<ConnectorError> {
        self.failures
            .lock()
            .await
            .get_mut(asset_id)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl TargetWriter for FakeWriter {
    async fn read_fields(&self, asset_id: &str) -> ConnectorResult<Option<FieldMap>> {
        Ok(self.store.lock().await.get(asset_id).cloned())
    }

    async fn create(&self, asset_id: &str, fields: &FieldMap) -> ConnectorResult<()> {
        if let Some(err) = self.take_failure(asset_id).await {
            return Err(err);
        }
        self.log.lock().await.push(format!("create {asset_id}"));
        self.store
            .lock()
            .await
            .insert(asset_id.to_string(), fields.clone());
        Ok(())
    }

    async fn update(&self, asset_id: &str, fields: &FieldMap) -> ConnectorResult<()> {
        if let Some(err) = self.take_failure(asset_id).await {
            return Err(err);
        }
        self.log.lock().await.push(format!("update {asset_id}"));
        let mut store = self.store.lock().await;
        let existing = store.entry(asset_id.to_string()).or_default();
        for (name, value) in fields.iter() {
            existing.insert(name, value.map(String::from));
        }
        Ok(())
    }

    async fn delete(&self, asset_id: &str) -> ConnectorResult<()> {
        if let Some(err) = self.take_failure(asset_id).await {
            return Err(err);
        }
        self.log.lock().await.push(format!("delete {asset_id}"));
        self.store.lock().await.remove(asset_id);
        Ok(())
    }
}

fn fast_applier_config() -> ApplierConfig {
    ApplierConfig {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        },
        op_timeout: Duration::from_secs(5),
        ..ApplierConfig::default()
    }
}

fn update_op(asset_id: &str, entries: &[(&str, Option<&str>)], sequence: u64) -> ChangeOperation {
    ChangeOperation {
        asset_id: asset_id.to_string(),
        kind: ChangeKind::Update,
        fields: fields(entries),
        sequence,
    }
}

#[tokio::test]
async fn test_end_to_end_diff_select_apply() {
    let provider = FakeProvider {
        monitoring: vec![
            RawRecord::new("srv1", fields(&[("ip", Some("10.0.0.1")), ("os", Some("Ubuntu"))])),
            RawRecord::new("srv2", fields(&[("ip", Some("10.0.0.2"))])),
        ],
        service_desk: vec![
            RawRecord::new("srv1", fields(&[("ip", Some("10.0.0.9")), ("os", Some("Ubuntu"))])),
            RawRecord::new("printer7", fields(&[("owner", Some("Facilities"))])),
        ],
    };

    let engine = ReconciliationEngine::with_config(EngineConfig {
        applier: fast_applier_config(),
        ..EngineConfig::default()
    });

    let run = engine.run_diff(&provider).await.unwrap();
    assert_eq!(run.statistics.total_assets, 3);
    assert_eq!(run.statistics.matched_assets, 1);
    assert_eq!(run.statistics.left_only_assets, 1);
    assert_eq!(run.statistics.right_only_assets, 1);

    // Natural order: printer7, srv1, srv2.
    let ids: Vec<&str> = run.diffs.iter().map(|d| d.asset_id.as_str()).collect();
    assert_eq!(ids, vec!["printer7", "srv1", "srv2"]);

    let srv1 = run.diffs.iter().find(|d| d.asset_id == "srv1").unwrap();
    let ip = srv1
        .differences
        .iter()
        .find(|d| d.field_name == "ip")
        .unwrap();
    assert_eq!(ip.status, DiffStatus::Conflict);

    // Take the monitoring-side ip for srv1 and create srv2 outright.
    let mut selections = ScriptedSelections::new(vec![
        Selection::new("srv1", "ip", Some("10.0.0.1".into()), SelectionOrigin::Left),
        Selection::new("srv2", "ip", Some("10.0.0.2".into()), SelectionOrigin::Left),
    ]);
    let mut builder = ChangesetBuilder::new();
    let taken = engine
        .collect_selections(&mut selections, &mut builder)
        .await
        .unwrap();
    assert_eq!(taken, 2);

    let operations = engine.build_changeset(&builder, &run.diffs);
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].asset_id, "srv1");
    assert_eq!(operations[0].kind, ChangeKind::Update);
    assert_eq!(operations[1].asset_id, "srv2");
    assert_eq!(operations[1].kind, ChangeKind::Create);

    let writer = Arc::new(FakeWriter::new());
    writer
        .seed("srv1", fields(&[("ip", Some("10.0.0.9")), ("os", Some("Ubuntu"))]))
        .await;

    let outcome = engine
        .apply(operations, writer.clone(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(outcome.transaction.state, TransactionState::Committed);
    assert!(outcome.summary.is_clean());
    assert!(outcome.transaction.ensure_complete().is_ok());

    let srv1 = writer.stored("srv1").await.unwrap();
    assert_eq!(srv1.get("ip"), Some(&Some("10.0.0.1".to_string())));
    assert!(writer.stored("srv2").await.is_some());

    let report = engine.report(&run, Some(outcome.summary));
    let json = report.to_json().unwrap();
    assert!(json.contains("\"successful\": 2"));
}

#[tokio::test]
async fn test_partial_failure_never_halts_the_batch() {
    let writer = Arc::new(FakeWriter::new());
    for id in ["srv1", "srv2", "srv3", "srv4", "srv5"] {
        writer.seed(id, fields(&[("os", Some("old"))])).await;
    }
    writer
        .fail_next(
            "srv3",
            vec![ConnectorError::validation_rejected("srv3", "bad value")],
        )
        .await;

    let operations: Vec<ChangeOperation> = ["srv1", "srv2", "srv3", "srv4", "srv5"]
        .iter()
        .enumerate()
        .map(|(i, id)| update_op(id, &[("os", Some("new"))], i as u64))
        .collect();

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(Transaction::new(operations), writer.clone(), CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(outcome.summary.successful, 4);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.transaction.state, TransactionState::PartiallyFailed);
    assert!(outcome.transaction.ensure_complete().is_err());

    let failed = outcome
        .results
        .iter()
        .find(|r| r.status == ApplyStatus::Failed)
        .unwrap();
    assert_eq!(failed.operation.asset_id, "srv3");
    // Non-retryable failure: exactly one attempt.
    assert_eq!(failed.attempt_count, 1);
    assert!(!failed.error.as_ref().unwrap().retryable);

    // The writes after the failure still landed.
    assert_eq!(
        writer.stored("srv5").await.unwrap().get("os"),
        Some(&Some("new".to_string()))
    );
    assert_eq!(
        writer.stored("srv3").await.unwrap().get("os"),
        Some(&Some("old".to_string()))
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried_to_success() {
    let writer = Arc::new(FakeWriter::new());
    writer.seed("srv1", fields(&[("os", Some("old"))])).await;
    writer
        .fail_next(
            "srv1",
            vec![
                ConnectorError::connection_failed("refused"),
                ConnectorError::rate_limited("429"),
            ],
        )
        .await;

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(
            Transaction::new(vec![update_op("srv1", &[("os", Some("new"))], 0)]),
            writer.clone(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.results[0].status, ApplyStatus::Success);
    assert_eq!(outcome.results[0].attempt_count, 3);
    assert_eq!(outcome.transaction.state, TransactionState::Committed);
}

#[tokio::test]
async fn test_retry_exhaustion_marks_operation_failed() {
    let writer = Arc::new(FakeWriter::new());
    writer.seed("srv1", fields(&[("os", Some("old"))])).await;
    writer
        .fail_next(
            "srv1",
            (0..5)
                .map(|_| ConnectorError::connection_failed("refused"))
                .collect(),
        )
        .await;

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(
            Transaction::new(vec![update_op("srv1", &[("os", Some("new"))], 0)]),
            writer.clone(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

    let result = &outcome.results[0];
    assert_eq!(result.status, ApplyStatus::Failed);
    assert_eq!(result.attempt_count, 3);
    assert!(result.error.as_ref().unwrap().retryable);
    assert_eq!(outcome.transaction.state, TransactionState::PartiallyFailed);
}

#[tokio::test]
async fn test_cancellation_skips_unattempted_operations() {
    let writer = Arc::new(FakeWriter::new());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let operations: Vec<ChangeOperation> = (0..4)
        .map(|i| update_op(&format!("srv{i}"), &[("os", Some("new"))], i))
        .collect();

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(Transaction::new(operations), writer.clone(), cancel)
        .await
        .unwrap();

    assert_eq!(outcome.summary.skipped, 4);
    assert_eq!(outcome.summary.successful, 0);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.status == ApplyStatus::Skipped && r.attempt_count == 0));
    // Cancellation leaves nothing committed.
    assert_eq!(outcome.transaction.state, TransactionState::PartiallyFailed);
    assert!(writer.log().await.is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let writer = Arc::new(FakeWriter::new());
    let applier = TransactionalApplier::with_config(ApplierConfig {
        dry_run: true,
        ..fast_applier_config()
    });

    let outcome = applier
        .apply(
            Transaction::new(vec![update_op("srv1", &[("os", Some("new"))], 0)]),
            writer.clone(),
            CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(outcome.summary.is_clean());
    assert!(writer.log().await.is_empty());
    assert!(writer.stored("srv1").await.is_none());
}

#[tokio::test]
async fn test_rollback_replays_before_images_in_reverse_order() {
    let writer = Arc::new(FakeWriter::new());
    writer.seed("srv1", fields(&[("ip", Some("10.0.0.9"))])).await;
    writer
        .fail_next(
            "zzz9",
            vec![ConnectorError::validation_rejected("zzz9", "rejected")],
        )
        .await;

    let operations = vec![
        ChangeOperation {
            asset_id: "new1".to_string(),
            kind: ChangeKind::Create,
            fields: fields(&[("ip", Some("10.0.0.3"))]),
            sequence: 0,
        },
        update_op("srv1", &[("ip", Some("10.0.0.1"))], 1),
        update_op("zzz9", &[("os", Some("new"))], 2),
    ];

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(Transaction::new(operations), writer.clone(), CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(outcome.summary.successful, 2);
    assert_eq!(outcome.summary.failed, 1);

    let rollback = applier
        .rollback(outcome.transaction, writer.clone())
        .await
        .unwrap();

    assert_eq!(rollback.transaction.state, TransactionState::RolledBack);
    assert!(rollback.summary.is_clean());

    // Compensations run in reverse sequence order: srv1 restored first,
    // then the created asset deleted.
    let log = writer.log().await;
    let tail = &log[log.len() - 2..];
    assert_eq!(tail, &["update srv1", "delete new1"]);

    assert_eq!(
        writer.stored("srv1").await.unwrap().get("ip"),
        Some(&Some("10.0.0.9".to_string()))
    );
    assert!(writer.stored("new1").await.is_none());
}

#[tokio::test]
async fn test_rollback_rejected_for_committed_transaction() {
    let writer = Arc::new(FakeWriter::new());
    writer.seed("srv1", fields(&[("os", Some("old"))])).await;

    let applier = TransactionalApplier::with_config(fast_applier_config());
    let outcome = applier
        .apply(
            Transaction::new(vec![update_op("srv1", &[("os", Some("new"))], 0)]),
            writer.clone(),
            CancelFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.transaction.state, TransactionState::Committed);

    let err = applier.rollback(outcome.transaction, writer).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_parallel_batches_keep_results_in_sequence_order() {
    let writer = Arc::new(FakeWriter::new());
    let operations: Vec<ChangeOperation> = (0..20)
        .map(|i| update_op(&format!("srv{i}"), &[("os", Some("new"))], i))
        .collect();

    let applier = TransactionalApplier::with_config(ApplierConfig {
        batch_size: 4,
        parallel_batches: 3,
        ..fast_applier_config()
    });
    let outcome = applier
        .apply(Transaction::new(operations), writer.clone(), CancelFlag::new())
        .await
        .unwrap();

    assert!(outcome.summary.is_clean());
    let sequences: Vec<u64> = outcome.results.iter().map(|r| r.operation.sequence).collect();
    assert_eq!(sequences, (0..20).collect::<Vec<u64>>());
    assert_eq!(outcome.transaction.applied_sequences.len(), 20);
}
