//! Batched, retrying executor for change operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use recon_connector::{ConnectorError, FieldMap, RetryConfig, TargetWriter};

use crate::changeset::{ChangeKind, ChangeOperation};
use crate::error::ReconResult;
use crate::report::ApplySummary;

use super::transaction::{BeforeImage, Transaction, TransactionState};

/// Applier configuration.
#[derive(Debug, Clone)]
pub struct ApplierConfig {
    /// Operations per batch.
    pub batch_size: usize,
    /// Retry policy for retryable write failures.
    pub retry: RetryConfig,
    /// Number of batches allowed to run concurrently (1 = sequential).
    pub parallel_batches: usize,
    /// Timeout per individual write call. A timed-out call counts as a
    /// retryable failure.
    pub op_timeout: Duration,
    /// Classify and report without writing anything.
    pub dry_run: bool,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry: RetryConfig::default(),
            parallel_batches: 1,
            op_timeout: Duration::from_secs(30),
            dry_run: false,
        }
    }
}

/// Cooperative cancellation signal for an apply run.
///
/// Cancelling stops new operation attempts from being issued; in-flight
/// attempts run to completion and every unattempted operation reports
/// `Skipped`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Outcome classification for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// The write succeeded.
    Success,
    /// The write failed (retries exhausted or non-retryable).
    Failed,
    /// The operation was never attempted (cancellation).
    Skipped,
}

impl ApplyStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStatus::Success => "success",
            ApplyStatus::Failed => "failed",
            ApplyStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error detail recorded on a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable failure description.
    pub message: String,
    /// Whether the underlying error class was retryable.
    pub retryable: bool,
}

impl ErrorDetail {
    pub(super) fn from_error(error: &ConnectorError) -> Self {
        Self {
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Per-operation apply outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// The operation this result belongs to.
    pub operation: ChangeOperation,
    /// Outcome classification.
    pub status: ApplyStatus,
    /// Error detail for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Number of write attempts made (0 for skipped or dry-run).
    pub attempt_count: u32,
}

/// Result of a full apply run.
#[derive(Debug)]
pub struct ApplyOutcome {
    /// The transaction in its final state, with rollback bookkeeping.
    pub transaction: Transaction,
    /// One result per operation, in sequence order.
    pub results: Vec<ApplyResult>,
    /// Aggregate counts.
    pub summary: ApplySummary,
}

/// Executes transactions against the target writer.
#[derive(Debug, Clone, Default)]
pub struct TransactionalApplier {
    config: ApplierConfig,
}

impl TransactionalApplier {
    /// Create an applier with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an applier with custom configuration.
    #[must_use]
    pub fn with_config(config: ApplierConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ApplierConfig {
        &self.config
    }

    /// Execute a pending transaction's operations.
    ///
    /// Every operation produces exactly one result; a failure in one
    /// operation never halts the rest of its batch. The transaction ends
    /// `Committed` when every operation succeeded, otherwise
    /// `PartiallyFailed` (which awaits an explicit rollback decision).
    pub async fn apply(
        &self,
        mut transaction: Transaction,
        writer: Arc<dyn TargetWriter>,
        cancel: CancelFlag,
    ) -> ReconResult<ApplyOutcome> {
        tracing::info!(
            transaction_id = %transaction.id,
            operations = transaction.operations.len(),
            batch_size = self.config.batch_size,
            parallel_batches = self.config.parallel_batches,
            dry_run = self.config.dry_run,
            "Starting apply run"
        );

        let batches = chunk_by_asset(&transaction.operations, self.config.batch_size.max(1));

        let mut executed: Vec<(ApplyResult, Option<BeforeImage>)> =
            if self.config.parallel_batches > 1 {
                self.run_parallel(batches, &writer, &cancel).await
            } else {
                self.run_sequential(batches, &writer, &cancel).await
            };

        // Results in replay order regardless of execution interleaving.
        executed.sort_by_key(|(result, _)| result.operation.sequence);

        let mut results = Vec::with_capacity(executed.len());
        for (result, image) in executed {
            if let Some(image) = image {
                transaction.record_before_image(result.operation.sequence, image);
            }
            if result.status == ApplyStatus::Success {
                transaction.record_applied(result.operation.sequence);
            }
            results.push(result);
        }

        let summary = ApplySummary::from_results(&results);
        let final_state = if summary.successful == summary.total {
            TransactionState::Committed
        } else {
            TransactionState::PartiallyFailed
        };
        transaction.transition(final_state)?;

        tracing::info!(
            transaction_id = %transaction.id,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            state = %transaction.state,
            "Apply run finished"
        );

        Ok(ApplyOutcome {
            transaction,
            results,
            summary,
        })
    }

    async fn run_sequential(
        &self,
        batches: Vec<Vec<ChangeOperation>>,
        writer: &Arc<dyn TargetWriter>,
        cancel: &CancelFlag,
    ) -> Vec<(ApplyResult, Option<BeforeImage>)> {
        let mut executed = Vec::new();
        for (index, batch) in batches.into_iter().enumerate() {
            let outcome = run_batch(index, batch, &self.config, writer, cancel).await;
            executed.extend(outcome);
        }
        executed
    }

    async fn run_parallel(
        &self,
        batches: Vec<Vec<ChangeOperation>>,
        writer: &Arc<dyn TargetWriter>,
        cancel: &CancelFlag,
    ) -> Vec<(ApplyResult, Option<BeforeImage>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_batches));
        let accumulator: Arc<Mutex<Vec<(ApplyResult, Option<BeforeImage>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (index, batch) in batches.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let accumulator = accumulator.clone();
            let config = self.config.clone();
            let writer = writer.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = run_batch(index, batch, &config, &writer, &cancel).await;
                accumulator.lock().await.extend(outcome);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Batch task failed to join");
            }
        }

        Arc::try_unwrap(accumulator)
            .map(Mutex::into_inner)
            .unwrap_or_default()
    }
}

/// Execute one batch sequentially, reporting aggregate counts after.
async fn run_batch(
    index: usize,
    batch: Vec<ChangeOperation>,
    config: &ApplierConfig,
    writer: &Arc<dyn TargetWriter>,
    cancel: &CancelFlag,
) -> Vec<(ApplyResult, Option<BeforeImage>)> {
    let mut executed = Vec::with_capacity(batch.len());
    for operation in batch {
        executed.push(execute_operation(operation, config, writer, cancel).await);
    }

    let count = |status: ApplyStatus| {
        executed
            .iter()
            .filter(|(r, _)| r.status == status)
            .count()
    };
    tracing::info!(
        batch = index,
        successful = count(ApplyStatus::Success),
        failed = count(ApplyStatus::Failed),
        skipped = count(ApplyStatus::Skipped),
        "Batch finished"
    );

    executed
}

/// Execute one operation with before-image capture and retry.
async fn execute_operation(
    operation: ChangeOperation,
    config: &ApplierConfig,
    writer: &Arc<dyn TargetWriter>,
    cancel: &CancelFlag,
) -> (ApplyResult, Option<BeforeImage>) {
    if cancel.is_cancelled() {
        return (
            ApplyResult {
                operation,
                status: ApplyStatus::Skipped,
                error: None,
                attempt_count: 0,
            },
            None,
        );
    }

    if config.dry_run {
        tracing::debug!(
            asset_id = %operation.asset_id,
            kind = %operation.kind,
            "Dry run: operation classified but not written"
        );
        return (
            ApplyResult {
                operation,
                status: ApplyStatus::Success,
                error: None,
                attempt_count: 0,
            },
            None,
        );
    }

    let mut image: Option<BeforeImage> = None;
    let mut attempts: u32 = 0;
    let max_attempts = config.retry.max_attempts.max(1);

    loop {
        attempts += 1;

        let step = attempt_once(&operation, config, writer, &mut image).await;
        match step {
            Ok(()) => {
                return (
                    ApplyResult {
                        operation,
                        status: ApplyStatus::Success,
                        error: None,
                        attempt_count: attempts,
                    },
                    image,
                );
            }
            Err(error) => {
                let out_of_attempts = attempts >= max_attempts;
                if !error.is_retryable() || out_of_attempts || cancel.is_cancelled() {
                    tracing::warn!(
                        asset_id = %operation.asset_id,
                        attempts = attempts,
                        error = %error,
                        "Operation failed"
                    );
                    return (
                        ApplyResult {
                            operation,
                            status: ApplyStatus::Failed,
                            error: Some(ErrorDetail::from_error(&error)),
                            attempt_count: attempts,
                        },
                        image,
                    );
                }

                let delay = config.retry.delay_for_attempt(attempts - 1);
                tracing::debug!(
                    asset_id = %operation.asset_id,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Retrying after retryable write error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// One attempt: capture the before-image if not yet captured, then write.
async fn attempt_once(
    operation: &ChangeOperation,
    config: &ApplierConfig,
    writer: &Arc<dyn TargetWriter>,
    image: &mut Option<BeforeImage>,
) -> Result<(), ConnectorError> {
    if image.is_none() {
        let remote = with_timeout(config.op_timeout, writer.read_fields(&operation.asset_id))
            .await?;
        *image = Some(capture_image(operation, remote));
    }

    match operation.kind {
        ChangeKind::Create => {
            with_timeout(
                config.op_timeout,
                writer.create(&operation.asset_id, &operation.fields),
            )
            .await
        }
        ChangeKind::Update => {
            with_timeout(
                config.op_timeout,
                writer.update(&operation.asset_id, &operation.fields),
            )
            .await
        }
        ChangeKind::Delete => {
            with_timeout(config.op_timeout, writer.delete(&operation.asset_id)).await
        }
    }
}

/// Build a before-image restricted to the fields the operation touches.
fn capture_image(operation: &ChangeOperation, remote: Option<FieldMap>) -> BeforeImage {
    match remote {
        Some(remote) => {
            let mut fields = FieldMap::new();
            for name in operation.fields.names() {
                fields.insert(name, remote.get(name).cloned().flatten());
            }
            BeforeImage {
                asset_id: operation.asset_id.clone(),
                existed: true,
                fields,
            }
        }
        None => BeforeImage {
            asset_id: operation.asset_id.clone(),
            existed: false,
            fields: FieldMap::new(),
        },
    }
}

/// Wrap a write call in the per-call timeout; a timed-out call counts as
/// a retryable failure.
pub(super) async fn with_timeout<T>(
    timeout: Duration,
    future: impl std::future::Future<Output = Result<T, ConnectorError>>,
) -> Result<T, ConnectorError> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::ConnectionTimeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Chunk operations into batches, never splitting one asset's operations
/// across a batch boundary — later operations for an asset may depend on
/// the effects of earlier ones, so they must stay serialized.
fn chunk_by_asset(operations: &[ChangeOperation], batch_size: usize) -> Vec<Vec<ChangeOperation>> {
    let mut batches: Vec<Vec<ChangeOperation>> = Vec::new();
    let mut current: Vec<ChangeOperation> = Vec::new();

    for operation in operations {
        let same_asset = current
            .last()
            .is_some_and(|prev| prev.asset_id == operation.asset_id);
        if current.len() >= batch_size && !same_asset {
            batches.push(std::mem::take(&mut current));
        }
        current.push(operation.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
