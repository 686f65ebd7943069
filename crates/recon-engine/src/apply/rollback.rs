//! Compensating rollback of partially failed transactions.

use std::sync::Arc;

use recon_connector::TargetWriter;

use crate::changeset::{ChangeKind, ChangeOperation};
use crate::error::{ReconResult, TransactionError};
use crate::report::ApplySummary;

use super::applier::{
    with_timeout, ApplyResult, ApplyStatus, ErrorDetail, TransactionalApplier,
};
use super::transaction::{BeforeImage, Transaction, TransactionState};

/// Result of a rollback run.
#[derive(Debug)]
pub struct RollbackOutcome {
    /// The transaction, `RolledBack` if every compensation succeeded,
    /// otherwise still `PartiallyFailed`.
    pub transaction: Transaction,
    /// One result per compensating write, in replay order.
    pub results: Vec<ApplyResult>,
    /// Aggregate counts over the compensating writes.
    pub summary: ApplySummary,
}

impl TransactionalApplier {
    /// Roll a partially failed transaction back to its before-images.
    ///
    /// Rollback is never automatic; it runs only on this explicit call,
    /// and only from the `PartiallyFailed` state. Successfully applied
    /// operations are compensated in reverse sequence order: an update is
    /// undone by writing the captured prior field values back, and a
    /// create against a previously absent asset is undone by a delete.
    /// The transaction transitions to `RolledBack` only when every
    /// compensation succeeds.
    pub async fn rollback(
        &self,
        mut transaction: Transaction,
        writer: Arc<dyn TargetWriter>,
    ) -> ReconResult<RollbackOutcome> {
        if !transaction.state.can_roll_back() {
            return Err(TransactionError::InvalidState {
                from: transaction.state.to_string(),
                to: TransactionState::RolledBack.to_string(),
            }
            .into());
        }

        tracing::info!(
            transaction_id = %transaction.id,
            applied = transaction.applied_sequences.len(),
            "Starting rollback"
        );

        let mut sequences = transaction.applied_sequences.clone();
        sequences.sort_unstable();
        sequences.reverse();

        let mut results = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let Some(image) = transaction.before_images.get(&sequence).cloned() else {
                return Err(TransactionError::NoBeforeImage {
                    asset_id: transaction
                        .operations
                        .iter()
                        .find(|op| op.sequence == sequence)
                        .map_or_else(|| sequence.to_string(), |op| op.asset_id.clone()),
                }
                .into());
            };
            results.push(self.compensate(sequence, &image, &writer).await);
        }

        let summary = ApplySummary::from_results(&results);
        if summary.failed == 0 {
            transaction.transition(TransactionState::RolledBack)?;
        } else {
            tracing::warn!(
                transaction_id = %transaction.id,
                failed = summary.failed,
                "Rollback incomplete; transaction remains partially failed"
            );
        }

        Ok(RollbackOutcome {
            transaction,
            results,
            summary,
        })
    }

    /// One compensating write, with the same retry policy as apply.
    async fn compensate(
        &self,
        sequence: u64,
        image: &BeforeImage,
        writer: &Arc<dyn TargetWriter>,
    ) -> ApplyResult {
        let operation = ChangeOperation {
            asset_id: image.asset_id.clone(),
            kind: if image.existed {
                ChangeKind::Update
            } else {
                ChangeKind::Delete
            },
            fields: image.fields.clone(),
            sequence,
        };

        let config = self.config();
        let max_attempts = config.retry.max_attempts.max(1);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let write = if image.existed {
                with_timeout(
                    config.op_timeout,
                    writer.update(&image.asset_id, &image.fields),
                )
                .await
            } else {
                with_timeout(config.op_timeout, writer.delete(&image.asset_id)).await
            };

            match write {
                Ok(()) => {
                    tracing::debug!(
                        asset_id = %image.asset_id,
                        sequence = sequence,
                        "Compensating write succeeded"
                    );
                    return ApplyResult {
                        operation,
                        status: ApplyStatus::Success,
                        error: None,
                        attempt_count: attempts,
                    };
                }
                Err(error) if error.is_retryable() && attempts < max_attempts => {
                    let delay = config.retry.delay_for_attempt(attempts - 1);
                    tracing::debug!(
                        asset_id = %image.asset_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Retrying compensating write"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::warn!(
                        asset_id = %image.asset_id,
                        attempts = attempts,
                        error = %error,
                        "Compensating write failed"
                    );
                    return ApplyResult {
                        operation,
                        status: ApplyStatus::Failed,
                        error: Some(ErrorDetail::from_error(&error)),
                        attempt_count: attempts,
                    };
                }
            }
        }
    }
}
