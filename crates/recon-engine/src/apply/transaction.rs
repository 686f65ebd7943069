//! Transaction lifecycle and rollback bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use recon_connector::FieldMap;

use crate::changeset::ChangeOperation;
use crate::error::TransactionError;

/// Lifecycle state of an apply run.
///
/// Transitions are one-directional: `Pending` moves to `Committed` or
/// `PartiallyFailed`, and only `PartiallyFailed` may move on to
/// `RolledBack` — and only on an explicit operator directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Created, not yet executed.
    Pending,
    /// Every operation succeeded.
    Committed,
    /// At least one operation failed after exhausting retries.
    PartiallyFailed,
    /// Compensating updates were replayed.
    RolledBack,
}

impl TransactionState {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::PartiallyFailed => "partially_failed",
            TransactionState::RolledBack => "rolled_back",
        }
    }

    /// Check if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }

    /// Check whether a rollback directive is legal from this state.
    #[must_use]
    pub fn can_roll_back(&self) -> bool {
        matches!(self, TransactionState::PartiallyFailed)
    }

    fn allows(&self, to: TransactionState) -> bool {
        matches!(
            (self, to),
            (
                TransactionState::Pending,
                TransactionState::Committed | TransactionState::PartiallyFailed
            ) | (
                TransactionState::PartiallyFailed,
                TransactionState::RolledBack
            )
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote field values captured immediately before an operation wrote.
///
/// Only the fields the operation touched are kept; a compensating update
/// must not clobber fields the operation never wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeforeImage {
    /// Asset the image belongs to.
    pub asset_id: String,
    /// Whether the asset existed remotely before the write. A create
    /// against a previously absent asset is compensated by a delete.
    pub existed: bool,
    /// Prior values of the touched fields (absent fields recorded null).
    pub fields: FieldMap,
}

/// One apply run over an ordered list of change operations.
///
/// Operation order is preserved end-to-end from the changeset builder;
/// reordering would change observable partial-failure behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id for this apply run.
    pub id: Uuid,
    /// Operations in replay order.
    pub operations: Vec<ChangeOperation>,
    /// Lifecycle state.
    pub state: TransactionState,
    /// When the apply run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a post-`Pending` state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Before-images keyed by operation sequence, captured during apply.
    pub before_images: BTreeMap<u64, BeforeImage>,
    /// Sequences of operations that were successfully applied.
    pub applied_sequences: Vec<u64>,
}

impl Transaction {
    /// Create a pending transaction over a sorted changeset.
    #[must_use]
    pub fn new(operations: Vec<ChangeOperation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operations,
            state: TransactionState::Pending,
            started_at: Utc::now(),
            completed_at: None,
            before_images: BTreeMap::new(),
            applied_sequences: Vec::new(),
        }
    }

    /// Transition to a new state, enforcing the one-directional machine.
    pub fn transition(&mut self, to: TransactionState) -> Result<(), TransactionError> {
        if !self.state.allows(to) {
            return Err(TransactionError::InvalidState {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        tracing::info!(
            transaction_id = %self.id,
            from = %self.state,
            to = %to,
            "Transaction state transition"
        );
        self.state = to;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Surface the incomplete-transaction condition: a run that ended
    /// partially failed awaits an explicit rollback decision.
    pub fn ensure_complete(&self) -> Result<(), TransactionError> {
        if self.state == TransactionState::PartiallyFailed {
            return Err(TransactionError::Incomplete { id: self.id });
        }
        Ok(())
    }

    /// Record a captured before-image for an operation.
    pub fn record_before_image(&mut self, sequence: u64, image: BeforeImage) {
        self.before_images.insert(sequence, image);
    }

    /// Record that an operation was applied successfully.
    pub fn record_applied(&mut self, sequence: u64) {
        self.applied_sequences.push(sequence);
    }
}
