//! Engine error taxonomy.
//!
//! Validation and provider failures abort the entire run before any diff
//! output is produced. Apply-phase write failures never surface here: they
//! are isolated per operation and recorded in the apply results. A field
//! conflict is a normal diff status, not an error.

use thiserror::Error;
use uuid::Uuid;

use recon_connector::Source;

/// Fatal validation error surfaced before matching begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A record arrived with an empty asset identifier.
    #[error("record {index} from {system} has an empty asset id")]
    EmptyAssetId { system: Source, index: usize },

    /// Two records within one source share an asset identifier.
    #[error("duplicate asset id '{asset_id}' within source {system}")]
    DuplicateAssetId { system: Source, asset_id: String },

    /// A record carries a field with an empty name.
    #[error("asset '{asset_id}' from {system} has a field with an empty name")]
    EmptyFieldName { system: Source, asset_id: String },
}

/// Errors scoped to transaction lifecycle management.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A state transition the state machine forbids.
    #[error("invalid transaction state transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    /// The run ended partially failed and no rollback decision was made.
    #[error("transaction {id} is partially failed and awaits an explicit rollback decision")]
    Incomplete { id: Uuid },

    /// Rollback needs a before-image that was never captured.
    #[error("no before-image captured for asset '{asset_id}'")]
    NoBeforeImage { asset_id: String },
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum ReconError {
    /// Input validation failed; the run is aborted before matching.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A source provider failed; the run is aborted (the provider owns
    /// its own retry policy).
    #[error("source provider failed for {system}: {message}")]
    Provider { system: Source, message: String },

    /// A selection source failed mid-stream.
    #[error("selection source failed: {message}")]
    Selection { message: String },

    /// Transaction lifecycle error.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Export serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconError {
    /// Create a provider failure.
    pub fn provider(system: Source, message: impl Into<String>) -> Self {
        Self::Provider {
            system,
            message: message.into(),
        }
    }

    /// Create a selection-source failure.
    pub fn selection(message: impl Into<String>) -> Self {
        Self::Selection {
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type ReconResult<T> = Result<T, ReconError>;
