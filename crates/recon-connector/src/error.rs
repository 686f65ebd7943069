//! Connector error types.
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

use crate::types::Source;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (transient)
    /// Failed to establish connection to the target system.
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// A call to the target system timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Target system is temporarily unavailable (5xx-equivalent).
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    /// The target system is throttling requests.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    // Authentication errors (permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Insufficient permissions for the operation.
    #[error("authorization failed: insufficient permissions for {operation}")]
    AuthorizationFailed { operation: String },

    // Operation errors (permanent)
    /// Asset not found in the target system.
    #[error("asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    /// Asset already exists in the target system (create conflict).
    #[error("asset already exists: {asset_id}")]
    AssetAlreadyExists { asset_id: String },

    /// The target system rejected the payload.
    #[error("validation rejected for asset {asset_id}: {message}")]
    ValidationRejected { asset_id: String, message: String },

    // Source-provider errors (fatal to the run, never retried by the engine)
    /// A source provider failed to deliver its records.
    #[error("source {system} fetch failed: {message}")]
    SourceFetchFailed { system: Source, message: String },

    /// A selection source failed mid-stream.
    #[error("selection source failed: {message}")]
    SelectionFailed { message: String },
}

impl ConnectorError {
    /// Create a connection failure.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a target-unavailable error.
    pub fn target_unavailable(message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: message.into(),
        }
    }

    /// Create a rate-limited error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Create an asset-not-found error.
    pub fn asset_not_found(asset_id: impl Into<String>) -> Self {
        Self::AssetNotFound {
            asset_id: asset_id.into(),
        }
    }

    /// Create a validation rejection.
    pub fn validation_rejected(asset_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationRejected {
            asset_id: asset_id.into(),
            message: message.into(),
        }
    }

    /// Create a source fetch failure.
    pub fn source_fetch_failed(system: Source, message: impl Into<String>) -> Self {
        Self::SourceFetchFailed {
            system,
            message: message.into(),
        }
    }

    /// Check whether a retry could plausibly succeed.
    ///
    /// Transient connection problems and throttling are retryable; missing
    /// assets, validation rejections, and credential problems are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
                | ConnectorError::RateLimited { .. }
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
