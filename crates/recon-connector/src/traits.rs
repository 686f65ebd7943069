//! Collaborator traits consumed by the reconciliation engine.

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::record::{FieldMap, RawRecord};
use crate::selection::Selection;
use crate::types::Source;

/// Provider of raw asset records for one source system.
///
/// Retry, caching, and pagination are the provider's responsibility; a
/// failure surfaced here is fatal to the reconciliation run.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch every asset record held by the given source.
    async fn fetch_records(&self, source: Source) -> ConnectorResult<Vec<RawRecord>>;
}

/// Write access to the service-desk system.
///
/// Implementations must be idempotent-safe under retry: applying the same
/// operation twice must not duplicate an asset.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Read the current remote field values for an asset.
    ///
    /// Returns `None` if the asset does not exist. The applier calls this
    /// immediately before each write to capture the before-image used for
    /// compensating rollback.
    async fn read_fields(&self, asset_id: &str) -> ConnectorResult<Option<FieldMap>>;

    /// Create a new asset with the given fields.
    async fn create(&self, asset_id: &str, fields: &FieldMap) -> ConnectorResult<()>;

    /// Update field values on an existing asset.
    async fn update(&self, asset_id: &str, fields: &FieldMap) -> ConnectorResult<()>;

    /// Delete an asset.
    async fn delete(&self, asset_id: &str) -> ConnectorResult<()>;
}

/// A producer of field-level selections.
///
/// Any concrete front-end (console prompt, scripted batch, web form)
/// implements this; the engine never sees the surface behind it.
#[async_trait]
pub trait SelectionSource: Send + Sync {
    /// Yield the next selection, or `None` when the stream is exhausted.
    ///
    /// A source may terminate early (user cancellation); the engine then
    /// builds a changeset from whatever arrived so far.
    async fn next_selection(&mut self) -> ConnectorResult<Option<Selection>>;
}
