//! # Reconciliation Connector Framework
//!
//! Collaborator contracts consumed by the reconciliation engine:
//!
//! - Source-record providers that fetch raw asset records from one of the
//!   two systems of record (monitoring or service desk).
//! - The target writer that applies change operations to the service-desk
//!   system, with transient/permanent error classification for retry logic.
//! - Selection sources that yield field-level selections produced by a
//!   human or automated front-end.
//!
//! Retrieval details (pagination, caching, credentials) belong to concrete
//! implementations; the engine only sees these traits.

pub mod error;
pub mod record;
pub mod resilience;
pub mod selection;
pub mod traits;
pub mod types;

pub use error::{ConnectorError, ConnectorResult};
pub use record::{FieldMap, RawRecord};
pub use resilience::RetryConfig;
pub use selection::{Selection, SelectionOrigin};
pub use traits::{SelectionSource, SourceProvider, TargetWriter};
pub use types::Source;
