//! # Asset Reconciliation Engine
//!
//! Reconciles asset records held in two independent systems of record (a
//! monitoring system and a service-desk system), producing a field-level
//! difference report, folding human or automated field selections into a
//! changeset, and applying the selected changes back to the service desk
//! with transactional guarantees.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐    ┌──────────┐    ┌─────────┐    ┌───────────────┐
//! │  Normalizer   │───►│ Matcher  │───►│ Differ  │───►│  (selection   │
//! │  (per source) │    │          │    │         │    │  front-end)   │
//! └───────────────┘    └──────────┘    └─────────┘    └───────┬───────┘
//!                                                             │
//!                      ┌───────────┐    ┌───────────┐         ▼
//!                      │ Applier   │◄───│  Sorter   │◄── ChangesetBuilder
//!                      │ (batched, │    │ (natural  │
//!                      │  retried) │    │  order)   │
//!                      └───────────┘    └───────────┘
//! ```
//!
//! Matching, diffing, and sorting are pure, deterministic, single-threaded
//! transformations; the applier is the only component that performs I/O.

pub mod apply;
pub mod changeset;
pub mod differ;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod record;
pub mod report;
pub mod sorter;

pub use apply::{
    ApplierConfig, ApplyOutcome, ApplyResult, ApplyStatus, CancelFlag, ErrorDetail,
    RollbackOutcome, Transaction, TransactionState, TransactionalApplier,
};
pub use changeset::{ChangeKind, ChangeOperation, ChangesetBuilder};
pub use differ::{AssetDiff, DiffStatistics, DiffStatus, Differ, DifferConfig, FieldDifference};
pub use engine::{DiffRun, EngineConfig, ReconciliationEngine};
pub use error::{ReconError, ReconResult, TransactionError, ValidationError};
pub use matcher::{MatchPair, MatchStrategy, Matcher, MatcherConfig, Presence};
pub use record::{normalize_records, AssetRecord};
pub use report::{ApplySummary, DiffExport, DiffExportEntry, ReconciliationReport};
pub use sorter::{assign_sequence, compare_asset_ids, natural_key, sort_diffs, sort_operations};

// Exchange types re-exported from the connector crate for convenience.
pub use recon_connector::{Selection, SelectionOrigin, Source};
