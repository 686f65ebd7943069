//! Transactional application of change operations.
//!
//! The applier is the only part of the engine that performs I/O. It
//! executes a transaction's operations in batches against the target
//! writer, with per-operation retry, partial-failure isolation, and
//! rollback bookkeeping based on before-images captured immediately
//! before each write.

mod applier;
mod rollback;
mod transaction;

pub use applier::{
    ApplierConfig, ApplyOutcome, ApplyResult, ApplyStatus, CancelFlag, ErrorDetail,
    TransactionalApplier,
};
pub use rollback::RollbackOutcome;
pub use transaction::{BeforeImage, Transaction, TransactionState};
