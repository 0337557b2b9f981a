//! Coordination layer of the fsrepo object repository.
//!
//! `RepositoryCoordinator` is the entry point: it serializes per-object
//! writes against long-running store-all/restore-all jobs, both inside one
//! process (a local state lock) and across processes (a named global lock
//! backed by an advisory lock file). Bulk jobs report progress into a
//! `RepositoryActionResult` instead of failing early.

pub mod concurrency;
pub mod coordinator;
pub mod jobs;
pub mod lifecycle;
pub mod result;
pub mod serializer;

pub use concurrency::{install_signal_handler, CancellationToken, GlobalLock, GlobalLockGuard};
pub use coordinator::{RepositoryCoordinator, BULK_LOCK_PURPOSE};
pub use jobs::{BulkJobRunner, FileSystemJobs, JobContext, RecordSink, RecordSource};
pub use lifecycle::{validate_transition, BulkKind, OperationState};
pub use result::{LogEntry, LogSeverity, RepositoryActionResult};
pub use serializer::{FileSystemSerializer, ObjectSerializer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] fsrepo_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] fsrepo_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation conflict: {0}")]
    OperationConflict(String),
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),
    #[error("failed to write object '{object}': {reason}")]
    ObjectWrite { object: String, reason: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl CoreError {
    /// True for errors caused by a bad argument rather than by the
    /// repository state.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            CoreError::InvalidArgument(_) => true,
            CoreError::Store(e) => e.is_invalid_argument(),
            _ => false,
        }
    }
}
