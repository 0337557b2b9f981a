//! On-disk side of the fsrepo object repository.
//!
//! This crate provides deterministic file naming (`make_safe_name`), the
//! directory layout that maps object types and names onto paths
//! (`RepositoryLayout`), an atomic JSON record store (`RecordStore`), and the
//! directory janitor that removes emptied folders without ever touching the
//! repository root.

pub mod janitor;
pub mod layout;
pub mod naming;
pub mod records;

pub use janitor::{delete_directory, delete_if_empty, prune_empty_parents};
pub use layout::RepositoryLayout;
pub use naming::{is_reserved, make_safe_name, HASH_DELIMITER, RESERVED_NAMES, TRUNCATION_MARKER};
pub use records::RecordStore;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid name length limits: max_length={max_length}, hash_length={hash_length} (need hash_length > 0 and max_length > hash_length + 1)")]
    InvalidLength {
        max_length: usize,
        hash_length: usize,
    },
    #[error("invalid repository path: {0}")]
    InvalidPath(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
}

impl StoreError {
    /// Caller mistakes, as opposed to I/O or data failures.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::InvalidLength { .. } | Self::InvalidPath(_)
        )
    }
}
