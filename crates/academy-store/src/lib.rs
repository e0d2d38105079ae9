//! Record storage, unique code index, and write-ahead log for Academy.
//!
//! This crate is the persistence collaborator of the engine: `RecordStore`
//! keeps one checksummed JSON file per course and per enrollment and owns the
//! storage-level unique index on course codes, `WriteAheadLog` records how to
//! undo in-flight writes, and `Transaction` ties the two together so a failed
//! operation leaves no partial mutation behind.

pub mod integrity;
pub mod layout;
pub mod records;
pub mod txn;
pub mod wal;

pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{code_key, StoreLayout, STORE_FORMAT_VERSION};
pub use records::{CourseRecord, CourseState, EnrollmentRecord, EnrollmentState, RecordStore};
pub use txn::Transaction;
pub use wal::{RollbackStep, WalEntry, WalOpKind, WriteAheadLog};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for record '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("course not found: {0}")]
    CourseNotFound(String),
    #[error("enrollment not found: {0}")]
    EnrollmentNotFound(String),
    #[error("course code '{code}' is already used by course {owner}")]
    CodeTaken { code: String, owner: String },
    #[error("course {id} changed concurrently: expected revision {expected}, found {found}")]
    RevisionConflict {
        id: String,
        expected: u64,
        found: u64,
    },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
