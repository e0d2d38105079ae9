//! Course lifecycle and enrollment capacity engine for Academy.
//!
//! `Academy` is the central API. It owns the course state machine
//! (draft, published, in progress, done, cancelled), the enrollment state
//! machine, and the rule that keeps each course's enrolled count, available
//! seats and full flag equal to a fresh count of its confirmed enrollments.
//! Every mutation runs as one store transaction under the course's lock, so
//! two confirmations racing for the last seat cannot both succeed.

pub mod audit;
pub mod capacity;
pub mod concurrency;
pub mod engine;
pub mod enrollment;
pub mod lifecycle;

pub use audit::{AuditEvent, AuditKind, AuditSink, JournalAudit, MemoryAudit, TracingAudit};
pub use capacity::{CapacityDrift, CapacityReport};
pub use concurrency::{install_signal_handler, shutdown_requested, StoreLock};
pub use engine::{Academy, CourseOutcome, CourseUpdate, NewCourse};
pub use enrollment::PersonSummary;
pub use lifecycle::{course_transition, enrollment_transition, CourseAction, EnrollmentAction};

use academy_schema::{ConfigError, ValidationError};
use academy_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid transition: cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("capacity exceeded: course {course_id} has no seats left ({max_students} max)")]
    CapacityExceeded { course_id: String, max_students: u32 },
    #[error("course not found: {0}")]
    CourseNotFound(String),
    #[error("enrollment not found: {0}")]
    EnrollmentNotFound(String),
    #[error("interrupted before {0} was processed")]
    Interrupted(String),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CourseNotFound(id) => CoreError::CourseNotFound(id),
            StoreError::EnrollmentNotFound(id) => CoreError::EnrollmentNotFound(id),
            StoreError::CodeTaken { .. } | StoreError::RevisionConflict { .. } => {
                CoreError::Conflict(e.to_string())
            }
            other => CoreError::Store(other),
        }
    }
}

/// Coarse classification of [`CoreError`] for callers that render or
/// retry errors without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidTransition,
    InvalidState,
    CapacityExceeded,
    NotFound,
    Interrupted,
    Storage,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::Config(_) => ErrorKind::Validation,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            CoreError::CourseNotFound(_) | CoreError::EnrollmentNotFound(_) => ErrorKind::NotFound,
            CoreError::Interrupted(_) => ErrorKind::Interrupted,
            CoreError::Store(_) | CoreError::Io(_) | CoreError::Serialization(_) => {
                ErrorKind::Storage
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_taken_maps_to_conflict() {
        let e: CoreError = StoreError::CodeTaken {
            code: "CS101".to_owned(),
            owner: "abc".to_owned(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Conflict);
        assert!(e.to_string().contains("CS101"));
    }

    #[test]
    fn revision_conflict_maps_to_conflict() {
        let e: CoreError = StoreError::RevisionConflict {
            id: "c".to_owned(),
            expected: 1,
            found: 2,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn store_not_found_keeps_its_kind() {
        let e: CoreError = StoreError::CourseNotFound("c".to_owned()).into();
        assert!(matches!(e, CoreError::CourseNotFound(_)));
        let e: CoreError = StoreError::EnrollmentNotFound("e".to_owned()).into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn validation_errors_convert() {
        let e: CoreError = ValidationError::NonPositiveCapacity(0).into();
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn capacity_exceeded_display_names_course() {
        let e = CoreError::CapacityExceeded {
            course_id: "c42".to_owned(),
            max_students: 2,
        };
        assert!(e.to_string().contains("c42"));
        assert_eq!(e.kind(), ErrorKind::CapacityExceeded);
    }
}
