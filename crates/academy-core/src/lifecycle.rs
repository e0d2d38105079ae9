use crate::CoreError;
use academy_store::{CourseState, EnrollmentState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseAction {
    Publish,
    Start,
    Complete,
    Cancel,
    ResetToDraft,
}

impl CourseAction {
    pub const ALL: [CourseAction; 5] = [
        CourseAction::Publish,
        CourseAction::Start,
        CourseAction::Complete,
        CourseAction::Cancel,
        CourseAction::ResetToDraft,
    ];

    pub fn target(self) -> CourseState {
        match self {
            CourseAction::Publish => CourseState::Published,
            CourseAction::Start => CourseState::InProgress,
            CourseAction::Complete => CourseState::Done,
            CourseAction::Cancel => CourseState::Cancelled,
            CourseAction::ResetToDraft => CourseState::Draft,
        }
    }
}

impl std::fmt::Display for CourseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseAction::Publish => write!(f, "publish"),
            CourseAction::Start => write!(f, "start"),
            CourseAction::Complete => write!(f, "complete"),
            CourseAction::Cancel => write!(f, "cancel"),
            CourseAction::ResetToDraft => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentAction {
    Confirm,
    Cancel,
    Reject,
}

impl EnrollmentAction {
    pub fn target(self) -> EnrollmentState {
        match self {
            EnrollmentAction::Confirm => EnrollmentState::Confirmed,
            EnrollmentAction::Cancel => EnrollmentState::Cancelled,
            EnrollmentAction::Reject => EnrollmentState::Rejected,
        }
    }
}

/// Resolve `action` against the course transition table.
///
/// Every pair not listed fails with [`CoreError::InvalidTransition`].
pub fn course_transition(from: CourseState, action: CourseAction) -> Result<CourseState, CoreError> {
    let valid = matches!(
        (from, action),
        (CourseState::Draft, CourseAction::Publish)
            | (CourseState::Published, CourseAction::Start)
            | (CourseState::InProgress, CourseAction::Complete)
            | (
                CourseState::Draft | CourseState::Published | CourseState::InProgress,
                CourseAction::Cancel
            )
            | (CourseState::Cancelled, CourseAction::ResetToDraft)
    );

    if valid {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: action.target().to_string(),
        })
    }
}

/// Resolve `action` against the enrollment transition table.
///
/// Cancelling an enrollment that is already terminal is handled by the
/// engine as a no-op before this table is consulted.
pub fn enrollment_transition(
    from: EnrollmentState,
    action: EnrollmentAction,
) -> Result<EnrollmentState, CoreError> {
    let valid = matches!(
        (from, action),
        (
            EnrollmentState::Requested,
            EnrollmentAction::Confirm | EnrollmentAction::Reject
        ) | (
            EnrollmentState::Requested | EnrollmentState::Confirmed,
            EnrollmentAction::Cancel
        )
    );

    if valid {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: action.target().to_string(),
        })
    }
}
