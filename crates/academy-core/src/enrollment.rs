//! Enrollment operations on [`Academy`].
//!
//! Each operation locks the owning course, applies the enrollment
//! transition table, and recomputes the course's seat figures in the same
//! transaction as the enrollment write.

use crate::audit::{AuditEvent, AuditKind};
use crate::concurrency::StoreLock;
use crate::engine::{now, Academy};
use crate::lifecycle::{enrollment_transition, EnrollmentAction};
use crate::CoreError;
use academy_schema::{new_enrollment_id, normalize_person_id, Capacity, CourseId, PersonId};
use academy_store::{EnrollmentRecord, EnrollmentState, Transaction, WalOpKind};
use serde::Serialize;
use tracing::{debug, info};

/// What one person is doing across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSummary {
    pub person_id: PersonId,
    pub enrollments_total: usize,
    /// Courses the person holds a confirmed seat in.
    pub courses_enrolled: Vec<CourseId>,
    pub courses_teaching: Vec<CourseId>,
}

impl Academy {
    /// Register `person_id` for a course in the `requested` state.
    ///
    /// A request does not occupy a seat, so a full course still accepts it.
    pub fn request_enrollment(
        &self,
        course_id: &str,
        person_id: &str,
    ) -> Result<EnrollmentRecord, CoreError> {
        let person_id = normalize_person_id(person_id)?;
        info!("requesting enrollment of {person_id} in course {course_id}");
        let _lock = self.lock_course(course_id)?;
        let mut course = self.records.get_course(course_id)?;

        if !course.state.accepts_enrollment() {
            return Err(CoreError::InvalidState(format!(
                "course {course_id} is {} and does not accept enrollments",
                course.state
            )));
        }

        if self.config.enrollment.unique_per_person {
            let existing = self
                .records
                .enrollments_for_course(course_id)?
                .into_iter()
                .find(|e| e.person_id == person_id && !e.state.is_terminal());
            if let Some(existing) = existing {
                return Err(CoreError::Conflict(format!(
                    "{person_id} already has enrollment {} ({}) in course {course_id}",
                    existing.enrollment_id, existing.state
                )));
            }
        }

        let timestamp = now();
        let enrollment = EnrollmentRecord {
            enrollment_id: new_enrollment_id(course_id, &person_id),
            course_id: course.course_id.clone(),
            person_id: PersonId::new(person_id),
            state: EnrollmentState::Requested,
            created_at: timestamp.clone(),
            updated_at: timestamp,
            checksum: None,
        };

        let mut tx = Transaction::begin(
            &self.records,
            &self.wal,
            WalOpKind::RequestEnrollment,
            course_id,
        )?;
        tx.put_enrollment(&enrollment)?;
        let capacity = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        self.emit(
            AuditEvent::new(AuditKind::EnrollmentRequested, &course.course_id)
                .with_enrollment(&enrollment.enrollment_id)
                .with_capacity(capacity),
        );
        Ok(self.records.get_enrollment(&enrollment.enrollment_id)?)
    }

    /// Confirm a requested enrollment if its course has a free seat.
    ///
    /// The seat check and both writes happen under the course lock, so of
    /// two confirmations racing for the last seat exactly one succeeds and
    /// the other fails with [`CoreError::CapacityExceeded`].
    pub fn confirm_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, CoreError> {
        info!("confirming enrollment {enrollment_id}");
        let course_id = self.records.get_enrollment(enrollment_id)?.course_id;
        let _lock = self.lock_course(&course_id)?;
        let mut enrollment = self.records.get_enrollment(enrollment_id)?;
        let from = enrollment.state;
        let to = enrollment_transition(from, EnrollmentAction::Confirm)?;

        let mut course = self.records.get_course(&course_id)?;
        if !course.state.accepts_enrollment() {
            return Err(CoreError::InvalidState(format!(
                "course {course_id} is {} and cannot confirm enrollments",
                course.state
            )));
        }
        let confirmed = self.records.confirmed_count(&course_id)?;
        if !Capacity::compute(course.max_students, confirmed).has_room() {
            return Err(CoreError::CapacityExceeded {
                course_id: course_id.to_string(),
                max_students: course.max_students,
            });
        }

        enrollment.state = to;
        enrollment.updated_at = now();
        let mut tx = Transaction::begin(
            &self.records,
            &self.wal,
            WalOpKind::ConfirmEnrollment,
            &course_id,
        )?;
        tx.put_enrollment(&enrollment)?;
        let capacity = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        self.emit(
            AuditEvent::new(AuditKind::EnrollmentConfirmed, &course_id)
                .with_enrollment(&enrollment.enrollment_id)
                .with_states(from, to)
                .with_capacity(capacity),
        );
        Ok(self.records.get_enrollment(enrollment_id)?)
    }

    /// Cancel an enrollment, freeing its seat if it held one.
    ///
    /// Allowed whatever the course state. Cancelling an enrollment that is
    /// already cancelled or rejected changes nothing and succeeds.
    pub fn cancel_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, CoreError> {
        info!("cancelling enrollment {enrollment_id}");
        let course_id = self.records.get_enrollment(enrollment_id)?.course_id;
        let _lock = self.lock_course(&course_id)?;
        let enrollment = self.records.get_enrollment(enrollment_id)?;
        if enrollment.state.is_terminal() {
            debug!(
                "enrollment {enrollment_id} already {}, nothing to cancel",
                enrollment.state
            );
            return Ok(enrollment);
        }
        self.apply_enrollment_action(
            enrollment,
            EnrollmentAction::Cancel,
            WalOpKind::CancelEnrollment,
            AuditKind::EnrollmentCancelled,
        )
    }

    /// Turn down a requested enrollment. Confirmed enrollments must be
    /// cancelled instead.
    pub fn reject_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, CoreError> {
        info!("rejecting enrollment {enrollment_id}");
        let course_id = self.records.get_enrollment(enrollment_id)?.course_id;
        let _lock = self.lock_course(&course_id)?;
        let enrollment = self.records.get_enrollment(enrollment_id)?;
        self.apply_enrollment_action(
            enrollment,
            EnrollmentAction::Reject,
            WalOpKind::RejectEnrollment,
            AuditKind::EnrollmentRejected,
        )
    }

    /// Delete an enrollment record outright and recompute its course.
    pub fn remove_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, CoreError> {
        info!("removing enrollment {enrollment_id}");
        let course_id = self.records.get_enrollment(enrollment_id)?.course_id;
        let _lock = self.lock_course(&course_id)?;
        let enrollment = self.records.get_enrollment(enrollment_id)?;
        let mut course = self.records.get_course(&course_id)?;

        let mut tx = Transaction::begin(
            &self.records,
            &self.wal,
            WalOpKind::RemoveEnrollment,
            &course_id,
        )?;
        tx.remove_enrollment(&course_id, enrollment_id)?;
        let capacity = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        self.emit(
            AuditEvent::new(AuditKind::EnrollmentRemoved, &course_id)
                .with_enrollment(&enrollment.enrollment_id)
                .with_capacity(capacity),
        );
        Ok(enrollment)
    }

    pub fn get_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, CoreError> {
        Ok(self.records.get_enrollment(enrollment_id)?)
    }

    pub fn enrollments_for_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, CoreError> {
        if !self.records.course_exists(course_id) {
            return Err(CoreError::CourseNotFound(course_id.to_owned()));
        }
        let _lock = StoreLock::acquire_shared(&self.layout.course_lock_file(course_id))?;
        let mut enrollments = self.records.enrollments_for_course(course_id)?;
        enrollments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(enrollments)
    }

    pub fn enrollments_for_person(
        &self,
        person_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, CoreError> {
        let person_id = normalize_person_id(person_id)?;
        let mut enrollments = self.records.enrollments_for_person(&person_id)?;
        enrollments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(enrollments)
    }

    pub fn person_summary(&self, person_id: &str) -> Result<PersonSummary, CoreError> {
        let enrollments = self.enrollments_for_person(person_id)?;
        let person_id = normalize_person_id(person_id)?;
        let courses_enrolled = enrollments
            .iter()
            .filter(|e| e.state.occupies_seat())
            .map(|e| e.course_id.clone())
            .collect();
        let courses_teaching = self
            .courses_taught_by(&person_id)?
            .into_iter()
            .map(|c| c.course_id)
            .collect();
        Ok(PersonSummary {
            person_id: PersonId::new(person_id),
            enrollments_total: enrollments.len(),
            courses_enrolled,
            courses_teaching,
        })
    }

    /// Shared tail of cancel and reject. The caller holds the course lock.
    fn apply_enrollment_action(
        &self,
        mut enrollment: EnrollmentRecord,
        action: EnrollmentAction,
        op: WalOpKind,
        audit: AuditKind,
    ) -> Result<EnrollmentRecord, CoreError> {
        let from = enrollment.state;
        let to = enrollment_transition(from, action)?;
        let mut course = self.records.get_course(&enrollment.course_id)?;

        enrollment.state = to;
        enrollment.updated_at = now();
        let mut tx = Transaction::begin(&self.records, &self.wal, op, &enrollment.course_id)?;
        tx.put_enrollment(&enrollment)?;
        let capacity = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        self.emit(
            AuditEvent::new(audit, &enrollment.course_id)
                .with_enrollment(&enrollment.enrollment_id)
                .with_states(from, to)
                .with_capacity(capacity),
        );
        Ok(self.records.get_enrollment(&enrollment.enrollment_id)?)
    }
}
