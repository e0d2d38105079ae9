//! Capacity evaluation, verification, and repair on [`Academy`].

use crate::audit::{AuditEvent, AuditKind};
use crate::concurrency::StoreLock;
use crate::engine::Academy;
use crate::CoreError;
use academy_schema::{Capacity, CourseId, FilterOp};
use academy_store::{verify_store_integrity, CourseRecord, IntegrityReport, Transaction, WalOpKind};
use serde::Serialize;
use tracing::{info, warn};

/// A course whose stored seat figures disagree with its enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityDrift {
    pub course_id: CourseId,
    pub stored: Capacity,
    pub actual: Capacity,
}

#[derive(Debug, Default, Serialize)]
pub struct CapacityReport {
    pub checked: usize,
    pub consistent: usize,
    pub drifted: Vec<CapacityDrift>,
    /// Course ids whose record, or one of whose enrollments, failed to load.
    pub unreadable: Vec<String>,
}

impl CapacityReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.unreadable.is_empty()
    }
}

impl Academy {
    /// Rewrite a course's seat figures from a fresh confirmed count.
    pub fn recompute_course(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        info!("recomputing capacity for course {course_id}");
        let _lock = self.lock_course(course_id)?;
        let mut course = self.records.get_course(course_id)?;
        let before = course.capacity();

        let mut tx =
            Transaction::begin(&self.records, &self.wal, WalOpKind::Recompute, course_id)?;
        let after = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        if before != after {
            warn!(
                "course {course_id} had drifted: stored {} enrolled, actual {}",
                before.enrolled_count, after.enrolled_count
            );
        }
        self.emit(
            AuditEvent::new(AuditKind::CapacityRecomputed, &course.course_id).with_capacity(after),
        );
        Ok(self.records.get_course(course_id)?)
    }

    /// Ids of courses whose `is_full`, evaluated from the current confirmed
    /// enrollments rather than the stored flag, satisfies `op value`.
    ///
    /// Each course is recounted under its shared lock. A course whose own
    /// enrollments cannot be read is left out of the result and logged.
    pub fn search_is_full(&self, op: FilterOp, value: bool) -> Result<Vec<CourseId>, CoreError> {
        let mut matched = Vec::new();
        for course in self.records.list_courses()? {
            let course_id = course.course_id;
            let _lock = StoreLock::acquire_shared(&self.layout.course_lock_file(&course_id))?;
            let counted = self
                .records
                .get_course(&course_id)
                .and_then(|course| Ok((self.records.confirmed_count(&course_id)?, course)));
            let (count, course) = match counted {
                Ok(counted) => counted,
                Err(e) => {
                    warn!("course {course_id} left out of is_full search: {e}");
                    continue;
                }
            };
            if op.matches(Capacity::compute(course.max_students, count).is_full, value) {
                matched.push(course_id);
            }
        }
        Ok(matched)
    }

    /// Compare every course's stored seat figures with a fresh recount.
    ///
    /// Each course is checked under its shared lock so an in-flight write
    /// is never reported as drift.
    pub fn verify_capacity(&self) -> Result<CapacityReport, CoreError> {
        let mut report = CapacityReport::default();
        for entry in self.records.list_courses_with_errors()? {
            report.checked += 1;
            let course_id = match entry {
                Ok(course) => course.course_id,
                Err((id, e)) => {
                    warn!("course {id} unreadable: {e}");
                    report.unreadable.push(id);
                    continue;
                }
            };

            let _lock = StoreLock::acquire_shared(&self.layout.course_lock_file(&course_id))?;
            let loaded = self
                .records
                .get_course(&course_id)
                .and_then(|course| Ok((self.records.confirmed_count(&course_id)?, course)));
            let (count, course) = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!("course {course_id} could not be recounted: {e}");
                    report.unreadable.push(course_id.into_inner());
                    continue;
                }
            };

            let actual = Capacity::compute(course.max_students, count);
            if course.capacity() == actual {
                report.consistent += 1;
            } else {
                report.drifted.push(CapacityDrift {
                    course_id,
                    stored: course.capacity(),
                    actual,
                });
            }
        }
        Ok(report)
    }

    /// Checksums, dangling enrollments, and the code index.
    pub fn verify_store(&self) -> Result<IntegrityReport, CoreError> {
        Ok(verify_store_integrity(&self.layout)?)
    }
}
