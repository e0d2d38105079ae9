use crate::records::{CourseRecord, EnrollmentRecord, RecordStore};
use crate::wal::{RollbackStep, WalOpKind, WriteAheadLog};
use crate::StoreError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A unit of work over the record store.
///
/// Before a file is touched for the first time its previous contents are
/// captured as a WAL rollback step. [`commit`](Self::commit) drops the WAL
/// entry; dropping an uncommitted transaction replays the rollback steps so
/// a failed operation leaves every record exactly as it found it.
pub struct Transaction<'s> {
    records: &'s RecordStore,
    wal: &'s WriteAheadLog,
    op_id: String,
    kind: WalOpKind,
    steps: Vec<RollbackStep>,
    staged: HashSet<PathBuf>,
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub fn begin(
        records: &'s RecordStore,
        wal: &'s WriteAheadLog,
        kind: WalOpKind,
        course_id: &str,
    ) -> Result<Self, StoreError> {
        wal.initialize()?;
        let op_id = wal.begin(kind, course_id)?;
        Ok(Self {
            records,
            wal,
            op_id,
            kind,
            steps: Vec::new(),
            staged: HashSet::new(),
            finished: false,
        })
    }

    pub fn op_id(&self) -> &str {
        &self.op_id
    }

    pub fn records(&self) -> &'s RecordStore {
        self.records
    }

    /// Record how to undo a write to `path`. Only the first call per path
    /// captures a snapshot.
    fn stage(&mut self, path: &Path) -> Result<(), StoreError> {
        if !self.staged.insert(path.to_path_buf()) {
            return Ok(());
        }
        let step = if path.exists() {
            RollbackStep::RestoreFile {
                path: path.to_path_buf(),
                contents: fs::read_to_string(path)?,
            }
        } else {
            RollbackStep::RemoveFile(path.to_path_buf())
        };
        self.wal.add_rollback_step(&self.op_id, step.clone())?;
        self.steps.push(step);
        Ok(())
    }

    pub fn put_course(&mut self, course: &CourseRecord) -> Result<(), StoreError> {
        self.stage(&self.records.course_path(&course.course_id))?;
        self.records.put_course(course)
    }

    /// Compare-and-swap write, see [`RecordStore::put_course_if`].
    pub fn put_course_if(
        &mut self,
        course: &CourseRecord,
        expected_revision: u64,
    ) -> Result<u64, StoreError> {
        self.stage(&self.records.course_path(&course.course_id))?;
        self.records.put_course_if(course, expected_revision)
    }

    pub fn put_enrollment(&mut self, enrollment: &EnrollmentRecord) -> Result<(), StoreError> {
        self.stage(
            &self
                .records
                .enrollment_path(&enrollment.course_id, &enrollment.enrollment_id),
        )?;
        self.records.put_enrollment(enrollment)
    }

    pub fn remove_enrollment(
        &mut self,
        course_id: &str,
        enrollment_id: &str,
    ) -> Result<(), StoreError> {
        self.stage(&self.records.enrollment_path(course_id, enrollment_id))?;
        self.records.remove_enrollment(course_id, enrollment_id)
    }

    pub fn claim_code(&mut self, code: &str, course_id: &str) -> Result<(), StoreError> {
        self.stage(&self.records.code_path(code))?;
        self.records.claim_code(code, course_id)
    }

    pub fn release_code(&mut self, code: &str, course_id: &str) -> Result<(), StoreError> {
        self.stage(&self.records.code_path(code))?;
        self.records.release_code(code, course_id)
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.wal.commit(&self.op_id)?;
        self.finished = true;
        debug!("{} committed (op_id={})", self.kind, self.op_id);
        Ok(())
    }

    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let entry = crate::wal::WalEntry {
            op_id: self.op_id.clone(),
            kind: self.kind,
            course_id: String::new(),
            timestamp: String::new(),
            rollback_steps: std::mem::take(&mut self.steps),
        };
        self.wal.rollback_entry(&entry);
        if let Err(e) = self.wal.commit(&self.op_id) {
            warn!("failed to clear WAL entry {} after rollback: {e}", self.op_id);
        }
        debug!("{} rolled back (op_id={})", self.kind, self.op_id);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.undo();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StoreLayout;
    use crate::records::{CourseState, EnrollmentState};
    use academy_schema::{new_course_id, new_enrollment_id, normalize_code, PersonId};

    fn setup() -> (tempfile::TempDir, RecordStore, WriteAheadLog) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let wal = WriteAheadLog::new(&layout);
        (dir, RecordStore::new(layout), wal)
    }

    fn course(code: &str) -> CourseRecord {
        let code = normalize_code(code).unwrap();
        CourseRecord::draft(new_course_id(&code), code, "Course".to_owned(), 3)
    }

    #[test]
    fn committed_writes_are_kept() {
        let (_dir, records, wal) = setup();
        let c = course("cs101");
        let mut tx = Transaction::begin(&records, &wal, WalOpKind::CreateCourse, &c.course_id)
            .unwrap();
        tx.claim_code(&c.code, &c.course_id).unwrap();
        tx.put_course(&c).unwrap();
        tx.commit().unwrap();

        assert!(records.course_exists(&c.course_id));
        assert!(records.code_owner("CS101").unwrap().is_some());
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn dropped_transaction_restores_previous_state() {
        let (_dir, records, wal) = setup();
        let mut c = course("cs101");
        records.put_course(&c).unwrap();

        {
            let mut tx =
                Transaction::begin(&records, &wal, WalOpKind::Transition, &c.course_id).unwrap();
            c.state = CourseState::Published;
            tx.put_course(&c).unwrap();
            let enrollment = EnrollmentRecord {
                enrollment_id: new_enrollment_id(&c.course_id, "p1"),
                course_id: c.course_id.clone(),
                person_id: PersonId::new("p1"),
                state: EnrollmentState::Requested,
                created_at: String::new(),
                updated_at: String::new(),
                checksum: None,
            };
            tx.put_enrollment(&enrollment).unwrap();
            assert_eq!(
                records.get_course(&c.course_id).unwrap().state,
                CourseState::Published
            );
            // dropped without commit
        }

        assert_eq!(
            records.get_course(&c.course_id).unwrap().state,
            CourseState::Draft
        );
        assert!(records.list_enrollments().unwrap().is_empty());
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn explicit_rollback_releases_claimed_code() {
        let (_dir, records, wal) = setup();
        let c = course("cs101");
        let mut tx =
            Transaction::begin(&records, &wal, WalOpKind::CreateCourse, &c.course_id).unwrap();
        tx.claim_code(&c.code, &c.course_id).unwrap();
        tx.rollback();
        assert!(records.code_owner("CS101").unwrap().is_none());
    }

    #[test]
    fn removed_enrollment_comes_back_on_rollback() {
        let (_dir, records, wal) = setup();
        let c = course("cs101");
        let enrollment = EnrollmentRecord {
            enrollment_id: new_enrollment_id(&c.course_id, "p1"),
            course_id: c.course_id.clone(),
            person_id: PersonId::new("p1"),
            state: EnrollmentState::Confirmed,
            created_at: String::new(),
            updated_at: String::new(),
            checksum: None,
        };
        records.put_enrollment(&enrollment).unwrap();

        let mut tx =
            Transaction::begin(&records, &wal, WalOpKind::RemoveEnrollment, &c.course_id).unwrap();
        tx.remove_enrollment(&c.course_id, &enrollment.enrollment_id)
            .unwrap();
        assert!(records.get_enrollment(&enrollment.enrollment_id).is_err());
        tx.rollback();

        let back = records.get_enrollment(&enrollment.enrollment_id).unwrap();
        assert_eq!(back.state, EnrollmentState::Confirmed);
    }

    #[test]
    fn second_write_to_same_file_keeps_first_snapshot() {
        let (_dir, records, wal) = setup();
        let mut c = course("cs101");
        records.put_course(&c).unwrap();
        let mut tx =
            Transaction::begin(&records, &wal, WalOpKind::UpdateCourse, &c.course_id).unwrap();
        c.name = "First".to_owned();
        tx.put_course(&c).unwrap();
        c.name = "Second".to_owned();
        tx.put_course(&c).unwrap();
        let entries = wal.list_incomplete().unwrap();
        assert_eq!(entries[0].rollback_steps.len(), 1);
        drop(tx);
        assert_eq!(records.get_course(&c.course_id).unwrap().name, "Course");
    }
}
