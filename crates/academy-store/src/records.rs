use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use academy_schema::{
    is_valid_record_id, Capacity, CategoryId, CourseCode, CourseId, EnrollmentId, PersonId,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CourseState {
    Draft,
    Published,
    InProgress,
    Done,
    Cancelled,
}

impl CourseState {
    pub const ALL: [CourseState; 5] = [
        CourseState::Draft,
        CourseState::Published,
        CourseState::InProgress,
        CourseState::Done,
        CourseState::Cancelled,
    ];

    /// Whether new or confirmed enrollments are allowed in this state.
    pub fn accepts_enrollment(self) -> bool {
        matches!(
            self,
            CourseState::Draft | CourseState::Published | CourseState::InProgress
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CourseState::Draft),
            "published" => Some(CourseState::Published),
            "in_progress" => Some(CourseState::InProgress),
            "done" => Some(CourseState::Done),
            "cancelled" => Some(CourseState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for CourseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseState::Draft => write!(f, "draft"),
            CourseState::Published => write!(f, "published"),
            CourseState::InProgress => write!(f, "in_progress"),
            CourseState::Done => write!(f, "done"),
            CourseState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Requested,
    Confirmed,
    Cancelled,
    Rejected,
}

impl EnrollmentState {
    pub const ALL: [EnrollmentState; 4] = [
        EnrollmentState::Requested,
        EnrollmentState::Confirmed,
        EnrollmentState::Cancelled,
        EnrollmentState::Rejected,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, EnrollmentState::Cancelled | EnrollmentState::Rejected)
    }

    /// Only confirmed enrollments occupy a seat.
    pub fn occupies_seat(self) -> bool {
        self == EnrollmentState::Confirmed
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(EnrollmentState::Requested),
            "confirmed" => Some(EnrollmentState::Confirmed),
            "cancelled" => Some(EnrollmentState::Cancelled),
            "rejected" => Some(EnrollmentState::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnrollmentState::Requested => write!(f, "requested"),
            EnrollmentState::Confirmed => write!(f, "confirmed"),
            EnrollmentState::Cancelled => write!(f, "cancelled"),
            EnrollmentState::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseRecord {
    pub course_id: CourseId,
    pub code: CourseCode,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub instructor: Option<PersonId>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub max_students: u32,
    pub state: CourseState,
    /// Derived from `max_students` and the confirmed enrollments; written
    /// only through [`CourseRecord::refresh_capacity`].
    capacity: Capacity,
    /// Bumped on every write; used as a compare-and-swap token.
    pub revision: u64,
    pub created_at: String,
    pub updated_at: String,
    /// blake3 checksum for integrity verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl CourseRecord {
    /// A fresh course in `draft` with no enrollments.
    pub fn draft(course_id: CourseId, code: CourseCode, name: String, max_students: u32) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            course_id,
            code,
            name,
            description: None,
            category: None,
            instructor: None,
            duration_hours: None,
            start_date: None,
            end_date: None,
            max_students,
            state: CourseState::Draft,
            capacity: Capacity::compute(max_students, 0),
            revision: 0,
            created_at: now.clone(),
            updated_at: now,
            checksum: None,
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn enrolled_count(&self) -> u32 {
        self.capacity.enrolled_count
    }

    pub fn available_seats(&self) -> i64 {
        self.capacity.available_seats
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_full
    }

    /// Recompute the derived seat figures from a confirmed-enrollment count.
    pub fn refresh_capacity(&mut self, confirmed: u32) -> Capacity {
        self.capacity = Capacity::compute(self.max_students, confirmed);
        self.capacity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub enrollment_id: EnrollmentId,
    pub course_id: CourseId,
    pub person_id: PersonId,
    pub state: EnrollmentState,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Records that carry an embedded checksum over their own content.
trait Checksummed: Serialize + DeserializeOwned + Clone {
    fn checksum(&self) -> Option<&str>;
    fn set_checksum(&mut self, checksum: Option<String>);

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.set_checksum(None);
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

impl Checksummed for CourseRecord {
    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
    fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }
}

impl Checksummed for EnrollmentRecord {
    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
    fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }
}

pub(crate) fn atomic_write(dir: &Path, dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

fn write_record<T: Checksummed>(dir: &Path, dest: &Path, record: &T) -> Result<(), StoreError> {
    let mut sealed = record.clone();
    sealed.set_checksum(Some(sealed.compute_checksum()?));
    let content = serde_json::to_string_pretty(&sealed)?;
    atomic_write(dir, dest, content.as_bytes())
}

fn read_record<T: Checksummed>(path: &Path, id: &str) -> Result<T, StoreError> {
    let content = fs::read_to_string(path)?;
    let record: T = serde_json::from_str(&content)?;
    if let Some(expected) = record.checksum() {
        let actual = record.compute_checksum()?;
        if actual != expected {
            return Err(StoreError::IntegrityFailure {
                id: id.to_owned(),
                expected: expected.to_owned(),
                actual,
            });
        }
    }
    Ok(record)
}

fn list_ids(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let name = entry.file_name();
            let name_str = name.to_str().unwrap_or("");
            if !name_str.starts_with('.') {
                ids.push(name_str.to_owned());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

fn list_dirs(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Course and enrollment records, one checksummed JSON file each, plus the
/// unique code index.
pub struct RecordStore {
    layout: StoreLayout,
}

impl RecordStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn course_path(&self, course_id: &str) -> PathBuf {
        self.layout.course_path(course_id)
    }

    pub fn enrollment_path(&self, course_id: &str, enrollment_id: &str) -> PathBuf {
        self.layout.enrollment_path(course_id, enrollment_id)
    }

    pub fn code_path(&self, code: &str) -> PathBuf {
        self.layout.code_path(code)
    }

    pub fn put_course(&self, course: &CourseRecord) -> Result<(), StoreError> {
        write_record(
            &self.layout.courses_dir(),
            &self.course_path(&course.course_id),
            course,
        )
    }

    /// Write `course` only if the stored revision still equals `expected`.
    ///
    /// The stored record is replaced by `course` with its revision bumped to
    /// `expected + 1`, which is returned.
    pub fn put_course_if(&self, course: &CourseRecord, expected: u64) -> Result<u64, StoreError> {
        let path = self.course_path(&course.course_id);
        if path.exists() {
            let current = self.get_course(&course.course_id)?;
            if current.revision != expected {
                return Err(StoreError::RevisionConflict {
                    id: course.course_id.to_string(),
                    expected,
                    found: current.revision,
                });
            }
        } else if expected != 0 {
            return Err(StoreError::CourseNotFound(course.course_id.to_string()));
        }
        let mut next = course.clone();
        next.revision = expected + 1;
        self.put_course(&next)?;
        Ok(next.revision)
    }

    pub fn get_course(&self, course_id: &str) -> Result<CourseRecord, StoreError> {
        if !is_valid_record_id(course_id) {
            return Err(StoreError::CourseNotFound(course_id.to_owned()));
        }
        let path = self.course_path(course_id);
        if !path.exists() {
            return Err(StoreError::CourseNotFound(course_id.to_owned()));
        }
        read_record(&path, course_id)
    }

    pub fn course_exists(&self, course_id: &str) -> bool {
        is_valid_record_id(course_id) && self.course_path(course_id).exists()
    }

    /// Ids of every course record file, valid or not, without reading them.
    pub fn list_course_ids(&self) -> Result<Vec<String>, StoreError> {
        list_ids(&self.layout.courses_dir())
    }

    pub fn list_courses(&self) -> Result<Vec<CourseRecord>, StoreError> {
        let mut results = Vec::new();
        for id in self.list_course_ids()? {
            match self.get_course(&id) {
                Ok(course) => results.push(course),
                Err(e) => {
                    tracing::warn!("skipping corrupted course record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    /// Like `list_courses()`, but returns per-entry `Result`s so callers can
    /// surface individual corruption errors.
    #[allow(clippy::type_complexity)]
    pub fn list_courses_with_errors(
        &self,
    ) -> Result<Vec<Result<CourseRecord, (String, StoreError)>>, StoreError> {
        Ok(list_ids(&self.layout.courses_dir())?
            .into_iter()
            .map(|id| self.get_course(&id).map_err(|e| (id, e)))
            .collect())
    }

    pub fn find_course_by_code(&self, code: &str) -> Result<Option<CourseRecord>, StoreError> {
        if let Some(owner) = self.code_owner(code)? {
            if let Ok(course) = self.get_course(&owner) {
                if course.code.as_str() == code {
                    return Ok(Some(course));
                }
            }
        }
        Ok(self
            .list_courses()?
            .into_iter()
            .find(|c| c.code.as_str() == code))
    }

    pub fn put_enrollment(&self, enrollment: &EnrollmentRecord) -> Result<(), StoreError> {
        let dir = self.layout.course_enrollments_dir(&enrollment.course_id);
        fs::create_dir_all(&dir)?;
        write_record(
            &dir,
            &self.enrollment_path(&enrollment.course_id, &enrollment.enrollment_id),
            enrollment,
        )
    }

    /// Path of an existing enrollment, found by probing each course's
    /// directory for the id.
    pub fn locate_enrollment(&self, enrollment_id: &str) -> Result<Option<PathBuf>, StoreError> {
        if !is_valid_record_id(enrollment_id) {
            return Ok(None);
        }
        for course_id in list_dirs(&self.layout.enrollments_dir())? {
            let path = self.enrollment_path(&course_id, enrollment_id);
            if path.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub fn get_enrollment(&self, enrollment_id: &str) -> Result<EnrollmentRecord, StoreError> {
        match self.locate_enrollment(enrollment_id)? {
            Some(path) => read_record(&path, enrollment_id),
            None => Err(StoreError::EnrollmentNotFound(enrollment_id.to_owned())),
        }
    }

    pub fn remove_enrollment(&self, course_id: &str, enrollment_id: &str) -> Result<(), StoreError> {
        if !is_valid_record_id(course_id) || !is_valid_record_id(enrollment_id) {
            return Ok(());
        }
        let path = self.enrollment_path(course_id, enrollment_id);
        if path.exists() {
            fs::remove_file(path)?;
            fsync_dir(&self.layout.course_enrollments_dir(course_id))?;
        }
        Ok(())
    }

    /// Every enrollment of one course, each read on its own so a corrupt
    /// record can be reported without hiding the rest.
    #[allow(clippy::type_complexity)]
    pub fn course_enrollments_with_errors(
        &self,
        course_id: &str,
    ) -> Result<Vec<Result<EnrollmentRecord, (String, StoreError)>>, StoreError> {
        if !is_valid_record_id(course_id) {
            return Ok(Vec::new());
        }
        let dir = self.layout.course_enrollments_dir(course_id);
        Ok(list_ids(&dir)?
            .into_iter()
            .filter(|id| is_valid_record_id(id))
            .map(|id| read_record(&dir.join(&id), &id).map_err(|e| (id, e)))
            .collect())
    }

    pub fn list_enrollments(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let mut results = Vec::new();
        for entry in self.list_enrollments_with_errors()? {
            match entry {
                Ok(e) => results.push(e),
                Err((id, e)) => {
                    tracing::warn!("skipping corrupted enrollment record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    #[allow(clippy::type_complexity)]
    pub fn list_enrollments_with_errors(
        &self,
    ) -> Result<Vec<Result<EnrollmentRecord, (String, StoreError)>>, StoreError> {
        let mut results = Vec::new();
        for course_id in list_dirs(&self.layout.enrollments_dir())? {
            results.extend(self.course_enrollments_with_errors(&course_id)?);
        }
        Ok(results)
    }

    pub fn enrollments_for_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let mut results = Vec::new();
        for entry in self.course_enrollments_with_errors(course_id)? {
            match entry {
                Ok(e) => results.push(e),
                Err((id, e)) => {
                    tracing::warn!("skipping corrupted enrollment record '{id}': {e}");
                }
            }
        }
        Ok(results)
    }

    pub fn enrollments_for_person(
        &self,
        person_id: &str,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        Ok(self
            .list_enrollments()?
            .into_iter()
            .filter(|e| e.person_id == *person_id)
            .collect())
    }

    /// Number of enrollments for `course_id` that currently occupy a seat.
    ///
    /// Only that course's records are read. A corrupted one fails the count
    /// rather than being skipped, so a stale figure is never written back.
    pub fn confirmed_count(&self, course_id: &str) -> Result<u32, StoreError> {
        let mut count = 0u32;
        for entry in self.course_enrollments_with_errors(course_id)? {
            let enrollment = entry.map_err(|(_, e)| e)?;
            if enrollment.state.occupies_seat() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Claim `code` for `course_id` in the unique index.
    ///
    /// Creation is exclusive at the filesystem level, so two writers racing
    /// for the same code cannot both succeed. Re-claiming a code already
    /// held by the same course is a no-op.
    pub fn claim_code(&self, code: &str, course_id: &str) -> Result<(), StoreError> {
        let path = self.code_path(code);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(course_id.as_bytes())?;
                file.sync_all()?;
                fsync_dir(&self.layout.codes_dir())?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path)?;
                if owner.trim() == course_id {
                    Ok(())
                } else {
                    Err(StoreError::CodeTaken {
                        code: code.to_owned(),
                        owner: owner.trim().to_owned(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn release_code(&self, code: &str, course_id: &str) -> Result<(), StoreError> {
        if self.code_owner(code)?.as_deref() == Some(course_id) {
            fs::remove_file(self.code_path(code))?;
            fsync_dir(&self.layout.codes_dir())?;
        }
        Ok(())
    }

    pub fn code_owner(&self, code: &str) -> Result<Option<String>, StoreError> {
        let path = self.code_path(code);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?.trim().to_owned()))
    }

    /// All `(index key, owner)` pairs in the unique index. Keys are
    /// [`code_key`](crate::layout::code_key) digests; the code itself is
    /// read from the owning course record.
    pub fn list_codes(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut codes = Vec::new();
        for key in list_ids(&self.layout.codes_dir())? {
            let owner = fs::read_to_string(self.layout.codes_dir().join(&key))?;
            codes.push((key, owner.trim().to_owned()));
        }
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_schema::{new_course_id, new_enrollment_id, normalize_code};

    fn test_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, RecordStore::new(layout))
    }

    fn sample_course(code: &str) -> CourseRecord {
        let code = normalize_code(code).unwrap();
        CourseRecord::draft(new_course_id(&code), code, "Intro".to_owned(), 2)
    }

    fn sample_enrollment(course: &CourseRecord, person: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            enrollment_id: new_enrollment_id(&course.course_id, person),
            course_id: course.course_id.clone(),
            person_id: PersonId::new(person),
            state: EnrollmentState::Requested,
            created_at: "2025-01-01T00:00:00Z".to_owned(),
            updated_at: "2025-01-01T00:00:00Z".to_owned(),
            checksum: None,
        }
    }

    #[test]
    fn course_roundtrip_embeds_checksum() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course(&course).unwrap();
        let back = store.get_course(&course.course_id).unwrap();
        assert_eq!(back.code.as_str(), "CS101");
        assert_eq!(back.state, CourseState::Draft);
        assert_eq!(back.available_seats(), 2);
        assert!(back.checksum.is_some(), "put_course() must embed a checksum");
    }

    #[test]
    fn tampered_course_fails_checksum() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course(&course).unwrap();
        let path = store.course_path(&course.course_id);
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("\"Intro\"", "\"Hacked\"")).unwrap();
        assert!(matches!(
            store.get_course(&course.course_id),
            Err(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn unknown_and_malformed_ids_are_not_found() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.get_course("0123456789abcdef"),
            Err(StoreError::CourseNotFound(_))
        ));
        assert!(matches!(
            store.get_course("../escape"),
            Err(StoreError::CourseNotFound(_))
        ));
        assert!(matches!(
            store.get_enrollment("nope"),
            Err(StoreError::EnrollmentNotFound(_))
        ));
    }

    #[test]
    fn put_course_if_bumps_revision() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        assert_eq!(store.put_course_if(&course, 0).unwrap(), 1);
        let stored = store.get_course(&course.course_id).unwrap();
        assert_eq!(store.put_course_if(&stored, 1).unwrap(), 2);
    }

    #[test]
    fn put_course_if_rejects_stale_revision() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course_if(&course, 0).unwrap();
        store.put_course_if(&course, 1).unwrap();
        let err = store.put_course_if(&course, 1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RevisionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn confirmed_count_only_counts_confirmed() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course(&course).unwrap();
        let other = sample_course("cs102");
        store.put_course(&other).unwrap();

        let mut a = sample_enrollment(&course, "p1");
        a.state = EnrollmentState::Confirmed;
        let mut b = sample_enrollment(&course, "p2");
        b.state = EnrollmentState::Cancelled;
        let c = sample_enrollment(&course, "p3");
        let mut d = sample_enrollment(&other, "p1");
        d.state = EnrollmentState::Confirmed;
        for e in [&a, &b, &c, &d] {
            store.put_enrollment(e).unwrap();
        }

        assert_eq!(store.confirmed_count(&course.course_id).unwrap(), 1);
        assert_eq!(store.enrollments_for_course(&course.course_id).unwrap().len(), 3);
        assert_eq!(store.enrollments_for_person("p1").unwrap().len(), 2);
    }

    #[test]
    fn confirmed_count_fails_on_corrupt_enrollment() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course(&course).unwrap();
        let dir = store.layout().course_enrollments_dir(&course.course_id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            store.enrollment_path(&course.course_id, "0123456789abcdef"),
            "GARBAGE",
        )
        .unwrap();
        assert!(store.confirmed_count(&course.course_id).is_err());
        assert!(store.list_enrollments().unwrap().is_empty());
    }

    #[test]
    fn corrupt_enrollment_only_affects_its_own_course() {
        let (_dir, store) = test_store();
        let healthy = sample_course("cs101");
        let broken = sample_course("cs102");
        store.put_course(&healthy).unwrap();
        store.put_course(&broken).unwrap();

        let mut seated = sample_enrollment(&healthy, "alice");
        seated.state = EnrollmentState::Confirmed;
        store.put_enrollment(&seated).unwrap();
        let damaged = sample_enrollment(&broken, "bob");
        store.put_enrollment(&damaged).unwrap();
        fs::write(
            store.enrollment_path(&broken.course_id, &damaged.enrollment_id),
            "GARBAGE",
        )
        .unwrap();

        assert_eq!(store.confirmed_count(&healthy.course_id).unwrap(), 1);
        assert_eq!(store.enrollments_for_course(&healthy.course_id).unwrap().len(), 1);
        assert!(store.confirmed_count(&broken.course_id).is_err());
    }

    #[test]
    fn enrollment_is_found_by_id_alone() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        let e = sample_enrollment(&course, "p1");
        store.put_enrollment(&e).unwrap();
        assert_eq!(
            store.locate_enrollment(&e.enrollment_id).unwrap(),
            Some(store.enrollment_path(&course.course_id, &e.enrollment_id))
        );
        assert_eq!(store.get_enrollment(&e.enrollment_id).unwrap().person_id, "p1");
    }

    #[test]
    fn remove_enrollment_is_idempotent() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        let e = sample_enrollment(&course, "p1");
        store.put_enrollment(&e).unwrap();
        store
            .remove_enrollment(&course.course_id, &e.enrollment_id)
            .unwrap();
        store
            .remove_enrollment(&course.course_id, &e.enrollment_id)
            .unwrap();
        assert!(store.get_enrollment(&e.enrollment_id).is_err());
    }

    #[test]
    fn code_claim_is_exclusive() {
        let (_dir, store) = test_store();
        store.claim_code("CS101", "aaaaaaaaaaaaaaaa").unwrap();
        store.claim_code("CS101", "aaaaaaaaaaaaaaaa").unwrap();
        let err = store.claim_code("CS101", "bbbbbbbbbbbbbbbb").unwrap_err();
        assert!(matches!(err, StoreError::CodeTaken { .. }));
        assert_eq!(
            store.code_owner("CS101").unwrap().as_deref(),
            Some("aaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn release_code_only_by_owner() {
        let (_dir, store) = test_store();
        store.claim_code("CS101", "aaaaaaaaaaaaaaaa").unwrap();
        store.release_code("CS101", "bbbbbbbbbbbbbbbb").unwrap();
        assert!(store.code_owner("CS101").unwrap().is_some());
        store.release_code("CS101", "aaaaaaaaaaaaaaaa").unwrap();
        assert!(store.code_owner("CS101").unwrap().is_none());
    }

    #[test]
    fn free_text_codes_are_indexed_by_digest() {
        let (_dir, store) = test_store();
        store.claim_code("CS 101", "aaaaaaaaaaaaaaaa").unwrap();
        store.claim_code("../ÉCON.1", "bbbbbbbbbbbbbbbb").unwrap();
        assert!(matches!(
            store.claim_code("CS 101", "cccccccccccccccc"),
            Err(StoreError::CodeTaken { .. })
        ));
        assert!(store.code_owner("CS101").unwrap().is_none());

        let codes = store.list_codes().unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes
            .iter()
            .any(|(key, owner)| *key == crate::layout::code_key("../ÉCON.1")
                && owner == "bbbbbbbbbbbbbbbb"));
    }

    #[test]
    fn find_course_by_code_uses_index_and_scan() {
        let (_dir, store) = test_store();
        let course = sample_course("cs101");
        store.put_course(&course).unwrap();
        // Not indexed yet: found by scan.
        assert!(store.find_course_by_code("CS101").unwrap().is_some());
        store.claim_code("CS101", &course.course_id).unwrap();
        let found = store.find_course_by_code("CS101").unwrap().unwrap();
        assert_eq!(found.course_id, course.course_id);
        assert!(store.find_course_by_code("CS999").unwrap().is_none());
    }

    #[test]
    fn list_courses_skips_corruption() {
        let (_dir, store) = test_store();
        store.put_course(&sample_course("cs101")).unwrap();
        fs::write(store.course_path("0123456789abcdef"), "NOT JSON").unwrap();
        assert_eq!(store.list_courses().unwrap().len(), 1);
        let all = store.list_courses_with_errors().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[test]
    fn state_names_roundtrip_through_parse() {
        for s in CourseState::ALL {
            assert_eq!(CourseState::parse(&s.to_string()), Some(s));
        }
        for s in EnrollmentState::ALL {
            assert_eq!(EnrollmentState::parse(&s.to_string()), Some(s));
        }
    }

    #[test]
    fn course_state_serializes_snake_case() {
        let json = serde_json::to_string(&CourseState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn refresh_capacity_tracks_max_students() {
        let mut course = sample_course("cs101");
        course.refresh_capacity(2);
        assert!(course.is_full());
        course.max_students = 5;
        course.refresh_capacity(2);
        assert_eq!(course.available_seats(), 3);
        assert_eq!(course.enrolled_count(), 2);
    }
}
