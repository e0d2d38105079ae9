use crate::audit::{AuditEvent, AuditKind, AuditSink, TracingAudit};
use crate::concurrency::{shutdown_requested, StoreLock};
use crate::lifecycle::{course_transition, CourseAction};
use crate::CoreError;
use academy_schema::{
    new_course_id, normalize_code, normalize_name, parse_config_file,
    validate_capacity, validate_date_range, validate_duration, AcademyConfig, Capacity,
    CategoryId, CourseId, PersonId, ValidationError,
};
use academy_store::{
    CourseRecord, CourseState, RecordStore, StoreLayout, Transaction, WalOpKind, WriteAheadLog,
};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Course Lifecycle Manager and Enrollment & Capacity Engine over one store.
///
/// Every mutating operation takes the course's exclusive lock, runs as a
/// single [`Transaction`], recomputes the course's seat figures from a fresh
/// count of confirmed enrollments before committing, and only then notifies
/// the audit sink. Readers take the shared lock and therefore never see an
/// enrollment change without the matching capacity change.
pub struct Academy {
    pub(crate) layout: StoreLayout,
    pub(crate) records: RecordStore,
    pub(crate) wal: WriteAheadLog,
    pub(crate) config: AcademyConfig,
    audit: Arc<dyn AuditSink>,
}

/// Input for [`Academy::create_course`].
#[derive(Debug, Clone, Default)]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<CategoryId>,
    pub instructor: Option<PersonId>,
    pub duration_hours: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Falls back to `course.default_max_students` from the config.
    pub max_students: Option<i64>,
}

impl NewCourse {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial edit for [`Academy::update_course`].
///
/// `None` leaves a field alone. For optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<CategoryId>>,
    pub instructor: Option<Option<PersonId>>,
    pub duration_hours: Option<Option<f64>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub max_students: Option<i64>,
}

/// Per-course result of [`Academy::apply_course_action`].
#[derive(Debug)]
pub struct CourseOutcome {
    pub course_id: CourseId,
    pub result: Result<CourseState, CoreError>,
}

impl CourseOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn clean_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}

impl Academy {
    /// Open (and if needed initialize) the store rooted at `root`.
    ///
    /// Loads `<root>/academy.toml` when present and rolls back transactions
    /// left behind by a crashed process. Entries whose course lock is still
    /// held belong to a live process and are left alone.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(root.into());
        layout.initialize()?;

        let config_path = layout.config_file();
        let config = if config_path.exists() {
            debug!("loading config from {}", config_path.display());
            parse_config_file(&config_path)?
        } else {
            AcademyConfig::default()
        };

        let records = RecordStore::new(layout.clone());
        let wal = WriteAheadLog::new(&layout);

        let recovered = wal.recover_where(|entry| {
            match StoreLock::try_acquire(&layout.course_lock_file(&entry.course_id)) {
                Ok(lock) => lock,
                Err(e) => {
                    warn!("course lock check failed for {}: {e}", entry.course_id);
                    None
                }
            }
        });
        if let Err(e) = recovered {
            warn!("WAL recovery failed: {e}");
        }

        Ok(Self {
            layout,
            records,
            wal,
            config,
            audit: Arc::new(TracingAudit),
        })
    }

    pub fn with_config(mut self, config: AcademyConfig) -> Result<Self, CoreError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &AcademyConfig {
        &self.config
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn store_root(&self) -> &Path {
        self.layout.root()
    }

    pub fn create_course(&self, input: NewCourse) -> Result<CourseRecord, CoreError> {
        let code = normalize_code(&input.code)?;
        info!("creating course {code}");
        let name = normalize_name(&input.name)?;
        validate_date_range(input.start_date, input.end_date)?;
        validate_duration(input.duration_hours)?;
        let max_students = match input.max_students {
            Some(n) => validate_capacity(n)?,
            None => self.config.course.default_max_students,
        };

        let _catalog = self.lock_catalog()?;
        if let Some(existing) = self.records.find_course_by_code(&code)? {
            return Err(CoreError::Conflict(format!(
                "course code '{code}' is already used by course {}",
                existing.course_id
            )));
        }

        let course_id = new_course_id(&code);
        // the record does not exist yet; the catalog lock serializes creation
        let _lock = StoreLock::acquire(&self.layout.course_lock_file(&course_id))?;

        let mut course = CourseRecord::draft(course_id, code, name, max_students);
        course.description = clean_text(input.description);
        course.category = input.category;
        course.instructor = input.instructor;
        course.duration_hours = input.duration_hours;
        course.start_date = input.start_date;
        course.end_date = input.end_date;

        let mut tx = Transaction::begin(
            &self.records,
            &self.wal,
            WalOpKind::CreateCourse,
            &course.course_id,
        )?;
        tx.claim_code(&course.code, &course.course_id)?;
        tx.put_course_if(&course, 0)?;
        tx.commit()?;

        let course = self.records.get_course(&course.course_id)?;
        self.emit(
            AuditEvent::new(AuditKind::CourseCreated, &course.course_id)
                .with_capacity(course.capacity()),
        );
        Ok(course)
    }

    pub fn update_course(
        &self,
        course_id: &str,
        update: CourseUpdate,
    ) -> Result<CourseRecord, CoreError> {
        info!("updating course {course_id}");
        let new_code = update.code.as_deref().map(normalize_code).transpose()?;
        let _catalog = match new_code {
            Some(_) => Some(self.lock_catalog()?),
            None => None,
        };
        let _lock = self.lock_course(course_id)?;
        let current = self.records.get_course(course_id)?;

        let mut course = current.clone();
        if let Some(name) = update.name {
            course.name = normalize_name(&name)?;
        }
        if let Some(description) = update.description {
            course.description = clean_text(description);
        }
        if let Some(category) = update.category {
            course.category = category;
        }
        if let Some(instructor) = update.instructor {
            course.instructor = instructor;
        }
        if let Some(duration) = update.duration_hours {
            course.duration_hours = duration;
        }
        if let Some(start) = update.start_date {
            course.start_date = start;
        }
        if let Some(end) = update.end_date {
            course.end_date = end;
        }
        validate_date_range(course.start_date, course.end_date)?;
        validate_duration(course.duration_hours)?;

        if let Some(requested) = update.max_students {
            let requested = validate_capacity(requested)?;
            let confirmed = self.records.confirmed_count(course_id)?;
            if requested < confirmed {
                return Err(ValidationError::CapacityBelowEnrolled {
                    requested,
                    confirmed,
                }
                .into());
            }
            course.max_students = requested;
        }

        let code_change = new_code.filter(|code| *code != current.code);
        if let Some(code) = &code_change {
            if let Some(other) = self.records.find_course_by_code(code)? {
                if other.course_id != course.course_id {
                    return Err(CoreError::Conflict(format!(
                        "course code '{code}' is already used by course {}",
                        other.course_id
                    )));
                }
            }
        }

        let mut tx =
            Transaction::begin(&self.records, &self.wal, WalOpKind::UpdateCourse, course_id)?;
        if let Some(code) = code_change {
            tx.claim_code(&code, course_id)?;
            tx.release_code(&current.code, course_id)?;
            course.code = code;
        }
        let capacity = self.recompute_in(&mut tx, &mut course)?;
        tx.commit()?;

        let event = AuditEvent::new(AuditKind::CourseUpdated, &course.course_id);
        self.emit(if capacity == current.capacity() {
            event
        } else {
            event.with_capacity(capacity)
        });
        Ok(self.records.get_course(course_id)?)
    }

    /// Read one course under its shared lock.
    pub fn get_course(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        if !self.records.course_exists(course_id) {
            return Err(CoreError::CourseNotFound(course_id.to_owned()));
        }
        let _lock = StoreLock::acquire_shared(&self.layout.course_lock_file(course_id))?;
        Ok(self.records.get_course(course_id)?)
    }

    pub fn find_course_by_code(&self, code: &str) -> Result<Option<CourseRecord>, CoreError> {
        let code = normalize_code(code)?;
        Ok(self.records.find_course_by_code(&code)?)
    }

    /// All readable courses ordered by code.
    ///
    /// Each record is read under its shared course lock. Unreadable records
    /// are skipped and logged.
    pub fn list_courses(&self) -> Result<Vec<CourseRecord>, CoreError> {
        let mut courses = Vec::new();
        for course_id in self.records.list_course_ids()? {
            let _lock = StoreLock::acquire_shared(&self.layout.course_lock_file(&course_id))?;
            match self.records.get_course(&course_id) {
                Ok(course) => courses.push(course),
                Err(e) => warn!("skipping course {course_id}: {e}"),
            }
        }
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    pub fn courses_in_category(&self, category: &str) -> Result<Vec<CourseRecord>, CoreError> {
        Ok(self
            .list_courses()?
            .into_iter()
            .filter(|c| c.category.as_ref().is_some_and(|cat| cat == category))
            .collect())
    }

    pub fn courses_taught_by(&self, person_id: &str) -> Result<Vec<CourseRecord>, CoreError> {
        Ok(self
            .list_courses()?
            .into_iter()
            .filter(|c| c.instructor.as_ref().is_some_and(|p| p == person_id))
            .collect())
    }

    pub fn category_course_count(&self, category: &str) -> Result<usize, CoreError> {
        Ok(self.courses_in_category(category)?.len())
    }

    /// Move one course through the lifecycle table.
    ///
    /// Only the state (plus `updated_at` and the revision) changes. A failed
    /// guard leaves the record untouched.
    pub fn transition_course(
        &self,
        course_id: &str,
        action: CourseAction,
    ) -> Result<CourseRecord, CoreError> {
        info!("{action} course {course_id}");
        let _lock = self.lock_course(course_id)?;
        let mut course = self.records.get_course(course_id)?;
        let from = course.state;
        let to = course_transition(from, action)?;
        course.state = to;

        let mut tx =
            Transaction::begin(&self.records, &self.wal, WalOpKind::Transition, course_id)?;
        Self::write_course(&mut tx, &mut course)?;
        tx.commit()?;

        self.emit(
            AuditEvent::new(AuditKind::CourseTransitioned, &course.course_id).with_states(from, to),
        );
        Ok(self.records.get_course(course_id)?)
    }

    pub fn publish(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        self.transition_course(course_id, CourseAction::Publish)
    }

    pub fn start(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        self.transition_course(course_id, CourseAction::Start)
    }

    pub fn complete(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        self.transition_course(course_id, CourseAction::Complete)
    }

    pub fn cancel(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        self.transition_course(course_id, CourseAction::Cancel)
    }

    pub fn reset_to_draft(&self, course_id: &str) -> Result<CourseRecord, CoreError> {
        self.transition_course(course_id, CourseAction::ResetToDraft)
    }

    /// Apply `action` to each course independently.
    ///
    /// One outcome per id, in input order. A failure on one course does not
    /// stop the rest; a pending shutdown marks every remaining id as
    /// [`CoreError::Interrupted`] without touching it.
    pub fn apply_course_action(
        &self,
        course_ids: &[CourseId],
        action: CourseAction,
    ) -> Vec<CourseOutcome> {
        let mut outcomes = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            let result = if shutdown_requested() {
                Err(CoreError::Interrupted(course_id.to_string()))
            } else {
                self.transition_course(course_id, action).map(|c| c.state)
            };
            if let Err(e) = &result {
                warn!("{action} {course_id} failed: {e}");
            }
            outcomes.push(CourseOutcome {
                course_id: course_id.clone(),
                result,
            });
        }
        outcomes
    }

    pub(crate) fn lock_course(&self, course_id: &str) -> Result<StoreLock, CoreError> {
        if !self.records.course_exists(course_id) {
            return Err(CoreError::CourseNotFound(course_id.to_owned()));
        }
        debug!("locking course {course_id}");
        StoreLock::acquire(&self.layout.course_lock_file(course_id))
    }

    fn lock_catalog(&self) -> Result<StoreLock, CoreError> {
        debug!("locking catalog");
        StoreLock::acquire(&self.layout.lock_file())
    }

    /// Compare-and-swap `course` against the revision it was read at.
    pub(crate) fn write_course(
        tx: &mut Transaction<'_>,
        course: &mut CourseRecord,
    ) -> Result<(), CoreError> {
        let expected = course.revision;
        course.updated_at = now();
        course.revision = tx.put_course_if(course, expected)?;
        Ok(())
    }

    /// Recount confirmed enrollments for `course` and write the refreshed
    /// seat figures inside `tx`. Enrollment writes earlier in the same
    /// transaction are already on disk and therefore counted.
    pub(crate) fn recompute_in(
        &self,
        tx: &mut Transaction<'_>,
        course: &mut CourseRecord,
    ) -> Result<Capacity, CoreError> {
        let confirmed = self.records.confirmed_count(&course.course_id)?;
        let capacity = course.refresh_capacity(confirmed);
        Self::write_course(tx, course)?;
        debug!(
            "course {} capacity: {} enrolled, {} seats left",
            course.course_id, capacity.enrolled_count, capacity.available_seats
        );
        Ok(capacity)
    }

    pub(crate) fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            warn!(
                "audit sink failed for {} on {}: {e}",
                event.kind, event.course_id
            );
        }
    }
}
