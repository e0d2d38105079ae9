pub mod completions;
pub mod course;
pub mod enroll;
pub mod person;
pub mod recompute;
pub mod verify;

use academy_core::{Academy, CoreError, ErrorKind};
use academy_store::CourseRecord;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION: u8 = 2;
pub const EXIT_CONFLICT: u8 = 3;
pub const EXIT_STORE_ERROR: u8 = 4;

/// A failed command: the message printed to stderr and the process exit code.
#[derive(Debug)]
pub struct CommandError {
    pub message: String,
    pub code: u8,
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: EXIT_VALIDATION,
        }
    }
}

pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidTransition | ErrorKind::InvalidState => {
            EXIT_VALIDATION
        }
        ErrorKind::Conflict | ErrorKind::CapacityExceeded => EXIT_CONFLICT,
        ErrorKind::Storage => EXIT_STORE_ERROR,
        ErrorKind::NotFound | ErrorKind::Interrupted => EXIT_FAILURE,
    }
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        Self {
            code: exit_code_for(e.kind()),
            message: e.to_string(),
        }
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self {
            message,
            code: EXIT_FAILURE,
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "published" | "confirmed" => Style::new().green().apply_to(state).to_string(),
        "in_progress" => Style::new().cyan().bold().apply_to(state).to_string(),
        "draft" | "requested" => Style::new().yellow().apply_to(state).to_string(),
        "done" => Style::new().blue().apply_to(state).to_string(),
        "cancelled" | "rejected" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Resolve a course given either its record id or its code (any case).
pub fn resolve_course(academy: &Academy, input: &str) -> Result<CourseRecord, CommandError> {
    match academy.get_course(input) {
        Ok(course) => return Ok(course),
        Err(CoreError::CourseNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    academy
        .find_course_by_code(input)?
        .ok_or_else(|| CommandError::from(CoreError::CourseNotFound(input.to_owned())))
}

pub fn print_course(course: &CourseRecord) {
    println!("course_id:    {}", course.course_id);
    println!("code:         {}", course.code);
    println!("name:         {}", course.name);
    println!("state:        {}", colorize_state(&course.state.to_string()));
    if let Some(description) = &course.description {
        println!("description:  {description}");
    }
    println!(
        "category:     {}",
        course.category.as_ref().map_or("(none)", |c| c.as_str())
    );
    println!(
        "instructor:   {}",
        course.instructor.as_ref().map_or("(none)", |p| p.as_str())
    );
    if let Some(hours) = course.duration_hours {
        println!("hours:        {hours}");
    }
    if let Some(start) = course.start_date {
        println!("start_date:   {start}");
    }
    if let Some(end) = course.end_date {
        println!("end_date:     {end}");
    }
    println!(
        "seats:        {}/{} confirmed, {} available{}",
        course.enrolled_count(),
        course.max_students,
        course.available_seats(),
        if course.is_full() { " (full)" } else { "" }
    );
    println!("revision:     {}", course.revision);
    println!("updated_at:   {}", course.updated_at);
}
