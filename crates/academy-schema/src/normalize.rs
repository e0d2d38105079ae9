use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("course code must not be empty")]
    EmptyCode,
    #[error("course name must not be empty")]
    EmptyName,
    #[error("person id must not be empty")]
    EmptyPersonId,
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("max_students must be greater than zero, got {0}")]
    NonPositiveCapacity(i64),
    #[error("max_students {requested} is below the {confirmed} confirmed enrollments")]
    CapacityBelowEnrolled { requested: u32, confirmed: u32 },
    #[error("duration_hours must be a finite, non-negative number, got {0}")]
    InvalidDuration(f64),
}

/// A course code after normalization: trimmed and uppercased.
///
/// The only way to obtain one is [`normalize_code`], so any `CourseCode`
/// held by a record is already in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseCode(String);

impl CourseCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for CourseCode {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim surrounding whitespace and uppercase. Inner characters are kept
/// as they are.
pub fn normalize_code(raw: &str) -> Result<CourseCode, ValidationError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    Ok(CourseCode(code))
}

pub fn normalize_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_owned())
}

pub fn normalize_person_id(raw: &str) -> Result<String, ValidationError> {
    let person = raw.trim();
    if person.is_empty() {
        return Err(ValidationError::EmptyPersonId);
    }
    Ok(person.to_owned())
}

pub fn validate_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            Err(ValidationError::EndBeforeStart { start, end })
        }
        _ => Ok(()),
    }
}

pub fn validate_capacity(max_students: i64) -> Result<u32, ValidationError> {
    if max_students <= 0 {
        return Err(ValidationError::NonPositiveCapacity(max_students));
    }
    u32::try_from(max_students).map_err(|_| ValidationError::NonPositiveCapacity(max_students))
}

pub fn validate_duration(hours: Option<f64>) -> Result<(), ValidationError> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(ValidationError::InvalidDuration(h)),
        _ => Ok(()),
    }
}
