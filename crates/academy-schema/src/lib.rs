//! Identifiers, input normalization, capacity projection, and configuration for Academy.
//!
//! This crate is the pure layer underneath the store and the engine: string
//! newtypes for record references, course code normalization and the
//! date/capacity validators run on every create and update, the `Capacity`
//! projection derived from confirmed enrollments, and `academy.toml` parsing.

pub mod capacity;
pub mod config;
pub mod identity;
pub mod normalize;
pub mod types;

pub use capacity::{Capacity, FilterOp};
pub use config::{
    parse_config_file, parse_config_str, AcademyConfig, ConfigError, CourseSection,
    EnrollmentSection,
};
pub use identity::{is_valid_record_id, new_course_id, new_enrollment_id, ID_LEN};
pub use normalize::{
    normalize_code, normalize_name, normalize_person_id, validate_capacity, validate_date_range,
    validate_duration, CourseCode, ValidationError,
};
pub use types::{CategoryId, CourseId, EnrollmentId, PersonId};
