use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("course.default_max_students must be greater than zero")]
    ZeroDefaultCapacity,
}

/// Settings read from `academy.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AcademyConfig {
    #[serde(default)]
    pub course: CourseSection,
    #[serde(default)]
    pub enrollment: EnrollmentSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CourseSection {
    #[serde(default = "default_max_students")]
    pub default_max_students: u32,
}

impl Default for CourseSection {
    fn default() -> Self {
        Self {
            default_max_students: default_max_students(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnrollmentSection {
    /// Reject a second live enrollment for the same (course, person) pair.
    #[serde(default = "default_true")]
    pub unique_per_person: bool,
}

impl Default for EnrollmentSection {
    fn default() -> Self {
        Self {
            unique_per_person: true,
        }
    }
}

fn default_max_students() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl AcademyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.course.default_max_students == 0 {
            return Err(ConfigError::ZeroDefaultCapacity);
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<AcademyConfig, ConfigError> {
    let config: AcademyConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<AcademyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
