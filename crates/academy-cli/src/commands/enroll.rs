use super::{colorize_state, json_pretty, resolve_course, CommandError, EXIT_SUCCESS};
use crate::EnrollCommand;
use academy_core::Academy;
use academy_store::EnrollmentRecord;

pub fn run(academy: &Academy, cmd: &EnrollCommand, json: bool) -> Result<u8, CommandError> {
    let (verb, enrollment) = match cmd {
        EnrollCommand::Request { course, person } => {
            let course = resolve_course(academy, course)?;
            ("requested", academy.request_enrollment(&course.course_id, person)?)
        }
        EnrollCommand::Confirm { enrollment_id } => {
            ("confirmed", academy.confirm_enrollment(enrollment_id)?)
        }
        EnrollCommand::Cancel { enrollment_id } => {
            ("cancelled", academy.cancel_enrollment(enrollment_id)?)
        }
        EnrollCommand::Reject { enrollment_id } => {
            ("rejected", academy.reject_enrollment(enrollment_id)?)
        }
        EnrollCommand::Remove { enrollment_id } => {
            ("removed", academy.remove_enrollment(enrollment_id)?)
        }
        EnrollCommand::List { course, person } => {
            let enrollments = match (course, person) {
                (Some(course), _) => {
                    let course = resolve_course(academy, course)?;
                    academy.enrollments_for_course(&course.course_id)?
                }
                (None, Some(person)) => academy.enrollments_for_person(person)?,
                (None, None) => {
                    return Err(CommandError::validation("pass --course or --person"));
                }
            };
            return list(&enrollments, json);
        }
    };

    if json {
        println!("{}", json_pretty(&enrollment)?);
    } else {
        println!(
            "{verb} enrollment {} ({} in {}, now {})",
            enrollment.enrollment_id,
            enrollment.person_id,
            enrollment.course_id,
            colorize_state(&enrollment.state.to_string())
        );
    }
    Ok(EXIT_SUCCESS)
}

fn list(enrollments: &[EnrollmentRecord], json: bool) -> Result<u8, CommandError> {
    if json {
        println!("{}", json_pretty(&enrollments)?);
    } else if enrollments.is_empty() {
        println!("no enrollments found");
    } else {
        println!(
            "{:<34} {:<16} {:<11} COURSE_ID",
            "ENROLLMENT_ID", "PERSON", "STATE"
        );
        for e in enrollments {
            println!(
                "{:<34} {:<16} {:<11} {}",
                e.enrollment_id,
                e.person_id,
                colorize_state(&e.state.to_string()),
                e.course_id
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
