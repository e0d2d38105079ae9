use super::{json_pretty, CommandError, EXIT_SUCCESS};
use academy_core::Academy;

pub fn run(academy: &Academy, person_id: &str, json: bool) -> Result<u8, CommandError> {
    let summary = academy.person_summary(person_id)?;
    if json {
        println!("{}", json_pretty(&summary)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("person:       {}", summary.person_id);
    println!("enrollments:  {}", summary.enrollments_total);
    println!("enrolled in:  {}", summary.courses_enrolled.len());
    for course_id in &summary.courses_enrolled {
        println!("  {course_id}");
    }
    println!("teaching:     {}", summary.courses_teaching.len());
    for course_id in &summary.courses_teaching {
        println!("  {course_id}");
    }
    Ok(EXIT_SUCCESS)
}
