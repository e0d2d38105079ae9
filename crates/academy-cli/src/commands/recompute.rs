use super::{json_pretty, resolve_course, CommandError, EXIT_SUCCESS};
use academy_core::Academy;

pub fn run(academy: &Academy, course: &str, json: bool) -> Result<u8, CommandError> {
    let course = resolve_course(academy, course)?;
    let before = course.capacity();
    let after = academy.recompute_course(&course.course_id)?;

    if json {
        println!("{}", json_pretty(&after)?);
    } else if before == after.capacity() {
        println!(
            "course {} already consistent: {}/{} confirmed",
            after.code,
            after.enrolled_count(),
            after.max_students
        );
    } else {
        println!(
            "course {} repaired: {} -> {} confirmed, {} seats available",
            after.code,
            before.enrolled_count,
            after.enrolled_count(),
            after.available_seats()
        );
    }
    Ok(EXIT_SUCCESS)
}
