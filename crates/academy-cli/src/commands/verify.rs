use super::{json_pretty, CommandError, EXIT_STORE_ERROR, EXIT_SUCCESS};
use academy_core::Academy;

pub fn run(academy: &Academy, json: bool) -> Result<u8, CommandError> {
    let integrity = academy.verify_store()?;
    let capacity = academy.verify_capacity()?;
    let healthy = integrity.failed.is_empty() && capacity.is_clean();

    if json {
        let payload = serde_json::json!({
            "healthy": healthy,
            "integrity": integrity,
            "capacity": capacity,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "records:  {}/{} courses, {}/{} enrollments, {}/{} codes passed",
            integrity.courses_passed,
            integrity.courses_checked,
            integrity.enrollments_passed,
            integrity.enrollments_checked,
            integrity.codes_passed,
            integrity.codes_checked
        );
        for f in &integrity.failed {
            println!("  FAIL {}: {}", f.id, f.reason);
        }
        println!(
            "capacity: {}/{} courses consistent",
            capacity.consistent, capacity.checked
        );
        for d in &capacity.drifted {
            println!(
                "  DRIFT {}: stored {} confirmed, actual {}",
                d.course_id, d.stored.enrolled_count, d.actual.enrolled_count
            );
        }
        for id in &capacity.unreadable {
            println!("  UNREADABLE {id}");
        }
        if !capacity.drifted.is_empty() {
            println!("run 'academy recompute <course>' to repair drifted courses");
        }
    }

    if healthy {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_STORE_ERROR)
    }
}
