use crate::layout::{code_key, StoreLayout};
use crate::records::RecordStore;
use crate::StoreError;
use academy_schema::normalize_code;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub courses_checked: usize,
    pub courses_passed: usize,
    pub enrollments_checked: usize,
    pub enrollments_passed: usize,
    pub codes_checked: usize,
    pub codes_passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

#[derive(Debug, Serialize)]
pub struct IntegrityFailure {
    pub id: String,
    pub reason: String,
}

/// Verify record checksums and the agreement between the code index and
/// the course records.
pub fn verify_store_integrity(layout: &StoreLayout) -> Result<IntegrityReport, StoreError> {
    let records = RecordStore::new(layout.clone());
    let mut report = IntegrityReport::default();

    let courses = records.list_courses_with_errors()?;
    report.courses_checked = courses.len();
    let mut valid_courses = Vec::new();
    for entry in courses {
        match entry {
            Ok(course) => {
                report.courses_passed += 1;
                valid_courses.push(course);
            }
            Err((id, e)) => report.failed.push(IntegrityFailure {
                id,
                reason: format!("course record: {e}"),
            }),
        }
    }

    let enrollments = records.list_enrollments_with_errors()?;
    report.enrollments_checked = enrollments.len();
    for entry in enrollments {
        match entry {
            Ok(enrollment) => {
                if valid_courses
                    .iter()
                    .any(|c| c.course_id == enrollment.course_id)
                {
                    report.enrollments_passed += 1;
                } else {
                    report.failed.push(IntegrityFailure {
                        id: enrollment.enrollment_id.to_string(),
                        reason: format!("references unknown course {}", enrollment.course_id),
                    });
                }
            }
            Err((id, e)) => report.failed.push(IntegrityFailure {
                id,
                reason: format!("enrollment record: {e}"),
            }),
        }
    }

    let codes = records.list_codes()?;
    report.codes_checked = codes.len();
    for (key, owner) in &codes {
        match valid_courses.iter().find(|c| c.course_id == *owner) {
            Some(course) if code_key(&course.code) == *key => report.codes_passed += 1,
            Some(course) => report.failed.push(IntegrityFailure {
                id: key.clone(),
                reason: format!(
                    "index entry points at {owner}, which now uses code {}",
                    course.code
                ),
            }),
            None => report.failed.push(IntegrityFailure {
                id: key.clone(),
                reason: format!("index entry points at unknown course {owner}"),
            }),
        }
    }

    for course in &valid_courses {
        let key = code_key(&course.code);
        let indexed = codes
            .iter()
            .any(|(k, owner)| *owner == course.course_id && *k == key);
        if !indexed {
            report.failed.push(IntegrityFailure {
                id: course.course_id.to_string(),
                reason: format!("code {} missing from the unique index", course.code),
            });
        }
        if normalize_code(&course.code).map(|c| c != course.code).unwrap_or(true) {
            report.failed.push(IntegrityFailure {
                id: course.course_id.to_string(),
                reason: format!("code '{}' is not normalized", course.code),
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CourseRecord;
    use academy_schema::new_course_id;
    use std::fs;

    fn setup() -> (tempfile::TempDir, StoreLayout, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let records = RecordStore::new(layout.clone());
        (dir, layout, records)
    }

    fn indexed_course(records: &RecordStore, code: &str) -> CourseRecord {
        let code = normalize_code(code).unwrap();
        let course = CourseRecord::draft(new_course_id(&code), code, "C".to_owned(), 5);
        records.claim_code(&course.code, &course.course_id).unwrap();
        records.put_course(&course).unwrap();
        course
    }

    #[test]
    fn clean_store_passes() {
        let (_dir, layout, records) = setup();
        indexed_course(&records, "cs101");
        indexed_course(&records, "cs102");
        let report = verify_store_integrity(&layout).unwrap();
        assert_eq!(report.courses_checked, 2);
        assert_eq!(report.courses_passed, 2);
        assert_eq!(report.codes_passed, 2);
        assert!(report.failed.is_empty(), "{:?}", report.failed);
    }

    #[test]
    fn corrupt_course_is_reported() {
        let (_dir, layout, records) = setup();
        let course = indexed_course(&records, "cs101");
        fs::write(records.course_path(&course.course_id), "{broken").unwrap();
        let report = verify_store_integrity(&layout).unwrap();
        assert_eq!(report.courses_passed, 0);
        assert!(report.failed.iter().any(|f| f.id == course.course_id.as_str()));
    }

    #[test]
    fn unindexed_course_is_reported() {
        let (_dir, layout, records) = setup();
        let code = normalize_code("cs101").unwrap();
        let course = CourseRecord::draft(new_course_id(&code), code, "C".to_owned(), 5);
        records.put_course(&course).unwrap();
        let report = verify_store_integrity(&layout).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("missing from the unique index"));
    }

    #[test]
    fn free_text_code_passes() {
        let (_dir, layout, records) = setup();
        indexed_course(&records, "  cs 101 ");
        indexed_course(&records, "écon.1");
        let report = verify_store_integrity(&layout).unwrap();
        assert_eq!(report.codes_checked, 2);
        assert_eq!(report.codes_passed, 2);
        assert!(report.failed.is_empty(), "{:?}", report.failed);
    }

    #[test]
    fn dangling_index_entry_is_reported() {
        let (_dir, layout, records) = setup();
        records.claim_code("GHOST", "0123456789abcdef").unwrap();
        let report = verify_store_integrity(&layout).unwrap();
        assert_eq!(report.codes_checked, 1);
        assert_eq!(report.codes_passed, 0);
        assert_eq!(report.failed.len(), 1);
    }
}
