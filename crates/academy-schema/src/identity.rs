use crate::types::{CourseId, EnrollmentId};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Length of the hex identifiers handed out for new records.
pub const ID_LEN: usize = 16;

/// Mint a fresh identifier from a domain tag, a caller-provided seed, the
/// wall clock, the process id, and a process-wide counter.
///
/// The counter keeps ids distinct within a process even when the clock does
/// not advance between calls; the pid separates concurrent processes.
fn mint(kind: &str, seed: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(seed.as_bytes());
    hasher.update(b"\0");
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.finalize().to_hex()[..ID_LEN].to_owned()
}

pub fn new_course_id(code: &str) -> CourseId {
    CourseId::new(mint("course", code))
}

pub fn new_enrollment_id(course: &str, person: &str) -> EnrollmentId {
    EnrollmentId::new(mint("enrollment", &format!("{course}:{person}")))
}

/// Syntactic check applied before an id is used as a file name.
pub fn is_valid_record_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}
