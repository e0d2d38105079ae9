use serde::{Deserialize, Serialize};

/// Seat figures derived from a course's capacity and its confirmed enrollments.
///
/// Always produced by [`Capacity::compute`]; records store a copy so that
/// readers do not have to scan enrollments, and the engine rewrites it in the
/// same transaction as every write that could change its inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub enrolled_count: u32,
    pub available_seats: i64,
    pub is_full: bool,
}

impl Capacity {
    pub fn compute(max_students: u32, confirmed: u32) -> Self {
        let available_seats = i64::from(max_students) - i64::from(confirmed);
        Self {
            enrolled_count: confirmed,
            available_seats,
            is_full: available_seats <= 0,
        }
    }

    pub fn has_room(&self) -> bool {
        self.available_seats > 0
    }
}

/// Comparison used by the `is_full` search evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            "=" | "==" | "eq" => Some(FilterOp::Eq),
            "!=" | "<>" | "ne" => Some(FilterOp::Ne),
            _ => None,
        }
    }

    pub fn matches(self, actual: bool, value: bool) -> bool {
        match self {
            FilterOp::Eq => actual == value,
            FilterOp::Ne => actual != value,
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterOp::Eq => write!(f, "="),
            FilterOp::Ne => write!(f, "!="),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seats_follow_confirmed_count() {
        let c = Capacity::compute(2, 0);
        assert_eq!(c.available_seats, 2);
        assert!(!c.is_full);
        let c = Capacity::compute(2, 1);
        assert_eq!(c.available_seats, 1);
        assert!(c.has_room());
        let c = Capacity::compute(2, 2);
        assert_eq!(c.available_seats, 0);
        assert!(c.is_full);
        assert!(!c.has_room());
    }

    #[test]
    fn overfull_course_reports_negative_seats() {
        let c = Capacity::compute(1, 3);
        assert_eq!(c.available_seats, -2);
        assert!(c.is_full);
    }

    #[test]
    fn filter_op_parses_both_spellings() {
        assert_eq!(FilterOp::parse("="), Some(FilterOp::Eq));
        assert_eq!(FilterOp::parse(" != "), Some(FilterOp::Ne));
        assert_eq!(FilterOp::parse("<"), None);
    }

    #[test]
    fn ne_false_selects_full_courses() {
        assert!(FilterOp::Ne.matches(true, false));
        assert!(!FilterOp::Ne.matches(false, false));
        assert!(FilterOp::Eq.matches(true, true));
    }
}
