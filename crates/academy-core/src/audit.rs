//! Audit trail for lifecycle and capacity changes.
//!
//! The engine calls [`AuditSink::record`] once per committed mutation. Sinks
//! never see rolled-back work, and a failing sink is logged rather than
//! failing the operation that already committed.

use crate::CoreError;
use academy_schema::{Capacity, CourseId, EnrollmentId};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    CourseCreated,
    CourseUpdated,
    CourseTransitioned,
    EnrollmentRequested,
    EnrollmentConfirmed,
    EnrollmentCancelled,
    EnrollmentRejected,
    EnrollmentRemoved,
    CapacityRecomputed,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", s.trim_matches('"'))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub kind: AuditKind,
    pub course_id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<EnrollmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Seat figures after the change, when it touched them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, course_id: &CourseId) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            course_id: course_id.clone(),
            enrollment_id: None,
            from: None,
            to: None,
            capacity: None,
        }
    }

    #[must_use]
    pub fn with_enrollment(mut self, enrollment_id: &EnrollmentId) -> Self {
        self.enrollment_id = Some(enrollment_id.clone());
        self
    }

    #[must_use]
    pub fn with_states(mut self, from: impl ToString, to: impl ToString) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), CoreError>;
}

/// Emits each event as a `tracing` info record. The default sink.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: &AuditEvent) -> Result<(), CoreError> {
        tracing::info!(
            kind = %event.kind,
            course = %event.course_id,
            enrollment = event.enrollment_id.as_deref().unwrap_or(""),
            from = event.from.as_deref().unwrap_or(""),
            to = event.to.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}

/// Appends events as JSON lines to a file, usually the store's `audit.jsonl`.
#[derive(Debug)]
pub struct JournalAudit {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl JournalAudit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn read_all(&self) -> Result<Vec<AuditEvent>, CoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(CoreError::from))
            .collect()
    }
}

impl AuditSink for JournalAudit {
    fn record(&self, event: &AuditEvent) -> Result<(), CoreError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let _guard = self
            .write_guard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Keeps events in memory; handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn kinds(&self) -> Vec<AuditKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, event: &AuditEvent) -> Result<(), CoreError> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(AuditKind::CourseTransitioned.to_string(), "course_transitioned");
        assert_eq!(AuditKind::EnrollmentConfirmed.to_string(), "enrollment_confirmed");
    }

    #[test]
    fn journal_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalAudit::new(dir.path().join("audit.jsonl"));
        let course = CourseId::new("0123456789abcdef");
        journal
            .record(&AuditEvent::new(AuditKind::CourseCreated, &course))
            .unwrap();
        journal
            .record(
                &AuditEvent::new(AuditKind::CourseTransitioned, &course)
                    .with_states("draft", "published"),
            )
            .unwrap();

        let events = journal.read_all().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].from.as_deref(), Some("draft"));
        assert_eq!(events[1].to.as_deref(), Some("published"));
    }

    #[test]
    fn journal_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JournalAudit::new(dir.path().join("none.jsonl"));
        assert!(journal.read_all().unwrap().is_empty());
    }

    #[test]
    fn memory_sink_captures_in_order() {
        let sink = MemoryAudit::new();
        let course = CourseId::new("c");
        sink.record(&AuditEvent::new(AuditKind::CourseCreated, &course))
            .unwrap();
        sink.record(
            &AuditEvent::new(AuditKind::CapacityRecomputed, &course)
                .with_capacity(Capacity::compute(3, 1)),
        )
        .unwrap();
        assert_eq!(
            sink.kinds(),
            vec![AuditKind::CourseCreated, AuditKind::CapacityRecomputed]
        );
        assert_eq!(sink.events()[1].capacity.unwrap().available_seats, 2);
    }

    #[test]
    fn event_json_omits_empty_fields() {
        let event = AuditEvent::new(AuditKind::CourseUpdated, &CourseId::new("c"));
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("enrollment_id"));
        assert!(!json.contains("capacity"));
    }
}
