use crate::layout::StoreLayout;
use crate::records::atomic_write;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A single rollback step that can undo part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackStep {
    /// Remove a file the transaction created.
    RemoveFile(PathBuf),
    /// Put back the bytes a file held before the transaction overwrote or
    /// deleted it.
    RestoreFile { path: PathBuf, contents: String },
}

/// The kind of mutating operation being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOpKind {
    CreateCourse,
    UpdateCourse,
    Transition,
    RequestEnrollment,
    ConfirmEnrollment,
    CancelEnrollment,
    RejectEnrollment,
    RemoveEnrollment,
    Recompute,
}

impl std::fmt::Display for WalOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalOpKind::CreateCourse => write!(f, "create-course"),
            WalOpKind::UpdateCourse => write!(f, "update-course"),
            WalOpKind::Transition => write!(f, "transition"),
            WalOpKind::RequestEnrollment => write!(f, "request-enrollment"),
            WalOpKind::ConfirmEnrollment => write!(f, "confirm-enrollment"),
            WalOpKind::CancelEnrollment => write!(f, "cancel-enrollment"),
            WalOpKind::RejectEnrollment => write!(f, "reject-enrollment"),
            WalOpKind::RemoveEnrollment => write!(f, "remove-enrollment"),
            WalOpKind::Recompute => write!(f, "recompute"),
        }
    }
}

/// A WAL entry representing an in-flight transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub op_id: String,
    pub kind: WalOpKind,
    /// The course whose lock the transaction holds.
    pub course_id: String,
    pub timestamp: String,
    pub rollback_steps: Vec<RollbackStep>,
}

/// Write-ahead log for crash recovery.
///
/// A transaction creates an entry before its first write, appends a
/// rollback step before each file it touches, and removes the entry once
/// all writes are done. Entries left behind by a crash are rolled back on
/// the next engine start.
pub struct WriteAheadLog {
    wal_dir: PathBuf,
}

impl WriteAheadLog {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            wal_dir: layout.wal_dir(),
        }
    }

    /// Ensure the WAL directory exists.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir)?;
        Ok(())
    }

    /// Begin a new WAL entry for an operation. Returns the op_id.
    pub fn begin(&self, kind: WalOpKind, course_id: &str) -> Result<String, StoreError> {
        let op_id = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S%9f"),
            &blake3::hash(format!("{course_id}:{kind}:{}", std::process::id()).as_bytes())
                .to_hex()[..8]
        );
        let entry = WalEntry {
            op_id: op_id.clone(),
            kind,
            course_id: course_id.to_owned(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            rollback_steps: Vec::new(),
        };
        self.write_entry(&entry)?;
        debug!("WAL begin: {} for {course_id} (op_id={op_id})", entry.kind);
        Ok(op_id)
    }

    /// Append a rollback step to an existing WAL entry.
    pub fn add_rollback_step(&self, op_id: &str, step: RollbackStep) -> Result<(), StoreError> {
        let mut entry = self.read_entry(op_id)?;
        entry.rollback_steps.push(step);
        self.write_entry(&entry)?;
        Ok(())
    }

    /// Commit (remove) a WAL entry after successful completion.
    pub fn commit(&self, op_id: &str) -> Result<(), StoreError> {
        let path = self.entry_path(op_id);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!("WAL commit: {op_id}");
        }
        Ok(())
    }

    /// List all incomplete WAL entries, oldest first.
    pub fn list_incomplete(&self) -> Result<Vec<WalEntry>, StoreError> {
        if !self.wal_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.wal_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<WalEntry>(&content) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            warn!("corrupt WAL entry {}: {e}", path.display());
                            let _ = fs::remove_file(&path);
                        }
                    },
                    Err(e) => {
                        warn!("unreadable WAL entry {}: {e}", path.display());
                        let _ = fs::remove_file(&path);
                    }
                }
            }
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Roll back every incomplete entry.
    pub fn recover(&self) -> Result<usize, StoreError> {
        self.recover_where(|_| Some(()))
    }

    /// Roll back the incomplete entries for which `guard` yields a value.
    ///
    /// The value is held until that entry's rollback finishes, so the engine
    /// can pass the course lock through and skip transactions that another
    /// process is still running.
    pub fn recover_where<G>(
        &self,
        mut guard: impl FnMut(&WalEntry) -> Option<G>,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for entry in self.list_incomplete()? {
            let Some(_held) = guard(&entry) else {
                debug!("WAL recovery: skipping in-flight {}", entry.op_id);
                continue;
            };
            // The owner may have committed between listing and locking.
            let Ok(entry) = self.read_entry(&entry.op_id) else {
                debug!("WAL recovery: {} finished meanwhile", entry.op_id);
                continue;
            };
            info!(
                "WAL recovery: rolling back {} on {} (op_id={})",
                entry.kind, entry.course_id, entry.op_id
            );
            self.rollback_entry(&entry);
            let _ = fs::remove_file(self.entry_path(&entry.op_id));
            count += 1;
        }
        if count > 0 {
            info!("WAL recovery complete: {count} entries rolled back");
        }
        Ok(count)
    }

    /// Execute the entry's rollback steps in reverse order, without removing
    /// the entry itself.
    pub fn rollback_entry(&self, entry: &WalEntry) {
        for step in entry.rollback_steps.iter().rev() {
            match step {
                RollbackStep::RemoveFile(path) => {
                    if path.exists() {
                        if let Err(e) = fs::remove_file(path) {
                            warn!(
                                "WAL rollback: failed to remove file {}: {e}",
                                path.display()
                            );
                        } else {
                            debug!("WAL rollback: removed file {}", path.display());
                        }
                    }
                }
                RollbackStep::RestoreFile { path, contents } => {
                    if let Err(e) = restore_file(path, contents) {
                        warn!(
                            "WAL rollback: failed to restore file {}: {e}",
                            path.display()
                        );
                    } else {
                        debug!("WAL rollback: restored file {}", path.display());
                    }
                }
            }
        }
    }

    fn entry_path(&self, op_id: &str) -> PathBuf {
        self.wal_dir.join(format!("{op_id}.json"))
    }

    fn write_entry(&self, entry: &WalEntry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.wal_dir)?;
        let content = serde_json::to_string_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(&self.wal_dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        let dest = self.entry_path(&entry.op_id);
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        crate::fsync_dir(&self.wal_dir)?;
        Ok(())
    }

    fn read_entry(&self, op_id: &str) -> Result<WalEntry, StoreError> {
        let path = self.entry_path(op_id);
        let content = fs::read_to_string(&path)?;
        let entry: WalEntry = serde_json::from_str(&content)?;
        Ok(entry)
    }
}

fn restore_file(path: &Path, contents: &str) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io(std::io::Error::other("rollback path has no parent")))?;
    atomic_write(dir, path, contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, WriteAheadLog) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let wal = WriteAheadLog::new(&layout);
        wal.initialize().unwrap();
        (dir, wal)
    }

    #[test]
    fn begin_creates_entry() {
        let (_dir, wal) = setup();
        let op_id = wal.begin(WalOpKind::CreateCourse, "course-123").unwrap();
        assert!(!op_id.is_empty());
        let entries = wal.list_incomplete().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].course_id, "course-123");
    }

    #[test]
    fn commit_removes_entry() {
        let (_dir, wal) = setup();
        let op_id = wal.begin(WalOpKind::Transition, "c1").unwrap();
        assert_eq!(wal.list_incomplete().unwrap().len(), 1);
        wal.commit(&op_id).unwrap();
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn add_rollback_step_persists() {
        let (_dir, wal) = setup();
        let op_id = wal.begin(WalOpKind::ConfirmEnrollment, "c1").unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveFile(PathBuf::from("/tmp/fake")))
            .unwrap();
        let entries = wal.list_incomplete().unwrap();
        assert_eq!(entries[0].rollback_steps.len(), 1);
    }

    #[test]
    fn recover_restores_overwritten_file() {
        let (dir, wal) = setup();
        let target = dir.path().join("record.json");
        fs::write(&target, "before").unwrap();

        let op_id = wal.begin(WalOpKind::UpdateCourse, "c1").unwrap();
        wal.add_rollback_step(
            &op_id,
            RollbackStep::RestoreFile {
                path: target.clone(),
                contents: "before".to_owned(),
            },
        )
        .unwrap();
        fs::write(&target, "after").unwrap();

        // Simulate crash: no commit.
        assert_eq!(wal.recover().unwrap(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "before");
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn recover_removes_created_file() {
        let (dir, wal) = setup();
        let created = dir.path().join("new.json");
        let op_id = wal.begin(WalOpKind::RequestEnrollment, "c1").unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveFile(created.clone()))
            .unwrap();
        fs::write(&created, "{}").unwrap();

        assert_eq!(wal.recover().unwrap(), 1);
        assert!(!created.exists());
    }

    #[test]
    fn steps_are_undone_in_reverse_order() {
        let (dir, wal) = setup();
        let target = dir.path().join("twice.json");
        fs::write(&target, "v1").unwrap();
        let op_id = wal.begin(WalOpKind::Recompute, "c1").unwrap();
        wal.add_rollback_step(
            &op_id,
            RollbackStep::RestoreFile {
                path: target.clone(),
                contents: "v1".to_owned(),
            },
        )
        .unwrap();
        fs::write(&target, "v2").unwrap();
        wal.add_rollback_step(
            &op_id,
            RollbackStep::RestoreFile {
                path: target.clone(),
                contents: "v2".to_owned(),
            },
        )
        .unwrap();
        fs::write(&target, "v3").unwrap();

        wal.recover().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "v1");
    }

    #[test]
    fn recover_where_skips_rejected_entries() {
        let (_dir, wal) = setup();
        wal.begin(WalOpKind::Transition, "busy").unwrap();
        wal.begin(WalOpKind::Transition, "idle").unwrap();
        let count = wal
            .recover_where(|e| (e.course_id == "idle").then_some(()))
            .unwrap();
        assert_eq!(count, 1);
        let left = wal.list_incomplete().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].course_id, "busy");
    }

    #[test]
    fn recover_with_no_entries_is_noop() {
        let (_dir, wal) = setup();
        assert_eq!(wal.recover().unwrap(), 0);
    }

    #[test]
    fn recover_corrupt_wal_entry_is_removed() {
        let (dir, wal) = setup();
        let wal_dir = dir.path().join("store").join("wal");
        fs::write(wal_dir.join("corrupt-op.json"), "THIS IS NOT JSON{{{").unwrap();

        let op_id = wal.begin(WalOpKind::CreateCourse, "c1").unwrap();
        let orphan = dir.path().join("orphan_from_valid");
        fs::write(&orphan, "x").unwrap();
        wal.add_rollback_step(&op_id, RollbackStep::RemoveFile(orphan.clone()))
            .unwrap();

        let count = wal.recover().unwrap();
        assert_eq!(count, 1, "only the valid entry counts as rolled back");
        assert!(!orphan.exists());
        assert!(!wal_dir.join("corrupt-op.json").exists());
        assert!(wal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn op_kind_display() {
        assert_eq!(WalOpKind::CreateCourse.to_string(), "create-course");
        assert_eq!(WalOpKind::ConfirmEnrollment.to_string(), "confirm-enrollment");
        assert_eq!(WalOpKind::Recompute.to_string(), "recompute");
    }
}
