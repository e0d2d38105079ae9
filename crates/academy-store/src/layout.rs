use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 2;
const VERSION_FILE: &str = "version";

/// File name of a code's entry in the unique index.
///
/// Codes are free text after normalization, so the index is keyed by their
/// blake3 digest rather than the code itself.
pub fn code_key(code: &str) -> String {
    blake3::hash(code.as_bytes()).to_hex().to_string()
}

/// Directory layout for the Academy record store.
///
/// Manages paths for course and enrollment records, the unique code index,
/// per-course lock files, the write-ahead log, and the store version marker.
/// All subdirectories are created lazily on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    #[inline]
    pub fn courses_dir(&self) -> PathBuf {
        self.store_dir().join("courses")
    }

    #[inline]
    pub fn enrollments_dir(&self) -> PathBuf {
        self.store_dir().join("enrollments")
    }

    /// One file per normalized course code, holding the owning course id.
    #[inline]
    pub fn codes_dir(&self) -> PathBuf {
        self.store_dir().join("codes")
    }

    #[inline]
    pub fn locks_dir(&self) -> PathBuf {
        self.store_dir().join("locks")
    }

    #[inline]
    pub fn wal_dir(&self) -> PathBuf {
        self.store_dir().join("wal")
    }

    #[inline]
    pub fn course_path(&self, course_id: &str) -> PathBuf {
        self.courses_dir().join(course_id)
    }

    /// Enrollments live under their course so a recount reads only them.
    #[inline]
    pub fn course_enrollments_dir(&self, course_id: &str) -> PathBuf {
        self.enrollments_dir().join(course_id)
    }

    #[inline]
    pub fn enrollment_path(&self, course_id: &str, enrollment_id: &str) -> PathBuf {
        self.course_enrollments_dir(course_id).join(enrollment_id)
    }

    #[inline]
    pub fn code_path(&self, code: &str) -> PathBuf {
        self.codes_dir().join(code_key(code))
    }

    #[inline]
    pub fn course_lock_file(&self, course_id: &str) -> PathBuf {
        self.locks_dir().join(format!("{course_id}.lock"))
    }

    /// Catalog-wide lock serializing code claims.
    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.store_dir().join(".lock")
    }

    #[inline]
    pub fn audit_log(&self) -> PathBuf {
        self.store_dir().join("audit.jsonl")
    }

    #[inline]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("academy.toml")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.courses_dir())?;
        fs::create_dir_all(self.enrollments_dir())?;
        fs::create_dir_all(self.codes_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        fs::create_dir_all(self.wal_dir())?;

        let version_path = self.store_dir().join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let store_dir = self.store_dir();
            let mut tmp = NamedTempFile::new_in(&store_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&store_dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.store_dir().join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}
