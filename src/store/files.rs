//! File store: metadata rows plus content blobs under a configured root
//! folder. Metadata lives in memory behind a lock; content is written to
//! `<root>/<uuid>_<name>` so stored blobs never collide even when names
//! repeat. Rows are soft-deleted via the `status` flag and only active rows
//! are ever served.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub owner: i64,
    /// Original upload name, preserved for the attachment response.
    pub file_name: String,
    /// Stored content locator relative to the store root.
    pub content_ref: String,
    pub size_kb: i64,
    /// Active flag; `false` means soft-deleted.
    pub status: bool,
    pub last_opened: DateTime<Utc>,
}

#[derive(Default)]
struct FileState {
    next_id: i64,
    by_id: HashMap<i64, FileRecord>,
}

pub struct FileStore {
    root: PathBuf,
    inner: RwLock<FileState>,
}

/// Strip any path components a client may have smuggled into the upload name.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
}

impl FileStore {
    /// Create a store rooted at the given folder. The directory is created if
    /// it does not already exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create file store root: {}", root.display()))?;
        Ok(Self { root, inner: RwLock::new(FileState { next_id: 1, by_id: HashMap::new() }) })
    }

    pub fn root_path(&self) -> &PathBuf {
        &self.root
    }

    /// Persist content, then insert the metadata row. The content write comes
    /// first so a failed write leaves no dangling row; a failed insert cannot
    /// happen after it.
    pub fn create(&self, owner: i64, file_name: &str, bytes: &[u8]) -> AppResult<FileRecord> {
        let name = base_name(file_name).to_string();
        let content_ref = format!("{}_{}", Uuid::new_v4(), name);
        let path = self.root.join(&content_ref);
        fs::write(&path, bytes)
            .map_err(|e| AppError::upstream("storage_write".into(), e.to_string()))?;

        let mut state = self.inner.write();
        let id = state.next_id;
        state.next_id += 1;
        let record = FileRecord {
            id,
            owner,
            file_name: name,
            content_ref,
            size_kb: (bytes.len() / 1024) as i64,
            status: true,
            last_opened: Utc::now(),
        };
        state.by_id.insert(id, record.clone());
        debug!(target: "filegate::store", "file stored id={} ref={}", record.id, record.content_ref);
        Ok(record)
    }

    /// Fetch a row by id, active rows only.
    pub fn get_active(&self, id: i64) -> Option<FileRecord> {
        self.inner.read().by_id.get(&id).filter(|r| r.status).cloned()
    }

    /// All active rows, id ascending.
    pub fn list_active(&self) -> Vec<FileRecord> {
        let state = self.inner.read();
        let mut rows: Vec<FileRecord> = state.by_id.values().filter(|r| r.status).cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Stamp `last_opened` on a successful redemption.
    pub fn touch_last_opened(&self, id: i64) {
        if let Some(r) = self.inner.write().by_id.get_mut(&id) {
            r.last_opened = Utc::now();
        }
    }

    /// Soft delete: flips `status` off; the row and its content remain.
    pub fn soft_delete(&self, id: i64) -> bool {
        match self.inner.write().by_id.get_mut(&id) {
            Some(r) => {
                r.status = false;
                true
            }
            None => false,
        }
    }

    /// Read the stored content for a row.
    pub fn read_content(&self, record: &FileRecord) -> AppResult<Vec<u8>> {
        let path = self.root.join(&record.content_ref);
        fs::read(&path).map_err(|e| AppError::upstream("storage_read".into(), e.to_string()))
    }

    /// Total number of rows, active or not. Used to assert that rejected
    /// operations created nothing.
    pub fn count(&self) -> usize {
        self.inner.read().by_id.len()
    }
}
