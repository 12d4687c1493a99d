//! File-backed outbox shared between independent processes.
//!
//! Layout under the store directory, per key:
//!
//! ```text
//! <key>.json          committed entries, a JSON array
//! <key>.lock          advisory lock guarding read-modify-write
//! <key>.json.tmp      staging file, renamed over <key>.json on commit
//! <key>.json.corrupt  last unreadable document, kept for inspection
//! ```
//!
//! Every operation takes the key's exclusive lock, reads the document,
//! and commits by renaming a fully written and synced staging file over it.
//! A crash mid-write therefore leaves either the old or the new document,
//! never a truncated one.

use crate::outbox::error::OutboxError;
use crate::outbox::key::OutboxKey;
use crate::outbox::store::OutboxStore;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of lock retries after the first attempt.
pub const DEFAULT_LOCK_RETRIES: u32 = 5;

const BACKOFF_BASE_MS: u64 = 5;
const BACKOFF_CAP_MS: u64 = 250;
const PREVIEW_CHARS: usize = 100;

/// Outbox store keeping one JSON document per key in a directory.
#[derive(Debug)]
pub struct FileOutbox {
    dir: PathBuf,
    lock_retries: u32,
    corrupt_resets: AtomicU64,
}

/// Exclusive lock on one key, released on drop.
struct KeyLock {
    file: File,
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

struct KeyPaths {
    document: PathBuf,
    lock: PathBuf,
    staging: PathBuf,
    quarantine: PathBuf,
}

impl FileOutbox {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, OutboxError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| OutboxError::Io {
            path: dir.clone(),
            source: e,
        })?;

        Ok(Self {
            dir,
            lock_retries: DEFAULT_LOCK_RETRIES,
            corrupt_resets: AtomicU64::new(0),
        })
    }

    /// Override how many times a contended lock is retried.
    pub fn with_lock_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the committed document for `key`.
    pub fn document_path(&self, key: &OutboxKey) -> PathBuf {
        self.paths(key).document
    }

    /// How many unreadable documents this handle has reset to empty.
    pub fn corrupt_resets(&self) -> u64 {
        self.corrupt_resets.load(Ordering::Relaxed)
    }

    fn paths(&self, key: &OutboxKey) -> KeyPaths {
        let stem = key.as_str();
        KeyPaths {
            document: self.dir.join(format!("{stem}.json")),
            lock: self.dir.join(format!("{stem}.lock")),
            staging: self.dir.join(format!("{stem}.json.tmp")),
            quarantine: self.dir.join(format!("{stem}.json.corrupt")),
        }
    }

    /// Take the key's lock, retrying with exponential backoff.
    ///
    /// Waits at most a bounded time; contention past that is reported as
    /// [`OutboxError::LockTimeout`] so the caller decides whether to retry.
    fn lock(&self, path: &Path) -> Result<KeyLock, OutboxError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| OutboxError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let contended = fs2::lock_contended_error().raw_os_error();

        for attempt in 0..=self.lock_retries {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(KeyLock { file }),
                Err(e) if e.raw_os_error() == contended => {
                    if attempt < self.lock_retries {
                        let wait_ms = (BACKOFF_BASE_MS << attempt.min(16)).min(BACKOFF_CAP_MS);
                        std::thread::sleep(Duration::from_millis(wait_ms));
                    }
                }
                Err(e) => {
                    return Err(OutboxError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }

        Err(OutboxError::LockTimeout {
            path: path.to_path_buf(),
            retries: self.lock_retries,
        })
    }

    /// Read the committed entries. Caller must hold the key's lock.
    fn read_locked(&self, key: &OutboxKey, paths: &KeyPaths) -> Result<Vec<Value>, OutboxError> {
        let content = match fs::read(&paths.document) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(OutboxError::Io {
                    path: paths.document.clone(),
                    source: e,
                })
            }
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<Value>>(&content) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                self.corrupt_resets.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    path = %paths.document.display(),
                    bytes = content.len(),
                    error = %e,
                    "Outbox document is corrupt; resetting to empty"
                );
                // Move it aside so the next commit does not have to overwrite it in place.
                if let Err(e) = fs::rename(&paths.document, &paths.quarantine) {
                    warn!(
                        key = %key,
                        error = %e,
                        "Could not quarantine corrupt outbox document"
                    );
                }
                Ok(Vec::new())
            }
        }
    }

    /// Replace the committed document. Caller must hold the key's lock.
    fn commit_locked(
        &self,
        key: &OutboxKey,
        paths: &KeyPaths,
        entries: &[Value],
    ) -> Result<usize, OutboxError> {
        let content = serde_json::to_vec(entries).map_err(|e| OutboxError::Serialize {
            key: key.to_string(),
            source: e,
        })?;

        {
            let mut staging = File::create(&paths.staging).map_err(io_error(&paths.staging))?;
            staging
                .write_all(&content)
                .map_err(io_error(&paths.staging))?;
            staging.sync_all().map_err(io_error(&paths.staging))?;
        }

        if let Err(e) = fs::rename(&paths.staging, &paths.document) {
            let _ = fs::remove_file(&paths.staging);
            return Err(OutboxError::Io {
                path: paths.document.clone(),
                source: e,
            });
        }

        sync_dir(&self.dir);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let text = String::from_utf8_lossy(&content);
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            debug!(
                key = %key,
                entries = entries.len(),
                bytes = content.len(),
                preview = %preview,
                "Outbox document committed"
            );
        }

        Ok(content.len())
    }
}

impl OutboxStore for FileOutbox {
    fn append_all(&self, key: &OutboxKey, entries: Vec<Value>) -> Result<usize, OutboxError> {
        let paths = self.paths(key);
        let _lock = self.lock(&paths.lock)?;

        let mut committed = self.read_locked(key, &paths)?;
        if entries.is_empty() {
            return Ok(committed.len());
        }

        let appended = entries.len();
        committed.extend(entries);
        self.commit_locked(key, &paths, &committed)?;

        debug!(key = %key, appended, pending = committed.len(), "Appended to outbox");
        Ok(committed.len())
    }

    fn drain_all(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        let paths = self.paths(key);
        let _lock = self.lock(&paths.lock)?;

        let entries = self.read_locked(key, &paths)?;
        if entries.is_empty() {
            return Ok(entries);
        }

        // Removing the document is the commit point; on failure nothing changed.
        fs::remove_file(&paths.document).map_err(|e| OutboxError::Io {
            path: paths.document.clone(),
            source: e,
        })?;
        sync_dir(&self.dir);

        debug!(key = %key, drained = entries.len(), "Drained outbox");
        Ok(entries)
    }

    fn peek(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        let paths = self.paths(key);
        let _lock = self.lock(&paths.lock)?;
        self.read_locked(key, &paths)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> OutboxError {
    let path = path.to_path_buf();
    move |source| OutboxError::Io { path, source }
}

/// Persist the directory entry after a rename or unlink.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
