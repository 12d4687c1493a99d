//! Collection transparency log.
//!
//! Counts what producers committed and what the consumer drained. Only
//! counts are kept, never session times or sensor values.
//!
//! Several processes may persist to the same file. Each one keeps the
//! increments it has not saved yet, and [`TransparencyLog::save`] adds them
//! to the on-disk totals under an exclusive lock, committing by rename.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Plain counter values, as persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct Counts {
    sleep_sessions_recorded: u64,
    sleep_sessions_drained: u64,
    env_samples_recorded: u64,
    env_samples_drained: u64,
    corrupt_resets: u64,
}

impl Counts {
    fn plus(self, other: Counts) -> Counts {
        Counts {
            sleep_sessions_recorded: self.sleep_sessions_recorded + other.sleep_sessions_recorded,
            sleep_sessions_drained: self.sleep_sessions_drained + other.sleep_sessions_drained,
            env_samples_recorded: self.env_samples_recorded + other.env_samples_recorded,
            env_samples_drained: self.env_samples_drained + other.env_samples_drained,
            corrupt_resets: self.corrupt_resets + other.corrupt_resets,
        }
    }

    fn saturating_sub(self, other: Counts) -> Counts {
        Counts {
            sleep_sessions_recorded: self
                .sleep_sessions_recorded
                .saturating_sub(other.sleep_sessions_recorded),
            sleep_sessions_drained: self
                .sleep_sessions_drained
                .saturating_sub(other.sleep_sessions_drained),
            env_samples_recorded: self
                .env_samples_recorded
                .saturating_sub(other.env_samples_recorded),
            env_samples_drained: self
                .env_samples_drained
                .saturating_sub(other.env_samples_drained),
            corrupt_resets: self.corrupt_resets.saturating_sub(other.corrupt_resets),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    sleep_sessions_recorded: AtomicU64,
    sleep_sessions_drained: AtomicU64,
    env_samples_recorded: AtomicU64,
    env_samples_drained: AtomicU64,
    corrupt_resets: AtomicU64,
}

impl Counters {
    fn add(&self, counts: Counts) {
        self.sleep_sessions_recorded
            .fetch_add(counts.sleep_sessions_recorded, Ordering::Relaxed);
        self.sleep_sessions_drained
            .fetch_add(counts.sleep_sessions_drained, Ordering::Relaxed);
        self.env_samples_recorded
            .fetch_add(counts.env_samples_recorded, Ordering::Relaxed);
        self.env_samples_drained
            .fetch_add(counts.env_samples_drained, Ordering::Relaxed);
        self.corrupt_resets
            .fetch_add(counts.corrupt_resets, Ordering::Relaxed);
    }

    fn set(&self, counts: Counts) {
        self.sleep_sessions_recorded
            .store(counts.sleep_sessions_recorded, Ordering::Relaxed);
        self.sleep_sessions_drained
            .store(counts.sleep_sessions_drained, Ordering::Relaxed);
        self.env_samples_recorded
            .store(counts.env_samples_recorded, Ordering::Relaxed);
        self.env_samples_drained
            .store(counts.env_samples_drained, Ordering::Relaxed);
        self.corrupt_resets
            .store(counts.corrupt_resets, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Counts {
        Counts {
            sleep_sessions_recorded: self.sleep_sessions_recorded.load(Ordering::Relaxed),
            sleep_sessions_drained: self.sleep_sessions_drained.load(Ordering::Relaxed),
            env_samples_recorded: self.env_samples_recorded.load(Ordering::Relaxed),
            env_samples_drained: self.env_samples_drained.load(Ordering::Relaxed),
            corrupt_resets: self.corrupt_resets.load(Ordering::Relaxed),
        }
    }

    fn take(&self) -> Counts {
        Counts {
            sleep_sessions_recorded: self.sleep_sessions_recorded.swap(0, Ordering::Relaxed),
            sleep_sessions_drained: self.sleep_sessions_drained.swap(0, Ordering::Relaxed),
            env_samples_recorded: self.env_samples_recorded.swap(0, Ordering::Relaxed),
            env_samples_drained: self.env_samples_drained.swap(0, Ordering::Relaxed),
            corrupt_resets: self.corrupt_resets.swap(0, Ordering::Relaxed),
        }
    }
}

/// Collection counters for the current process, optionally seeded from disk.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Totals as last seen on disk plus everything recorded since
    totals: Counters,
    /// Increments not yet merged into the persisted file
    unsaved: Counters,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            totals: Counters::default(),
            unsaved: Counters::default(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();

        match read_persisted(&path) {
            Ok(Some(persisted)) => log.totals.set(persisted.counts),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Could not load previous transparency stats");
            }
        }

        log.persist_path = Some(path);
        log
    }

    fn record(&self, counts: Counts) {
        self.totals.add(counts);
        self.unsaved.add(counts);
    }

    pub fn record_sleep_sessions(&self, count: u64) {
        self.record(Counts {
            sleep_sessions_recorded: count,
            ..Counts::default()
        });
    }

    pub fn record_sleep_sessions_drained(&self, count: u64) {
        self.record(Counts {
            sleep_sessions_drained: count,
            ..Counts::default()
        });
    }

    pub fn record_env_sample(&self) {
        self.record(Counts {
            env_samples_recorded: 1,
            ..Counts::default()
        });
    }

    pub fn record_env_samples_drained(&self, count: u64) {
        self.record(Counts {
            env_samples_drained: count,
            ..Counts::default()
        });
    }

    pub fn record_corrupt_resets(&self, count: u64) {
        self.record(Counts {
            corrupt_resets: count,
            ..Counts::default()
        });
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        let counts = self.totals.snapshot();
        TransparencyStats {
            sleep_sessions_recorded: counts.sleep_sessions_recorded,
            sleep_sessions_drained: counts.sleep_sessions_drained,
            env_samples_recorded: counts.env_samples_recorded,
            env_samples_drained: counts.env_samples_drained,
            corrupt_resets: counts.corrupt_resets,
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Collection Statistics:\n\
             - Sleep sessions recorded: {}\n\
             - Sleep sessions drained: {}\n\
             - Environment samples recorded: {}\n\
             - Environment samples drained: {}\n\
             - Corrupt outbox resets: {}\n\
             \n\
             Only counts are kept here; session times and readings\n\
             live in the outbox until the app drains them.",
            stats.sleep_sessions_recorded,
            stats.sleep_sessions_drained,
            stats.env_samples_recorded,
            stats.env_samples_drained,
            stats.corrupt_resets,
        )
    }

    /// Merge unsaved increments into the stats file.
    ///
    /// Holds `<path>.lock` for the whole read-add-write, so concurrent
    /// savers from other processes each contribute their own increments.
    /// On failure the increments stay unsaved for the next call.
    pub fn save(&self) -> Result<(), io::Error> {
        let Some(path) = self.persist_path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path))?;
        lock.lock_exclusive()?;
        let result = self.merge_locked(path);
        let _ = FileExt::unlock(&lock);
        result
    }

    fn merge_locked(&self, path: &Path) -> Result<(), io::Error> {
        let unsaved = self.unsaved.take();
        let on_disk = match read_persisted(path) {
            Ok(persisted) => persisted.map(|p| p.counts).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Stats file unreadable; rewriting from this process's totals");
                self.totals.snapshot().saturating_sub(unsaved)
            }
        };
        let merged = on_disk.plus(unsaved);

        let persisted = PersistedStats {
            counts: merged,
            last_updated: Utc::now(),
        };
        if let Err(e) = write_atomically(path, &persisted) {
            self.unsaved.add(unsaved);
            return Err(e);
        }

        // Increments recorded while the file was being written are still unsaved.
        self.totals.set(merged.plus(self.unsaved.snapshot()));
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub sleep_sessions_recorded: u64,
    pub sleep_sessions_drained: u64,
    pub env_samples_recorded: u64,
    pub env_samples_drained: u64,
    pub corrupt_resets: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    counts: Counts,
    last_updated: DateTime<Utc>,
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn read_persisted(path: &Path) -> Result<Option<PersistedStats>, io::Error> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(io::Error::other)
}

fn write_atomically(path: &Path, persisted: &PersistedStats) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(persisted).map_err(io::Error::other)?;

    let mut staging_name = path.file_name().unwrap_or_default().to_os_string();
    staging_name.push(".tmp");
    let staging = path.with_file_name(staging_name);

    {
        let mut file = File::create(&staging)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&staging, path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        e
    })
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_sleep_sessions(2);
        log.record_env_sample();
        log.record_env_sample();
        log.record_env_samples_drained(2);

        let stats = log.stats();
        assert_eq!(stats.sleep_sessions_recorded, 2);
        assert_eq!(stats.sleep_sessions_drained, 0);
        assert_eq!(stats.env_samples_recorded, 2);
        assert_eq!(stats.env_samples_drained, 2);
    }

    #[test]
    fn test_persisted_totals_carry_over() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transparency.json");

        let first = TransparencyLog::with_persistence(path.clone());
        first.record_sleep_sessions(3);
        first.save().unwrap();

        let second = TransparencyLog::with_persistence(path);
        second.record_sleep_sessions(1);
        assert_eq!(second.stats().sleep_sessions_recorded, 4);
    }

    #[test]
    fn test_repeated_saves_do_not_double_count() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_env_samples_drained(5);
        log.save().unwrap();
        log.save().unwrap();
        log.record_env_samples_drained(1);
        log.save().unwrap();

        assert_eq!(log.stats().env_samples_drained, 6);
        let reloaded = TransparencyLog::with_persistence(path);
        assert_eq!(reloaded.stats().env_samples_drained, 6);
    }

    #[test]
    fn test_concurrent_savers_keep_every_increment() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transparency.json");

        // Each thread stands in for a separate producer process.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let log = TransparencyLog::with_persistence(path);
                    log.record_sleep_sessions(1);
                    log.save().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = TransparencyLog::with_persistence(path);
        assert_eq!(reloaded.stats().sleep_sessions_recorded, 8);
    }

    #[test]
    fn test_corrupt_stats_file_is_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transparency.json");
        fs::write(&path, "{\"sleep_sessions_rec").unwrap();

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_sleep_sessions(2);
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        assert_eq!(reloaded.stats().sleep_sessions_recorded, 2);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Sleep sessions recorded"));
        assert!(summary.contains("Environment samples drained"));
        assert!(summary.contains("Only counts are kept"));
    }
}
