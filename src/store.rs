//! Durable storage for the job queue.
//!
//! Three JSON collections live in the data directory: `jobs.json` (active
//! jobs), `dlq.json` (dead letter queue), and `config.json`. Each collection
//! is loaded and saved as one unit; a missing file loads as the empty or
//! default value.
//!
//! # Atomic Writes
//!
//! Every save uses a write-to-temp-then-rename pattern:
//! 1. Write to `<file>.tmp`
//! 2. fsync the file
//! 3. Rename to `<file>`
//! 4. fsync the directory
//!
//! A reader never observes a partially written collection, and a crash
//! mid-write leaves the previous snapshot intact. Content that cannot be
//! parsed fails with `StoreCorrupt` naming the file; callers load before they
//! save, so a corrupt collection is never silently overwritten.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::queue::Job;

const JOBS_FILE: &str = "jobs.json";
const DLQ_FILE: &str = "dlq.json";
const CONFIG_FILE: &str = "config.json";

/// File-backed store for the three queue collections.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn load_jobs(&self) -> Result<Vec<Job>> {
        self.load_or(JOBS_FILE, Vec::new)
    }

    pub fn save_jobs(&self, jobs: &[Job]) -> Result<()> {
        self.save(JOBS_FILE, &jobs)
    }

    pub fn load_dlq(&self) -> Result<Vec<Job>> {
        self.load_or(DLQ_FILE, Vec::new)
    }

    pub fn save_dlq(&self, jobs: &[Job]) -> Result<()> {
        self.save(DLQ_FILE, &jobs)
    }

    pub fn load_config(&self) -> Result<QueueConfig> {
        self.load_or(CONFIG_FILE, QueueConfig::default)
    }

    pub fn save_config(&self, config: &QueueConfig) -> Result<()> {
        self.save(CONFIG_FILE, config)
    }

    /// Load a collection, or produce `default` if its file doesn't exist yet.
    fn load_or<T: DeserializeOwned>(&self, name: &str, default: impl FnOnce() -> T) -> Result<T> {
        let path = self.dir.join(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|source| QueueError::StoreCorrupt { path, source })
    }

    /// Save a collection atomically: temp file, fsync, rename, fsync dir.
    fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!("{name}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            fsync_file(&file)?;
        }

        std::fs::rename(&tmp_path, &path)?;
        fsync_dir(&self.dir)?;
        Ok(())
    }
}

/// Sync a file's contents and metadata to disk.
fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Sync a directory to disk, ensuring the renamed entry is durable.
///
/// On POSIX systems a rename updates the directory entry; without this fsync
/// the entry may not survive a power loss even if the file contents were
/// synced.
fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
