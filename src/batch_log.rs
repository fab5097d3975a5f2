//! Append-only record of performed moves, grouped into undoable batches.
//!
//! Everything lives under `<root>/.autosort/`:
//!
//! - `moves.csv` holds every entry ever written, one row per move.
//! - `<batch_id>.json` is the ordered snapshot of one batch, read back by undo.
//! - `lock` guards the write of a batch against concurrent writers.

use crate::error::{SortError, SortResult};
use chrono::{DateTime, Local};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Metadata directory created under a destination root.
pub const METADATA_DIR: &str = ".autosort";
pub const LOG_FILE: &str = "moves.csv";
pub const LOCK_FILE: &str = "lock";

const CSV_HEADER: [&str; 4] = ["batch_id", "source", "destination", "timestamp"];

/// One performed move, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLogEntry {
    pub batch_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub timestamp: DateTime<Local>,
    /// The move created the destination's category directory.
    ///
    /// Kept in the snapshot only; undo removes just the directories a batch created.
    #[serde(default, skip_serializing)]
    pub created_dir: bool,
}

impl MoveLogEntry {
    /// Entry stamped with the current local time.
    pub fn now(batch_id: &str, source: &Path, destination: &Path) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            timestamp: Local::now(),
            created_dir: false,
        }
    }

    pub fn with_created_dir(mut self, created_dir: bool) -> Self {
        self.created_dir = created_dir;
        self
    }
}

/// Snapshot row; the batch id is the file name.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    source: PathBuf,
    destination: PathBuf,
    timestamp: DateTime<Local>,
    #[serde(default)]
    created_dir: bool,
}

/// Handle on the batch log of one destination root.
#[derive(Debug, Clone)]
pub struct BatchLogger {
    root: PathBuf,
    dir: PathBuf,
}

impl BatchLogger {
    /// Opens the log under `root`. Nothing is created until the first write.
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dir: root.join(METADATA_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    fn snapshot_path(&self, batch_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", batch_id))
    }

    /// Returns a fresh id of the form `YYYYMMDD-HHMMSS-mmm`.
    ///
    /// When a snapshot with that id already exists, `-001`, `-002`, ... is appended
    /// until the id is unused. The padding keeps ids in time order when sorted.
    pub fn next_batch_id(&self) -> String {
        self.unused_batch_id(Local::now().format("%Y%m%d-%H%M%S-%3f").to_string())
    }

    fn unused_batch_id(&self, base: String) -> String {
        if !self.snapshot_path(&base).exists() {
            return base;
        }
        (1u32..)
            .map(|n| format!("{}-{:03}", base, n))
            .find(|id| !self.snapshot_path(id).exists())
            .unwrap_or(base)
    }

    /// Records one batch: its JSON snapshot and one CSV row per entry.
    ///
    /// Empty input writes nothing. The snapshot is removed again if the CSV
    /// append fails, so either both or neither describe the batch.
    ///
    /// # Errors
    ///
    /// Fails when entries carry different batch ids, when the id is not a
    /// plain file name, or on I/O errors. Returns [`SortError::DuplicateBatch`]
    /// without writing anything when the id is already recorded.
    pub fn write_batch(&self, entries: &[MoveLogEntry]) -> SortResult<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        let batch_id = first.batch_id.as_str();
        if !is_valid_batch_id(batch_id) {
            return Err(SortError::Other(format!("Invalid batch id '{}'", batch_id)));
        }
        if entries.iter().any(|e| e.batch_id != batch_id) {
            return Err(SortError::Other(
                "All entries of a batch must share one batch id".to_string(),
            ));
        }

        fs::create_dir_all(&self.dir).map_err(|e| SortError::log(&self.dir, e))?;
        let _lock = self.acquire_lock()?;

        let snapshot = self.snapshot_path(batch_id);
        if fs::symlink_metadata(&snapshot).is_ok() {
            return Err(SortError::DuplicateBatch {
                batch_id: batch_id.to_string(),
            });
        }
        self.write_snapshot(&snapshot, entries)?;

        if let Err(err) = self.append_rows(entries) {
            tracing::warn!(batch = batch_id, error = %err, "Log append failed, dropping snapshot");
            let _ = fs::remove_file(&snapshot);
            return Err(err);
        }

        tracing::info!(batch = batch_id, entries = entries.len(), "Batch recorded");
        Ok(())
    }

    /// Distinct batch ids, newest first. Empty when nothing was logged yet.
    pub fn list_batches(&self) -> SortResult<Vec<String>> {
        let path = self.log_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SortError::log(&path, e)),
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut ids = Vec::new();
        for row in reader.deserialize::<MoveLogEntry>() {
            let entry = row.map_err(|e| SortError::log_format(&path, e))?;
            ids.push(entry.batch_id);
        }

        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        Ok(ids)
    }

    /// Entries of one batch in the order they were performed.
    ///
    /// Unknown ids yield an empty list.
    pub fn load_batch(&self, batch_id: &str) -> SortResult<Vec<MoveLogEntry>> {
        if !is_valid_batch_id(batch_id) {
            return Ok(Vec::new());
        }
        let path = self.snapshot_path(batch_id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SortError::log(&path, e)),
        };

        let rows: Vec<SnapshotEntry> =
            serde_json::from_str(&json).map_err(|e| SortError::log_format(&path, e))?;
        Ok(rows
            .into_iter()
            .map(|row| MoveLogEntry {
                batch_id: batch_id.to_string(),
                source: row.source,
                destination: row.destination,
                timestamp: row.timestamp,
                created_dir: row.created_dir,
            })
            .collect())
    }

    /// Blocks until this process holds the log's exclusive lock.
    ///
    /// The lock is released when the returned handle is dropped.
    fn acquire_lock(&self) -> SortResult<File> {
        let path = self.dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SortError::log(&path, e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| SortError::log(&path, e))?;
        Ok(lock_file)
    }

    fn write_snapshot(&self, path: &Path, entries: &[MoveLogEntry]) -> SortResult<()> {
        let rows: Vec<SnapshotEntry> = entries
            .iter()
            .map(|e| SnapshotEntry {
                source: e.source.clone(),
                destination: e.destination.clone(),
                timestamp: e.timestamp,
                created_dir: e.created_dir,
            })
            .collect();
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| SortError::log_format(path, e))?;

        // Write to a temp file, then rename over the final name
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, json).map_err(|e| SortError::log(&temp, e))?;
        fs::rename(&temp, path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            SortError::log(path, e)
        })
    }

    fn append_rows(&self, entries: &[MoveLogEntry]) -> SortResult<()> {
        let path = self.log_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SortError::log(&path, e))?;
        let is_new = file
            .metadata()
            .map(|m| m.len() == 0)
            .map_err(|e| SortError::log(&path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let to_log_error = |e: csv::Error| match e.into_kind() {
            csv::ErrorKind::Io(io_err) => SortError::log(&path, io_err),
            other => SortError::log_format(&path, format!("{:?}", other)),
        };

        if is_new {
            writer.write_record(CSV_HEADER).map_err(to_log_error)?;
        }
        for entry in entries {
            writer.serialize(entry).map_err(to_log_error)?;
        }
        writer
            .flush()
            .and_then(|()| writer.get_ref().sync_data())
            .map_err(|e| SortError::log(&path, e))?;
        Ok(())
    }
}

/// Ids double as file names, so they may only contain ASCII letters, digits and `-`.
fn is_valid_batch_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
