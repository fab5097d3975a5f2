//! Reverses a recorded batch of moves.
//!
//! Entries are replayed newest first: the logged destination is where the file
//! is now, the logged source is where it goes back to. Restores are
//! collision-safe in the same way forward moves are.

use crate::batch_log::BatchLogger;
use crate::error::SortResult;
use crate::mover::{MoveReason, MoveResult, entry_exists, relocate, unique_path};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Counts derived from the results of one undo.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UndoReport {
    /// Files moved back, including those restored under a ` (n)` name.
    pub restored_files: usize,
    /// Files that were no longer where the log left them.
    pub skipped_files: usize,
    /// Files whose restore failed with an I/O error.
    pub failed_restores: usize,
}

impl UndoReport {
    pub fn from_results(results: &[MoveResult]) -> Self {
        let mut report = Self::default();
        for result in results {
            match &result.reason {
                Some(MoveReason::MissingSource) => report.skipped_files += 1,
                Some(MoveReason::Failed(_)) => report.failed_restores += 1,
                _ => report.restored_files += 1,
            }
        }
        report
    }

    pub fn total_processed(&self) -> usize {
        self.restored_files + self.skipped_files + self.failed_restores
    }

    /// True if every entry of the batch was restored.
    pub fn is_complete_success(&self) -> bool {
        self.skipped_files == 0 && self.failed_restores == 0
    }
}

/// Undoes batches recorded by a [`BatchLogger`].
pub struct UndoManager {
    logger: BatchLogger,
    dry_run: bool,
}

impl UndoManager {
    pub fn new(logger: BatchLogger, dry_run: bool) -> Self {
        Self { logger, dry_run }
    }

    /// Moves every file of `batch_id` back to where it came from.
    ///
    /// Per-item problems never abort the undo; they show up as results with
    /// `performed == false` and a reason. The log itself is never modified, so a
    /// batch can be previewed any number of times.
    ///
    /// # Errors
    ///
    /// Only fails when the batch snapshot cannot be read. An unknown id yields an
    /// empty result list.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosort::batch_log::BatchLogger;
    /// use autosort::undo::{UndoManager, UndoReport};
    /// use std::path::Path;
    ///
    /// let logger = BatchLogger::open(Path::new("/home/me/Downloads"));
    /// if let Some(latest) = logger.list_batches()?.first() {
    ///     let results = UndoManager::new(logger.clone(), false).undo_batch(latest)?;
    ///     println!("Restored {} files", UndoReport::from_results(&results).restored_files);
    /// }
    /// # Ok::<(), autosort::SortError>(())
    /// ```
    pub fn undo_batch(&self, batch_id: &str) -> SortResult<Vec<MoveResult>> {
        let entries = self.logger.load_batch(batch_id)?;
        if entries.is_empty() {
            tracing::info!(batch = batch_id, "Nothing to undo");
            return Ok(Vec::new());
        }

        let mut reserved = HashSet::new();
        let mut created_dirs = BTreeSet::new();
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries.iter().rev() {
            let result = self.restore_one(&entry.destination, &entry.source, &mut reserved);
            if entry.created_dir
                && let Some(parent) = entry.destination.parent()
            {
                created_dirs.insert(parent.to_path_buf());
            }
            results.push(result);
        }

        if !self.dry_run {
            self.remove_empty_dirs(created_dirs);
        }

        let report = UndoReport::from_results(&results);
        tracing::info!(
            batch = batch_id,
            dry_run = self.dry_run,
            restored = report.restored_files,
            skipped = report.skipped_files,
            failed = report.failed_restores,
            "Undo finished"
        );
        Ok(results)
    }

    fn restore_one(
        &self,
        current: &Path,
        original: &Path,
        reserved: &mut HashSet<PathBuf>,
    ) -> MoveResult {
        let result = |destination: PathBuf, performed, reason| MoveResult {
            source: current.to_path_buf(),
            destination,
            performed,
            reason,
        };

        if !entry_exists(current) {
            tracing::warn!(path = %current.display(), "Missing source for undo");
            return result(original.to_path_buf(), false, Some(MoveReason::MissingSource));
        }

        let is_taken = |p: &Path| entry_exists(p) || reserved.contains(p);
        let (target, reason) = if is_taken(original) {
            (
                unique_path(original, is_taken),
                Some(MoveReason::RestoreConflict),
            )
        } else {
            (original.to_path_buf(), None)
        };

        if self.dry_run {
            reserved.insert(target.clone());
            return result(target, false, reason);
        }

        let restored = match target.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| relocate(current, &target));

        match restored {
            Ok(()) => {
                tracing::debug!(from = %current.display(), to = %target.display(), "Restored file");
                result(target, true, reason)
            }
            Err(e) => {
                tracing::warn!(path = %current.display(), error = %e, "Restore failed");
                result(target, false, Some(MoveReason::Failed(e.to_string())))
            }
        }
    }

    /// Removes category directories the batch created and this undo emptied,
    /// deepest first.
    ///
    /// Only directories strictly below the logger's root are considered.
    fn remove_empty_dirs(&self, dirs: BTreeSet<PathBuf>) {
        for dir in dirs.into_iter().rev() {
            if dir == self.logger.root() || !dir.starts_with(self.logger.root()) {
                continue;
            }
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty && fs::remove_dir(&dir).is_ok() {
                tracing::debug!(dir = %dir.display(), "Removed empty category directory");
            }
        }
    }
}
