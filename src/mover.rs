//! Collision-safe moves of scanned files into category folders.
//!
//! A destination handed out by this module never points at an existing
//! filesystem entry at the moment it is chosen: clashing names get a ` (n)`
//! counter before the extension.

use crate::classifier::Assignment;
use crate::error::{SortError, SortResult};
use crate::organize::StopSignal;
use crate::scanner::FileDescriptor;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

/// Why a move or restore ended the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveReason {
    /// The naive destination was taken; a ` (n)` name was used instead.
    RenamedOnConflict,
    /// The file already sits where it would be moved to.
    SameLocation,
    /// Undo found nothing at the recorded destination.
    MissingSource,
    /// Undo found the original path taken; a ` (n)` name was used instead.
    RestoreConflict,
    /// Undo could not restore the file.
    Failed(String),
}

impl MoveReason {
    pub fn code(&self) -> &str {
        match self {
            Self::RenamedOnConflict => "renamed-on-conflict",
            Self::SameLocation => "same-location",
            Self::MissingSource => "missing-source",
            Self::RestoreConflict => "restore-name-conflict",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for MoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(cause) => write!(f, "failed: {}", cause),
            other => f.write_str(other.code()),
        }
    }
}

/// Outcome of one move or restore attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// False for dry runs and skipped items.
    pub performed: bool,
    pub reason: Option<MoveReason>,
}

impl MoveResult {
    fn new(source: &Path, destination: PathBuf, performed: bool, reason: Option<MoveReason>) -> Self {
        Self {
            source: source.to_path_buf(),
            destination,
            performed,
            reason,
        }
    }
}

/// Moves files into `<output_root>/<category>/`.
///
/// In dry-run mode nothing on disk changes; destinations handed out earlier in
/// the same run are remembered so a preview never plans two files onto one name.
pub struct SafeMover {
    output_root: PathBuf,
    dry_run: bool,
    reserved: HashSet<PathBuf>,
    created_dirs: HashSet<PathBuf>,
}

impl SafeMover {
    /// Creates a mover for an existing output root.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidPath`] if the root cannot be resolved.
    pub fn new(output_root: &Path, dry_run: bool) -> SortResult<Self> {
        let output_root = fs::canonicalize(output_root)
            .map_err(|e| SortError::invalid_path(output_root, e.to_string()))?;
        Ok(Self {
            output_root,
            dry_run,
            reserved: HashSet::new(),
            created_dirs: HashSet::new(),
        })
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Category directories this mover had to create.
    pub fn created_dirs(&self) -> &HashSet<PathBuf> {
        &self.created_dirs
    }

    /// Moves one file into its category folder.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Move`] when the source vanished or the filesystem refuses
    /// the move, [`SortError::StaleSource`] when the file changed since the scan, and
    /// [`SortError::NonUtf8Path`] when the path could not be written to the batch log.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosort::mover::SafeMover;
    /// use autosort::scanner::FileDescriptor;
    /// use std::path::Path;
    ///
    /// let file = FileDescriptor::from_path(Path::new("/data/report.pdf"))?;
    /// let mut mover = SafeMover::new(Path::new("/data"), false)?;
    /// let result = mover.move_one(&file, "Documents")?;
    /// println!("{} -> {}", result.source.display(), result.destination.display());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn move_one(
        &mut self,
        descriptor: &FileDescriptor,
        category: &str,
    ) -> SortResult<MoveResult> {
        let source = descriptor.path.as_path();
        let dest_dir = self.output_root.join(category);
        let file_name = source
            .file_name()
            .unwrap_or_else(|| OsStr::new(&descriptor.name));
        let naive = dest_dir.join(file_name);

        // The batch log stores paths as text; a move it cannot record cannot be undone
        if source.to_str().is_none() || naive.to_str().is_none() {
            tracing::warn!(path = %source.display(), "Skipping path that is not valid UTF-8");
            return Err(SortError::NonUtf8Path {
                path: source.to_path_buf(),
            });
        }

        check_unchanged(descriptor, &naive)?;

        if naive == source {
            return Ok(MoveResult::new(
                source,
                naive,
                false,
                Some(MoveReason::SameLocation),
            ));
        }

        if !self.dry_run && !dest_dir.is_dir() {
            fs::create_dir_all(&dest_dir).map_err(|cause| SortError::Move {
                from: source.to_path_buf(),
                to: dest_dir.clone(),
                cause,
            })?;
            self.created_dirs.insert(dest_dir.clone());
        }

        let (destination, reason) = if self.is_taken(&naive) {
            let unique = unique_path(&naive, |p| self.is_taken(p));
            (unique, Some(MoveReason::RenamedOnConflict))
        } else {
            (naive, None)
        };

        if self.dry_run {
            self.reserved.insert(destination.clone());
            tracing::debug!(
                from = %source.display(),
                to = %destination.display(),
                "Planned move"
            );
            return Ok(MoveResult::new(source, destination, false, reason));
        }

        relocate(source, &destination).map_err(|cause| SortError::Move {
            from: source.to_path_buf(),
            to: destination.clone(),
            cause,
        })?;

        tracing::debug!(from = %source.display(), to = %destination.display(), "Moved file");
        Ok(MoveResult::new(source, destination, true, reason))
    }

    /// Moves every assignment in order, one result per processed item.
    ///
    /// A failing item does not stop the loop. The loop ends early only when `stop`
    /// is raised; the in-flight move always completes first.
    pub fn move_many(
        &mut self,
        assignments: &[Assignment],
        stop: &StopSignal,
    ) -> Vec<SortResult<MoveResult>> {
        self.move_many_with(assignments, stop, |_, _| ControlFlow::Continue(()))
    }

    /// Like [`move_many`](Self::move_many), reporting each result to `on_result`.
    ///
    /// Returning `ControlFlow::Break` from the callback stops before the next item.
    pub fn move_many_with<F>(
        &mut self,
        assignments: &[Assignment],
        stop: &StopSignal,
        mut on_result: F,
    ) -> Vec<SortResult<MoveResult>>
    where
        F: FnMut(&Assignment, &SortResult<MoveResult>) -> ControlFlow<()>,
    {
        let mut results = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if stop.is_stop_requested() {
                tracing::info!(done = results.len(), "Stop requested, ending early");
                break;
            }
            let result = self.move_one(&assignment.descriptor, &assignment.category);
            let flow = on_result(assignment, &result);
            results.push(result);
            if flow.is_break() {
                break;
            }
        }
        results
    }

    fn is_taken(&self, path: &Path) -> bool {
        entry_exists(path) || self.reserved.contains(path)
    }
}

/// Fails if the file vanished or changed size or mtime since it was scanned.
fn check_unchanged(descriptor: &FileDescriptor, destination: &Path) -> SortResult<()> {
    let metadata = fs::symlink_metadata(&descriptor.path).map_err(|cause| SortError::Move {
        from: descriptor.path.clone(),
        to: destination.to_path_buf(),
        cause,
    })?;

    let modified: Option<DateTime<Local>> = metadata.modified().ok().map(Into::into);
    if !metadata.is_file()
        || metadata.len() != descriptor.size
        || modified.is_some_and(|m| m != descriptor.modified)
    {
        return Err(SortError::StaleSource {
            path: descriptor.path.clone(),
        });
    }
    Ok(())
}

/// True if anything, including a dangling symlink, exists at `path`.
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Returns `stem (n).ext` for the smallest `n >= 1` that `is_taken` rejects.
///
/// Gaps are fine: with `a (1).txt` and `a (3).txt` present, `a (2).txt` is chosen.
///
/// # Examples
///
/// ```
/// use autosort::mover::unique_path;
/// use std::path::{Path, PathBuf};
///
/// let taken = [PathBuf::from("/d/report.pdf"), PathBuf::from("/d/report (1).pdf")];
/// let next = unique_path(Path::new("/d/report.pdf"), |p| taken.iter().any(|t| t == p));
/// assert_eq!(next, PathBuf::from("/d/report (2).pdf"));
/// ```
pub fn unique_path(candidate: &Path, is_taken: impl Fn(&Path) -> bool) -> PathBuf {
    let parent = candidate.parent().unwrap_or_else(|| Path::new(""));
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u64 = 1;
    loop {
        let path = parent.join(format!("{} ({}){}", stem, counter, extension));
        if !is_taken(&path) {
            return path;
        }
        counter += 1;
    }
}

/// Renames `from` to `to`, copying and deleting when they sit on different devices.
pub(crate) fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(from = %from.display(), "Rename crosses devices, copying instead");
            copy_then_remove(from, to)
        }
        Err(e) => Err(e),
    }
}

/// Copies `from` to `to`, then removes `from`.
///
/// The file ends up in exactly one place: a failed copy or a failed delete
/// removes whatever was written to `to`.
fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(e) = fs::copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Assignment;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let base = fs::canonicalize(dir.path()).expect("Failed to resolve temp directory");
        (dir, base)
    }

    fn create(path: &Path, content: &str) -> FileDescriptor {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).expect("Failed to write test file");
        FileDescriptor::from_path(path).expect("Failed to stat test file")
    }

    fn tree(base: &Path) -> BTreeSet<PathBuf> {
        walkdir::WalkDir::new(base)
            .into_iter()
            .filter_map(Result::ok)
            .map(|e| e.into_path())
            .collect()
    }

    #[test]
    fn test_move_one_creates_category_directory() {
        let (_dir, base) = setup();
        let file = create(&base.join("test.txt"), "test content");

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&file, "Text").expect("Failed to move file");

        assert!(result.performed);
        assert_eq!(result.reason, None);
        assert_eq!(result.destination, base.join("Text/test.txt"));
        assert!(base.join("Text").is_dir());
        assert!(!file.path.exists());
        assert_eq!(fs::read_to_string(&result.destination).unwrap(), "test content");
    }

    #[test]
    fn test_move_one_renames_on_conflict() {
        let (_dir, base) = setup();
        create(&base.join("Documents/report.pdf"), "old");
        let second = create(&base.join("in/report.pdf"), "second");

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&second, "Documents").unwrap();
        assert_eq!(result.destination, base.join("Documents/report (1).pdf"));
        assert_eq!(result.reason, Some(MoveReason::RenamedOnConflict));
        assert!(result.performed);

        let third = create(&base.join("in/report.pdf"), "third");
        let result = mover.move_one(&third, "Documents").unwrap();
        assert_eq!(result.destination, base.join("Documents/report (2).pdf"));

        // Nothing was overwritten
        assert_eq!(
            fs::read_to_string(base.join("Documents/report.pdf")).unwrap(),
            "old"
        );
        assert_eq!(
            fs::read_to_string(base.join("Documents/report (1).pdf")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_conflict_search_fills_sparse_gaps() {
        let (_dir, base) = setup();
        create(&base.join("Images/x.png"), "0");
        create(&base.join("Images/x (1).png"), "1");
        create(&base.join("Images/x (3).png"), "3");
        let file = create(&base.join("x.png"), "new");

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&file, "Images").unwrap();
        assert_eq!(result.destination, base.join("Images/x (2).png"));
    }

    #[test]
    fn test_same_location_is_a_no_op() {
        let (_dir, base) = setup();
        let file = create(&base.join("Images/x.png"), "png");
        let before = tree(&base);

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&file, "Images").unwrap();

        assert!(!result.performed);
        assert_eq!(result.reason, Some(MoveReason::SameLocation));
        assert_eq!(result.destination, file.path);
        assert_eq!(tree(&base), before);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (_dir, base) = setup();
        create(&base.join("Documents/report.pdf"), "old");
        let a = create(&base.join("report.pdf"), "a");
        let b = create(&base.join("song.mp3"), "b");
        let before = tree(&base);

        let mut mover = SafeMover::new(&base, true).unwrap();
        let first = mover.move_one(&a, "Documents").unwrap();
        let second = mover.move_one(&b, "Audio").unwrap();

        assert!(!first.performed && !second.performed);
        assert_eq!(first.destination, base.join("Documents/report (1).pdf"));
        assert_eq!(first.reason, Some(MoveReason::RenamedOnConflict));
        assert_eq!(second.destination, base.join("Audio/song.mp3"));
        assert_eq!(tree(&base), before, "dry run must not change the tree");
    }

    #[test]
    fn test_dry_run_reserves_planned_names() {
        let (_dir, base) = setup();
        let a = create(&base.join("one/notes.txt"), "a");
        let b = create(&base.join("two/notes.txt"), "b");

        let mut mover = SafeMover::new(&base, true).unwrap();
        let first = mover.move_one(&a, "Text").unwrap();
        let second = mover.move_one(&b, "Text").unwrap();

        assert_eq!(first.destination, base.join("Text/notes.txt"));
        assert_eq!(second.destination, base.join("Text/notes (1).txt"));
    }

    #[test]
    fn test_vanished_source_is_move_error() {
        let (_dir, base) = setup();
        let file = create(&base.join("gone.txt"), "x");
        fs::remove_file(&file.path).unwrap();

        let mut mover = SafeMover::new(&base, false).unwrap();
        match mover.move_one(&file, "Text") {
            Err(SortError::Move { from, cause, .. }) => {
                assert_eq!(from, file.path);
                assert_eq!(cause.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected move error, got {:?}", other),
        }
        assert!(!base.join("Text").exists());
    }

    #[test]
    fn test_modified_source_is_stale() {
        let (_dir, base) = setup();
        let file = create(&base.join("grow.txt"), "x");
        fs::write(&file.path, "grown since the scan").unwrap();

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&file, "Text");
        assert!(matches!(result, Err(SortError::StaleSource { .. })));
        assert!(file.path.exists());
    }

    #[test]
    fn test_move_many_keeps_going_after_failure() {
        let (_dir, base) = setup();
        let missing = create(&base.join("missing.txt"), "m");
        fs::remove_file(&missing.path).unwrap();
        let present = create(&base.join("present.txt"), "p");

        let assignments = vec![
            Assignment {
                descriptor: missing,
                category: "Text".to_string(),
            },
            Assignment {
                descriptor: present,
                category: "Text".to_string(),
            },
        ];

        let mut mover = SafeMover::new(&base, false).unwrap();
        let results = mover.move_many(&assignments, &StopSignal::new());

        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].as_ref().unwrap().performed);
        assert!(base.join("Text/present.txt").exists());
    }

    #[test]
    fn test_move_many_honours_stop_signal() {
        let (_dir, base) = setup();
        let assignments: Vec<_> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|name| Assignment {
                descriptor: create(&base.join(name), name),
                category: "Text".to_string(),
            })
            .collect();

        let stop = StopSignal::new();
        let mut mover = SafeMover::new(&base, false).unwrap();
        let results = mover.move_many_with(&assignments, &stop, |_, _| {
            stop.request_stop();
            ControlFlow::Continue(())
        });

        // The in-flight move finishes, nothing after it starts
        assert_eq!(results.len(), 1);
        assert!(base.join("Text/a.txt").exists());
        assert!(base.join("b.txt").exists());
        assert!(base.join("c.txt").exists());
    }

    #[test]
    fn test_created_dirs_only_lists_new_categories() {
        let (_dir, base) = setup();
        fs::create_dir(base.join("Images")).unwrap();
        let photo = create(&base.join("x.png"), "png");
        let notes = create(&base.join("notes.txt"), "txt");

        let mut mover = SafeMover::new(&base, false).unwrap();
        mover.move_one(&photo, "Images").unwrap();
        mover.move_one(&notes, "Text").unwrap();

        let created: Vec<_> = mover.created_dirs().iter().cloned().collect();
        assert_eq!(created, vec![base.join("Text")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_left_in_place() {
        use std::os::unix::ffi::OsStrExt;

        let (_dir, base) = setup();
        let odd = base.join(OsStr::from_bytes(b"bad\xffname.png"));
        if fs::write(&odd, "png").is_err() {
            // Some filesystems refuse non-UTF-8 names outright
            return;
        }
        let file = FileDescriptor::from_path(&odd).unwrap();

        let mut mover = SafeMover::new(&base, false).unwrap();
        let result = mover.move_one(&file, "Images");

        assert!(matches!(result, Err(SortError::NonUtf8Path { ref path }) if *path == odd));
        assert!(odd.exists());
        assert!(!base.join("Images").exists());
    }

    #[test]
    fn test_destination_uses_the_on_disk_name() {
        let (_dir, base) = setup();
        let mut file = create(&base.join("plain.txt"), "x");
        // A lossy display name must not leak into the destination
        file.name = "something else.txt".to_string();

        let mut mover = SafeMover::new(&base, true).unwrap();
        let result = mover.move_one(&file, "Text").unwrap();
        assert_eq!(result.destination, base.join("Text/plain.txt"));
    }

    #[test]
    fn test_unique_path_without_extension() {
        let taken = [PathBuf::from("/d/Makefile")];
        let next = unique_path(Path::new("/d/Makefile"), |p| taken.iter().any(|t| t == p));
        assert_eq!(next, PathBuf::from("/d/Makefile (1)"));
    }

    #[test]
    fn test_copy_then_remove_leaves_one_copy() {
        let (_dir, base) = setup();
        let from = base.join("from.bin");
        let to = base.join("to.bin");
        fs::write(&from, b"payload").unwrap();

        copy_then_remove(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"payload");

        // Copying a missing file leaves no stray destination behind
        let result = copy_then_remove(&base.join("absent"), &base.join("stray"));
        assert!(result.is_err());
        assert!(!base.join("stray").exists());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(MoveReason::RenamedOnConflict.to_string(), "renamed-on-conflict");
        assert_eq!(MoveReason::SameLocation.to_string(), "same-location");
        assert_eq!(MoveReason::MissingSource.to_string(), "missing-source");
        assert_eq!(MoveReason::RestoreConflict.to_string(), "restore-name-conflict");
        assert_eq!(
            MoveReason::Failed("denied".to_string()).to_string(),
            "failed: denied"
        );
    }
}
