//! Directory scanning: turns a folder into a list of file descriptors.

use crate::batch_log::METADATA_DIR;
use crate::config::CompiledFilters;
use crate::error::{SortError, SortResult};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Immutable snapshot of one regular file taken at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Base name, e.g. `photo.JPG`.
    pub name: String,
    /// Lowercased extension with its leading dot (`.jpg`), or empty.
    pub extension: String,
    /// Size in bytes when scanned.
    pub size: u64,
    /// Last modification time when scanned.
    pub modified: DateTime<Local>,
}

impl FileDescriptor {
    /// Builds a descriptor by reading the file's metadata now.
    ///
    /// Symlinks are not followed.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::symlink_metadata(path)?;
        Self::with_metadata(path, &metadata)
    }

    fn with_metadata(path: &Path, metadata: &fs::Metadata) -> std::io::Result<Self> {
        let modified: DateTime<Local> = metadata.modified()?.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            extension: extension_of(path),
            size: metadata.len(),
            modified,
        })
    }
}

/// Returns `.ext` in lowercase, or an empty string when the name has none.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Walks a root directory and collects regular files.
///
/// # Examples
///
/// ```no_run
/// use autosort::scanner::Scanner;
///
/// let files = Scanner::new("/home/me/Downloads").recursive(true).scan()?;
/// println!("found {} files", files.len());
/// # Ok::<(), autosort::SortError>(())
/// ```
pub struct Scanner {
    root: PathBuf,
    recursive: bool,
    ignore_hidden: bool,
    filters: Option<CompiledFilters>,
}

impl Scanner {
    /// Non-recursive scanner that ignores hidden entries.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            ignore_hidden: true,
            filters: None,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn ignore_hidden(mut self, ignore_hidden: bool) -> Self {
        self.ignore_hidden = ignore_hidden;
        self
    }

    /// Applies configured exclusion filters to every candidate file.
    pub fn with_filters(mut self, filters: CompiledFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Scans the root and returns descriptors sorted by path.
    ///
    /// Only regular files are returned; directories, symlinks and special files are
    /// skipped. Entries below the root that cannot be read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::InvalidPath`] if the root does not exist or is not a
    /// directory.
    pub fn scan(&self) -> SortResult<Vec<FileDescriptor>> {
        let root = fs::canonicalize(&self.root)
            .map_err(|e| SortError::invalid_path(&self.root, e.to_string()))?;
        if !root.is_dir() {
            return Err(SortError::invalid_path(&root, "not a directory"));
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.keep_entry(entry));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(filters) = &self.filters {
                let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                if !filters.should_include(relative) {
                    tracing::debug!(path = %entry.path().display(), "Excluded by filters");
                    continue;
                }
            }

            let descriptor = entry
                .metadata()
                .map_err(std::io::Error::from)
                .and_then(|metadata| FileDescriptor::with_metadata(entry.path(), &metadata));
            match descriptor {
                Ok(descriptor) => files.push(descriptor),
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "Skipping file");
                }
            }
        }

        tracing::info!(
            root = %root.display(),
            recursive = self.recursive,
            count = files.len(),
            "Scan complete"
        );
        Ok(files)
    }

    /// Prunes the metadata directory always, and hidden entries when asked.
    ///
    /// Pruning a hidden directory drops its whole subtree, so checking each
    /// entry's own name covers every segment between root and file.
    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() == 1 && name == METADATA_DIR {
            return false;
        }
        !(self.ignore_hidden && name.starts_with('.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcludeRules, FilterRules};
    use tempfile::TempDir;

    fn names(files: &[FileDescriptor]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    fn setup() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let base = dir.path();
        fs::write(base.join("a.txt"), "aaa").unwrap();
        fs::write(base.join("B.JPG"), "bb").unwrap();
        fs::write(base.join(".hidden"), "h").unwrap();
        fs::create_dir_all(base.join("sub/deeper")).unwrap();
        fs::write(base.join("sub/c.pdf"), "c").unwrap();
        fs::write(base.join("sub/deeper/d"), "d").unwrap();
        fs::create_dir(base.join(".secret")).unwrap();
        fs::write(base.join(".secret/e.txt"), "e").unwrap();
        dir
    }

    #[test]
    fn test_scan_direct_children_only() {
        let dir = setup();
        let files = Scanner::new(dir.path()).scan().unwrap();
        assert_eq!(names(&files), vec!["B.JPG", "a.txt"]);
    }

    #[test]
    fn test_scan_recursive_skips_hidden_subtrees() {
        let dir = setup();
        let files = Scanner::new(dir.path()).recursive(true).scan().unwrap();
        let mut found = names(&files);
        found.sort();
        assert_eq!(found, vec!["B.JPG", "a.txt", "c.pdf", "d"]);
    }

    #[test]
    fn test_scan_can_include_hidden_entries() {
        let dir = setup();
        let files = Scanner::new(dir.path())
            .recursive(true)
            .ignore_hidden(false)
            .scan()
            .unwrap();
        let found = names(&files);
        assert!(found.contains(&".hidden"));
        assert!(found.contains(&"e.txt"));
    }

    #[test]
    fn test_scan_always_skips_metadata_dir() {
        let dir = setup();
        fs::create_dir(dir.path().join(METADATA_DIR)).unwrap();
        fs::write(dir.path().join(METADATA_DIR).join("moves.csv"), "x").unwrap();

        let files = Scanner::new(dir.path())
            .recursive(true)
            .ignore_hidden(false)
            .scan()
            .unwrap();
        assert!(!names(&files).contains(&"moves.csv"));
    }

    #[test]
    fn test_descriptor_fields() {
        let dir = setup();
        let files = Scanner::new(dir.path()).recursive(true).scan().unwrap();

        let jpg = files.iter().find(|f| f.name == "B.JPG").unwrap();
        assert_eq!(jpg.extension, ".jpg");
        assert_eq!(jpg.size, 2);
        assert!(jpg.path.is_absolute());

        let bare = files.iter().find(|f| f.name == "d").unwrap();
        assert_eq!(bare.extension, "");
    }

    #[test]
    fn test_scan_applies_filters() {
        let dir = setup();
        let filters = FilterRules {
            exclude: ExcludeRules {
                extensions: vec!["pdf".to_string()],
                patterns: vec!["sub/deeper/**".to_string()],
                ..Default::default()
            },
            ..Default::default()
        }
        .compile()
        .unwrap();

        let files = Scanner::new(dir.path())
            .recursive(true)
            .with_filters(filters)
            .scan()
            .unwrap();
        let mut found = names(&files);
        found.sort();
        assert_eq!(found, vec!["B.JPG", "a.txt"]);
    }

    #[test]
    fn test_scan_invalid_root() {
        let result = Scanner::new("/non/existent/path").scan();
        assert!(matches!(result, Err(SortError::InvalidPath { .. })));

        let dir = setup();
        let result = Scanner::new(dir.path().join("a.txt")).scan();
        assert!(matches!(result, Err(SortError::InvalidPath { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let dir = setup();
        std::os::unix::fs::symlink(dir.path().join("sub"), dir.path().join("link_dir")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link.txt"))
            .unwrap();

        let files = Scanner::new(dir.path()).recursive(true).scan().unwrap();
        let found = names(&files);
        assert!(!found.contains(&"link.txt"));
        // c.pdf is only reachable once, through the real directory
        assert_eq!(found.iter().filter(|n| **n == "c.pdf").count(), 1);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("x.TAR.GZ")), ".gz");
        assert_eq!(extension_of(Path::new(".bashrc")), "");
        assert_eq!(extension_of(Path::new("README")), "");
    }
}
