//! Extension-to-category rules for routing files into folders.
//!
//! This module maps file extensions (".jpg", ".pdf", ...) to category folder names
//! ("Images", "Documents", ...). Built-in defaults can be overridden by a user rule
//! table in JSON or TOML format.
//!
//! # Examples
//!
//! ```
//! use autosort::rules::RuleSet;
//!
//! let rules = RuleSet::builtin();
//! assert_eq!(rules.classify(".png"), "Images");
//! assert_eq!(rules.classify(".PDF"), "Documents");
//! assert_eq!(rules.classify(".unknown"), "Others");
//! ```
use crate::error::{SortError, SortResult};
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Key used for files that have no extension at all.
pub const NO_EXTENSION_KEY: &str = "no_extension";

/// Category for every extension the table does not know.
pub const FALLBACK_CATEGORY: &str = "Others";

/// Reserved top-level key in rule files, kept for future metadata.
const RESERVED_KEY: &str = "folders";

/// Ordered extension → category table.
///
/// Keys are lowercase and start with `.`, except [`NO_EXTENSION_KEY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    map: BTreeMap<String, String>,
}

/// A single value in a user rule table.
///
/// Anything that is not a string only parses so the reserved key can carry
/// arbitrary metadata; it is rejected for ordinary keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleValue {
    Folder(String),
    Other(IgnoredAny),
}

impl RuleSet {
    /// Creates an empty rule set. Every lookup falls back to [`FALLBACK_CATEGORY`].
    pub fn empty() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Creates a rule set holding the built-in defaults.
    pub fn builtin() -> Self {
        let mut rules = Self::empty();
        rules.populate_defaults();
        rules
    }

    fn populate_defaults(&mut self) {
        // Images
        for ext in ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"] {
            self.insert(ext, "Images");
        }

        // Documents
        for ext in ["pdf", "doc", "docx"] {
            self.insert(ext, "Documents");
        }
        for ext in ["xls", "xlsx"] {
            self.insert(ext, "Spreadsheets");
        }
        for ext in ["ppt", "pptx"] {
            self.insert(ext, "Presentations");
        }
        for ext in ["txt", "md", "rtf"] {
            self.insert(ext, "Text");
        }

        // Audio / video
        for ext in ["mp3", "wav", "flac"] {
            self.insert(ext, "Audio");
        }
        for ext in ["mp4", "mkv", "avi", "mov"] {
            self.insert(ext, "Video");
        }

        // Archives
        for ext in ["zip", "rar", "7z", "tar", "gz"] {
            self.insert(ext, "Archives");
        }

        // Code
        for ext in ["py", "js", "html", "css", "json"] {
            self.insert(ext, "Code");
        }
    }

    /// Loads the built-in defaults, then applies the overrides in `path`.
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SortError::RuleFile`] if the file does not exist, cannot be read,
    /// is not a key → string table, or names an unusable category folder.
    pub fn load(path: &Path) -> SortResult<Self> {
        let mut rules = Self::builtin();
        rules.apply_file(path)?;
        Ok(rules)
    }

    /// Loads overrides when a path is given, otherwise returns the defaults.
    pub fn load_optional(path: Option<&Path>) -> SortResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Applies the overrides in `path` on top of the current table.
    pub fn apply_file(&mut self, path: &Path) -> SortResult<()> {
        if !path.is_file() {
            return Err(SortError::rule_file(path, "file not found"));
        }

        let content =
            fs::read_to_string(path).map_err(|e| SortError::rule_file(path, e.to_string()))?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let table: BTreeMap<String, RuleValue> = if is_toml {
            toml::from_str(&content).map_err(|e| SortError::rule_file(path, e.to_string()))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| SortError::rule_file(path, e.to_string()))?
        };

        let mut applied = 0;
        for (key, value) in table {
            if key == RESERVED_KEY {
                continue;
            }
            let folder = match value {
                RuleValue::Folder(folder) => folder,
                RuleValue::Other(_) => {
                    return Err(SortError::rule_file(
                        path,
                        format!("value for '{}' must be a folder name", key),
                    ));
                }
            };
            validate_folder_name(&folder)
                .map_err(|reason| SortError::rule_file(path, format!("'{}': {}", key, reason)))?;
            self.insert(&key, &folder);
            applied += 1;
        }

        tracing::debug!(path = %path.display(), applied, "Loaded rule overrides");
        Ok(())
    }

    /// Adds or replaces a mapping. The key is normalized first.
    pub fn insert(&mut self, extension: &str, category: &str) {
        self.map
            .insert(normalize_key(extension), category.to_string());
    }

    /// Returns the category folder for an extension.
    ///
    /// Matching is case-insensitive and a missing leading `.` is tolerated. The
    /// empty extension goes through [`NO_EXTENSION_KEY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use autosort::rules::RuleSet;
    ///
    /// let mut rules = RuleSet::builtin();
    /// assert_eq!(rules.classify(""), "Others");
    /// rules.insert("no_extension", "Misc");
    /// assert_eq!(rules.classify(""), "Misc");
    /// assert_eq!(rules.classify("JPG"), "Images");
    /// ```
    pub fn classify(&self, extension: &str) -> &str {
        let key = if extension.is_empty() {
            NO_EXTENSION_KEY.to_string()
        } else {
            normalize_key(extension)
        };
        self.map
            .get(&key)
            .map(String::as_str)
            .unwrap_or(FALLBACK_CATEGORY)
    }

    /// Iterates over the table in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercases a key and makes sure it starts with `.`.
///
/// The no-extension sentinel passes through verbatim.
fn normalize_key(key: &str) -> String {
    if key == NO_EXTENSION_KEY {
        return key.to_string();
    }
    let lower = key.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

/// A category must be one plain path segment inside the destination root.
fn validate_folder_name(folder: &str) -> Result<(), &'static str> {
    let trimmed = folder.trim();
    if trimmed.is_empty() {
        return Err("folder name is empty");
    }
    if trimmed == "." || trimmed == ".." {
        return Err("folder name must not be '.' or '..'");
    }
    if folder.contains('/') || folder.contains('\\') {
        return Err("folder name must not contain path separators");
    }
    Ok(())
}
