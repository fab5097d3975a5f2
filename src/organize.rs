//! End-to-end organize run: validate, scan, classify, preview, move, log.
//!
//! [`Organizer::run`] is synchronous and UI-agnostic. Progress is reported
//! through an event callback and the go/no-go decision between preview and
//! execution through a confirmation callback, so a front end can drive it from a
//! worker thread.

use crate::batch_log::{BatchLogger, MoveLogEntry};
use crate::classifier::{Assignment, Classifier};
use crate::config::CompiledFilters;
use crate::error::{SortError, SortResult};
use crate::mover::{MoveReason, MoveResult, SafeMover};
use crate::rules::RuleSet;
use crate::scanner::Scanner;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag, checked between file moves.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an organize run needs from its caller.
#[derive(Debug, Clone)]
pub struct OrganizeRequest {
    pub source: PathBuf,
    /// Root for the category folders; the source when unset.
    pub destination: Option<PathBuf>,
    /// Rule overrides applied on top of the built-in table.
    pub rules_file: Option<PathBuf>,
    pub recursive: bool,
    pub ignore_hidden: bool,
    /// Preview every move and ask for confirmation before touching anything.
    pub simulate_first: bool,
    /// Preview only.
    pub dry_run: bool,
    /// End the run at the first failed move.
    pub stop_on_error: bool,
    pub filters: Option<CompiledFilters>,
    pub stop: StopSignal,
}

impl OrganizeRequest {
    /// Request with the default flags: non-recursive, hidden files ignored,
    /// preview first.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: None,
            rules_file: None,
            recursive: false,
            ignore_hidden: true,
            simulate_first: true,
            dry_run: false,
            stop_on_error: false,
            filters: None,
            stop: StopSignal::new(),
        }
    }
}

/// Progress notifications emitted during a run, in order.
#[derive(Debug)]
pub enum OrganizeEvent {
    Scanned { count: usize },
    /// A move as it would happen; nothing on disk changed.
    Planned { category: String, result: MoveResult },
    Moved { category: String, result: MoveResult },
    Failed { path: PathBuf, message: String },
    Stopped { completed: usize },
    BatchRecorded { batch_id: String, entries: usize },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Preview only, by request.
    DryRun,
    /// The caller answered "no" after the preview.
    Declined,
    /// Stop signal raised, or first failure with stop-on-error.
    Stopped,
}

/// Counts reported at the end of every run.
///
/// For previews, `moved` counts the files that would move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Set when at least one move was performed and logged.
    pub batch_id: Option<String>,
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            processed: 0,
            moved: 0,
            skipped: 0,
            failed: 0,
            by_category: BTreeMap::new(),
            batch_id: None,
            outcome: RunOutcome::Completed,
        }
    }

    fn tally(&mut self, category: &str, result: &SortResult<MoveResult>) {
        self.processed += 1;
        match result {
            Ok(moved) if moved.reason == Some(MoveReason::SameLocation) => self.skipped += 1,
            Ok(_) => {
                self.moved += 1;
                *self.by_category.entry(category.to_string()).or_insert(0) += 1;
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Checks both roots and resolves them to canonical paths.
///
/// The destination defaults to the source. A destination strictly inside the
/// source is rejected.
///
/// # Errors
///
/// Returns [`SortError::InvalidPath`] when a root is missing, is not a
/// directory, or the destination is nested inside the source.
pub fn validate_roots(source: &Path, destination: Option<&Path>) -> SortResult<(PathBuf, PathBuf)> {
    let source = existing_dir(source)?;
    let destination = match destination {
        Some(dest) => existing_dir(dest)?,
        None => source.clone(),
    };

    if destination != source && destination.starts_with(&source) {
        return Err(SortError::invalid_path(
            &destination,
            format!("destination is inside the source {}", source.display()),
        ));
    }
    Ok((source, destination))
}

fn existing_dir(path: &Path) -> SortResult<PathBuf> {
    let resolved = fs::canonicalize(path)
        .map_err(|e| SortError::invalid_path(path, format!("cannot resolve: {}", e)))?;
    if !resolved.is_dir() {
        return Err(SortError::invalid_path(path, "not a directory"));
    }
    Ok(resolved)
}

/// Fails when the files cannot fit on the destination's filesystem.
///
/// Only checked when the destination is on another device than the source,
/// since same-device moves are renames. The check is advisory: it looks at free
/// space once, for the filesystem as a whole.
pub fn check_capacity(source: &Path, destination: &Path, files: &[Assignment]) -> SortResult<()> {
    if same_device(source, destination) {
        return Ok(());
    }

    let required: u64 = files.iter().map(|a| a.descriptor.size).sum();
    let available = fs2::available_space(destination)
        .map_err(|e| SortError::invalid_path(destination, e.to_string()))?;
    tracing::debug!(required, available, "Capacity check");

    if required > available {
        return Err(SortError::InsufficientSpace {
            root: destination.to_path_buf(),
            required,
            available,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn same_device(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(_a: &Path, _b: &Path) -> bool {
    false
}

/// Drives one organize run.
pub struct Organizer;

impl Organizer {
    /// Runs the whole pipeline for `request`.
    ///
    /// With `simulate_first`, every move is previewed through `on_event` and
    /// `confirm` is asked before anything is touched. Per-file failures are
    /// reported as [`OrganizeEvent::Failed`] and counted; they end the run only
    /// with `stop_on_error`. Performed moves are written to the batch log as one
    /// batch.
    ///
    /// # Errors
    ///
    /// Invalid roots, unreadable rule files and a failed capacity check abort the
    /// run before any file is touched. A failed batch-log write is also returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use autosort::organize::{OrganizeRequest, Organizer};
    ///
    /// let mut request = OrganizeRequest::new("/home/me/Downloads");
    /// request.recursive = true;
    /// let summary = Organizer::run(&request, |event| println!("{:?}", event), |_| true)?;
    /// println!("moved {} files in batch {:?}", summary.moved, summary.batch_id);
    /// # Ok::<(), autosort::SortError>(())
    /// ```
    pub fn run<E, C>(
        request: &OrganizeRequest,
        mut on_event: E,
        mut confirm: C,
    ) -> SortResult<RunSummary>
    where
        E: FnMut(OrganizeEvent),
        C: FnMut(&RunSummary) -> bool,
    {
        let (source, destination) =
            validate_roots(&request.source, request.destination.as_deref())?;
        let rules = RuleSet::load_optional(request.rules_file.as_deref())?;

        let mut scanner = Scanner::new(&source)
            .recursive(request.recursive)
            .ignore_hidden(request.ignore_hidden);
        if let Some(filters) = &request.filters {
            scanner = scanner.with_filters(filters.clone());
        }
        let files = scanner.scan()?;
        on_event(OrganizeEvent::Scanned { count: files.len() });

        let assignments = Classifier::new(&rules).assign(files);
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            files = assignments.len(),
            dry_run = request.dry_run,
            "Organizing"
        );

        if request.dry_run || request.simulate_first {
            let (mut preview, _, _) =
                Self::execute(&destination, &assignments, request, true, &mut on_event)?;
            if preview.outcome == RunOutcome::Stopped {
                return Ok(preview);
            }
            if request.dry_run {
                preview.outcome = RunOutcome::DryRun;
                return Ok(preview);
            }
            if preview.moved == 0 {
                tracing::info!("Nothing to move");
                return Ok(preview);
            }
            if !confirm(&preview) {
                tracing::info!("Run declined after preview");
                let mut declined = RunSummary::new();
                declined.processed = preview.processed;
                declined.outcome = RunOutcome::Declined;
                return Ok(declined);
            }
        }

        check_capacity(&source, &destination, &assignments)?;

        let logger = BatchLogger::open(&destination);
        let (mut summary, performed, created_dirs) =
            Self::execute(&destination, &assignments, request, false, &mut on_event)?;

        if !performed.is_empty() {
            let batch_id = Self::record_batch(&logger, &performed, &created_dirs)?;
            on_event(OrganizeEvent::BatchRecorded {
                batch_id: batch_id.clone(),
                entries: performed.len(),
            });
            summary.batch_id = Some(batch_id);
        }

        tracing::info!(
            moved = summary.moved,
            skipped = summary.skipped,
            failed = summary.failed,
            batch = summary.batch_id.as_deref().unwrap_or("-"),
            "Run finished"
        );
        Ok(summary)
    }

    /// Writes the performed moves as one batch and returns its id.
    ///
    /// Another writer may claim the chosen id first; a fresh one is tried then.
    fn record_batch(
        logger: &BatchLogger,
        performed: &[MoveResult],
        created_dirs: &HashSet<PathBuf>,
    ) -> SortResult<String> {
        const ATTEMPTS: usize = 5;
        let mut attempt = 1;
        loop {
            let batch_id = logger.next_batch_id();
            let entries: Vec<MoveLogEntry> = performed
                .iter()
                .map(|r| {
                    let created = r
                        .destination
                        .parent()
                        .is_some_and(|dir| created_dirs.contains(dir));
                    MoveLogEntry::now(&batch_id, &r.source, &r.destination)
                        .with_created_dir(created)
                })
                .collect();
            match logger.write_batch(&entries) {
                Ok(()) => return Ok(batch_id),
                Err(SortError::DuplicateBatch { .. }) if attempt < ATTEMPTS => {
                    tracing::debug!(batch = %batch_id, "Batch id taken, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Moves (or previews) every assignment, reporting each result as an event.
    fn execute<E>(
        destination: &Path,
        assignments: &[Assignment],
        request: &OrganizeRequest,
        dry_run: bool,
        on_event: &mut E,
    ) -> SortResult<(RunSummary, Vec<MoveResult>, HashSet<PathBuf>)>
    where
        E: FnMut(OrganizeEvent),
    {
        let mut mover = SafeMover::new(destination, dry_run)?;
        let mut summary = RunSummary::new();
        let mut performed = Vec::new();
        let mut failed_fast = false;

        let results = mover.move_many_with(assignments, &request.stop, |assignment, result| {
            summary.tally(&assignment.category, result);
            match result {
                Ok(moved) => {
                    if moved.performed {
                        performed.push(moved.clone());
                    }
                    let category = assignment.category.clone();
                    let result = moved.clone();
                    on_event(if dry_run {
                        OrganizeEvent::Planned { category, result }
                    } else {
                        OrganizeEvent::Moved { category, result }
                    });
                    ControlFlow::Continue(())
                }
                Err(err) => {
                    on_event(OrganizeEvent::Failed {
                        path: assignment.descriptor.path.clone(),
                        message: err.to_string(),
                    });
                    if request.stop_on_error {
                        failed_fast = true;
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            }
        });

        if failed_fast || results.len() < assignments.len() {
            summary.outcome = RunOutcome::Stopped;
            on_event(OrganizeEvent::Stopped {
                completed: results.len(),
            });
        }
        Ok((summary, performed, mover.created_dirs().clone()))
    }
}
