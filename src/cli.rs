//! Command-line interface module for autosort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing and merging with the configuration file
//! - Running organize on a worker thread and rendering its events
//! - Interactive confirmation between preview and execution
//! - Listing and undoing batches

use crate::batch_log::BatchLogger;
use crate::config::AppConfig;
use crate::error::{SortError, SortResult};
use crate::organize::{OrganizeEvent, OrganizeRequest, Organizer, RunSummary, validate_roots};
use crate::output::OutputFormatter;
use crate::undo::{UndoManager, UndoReport};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

/// autosort - sort files into category folders by extension, and undo it later
#[derive(Parser, Debug)]
#[command(name = "autosort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: ./.autosortrc.toml, then ~/.config/autosort/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase diagnostic output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sort the files of a directory into category folders
    Organize(OrganizeArgs),
    /// List recorded batches, newest first
    Batches {
        /// Destination root the batches were recorded under
        root: PathBuf,
    },
    /// Move the files of a batch back where they came from
    Undo(UndoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OrganizeArgs {
    /// Directory to organize
    pub source: PathBuf,

    /// Root for the category folders (default: the source directory)
    #[arg(short = 'd', long = "dest")]
    pub destination: Option<PathBuf>,

    /// JSON or TOML file mapping extensions to folder names
    #[arg(short = 'r', long = "rules")]
    pub rules: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short = 'R', long, action = ArgAction::SetTrue)]
    pub recursive: bool,

    /// Also sort hidden files and descend into hidden directories
    #[arg(long, action = ArgAction::SetTrue)]
    pub include_hidden: bool,

    /// Preview only, change nothing
    #[arg(short = 'n', long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Do not ask for confirmation after the preview
    #[arg(short = 'y', long, action = ArgAction::SetTrue)]
    pub yes: bool,

    /// End the run at the first file that cannot be moved
    #[arg(long, action = ArgAction::SetTrue)]
    pub stop_on_error: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UndoArgs {
    /// Destination root the batch was recorded under
    pub root: PathBuf,

    /// Batch to undo (default: the latest)
    pub batch: Option<String>,

    /// Preview only, change nothing
    #[arg(short = 'n', long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Do not ask for confirmation after the preview
    #[arg(short = 'y', long, action = ArgAction::SetTrue)]
    pub yes: bool,
}

/// Messages from the organize worker to the terminal thread.
enum WorkerMessage {
    Event(OrganizeEvent),
    Confirm(RunSummary, mpsc::Sender<bool>),
    Done(SortResult<RunSummary>),
}

/// Runs the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use autosort::cli::{Cli, run_cli};
/// use clap::Parser;
///
/// let cli = Cli::parse_from(["autosort", "organize", "/home/me/Downloads", "-n"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> SortResult<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Organize(args) => organize(&args, &config),
        Command::Batches { root } => list_batches(&root),
        Command::Undo(args) => undo(&args),
    }
}

/// Merges command-line flags over the configuration file.
pub fn build_request(args: &OrganizeArgs, config: &AppConfig) -> SortResult<OrganizeRequest> {
    let mut request = OrganizeRequest::new(&args.source);
    request.destination = args.destination.clone();
    request.rules_file = args
        .rules
        .clone()
        .or_else(|| config.organize.rules_file.clone());
    request.recursive = args.recursive || config.organize.recursive;
    request.ignore_hidden = !(args.include_hidden || config.filters.enable_hidden_files);
    request.simulate_first = !args.yes;
    request.dry_run = args.dry_run;
    request.stop_on_error = args.stop_on_error;
    request.filters = Some(config.filters.compile()?);
    Ok(request)
}

fn organize(args: &OrganizeArgs, config: &AppConfig) -> SortResult<()> {
    let request = build_request(args, config)?;
    let (source, destination) = validate_roots(&request.source, request.destination.as_deref())?;
    OutputFormatter::info(&format!("Organizing contents of: {}", source.display()));
    if request.dry_run {
        OutputFormatter::dry_run_notice("Previewing only, no files will be moved");
    }

    let stop = request.stop.clone();
    if let Err(e) = ctrlc::set_handler(move || stop.request_stop()) {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
    }

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let events = tx.clone();
        let result = Organizer::run(
            &request,
            |event| {
                let _ = events.send(WorkerMessage::Event(event));
            },
            |preview| {
                let (reply_tx, reply_rx) = mpsc::channel();
                if tx.send(WorkerMessage::Confirm(preview.clone(), reply_tx)).is_err() {
                    return false;
                }
                reply_rx.recv().unwrap_or(false)
            },
        );
        let _ = tx.send(WorkerMessage::Done(result));
    });

    let mut total = 0;
    let mut progress: Option<ProgressBar> = None;
    let mut outcome = Err(SortError::Other("organize worker ended unexpectedly".to_string()));

    for message in rx {
        match message {
            WorkerMessage::Event(event) => {
                render_event(event, &destination, &mut progress, &mut total)
            }
            WorkerMessage::Confirm(preview, reply) => {
                if let Some(pb) = progress.take() {
                    pb.finish_and_clear();
                }
                let proceed = ask(&format!("Move {} file(s)?", preview.moved));
                let _ = reply.send(proceed);
            }
            WorkerMessage::Done(result) => {
                outcome = result;
                break;
            }
        }
    }
    if let Some(pb) = progress.take() {
        pb.finish_and_clear();
    }
    if worker.join().is_err() {
        return Err(SortError::Other("organize worker panicked".to_string()));
    }

    let summary = outcome?;
    OutputFormatter::run_summary(&summary);
    Ok(())
}

fn render_event(
    event: OrganizeEvent,
    root: &Path,
    progress: &mut Option<ProgressBar>,
    total: &mut usize,
) {
    match event {
        OrganizeEvent::Scanned { count } => {
            *total = count;
            OutputFormatter::plain(&format!("Found {} file(s)", count));
        }
        OrganizeEvent::Planned { result, .. } => OutputFormatter::move_line(&result, root),
        OrganizeEvent::Moved { result, .. } => {
            let pb = progress
                .get_or_insert_with(|| OutputFormatter::create_progress_bar(*total as u64));
            pb.println(format!("  {}", OutputFormatter::format_move(&result, root)));
            pb.inc(1);
        }
        OrganizeEvent::Failed { path, message } => {
            let line = format!("Skipped {}: {}", path.display(), message);
            match progress {
                Some(pb) => {
                    pb.println(format!("  ✗ {}", line));
                    pb.inc(1);
                }
                None => OutputFormatter::error(&line),
            }
        }
        OrganizeEvent::Stopped { completed } => {
            tracing::info!(completed, "Run stopped");
        }
        OrganizeEvent::BatchRecorded { batch_id, entries } => {
            tracing::debug!(batch = %batch_id, entries, "Batch recorded");
        }
    }
}

fn list_batches(root: &Path) -> SortResult<()> {
    let (root, _) = validate_roots(root, None)?;
    let logger = BatchLogger::open(&root);
    let batches = logger.list_batches()?;
    if batches.is_empty() {
        OutputFormatter::info("No batches recorded yet");
        return Ok(());
    }

    OutputFormatter::header(&format!("Batches under {}:", root.display()));
    for (i, batch_id) in batches.iter().enumerate() {
        let entries = logger.load_batch(batch_id)?.len();
        OutputFormatter::batch_line(batch_id, entries, i == 0);
    }
    Ok(())
}

fn undo(args: &UndoArgs) -> SortResult<()> {
    let (root, _) = validate_roots(&args.root, None)?;
    let logger = BatchLogger::open(&root);

    let batch_id = match &args.batch {
        Some(id) => id.clone(),
        None => match logger.list_batches()?.into_iter().next() {
            Some(latest) => latest,
            None => {
                OutputFormatter::info("No previous organization found to undo");
                return Ok(());
            }
        },
    };

    let preview = UndoManager::new(logger.clone(), true).undo_batch(&batch_id)?;
    if preview.is_empty() {
        OutputFormatter::warning(&format!("Batch {} has no recorded moves", batch_id));
        return Ok(());
    }

    OutputFormatter::header(&format!("Undoing batch {}:", batch_id));
    for result in &preview {
        OutputFormatter::move_line(result, &root);
    }

    if args.dry_run {
        OutputFormatter::undo_summary(&UndoReport::from_results(&preview), true);
        OutputFormatter::dry_run_notice("Nothing was changed");
        return Ok(());
    }
    if !args.yes && !ask(&format!("Restore {} file(s)?", preview.len())) {
        OutputFormatter::warning("Cancelled, no files were restored");
        return Ok(());
    }

    let results = UndoManager::new(logger, false).undo_batch(&batch_id)?;
    for result in results.iter().filter(|r| r.reason.is_some()) {
        OutputFormatter::move_line(result, &root);
    }
    OutputFormatter::undo_summary(&UndoReport::from_results(&results), false);
    Ok(())
}

/// Asks a yes/no question on stdin; anything but `y`/`yes` means no.
fn ask(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
