//! Output formatting and styling module.
//!
//! Everything the user sees on stdout goes through [`OutputFormatter`];
//! diagnostics go through `tracing` on stderr instead.

use crate::mover::{MoveReason, MoveResult};
use crate::organize::{RunOutcome, RunSummary};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Status messages (success, error, warning, info)
/// - One line per planned, performed or restored move
/// - Progress bars for long runs
/// - Summary tables with per-category counts
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// OutputFormatter::success("Organized 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints one move, planned or performed.
    pub fn move_line(result: &MoveResult, root: &Path) {
        let line = Self::format_move(result, root);
        match &result.reason {
            Some(MoveReason::Failed(_)) | Some(MoveReason::MissingSource) => {
                println!("  {}", line.red())
            }
            Some(MoveReason::SameLocation) => println!("  {}", line.dimmed()),
            Some(_) => println!("  {}", line.yellow()),
            None => println!("  {}", line),
        }
    }

    /// Renders `source -> destination [reason]`, with paths shown relative to `root`.
    pub fn format_move(result: &MoveResult, root: &Path) -> String {
        let show = |path: &Path| {
            path.strip_prefix(root)
                .unwrap_or(path)
                .display()
                .to_string()
        };
        let mut line = format!("{} -> {}", show(&result.source), show(&result.destination));
        if let Some(reason) = &result.reason {
            line.push_str(&format!(" [{}]", reason));
        }
        line
    }

    /// Creates and returns a progress bar for file operations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints a summary table with file counts by category.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use autosort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!("{:<width$} | {}", "Category".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = width
        );
    }

    /// Prints the closing lines of an organize run.
    pub fn run_summary(summary: &RunSummary) {
        match summary.outcome {
            RunOutcome::Declined => {
                Self::warning("Cancelled, no files were moved");
                return;
            }
            RunOutcome::DryRun => {
                Self::summary_table(&summary.by_category, summary.moved);
                Self::dry_run_notice(&format!(
                    "{} file(s) would be moved, nothing was changed",
                    summary.moved
                ));
            }
            RunOutcome::Completed | RunOutcome::Stopped => {
                if summary.moved > 0 {
                    Self::summary_table(&summary.by_category, summary.moved);
                }
            }
        }

        println!(
            "\nProcessed {}, moved {}, skipped {}, failed {}",
            summary.processed,
            summary.moved.to_string().green(),
            summary.skipped,
            if summary.failed > 0 {
                summary.failed.to_string().red()
            } else {
                summary.failed.to_string().normal()
            }
        );

        if summary.outcome == RunOutcome::Stopped {
            Self::warning("Run stopped early");
        }
        if let Some(batch_id) = &summary.batch_id {
            Self::success(&format!("Batch {} recorded, undo with: autosort undo", batch_id));
        }
    }

    pub fn undo_summary(report: &UndoReport, dry_run: bool) {
        let verb = if dry_run { "would be restored" } else { "restored" };
        Self::success(&format!("{} file(s) {}", report.restored_files, verb));
        if report.skipped_files > 0 {
            Self::warning(&format!(
                "{} file(s) skipped, no longer where they were moved",
                report.skipped_files
            ));
        }
        if report.failed_restores > 0 {
            Self::error(&format!("{} file(s) could not be restored", report.failed_restores));
        }
    }

    /// Prints one row of `autosort batches`.
    pub fn batch_line(batch_id: &str, entries: usize, latest: bool) {
        let marker = if latest { " (latest)".green().to_string() } else { String::new() };
        println!("  {}  {} {}{}", batch_id.bold(), entries, plural(entries), marker);
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_move_relative_with_reason() {
        let result = MoveResult {
            source: PathBuf::from("/data/report.pdf"),
            destination: PathBuf::from("/data/Documents/report (1).pdf"),
            performed: true,
            reason: Some(MoveReason::RenamedOnConflict),
        };
        assert_eq!(
            OutputFormatter::format_move(&result, Path::new("/data")),
            "report.pdf -> Documents/report (1).pdf [renamed-on-conflict]"
        );
    }

    #[test]
    fn test_format_move_outside_root_keeps_full_path() {
        let result = MoveResult {
            source: PathBuf::from("/in/a.txt"),
            destination: PathBuf::from("/out/Text/a.txt"),
            performed: false,
            reason: None,
        };
        assert_eq!(
            OutputFormatter::format_move(&result, Path::new("/out")),
            "/in/a.txt -> Text/a.txt"
        );
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1), "file");
        assert_eq!(plural(0), "files");
        assert_eq!(plural(2), "files");
    }
}
