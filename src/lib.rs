//! autosort - sort the files of a directory into category folders, and undo it
//!
//! The library is the classify → safe-move → batch-log → undo pipeline:
//! [`scanner`] lists files, [`classifier`] maps their extensions through a
//! [`rules::RuleSet`], [`mover`] moves them without ever overwriting anything,
//! [`batch_log`] records each run as one batch, and [`undo`] reverses a batch.
//! [`organize`] ties the forward path together for front ends such as [`cli`].

pub mod batch_log;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mover;
pub mod organize;
pub mod output;
pub mod rules;
pub mod scanner;
pub mod undo;

pub use batch_log::{BatchLogger, MoveLogEntry};
pub use classifier::{Assignment, Classifier};
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use error::{SortError, SortResult};
pub use mover::{MoveReason, MoveResult, SafeMover};
pub use organize::{OrganizeEvent, OrganizeRequest, Organizer, RunOutcome, RunSummary, StopSignal};
pub use rules::RuleSet;
pub use scanner::{FileDescriptor, Scanner};
pub use undo::{UndoManager, UndoReport};
