//! Run reporting
//!
//! A `Reporter` is handed to every component that talks to the user. Only
//! the primary rank prints, so multi-process runs produce one log stream
//! without each call site checking the rank. Scalar series optionally go
//! to a JSONL file for later plotting.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Output verbosity, ordered from silent to chatty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

impl LogLevel {
    /// Resolve the level from `--verbose` / `--quiet` flags. Quiet wins
    /// when both are set.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            LogLevel::Quiet
        } else if verbose {
            LogLevel::Verbose
        } else {
            LogLevel::Normal
        }
    }
}

/// Rank-aware run reporter
pub struct Reporter {
    rank: usize,
    level: LogLevel,
    scalar_log: Option<Mutex<LineWriter<File>>>,
}

impl Reporter {
    /// Create a reporter for the given process rank
    pub fn new(rank: usize, level: LogLevel) -> Self {
        Self { rank, level, scalar_log: None }
    }

    /// Attach a JSONL scalar stream, appending if the file exists
    pub fn with_scalar_log(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        self.scalar_log = Some(Mutex::new(LineWriter::new(file)));
        Ok(self)
    }

    /// Process rank this reporter was built for
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// True on the rank that owns user-facing output
    pub fn is_primary(&self) -> bool {
        self.rank == 0
    }

    /// True if a message at the given level would be printed
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.is_primary() && self.level >= level
    }

    /// Print a progress message on the primary rank
    pub fn info(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Normal) {
            println!("{}", msg.as_ref());
        }
    }

    /// Print a detail message on the primary rank in verbose runs
    pub fn verbose(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Verbose) {
            println!("{}", msg.as_ref());
        }
    }

    /// Print a warning on the primary rank regardless of verbosity
    pub fn warn(&self, msg: impl AsRef<str>) {
        if self.is_primary() {
            eprintln!("warning: {}", msg.as_ref());
        }
    }

    /// Record a scalar sample on the primary rank
    ///
    /// The sample is appended to the JSONL stream when one is attached.
    /// The stream is best effort; write failures do not interrupt a run.
    pub fn scalar(&self, name: &str, step: u64, value: f64) {
        if !self.is_primary() {
            return;
        }
        if let Some(log) = &self.scalar_log {
            let line = serde_json::json!({ "name": name, "step": step, "value": value });
            let mut writer = log.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_primary_is_rank_zero() {
        assert!(Reporter::new(0, LogLevel::Normal).is_primary());
        assert!(!Reporter::new(1, LogLevel::Normal).is_primary());
        assert!(!Reporter::new(3, LogLevel::Verbose).is_primary());
    }

    #[test]
    fn test_level_gating() {
        let quiet = Reporter::new(0, LogLevel::Quiet);
        assert!(!quiet.enabled(LogLevel::Normal));
        assert!(!quiet.enabled(LogLevel::Verbose));

        let normal = Reporter::new(0, LogLevel::Normal);
        assert!(normal.enabled(LogLevel::Normal));
        assert!(!normal.enabled(LogLevel::Verbose));

        let verbose = Reporter::new(0, LogLevel::Verbose);
        assert!(verbose.enabled(LogLevel::Normal));
        assert!(verbose.enabled(LogLevel::Verbose));
    }

    #[test]
    fn test_secondary_rank_never_enabled() {
        let reporter = Reporter::new(2, LogLevel::Verbose);
        assert!(!reporter.enabled(LogLevel::Normal));
        assert!(!reporter.enabled(LogLevel::Verbose));
    }

    #[test]
    fn test_scalar_log_appends_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scalars.jsonl");

        let reporter = Reporter::new(0, LogLevel::Normal).with_scalar_log(&path).unwrap();
        reporter.scalar("train/loss", 1, 0.5);
        reporter.scalar("train/loss", 2, 0.25);
        drop(reporter);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "train/loss");
        assert_eq!(first["step"], 1);
        assert_eq!(first["value"], 0.5);
    }

    #[test]
    fn test_scalar_silent_without_stream() {
        let reporter = Reporter::new(0, LogLevel::Normal);
        reporter.scalar("train/loss", 1, 0.5);
    }

    #[test]
    fn test_scalar_skipped_on_secondary_rank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scalars.jsonl");

        let reporter = Reporter::new(1, LogLevel::Normal).with_scalar_log(&path).unwrap();
        reporter.scalar("train/loss", 1, 0.5);
        drop(reporter);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_level_from_flags() {
        assert_eq!(LogLevel::from_flags(false, false), LogLevel::Normal);
        assert_eq!(LogLevel::from_flags(true, false), LogLevel::Verbose);
        assert_eq!(LogLevel::from_flags(false, true), LogLevel::Quiet);
        assert_eq!(LogLevel::from_flags(true, true), LogLevel::Quiet);
    }
}
