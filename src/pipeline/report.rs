// src/pipeline/report.rs

//! Per-book results and the run-level accumulator.

use std::fmt;

use super::cycle::Phase;
use crate::utils::log;

/// How a book's cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every step ran and nothing is left pending
    Synced,
    /// Progress was made but some chapters or batches remain for next time
    Partial,
    /// The remote marks the book completed
    Skipped,
    Failed { phase: Phase, error: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => f.write_str("synced"),
            Self::Partial => f.write_str("partial"),
            Self::Skipped => f.write_str("skipped (completed)"),
            Self::Failed { phase, error } => write!(f, "failed during {phase}: {error}"),
        }
    }
}

/// Summary of one book's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookReport {
    pub title: String,
    pub outcome: Outcome,
    /// Chapter bodies fetched this cycle
    pub fetched: usize,
    /// Chapters whose fetch failed this cycle and stay pending
    pub failed: usize,
    /// Chapters acknowledged by the remote this cycle
    pub uploaded: usize,
    /// Pending chapters left in the archive
    pub pending: usize,
}

impl BookReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            outcome: Outcome::Synced,
            fetched: 0,
            failed: 0,
            uploaded: 0,
            pending: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }

    fn log(&self) {
        log::sub_item(&format!(
            "{}: {} (fetched {}, failed {}, uploaded {}, pending {})",
            self.title, self.outcome, self.fetched, self.failed, self.uploaded, self.pending
        ));
    }
}

/// Accumulates book reports over a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub books: Vec<BookReport>,
    /// The run stopped early on operator request
    pub interrupted: bool,
}

impl RunReport {
    pub fn push(&mut self, report: BookReport) {
        report.log();
        self.books.push(report);
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.books.iter().filter(|b| pred(&b.outcome)).count()
    }

    pub fn successes(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Synced))
    }

    pub fn partial(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Partial))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    pub fn failures(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    pub fn failed_titles(&self) -> Vec<&str> {
        self.books
            .iter()
            .filter(|b| b.is_failed())
            .map(|b| b.title.as_str())
            .collect()
    }

    pub fn total_uploaded(&self) -> usize {
        self.books.iter().map(|b| b.uploaded).sum()
    }

    pub fn total_fetched(&self) -> usize {
        self.books.iter().map(|b| b.fetched).sum()
    }

    /// Log the final report, naming every failed book.
    pub fn log_summary(&self, title: &str) {
        log::summary(
            title,
            &[
                ("Books", self.books.len().to_string()),
                ("Synced", self.successes().to_string()),
                ("Partial", self.partial().to_string()),
                ("Skipped", self.skipped().to_string()),
                ("Failed", self.failures().to_string()),
                ("Chapters fetched", self.total_fetched().to_string()),
                ("Chapters uploaded", self.total_uploaded().to_string()),
            ],
        );
        if self.interrupted {
            ::log::warn!("Run was interrupted; remaining books were not processed");
        }
        for book in self.books.iter().filter(|b| b.is_failed()) {
            ::log::error!("  {} -> {}", book.title, book.outcome);
        }
    }
}

/// Result of a mark-completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkReport {
    pub updated: Vec<String>,
    pub already_completed: Vec<String>,
    pub not_found: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl MarkReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn log_summary(&self) {
        log::summary(
            "Mark completed",
            &[
                ("Updated", self.updated.len().to_string()),
                ("Already completed", self.already_completed.len().to_string()),
                ("Not found", self.not_found.len().to_string()),
                ("Failed", self.failed.len().to_string()),
            ],
        );
        for title in &self.not_found {
            ::log::warn!("  not on remote: {}", title);
        }
        for (title, error) in &self.failed {
            ::log::error!("  {} -> {}", title, error);
        }
    }
}
