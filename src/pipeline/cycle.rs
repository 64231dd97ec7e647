// src/pipeline/cycle.rs

//! Book update cycles.
//!
//! One cycle per book walks `catalog-fetch -> plan -> content-fetch ->
//! archive-write -> remote-sync -> done`. Any unrecoverable error stops the
//! cycle and is recorded against the phase it happened in. Books in a run are
//! processed one after another; a failed book never stops the others.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Book, BookStatus, Catalog, Config};
use crate::services::{
    BatchUploader, ContentExtractor, ReliableFetcher, RemoteStore, StatusSnapshot,
};
use crate::storage::ArchiveStore;
use crate::utils::{CancelFlag, log};

use super::merge::merge;
use super::order::OrderingResolver;
use super::plan::{SyncPlan, SyncPlanner};
use super::report::{BookReport, MarkReport, Outcome, RunReport};

/// Cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CatalogFetch,
    Plan,
    ContentFetch,
    ArchiveWrite,
    RemoteSync,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CatalogFetch => "catalog-fetch",
            Self::Plan => "plan",
            Self::ContentFetch => "content-fetch",
            Self::ArchiveWrite => "archive-write",
            Self::RemoteSync => "remote-sync",
            Self::Done => "done",
        })
    }
}

/// Which archived books a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Book(String),
}

/// Drives cycles over archived books.
pub struct Orchestrator {
    config: Arc<Config>,
    archive: Arc<dyn ArchiveStore>,
    fetcher: ReliableFetcher,
    /// `None` runs offline: no status gate, no manifest check, no upload
    remote: Option<Arc<dyn RemoteStore>>,
    resolver: OrderingResolver,
    cancel: CancelFlag,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        archive: Arc<dyn ArchiveStore>,
        extractor: Arc<dyn ContentExtractor>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Result<Self> {
        let resolver = OrderingResolver::new(&config.ordering)?;
        let fetcher = ReliableFetcher::new(extractor, config.fetch.clone());
        Ok(Self {
            config,
            archive,
            fetcher,
            remote,
            resolver,
            cancel: CancelFlag::new(),
        })
    }

    /// Share a cancel flag with a signal handler.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Refresh catalogs, fetch pending chapters and push to the remote.
    pub async fn update(&self, target: &Target) -> Result<RunReport> {
        let books = self.targets(target).await?;
        let snapshot = self.snapshot().await?;

        log::header(&format!("Updating {} book(s)", books.len()));
        let mut run = RunReport::default();
        let total = books.len();
        for (i, book) in books.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                run.interrupted = true;
                break;
            }
            log::step(i + 1, total, book.key());
            let report = Cycle::new(self, &snapshot, book.key()).update(book).await;
            run.push(report);
            if i + 1 < total {
                self.between_books().await;
            }
        }
        run.interrupted |= self.cancel.is_cancelled();

        run.log_summary("Update");
        Ok(run)
    }

    /// Create (or refresh) a book from its catalog URL and run a full cycle.
    pub async fn add(&self, source_url: &str) -> Result<RunReport> {
        let snapshot = self.snapshot().await?;

        log::header(&format!("Adding {source_url}"));
        let mut run = RunReport::default();
        let report = Cycle::new(self, &snapshot, source_url).add(source_url).await;
        run.push(report);
        run.interrupted = self.cancel.is_cancelled();

        run.log_summary("Add");
        Ok(run)
    }

    /// Sync archived books to the remote without touching the source.
    pub async fn push(&self, target: &Target) -> Result<RunReport> {
        if self.remote.is_none() {
            return Err(disabled_remote());
        }
        let books = self.targets(target).await?;
        let snapshot = self.snapshot().await?;

        log::header(&format!("Pushing {} book(s)", books.len()));
        let mut run = RunReport::default();
        let total = books.len();
        for (i, book) in books.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                run.interrupted = true;
                break;
            }
            log::step(i + 1, total, book.key());
            let report = Cycle::new(self, &snapshot, book.key()).push(book).await;
            run.push(report);
        }
        run.interrupted |= self.cancel.is_cancelled();

        run.log_summary("Push");
        Ok(run)
    }

    /// Set the remote status of the given titles to completed.
    pub async fn mark_completed(&self, titles: &[String]) -> Result<MarkReport> {
        let remote = self.remote.as_ref().ok_or_else(disabled_remote)?;
        let snapshot = remote.book_statuses().await?;

        let mut report = MarkReport::default();
        let mut seen = HashSet::new();
        for title in titles.iter().map(|t| t.trim()) {
            if title.is_empty() || !seen.insert(title) {
                continue;
            }
            match snapshot.get(title) {
                None => report.not_found.push(title.to_string()),
                Some(book) if book.status == BookStatus::Completed => {
                    report.already_completed.push(title.to_string());
                }
                Some(book) => match remote.set_status(book, BookStatus::Completed).await {
                    Ok(()) => {
                        ::log::info!("Marked {} as completed", title);
                        report.updated.push(title.to_string());
                    }
                    Err(e) if e.is_auth() => return Err(e),
                    Err(e) => report.failed.push((title.to_string(), e.to_string())),
                },
            }
        }

        report.log_summary();
        Ok(report)
    }

    async fn targets(&self, target: &Target) -> Result<Vec<Book>> {
        match target {
            Target::All => self.archive.load_all().await,
            Target::Book(title) => self
                .archive
                .load(title.trim())
                .await?
                .map(|book| vec![book])
                .ok_or_else(|| AppError::validation(format!("no archive for {}", title.trim()))),
        }
    }

    /// Remote statuses, fetched once per run.
    async fn snapshot(&self) -> Result<StatusSnapshot> {
        match &self.remote {
            Some(remote) => {
                let snapshot = remote.book_statuses().await?;
                ::log::info!("Remote lists {} books", snapshot.len());
                Ok(snapshot)
            }
            None => Ok(StatusSnapshot::default()),
        }
    }

    async fn between_books(&self) {
        let delay = self.config.fetch.book_delay();
        if !delay.is_zero() && !self.cancel.is_cancelled() {
            tokio::time::sleep(delay).await;
        }
    }

    fn min_chars(&self) -> usize {
        self.config.fetch.min_content_chars
    }
}

fn disabled_remote() -> AppError {
    AppError::config("remote sync is disabled (remote.base_url is empty or --offline)")
}

/// State of one book's cycle.
struct Cycle<'o> {
    orch: &'o Orchestrator,
    snapshot: &'o StatusSnapshot,
    phase: Phase,
    report: BookReport,
}

impl<'o> Cycle<'o> {
    fn new(orch: &'o Orchestrator, snapshot: &'o StatusSnapshot, title: &str) -> Self {
        Self {
            orch,
            snapshot,
            phase: Phase::CatalogFetch,
            report: BookReport::new(title.trim()),
        }
    }

    async fn update(mut self, book: Book) -> BookReport {
        let result = self.run_update(book, None).await;
        self.finish(result)
    }

    async fn add(mut self, source_url: &str) -> BookReport {
        let result = self.run_add(source_url).await;
        self.finish(result)
    }

    async fn push(mut self, book: Book) -> BookReport {
        let result = self.run_push(book).await;
        self.finish(result)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        ::log::debug!("[{}] {}", phase, self.report.title);
    }

    fn finish(mut self, result: Result<()>) -> BookReport {
        match result {
            Ok(()) => {
                if self.report.outcome == Outcome::Synced && self.report.failed > 0 {
                    self.report.outcome = Outcome::Partial;
                }
            }
            Err(e) => {
                ::log::error!("{} failed during {}: {}", self.report.title, self.phase, e);
                if let AppError::Upload { uploaded, .. } = &e {
                    self.report.uploaded = *uploaded;
                }
                self.report.outcome = Outcome::Failed {
                    phase: self.phase,
                    error: e.to_string(),
                };
            }
        }
        self.report
    }

    /// Status gate. Marks the report skipped when the remote says completed.
    fn skip_completed(&mut self, book: &Book) -> bool {
        if SyncPlanner::gate(self.snapshot, book.key()) {
            return false;
        }
        ::log::info!("{} is completed remotely, skipping", book.key());
        self.report.outcome = Outcome::Skipped;
        true
    }

    async fn run_add(&mut self, source_url: &str) -> Result<()> {
        let orch = self.orch;
        self.enter(Phase::CatalogFetch);

        let catalog = orch.fetcher.fetch_catalog(source_url).await?;
        let title = catalog.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::extraction(source_url, "catalog page has no title"));
        }
        self.report.title = title.clone();

        let mut book = match orch.archive.load(&title).await? {
            Some(existing) => {
                ::log::info!("{} is already archived, merging", title);
                existing
            }
            None => Book::new(
                &title,
                catalog.author.clone().unwrap_or_default(),
                source_url,
            ),
        };
        book.source_url = source_url.to_string();

        self.run_update(book, Some(catalog)).await
    }

    async fn run_update(&mut self, book: Book, catalog: Option<Catalog>) -> Result<()> {
        let orch = self.orch;
        if self.skip_completed(&book) {
            return Ok(());
        }

        self.enter(Phase::CatalogFetch);
        let catalog = match catalog {
            Some(catalog) => catalog,
            None => {
                if book.source_url.trim().is_empty() {
                    return Err(AppError::validation(format!(
                        "{} has no source URL",
                        book.key()
                    )));
                }
                orch.fetcher.fetch_catalog(&book.source_url).await?
            }
        };
        let mut book = self.refresh(&book, catalog);

        let plan = self.plan(&book).await?;
        if plan == Some(SyncPlan::Skip) {
            self.report.outcome = Outcome::Skipped;
            return Ok(());
        }

        let interrupted = match self.fetch_content(&mut book).await {
            Ok(()) => false,
            Err(AppError::Interrupted) => true,
            Err(e) => {
                if let Err(persist_err) = orch.archive.persist(&book).await {
                    ::log::warn!("Could not save progress for {}: {}", book.key(), persist_err);
                }
                return Err(e);
            }
        };

        self.enter(Phase::ArchiveWrite);
        orch.archive.persist(&book).await?;
        self.report.pending = book.pending_count(orch.min_chars());

        if interrupted {
            ::log::warn!("{} interrupted, progress saved", book.key());
            self.report.outcome = Outcome::Partial;
            return Ok(());
        }

        if let Some(plan) = plan {
            self.sync(&book, &plan).await?;
        }
        self.enter(Phase::Done);
        Ok(())
    }

    async fn run_push(&mut self, book: Book) -> Result<()> {
        if self.skip_completed(&book) {
            return Ok(());
        }
        self.report.pending = book.pending_count(self.orch.min_chars());

        let Some(plan) = self.plan(&book).await? else {
            return Err(disabled_remote());
        };
        if plan == SyncPlan::Skip {
            self.report.outcome = Outcome::Skipped;
            return Ok(());
        }

        self.sync(&book, &plan).await?;
        self.enter(Phase::Done);
        Ok(())
    }

    /// Order the fresh catalog and merge it into the archived book.
    fn refresh(&self, book: &Book, mut catalog: Catalog) -> Book {
        let orch = self.orch;
        orch.resolver.order_catalog(&mut catalog);

        let (mut merged, stats) = merge(book, &catalog.entries, orch.min_chars());
        if let Some(author) = catalog.author.filter(|a| !a.trim().is_empty()) {
            merged.author = author;
        }

        ::log::info!(
            "{}: {} chapters listed ({} carried, {} pending, {} dropped)",
            merged.key(),
            merged.chapters.len(),
            stats.carried,
            stats.pending,
            stats.dropped
        );
        merged
    }

    async fn plan(&mut self, book: &Book) -> Result<Option<SyncPlan>> {
        let orch = self.orch;
        let Some(remote) = &orch.remote else {
            return Ok(None);
        };

        self.enter(Phase::Plan);
        let plan = SyncPlanner::new(remote.as_ref())
            .plan(book, self.snapshot)
            .await?;
        Ok(Some(plan))
    }

    /// Fetch every pending chapter once, checkpointing as content arrives.
    ///
    /// Failed chapters stay pending for the next cycle. Returns
    /// [`AppError::Interrupted`] when the cancel flag is raised between chapters.
    async fn fetch_content(&mut self, book: &mut Book) -> Result<()> {
        let orch = self.orch;
        let min = orch.min_chars();
        let pending: Vec<usize> = book
            .chapters
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_filled(min))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            ::log::info!("{}: no pending chapters", book.key());
            return Ok(());
        }

        self.enter(Phase::ContentFetch);
        let total = pending.len();
        let checkpoint_every = orch.config.fetch.checkpoint_every.max(1);
        let mut since_checkpoint = 0;

        for (n, idx) in pending.into_iter().enumerate() {
            if orch.cancel.is_cancelled() {
                return Err(AppError::Interrupted);
            }

            let link = book.chapters[idx].link.clone();
            match orch.fetcher.fetch_chapter_content(&link).await {
                Ok(content) => {
                    book.chapters[idx].content = content;
                    self.report.fetched += 1;
                    since_checkpoint += 1;
                }
                Err(e) if e.is_auth() || matches!(e, AppError::Interrupted) => return Err(e),
                Err(e) => {
                    ::log::warn!(
                        "{} stays pending until the next cycle: {}",
                        book.chapters[idx].title,
                        e
                    );
                    self.report.failed += 1;
                }
            }
            log::progress(Phase::ContentFetch, n + 1, total, &book.chapters[idx].title);

            if since_checkpoint >= checkpoint_every {
                self.checkpoint(book).await?;
                since_checkpoint = 0;
            }
            if n + 1 < total {
                orch.fetcher.pace().await;
            }
        }
        Ok(())
    }

    async fn checkpoint(&mut self, book: &Book) -> Result<()> {
        let resume = self.phase;
        self.enter(Phase::ArchiveWrite);
        self.orch.archive.persist(book).await?;
        ::log::info!(
            "Checkpoint: {} ({} filled)",
            book.key(),
            book.filled_count(self.orch.min_chars())
        );
        self.phase = resume;
        Ok(())
    }

    async fn sync(&mut self, book: &Book, plan: &SyncPlan) -> Result<()> {
        let orch = self.orch;
        let Some(remote) = &orch.remote else {
            return Ok(());
        };

        self.enter(Phase::RemoteSync);
        let chapters = plan.chapters_to_upload(book, orch.min_chars());
        if chapters.is_empty() {
            ::log::info!("{}: remote is up to date", book.key());
            return Ok(());
        }

        let progress = BatchUploader::new(remote.as_ref(), orch.config.remote.batch_size)
            .upload(book, &chapters, &orch.cancel)
            .await?;
        self.report.uploaded = progress.uploaded;
        if !progress.is_complete() {
            self.report.outcome = Outcome::Partial;
        }
        Ok(())
    }
}
