//! Sync planning: decide what the remote needs for one book.
//!
//! Two steps. Books the remote marks completed are skipped outright. For the
//! rest a manifest of `{title, chapter_number}` goes to the remote, which
//! answers with either "upload everything" or the titles it lacks.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Book, Chapter};
use crate::services::{RemoteStore, StatusSnapshot};

/// Planner verdict for one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Remote marks the book completed; nothing else runs for it.
    Skip,
    /// Remote has no record of the book.
    FullUpload,
    /// Remote has the book but lacks these chapter titles.
    Missing(HashSet<String>),
}

impl SyncPlan {
    /// Chapters to send, in chapter order. Only chapters with content qualify.
    pub fn chapters_to_upload(&self, book: &Book, min_chars: usize) -> Vec<Chapter> {
        match self {
            Self::Skip => Vec::new(),
            Self::FullUpload => book.filled(min_chars).cloned().collect(),
            Self::Missing(titles) => book
                .filled(min_chars)
                .filter(|c| titles.contains(c.key()))
                .cloned()
                .collect(),
        }
    }

    /// Remote already has every chapter we listed.
    pub fn is_aligned(&self) -> bool {
        matches!(self, Self::Missing(titles) if titles.is_empty())
    }
}

/// Runs the status gate and the manifest check.
pub struct SyncPlanner<'a> {
    remote: &'a dyn RemoteStore,
}

impl<'a> SyncPlanner<'a> {
    pub fn new(remote: &'a dyn RemoteStore) -> Self {
        Self { remote }
    }

    /// Status gate: completed books are skipped before any diffing.
    pub fn gate(snapshot: &StatusSnapshot, title: &str) -> bool {
        !snapshot.is_completed(title)
    }

    pub async fn plan(&self, book: &Book, snapshot: &StatusSnapshot) -> Result<SyncPlan> {
        if !Self::gate(snapshot, book.key()) {
            return Ok(SyncPlan::Skip);
        }

        let manifest = book.manifest();
        let answer = self.remote.check_sync(book.key(), &manifest).await?;
        if answer.needs_full_upload {
            log::info!("{} is new to the remote, planning full upload", book.key());
            return Ok(SyncPlan::FullUpload);
        }

        let missing: HashSet<String> = answer
            .missing_titles
            .iter()
            .map(|t| t.trim().to_string())
            .collect();
        log::info!(
            "{}: remote lacks {} of {} chapters",
            book.key(),
            missing.len(),
            manifest.len()
        );
        Ok(SyncPlan::Missing(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{BookStatus, ManifestEntry};
    use crate::services::{CheckSyncResponse, RemoteBook};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Remote that already holds a fixed set of chapter titles.
    struct Holding {
        titles: Option<Vec<&'static str>>,
        checks: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for Holding {
        async fn book_statuses(&self) -> Result<StatusSnapshot> {
            Ok(StatusSnapshot::default())
        }

        async fn check_sync(&self, _: &str, manifest: &[ManifestEntry]) -> Result<CheckSyncResponse> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.titles {
                None => CheckSyncResponse {
                    needs_full_upload: true,
                    missing_titles: Vec::new(),
                },
                Some(held) => CheckSyncResponse {
                    needs_full_upload: false,
                    missing_titles: manifest
                        .iter()
                        .filter(|m| !held.iter().any(|h| *h == m.title))
                        .map(|m| m.title.clone())
                        .collect(),
                },
            })
        }

        async fn upload_book(&self, _: &Map<String, Value>, _: &[Chapter]) -> Result<usize> {
            Err(AppError::validation("planner never uploads"))
        }

        async fn set_status(&self, _: &RemoteBook, _: BookStatus) -> Result<()> {
            Ok(())
        }
    }

    fn book(filled: u32, total: u32) -> Book {
        let mut book = Book::new("诡秘之主", "", "");
        book.chapters = (1..=total)
            .map(|n| {
                let mut c = Chapter::pending(format!("第{n}章"), format!("https://example.com/{n}"), n);
                if n <= filled {
                    c.content = "正文".repeat(30);
                }
                c
            })
            .collect();
        book
    }

    #[tokio::test]
    async fn test_completed_book_is_skipped_without_check() {
        let remote = Holding {
            titles: Some(vec![]),
            checks: AtomicUsize::new(0),
        };
        let snapshot = StatusSnapshot::new([RemoteBook {
            id: "1".into(),
            title: "诡秘之主".into(),
            status: BookStatus::Completed,
        }]);

        let plan = SyncPlanner::new(&remote).plan(&book(3, 3), &snapshot).await.unwrap();
        assert_eq!(plan, SyncPlan::Skip);
        assert_eq!(remote.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_book_needs_full_upload() {
        let remote = Holding {
            titles: None,
            checks: AtomicUsize::new(0),
        };
        let book = book(2, 3);

        let plan = SyncPlanner::new(&remote)
            .plan(&book, &StatusSnapshot::default())
            .await
            .unwrap();
        assert_eq!(plan, SyncPlan::FullUpload);
        assert_eq!(plan.chapters_to_upload(&book, 50).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_titles_after_new_chapters() {
        let held: Vec<&'static str> = vec![
            "第1章", "第2章", "第3章", "第4章", "第5章", "第6章", "第7章", "第8章", "第9章", "第10章",
        ];
        let remote = Holding {
            titles: Some(held),
            checks: AtomicUsize::new(0),
        };
        let book = book(12, 12);

        let plan = SyncPlanner::new(&remote)
            .plan(&book, &StatusSnapshot::default())
            .await
            .unwrap();
        let expected: HashSet<String> = ["第11章", "第12章"].iter().map(|s| s.to_string()).collect();
        assert_eq!(plan, SyncPlan::Missing(expected));

        let titles: Vec<String> = plan
            .chapters_to_upload(&book, 50)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["第11章", "第12章"]);
    }

    #[test]
    fn test_pending_chapters_are_never_uploaded() {
        let book = book(1, 3);
        let plan = SyncPlan::Missing(["第2章".to_string(), "第3章".to_string()].into());
        assert!(plan.chapters_to_upload(&book, 50).is_empty());
        assert!(!plan.is_aligned());
        assert!(SyncPlan::Missing(HashSet::new()).is_aligned());
    }
}
