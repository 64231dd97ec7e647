//! Local filesystem archive.
//!
//! Files are written to `<name>.json.tmp` first and renamed over the target,
//! so readers only ever see the previous or the new record.
//!
//! Records found under any other name than [`archive_file_name`] (older tools
//! saved `<title>.json` verbatim) are read as usual and moved to the canonical
//! name the first time they are persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Book;
use crate::storage::ArchiveStore;
use crate::utils::archive_file_name;

/// Directory of per-book JSON files.
#[derive(Debug)]
pub struct LocalArchive {
    root_dir: PathBuf,
    /// Non-canonical files a title was read from, removed on its next persist
    legacy: Mutex<HashMap<String, Vec<PathBuf>>>,
}

impl LocalArchive {
    /// Create a new LocalArchive rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            legacy: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the archive file for a title.
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.root_dir.join(archive_file_name(title))
    }

    /// `<title>.json` as older tools named it, when that differs from the canonical path.
    fn verbatim_path(&self, title: &str) -> Option<PathBuf> {
        let title = title.trim();
        if title.is_empty() || title.contains(['/', '\\']) {
            return None;
        }
        let path = self.root_dir.join(format!("{title}.json"));
        (path != self.path_for(title)).then_some(path)
    }

    fn remember_legacy(&self, title: &str, path: PathBuf) {
        let mut legacy = self.legacy.lock().unwrap_or_else(PoisonError::into_inner);
        let paths = legacy.entry(title.to_string()).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    fn take_legacy(&self, title: &str) -> Vec<PathBuf> {
        self.legacy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(title)
            .unwrap_or_default()
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// The temp file is removed again when any step fails.
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Could not remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_book(&self, path: &Path) -> Result<Option<Book>> {
        match self.read_bytes(path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::archive(path.display(), e)),
            None => Ok(None),
        }
    }

    /// Drop the non-canonical copies of a title once the canonical file is written.
    async fn retire_legacy(&self, title: &str, canonical: &Path) {
        for path in self.take_legacy(title) {
            if path == canonical {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => log::info!("Moved {} to {}", path.display(), canonical.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Could not remove old archive {}: {}", path.display(), e),
            }
        }
    }
}

#[async_trait]
impl ArchiveStore for LocalArchive {
    async fn load(&self, title: &str) -> Result<Option<Book>> {
        if let Some(book) = self.read_book(&self.path_for(title)).await? {
            return Ok(Some(book));
        }
        let Some(path) = self.verbatim_path(title) else {
            return Ok(None);
        };
        let book = self.read_book(&path).await?;
        if let Some(book) = &book {
            self.remember_legacy(book.key(), path);
        }
        Ok(book)
    }

    async fn persist(&self, book: &Book) -> Result<()> {
        let path = self.path_for(book.key());

        let mut record = book.clone();
        record.updated_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&record)?;

        self.write_bytes(&path, &bytes)
            .await
            .map_err(|e| AppError::archive(path.display(), e))?;
        self.retire_legacy(record.key(), &path).await;

        log::debug!(
            "Archived {} ({} chapters) to {}",
            record.key(),
            record.chapters.len(),
            path.display()
        );
        Ok(())
    }

    /// One book per title. When a title sits in several files the canonical
    /// one wins and the others are retired on the next persist.
    async fn load_all(&self) -> Result<Vec<Book>> {
        let mut dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Archive directory {} not found", self.root_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut books: Vec<Book> = Vec::with_capacity(paths.len());
        let mut by_title: HashMap<String, usize> = HashMap::new();
        for path in paths {
            let book = match self.read_book(&path).await {
                Ok(Some(book)) => book,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping unreadable archive: {}", e);
                    continue;
                }
            };

            let title = book.key().to_string();
            let canonical = path == self.path_for(&title);
            if !canonical {
                self.remember_legacy(&title, path.clone());
            }
            match by_title.get(&title) {
                Some(&i) => {
                    log::warn!("{} is archived twice, also at {}", title, path.display());
                    if canonical {
                        books[i] = book;
                    }
                }
                None => {
                    by_title.insert(title, books.len());
                    books.push(book);
                }
            }
        }
        Ok(books)
    }
}
