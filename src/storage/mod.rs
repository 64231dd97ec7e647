//! Storage abstractions for book archives.
//!
//! One JSON file per book, named after the book title:
//!
//! ```text
//! downloads/
//! ├── 诡秘之主.json
//! ├── 绍宋.json
//! └── Lord of Mysteries_ Vol. 2-3f2a9c1e.json   # sanitized title + hash
//! ```
//!
//! A file always holds the full book record. Writes replace the file
//! atomically so a crash never leaves a half-written archive behind.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Book;

// Re-export for convenience
pub use local::LocalArchive;

/// Trait for book archive backends.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Load the archived book with this title, if any.
    async fn load(&self, title: &str) -> Result<Option<Book>>;

    /// Replace the archived record for `book.title`, retiring any older
    /// copy it was loaded from.
    async fn persist(&self, book: &Book) -> Result<()>;

    /// Load every readable archive. Unreadable files are logged and skipped.
    async fn load_all(&self) -> Result<Vec<Book>>;
}
