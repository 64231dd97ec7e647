//! Book, chapter and catalog data structures.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Publication status of a work.
///
/// Archives written by older tooling carry the Chinese labels, so both
/// spellings deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    #[serde(alias = "连载")]
    Ongoing,
    #[serde(alias = "完结")]
    Completed,
}

/// One durable record per work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Business key, compared after trimming
    pub title: String,

    #[serde(default)]
    pub author: String,

    /// Canonical catalog page
    #[serde(default)]
    pub source_url: String,

    #[serde(default)]
    pub status: BookStatus,

    /// Canonical reading order
    #[serde(default)]
    pub chapters: Vec<Chapter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Fields we don't model (category, views, rating, ...) survive a rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Book {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into().trim().to_string(),
            author: author.into(),
            source_url: source_url.into(),
            status: BookStatus::Ongoing,
            chapters: Vec::new(),
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Trimmed title used for archive and remote lookups.
    pub fn key(&self) -> &str {
        self.title.trim()
    }

    /// Chapters whose content passes the given length threshold.
    pub fn filled(&self, min_chars: usize) -> impl Iterator<Item = &Chapter> {
        self.chapters.iter().filter(move |c| c.is_filled(min_chars))
    }

    pub fn filled_count(&self, min_chars: usize) -> usize {
        self.filled(min_chars).count()
    }

    pub fn pending_count(&self, min_chars: usize) -> usize {
        self.chapters.len() - self.filled_count(min_chars)
    }

    /// Lightweight `{title, chapter_number}` list for the remote check.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.chapters
            .iter()
            .map(|c| ManifestEntry {
                title: c.title.clone(),
                chapter_number: c.chapter_number,
            })
            .collect()
    }

    /// Regenerate the dense 1..N numbering from list order.
    pub fn renumber(&mut self) {
        for (i, chapter) in self.chapters.iter_mut().enumerate() {
            chapter.chapter_number = (i + 1) as u32;
        }
    }

    /// Book-level fields sent alongside each upload batch.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut meta = self.extra.clone();
        meta.insert("title".into(), Value::String(self.key().to_string()));
        meta.insert("author".into(), Value::String(self.author.clone()));
        meta.insert("sourceUrl".into(), Value::String(self.source_url.clone()));
        meta
    }
}

/// A single chapter of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Title as observed at the source; identity key for diffing
    pub title: String,

    /// Source URL; secondary identity key
    #[serde(default)]
    pub link: String,

    /// 1-based position, regenerated on every catalog refresh
    #[serde(default)]
    pub chapter_number: u32,

    /// Empty means the chapter is still pending
    #[serde(default)]
    pub content: String,
}

impl Chapter {
    /// A chapter known to exist whose body has not been fetched yet.
    pub fn pending(title: impl Into<String>, link: impl Into<String>, chapter_number: u32) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            chapter_number,
            content: String::new(),
        }
    }

    pub fn key(&self) -> &str {
        self.title.trim()
    }

    pub fn is_pending(&self) -> bool {
        self.content.is_empty()
    }

    /// Content is present and longer than `min_chars` characters.
    pub fn is_filled(&self, min_chars: usize) -> bool {
        content_passes(&self.content, min_chars)
    }
}

/// Length check shared by the merge and the fetch layer.
pub fn content_passes(content: &str, min_chars: usize) -> bool {
    !content.is_empty() && content.chars().count() > min_chars
}

/// One `{title, link}` pair from a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub link: String,
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

/// What the extractor returns for a catalog page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub title: String,
    pub author: Option<String>,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Drop repeated links, then repeated trimmed titles, keeping first sightings.
    pub fn dedup(&mut self) {
        let mut links = HashSet::new();
        let mut titles = HashSet::new();
        self.entries.retain(|e| {
            let title = e.title.trim().to_string();
            if title.is_empty() || !links.insert(e.link.clone()) {
                return false;
            }
            titles.insert(title)
        });
        for entry in &mut self.entries {
            entry.title = entry.title.trim().to_string();
        }
    }
}

/// What the extractor returns for a chapter page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterBody {
    pub content: String,
}

/// Manifest row sent during the check phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub title: String,
    pub chapter_number: u32,
}
