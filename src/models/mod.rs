// src/models/mod.rs

//! Domain models for the sync engine.

mod book;
mod config;

// Re-export all public types
pub use book::{
    Book, BookStatus, Catalog, CatalogEntry, Chapter, ChapterBody, ManifestEntry, content_passes,
};
pub use config::{
    ArchiveConfig, Config, ExtractorConfig, FetchConfig, OrderingConfig, RemoteConfig,
};
