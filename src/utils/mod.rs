//! Utility functions and helpers.

pub mod http;
pub mod log;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sha2::{Digest, Sha256};
use url::Url;

/// Characters that can't appear in a file name on common filesystems.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Shared stop request, checked between chapters and between upload batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Deterministic archive file name for a book title.
///
/// Titles that are already safe map to `<title>.json`. Anything that had to
/// be rewritten gets a short hash of the original title appended so two
/// different titles never collide.
pub fn archive_file_name(title: &str) -> String {
    let title = title.trim();
    let sanitized: String = title
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim_end_matches('.').trim();

    if !sanitized.is_empty() && sanitized == title {
        return format!("{sanitized}.json");
    }

    let digest = hex::encode(Sha256::digest(title.as_bytes()));
    let stem = if sanitized.is_empty() {
        "untitled"
    } else {
        sanitized
    };
    format!("{stem}-{}.json", &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/book/123.htm").unwrap();
        assert_eq!(
            resolve_url(&base, "/txt/123/1.html"),
            "https://example.com/txt/123/1.html"
        );
        assert_eq!(
            resolve_url(&base, "2.html"),
            "https://example.com/book/2.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_plain_title_file_name() {
        assert_eq!(archive_file_name("诡秘之主"), "诡秘之主.json");
        assert_eq!(archive_file_name("  绍宋 "), "绍宋.json");
    }

    #[test]
    fn test_reserved_characters_are_replaced() {
        let name = archive_file_name("Lord of Mysteries: Vol. 2");
        assert!(name.starts_with("Lord of Mysteries_ Vol. 2-"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_sanitized_titles_do_not_collide() {
        assert_ne!(archive_file_name("a/b"), archive_file_name("a:b"));
        assert_eq!(archive_file_name("a/b"), archive_file_name("a/b"));
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_empty_title() {
        let name = archive_file_name("..");
        assert!(name.starts_with("untitled-"));
    }
}
