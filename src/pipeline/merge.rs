//! Merge a fresh catalog into an archived book.
//!
//! The fresh catalog decides which chapters exist and in what order. Archived
//! chapters only contribute their content: a chapter matched by link (or, if
//! that fails, by trimmed title) keeps its body under the new position;
//! everything else becomes pending. Archived chapters the catalog no longer
//! lists are dropped.

use std::collections::{HashMap, HashSet};

use crate::models::{Book, CatalogEntry, Chapter};

/// Counters from a merge, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Chapters whose content carried over
    pub carried: usize,
    /// Chapters that still need fetching
    pub pending: usize,
    /// Archived chapters no longer listed upstream
    pub dropped: usize,
}

/// Two-key lookup over archived chapters.
struct ChapterIndex<'a> {
    chapters: &'a [Chapter],
    by_link: HashMap<&'a str, usize>,
    by_title: HashMap<&'a str, usize>,
}

impl<'a> ChapterIndex<'a> {
    fn new(chapters: &'a [Chapter]) -> Self {
        let mut by_link = HashMap::new();
        let mut by_title = HashMap::new();
        for (i, chapter) in chapters.iter().enumerate() {
            if !chapter.link.is_empty() {
                by_link.entry(chapter.link.as_str()).or_insert(i);
            }
            by_title.entry(chapter.key()).or_insert(i);
        }
        Self {
            chapters,
            by_link,
            by_title,
        }
    }

    /// Index of a filled chapter matching `entry`, link first.
    fn find_filled(&self, entry: &CatalogEntry, min_chars: usize) -> Option<usize> {
        let by_link = self.by_link.get(entry.link.as_str());
        let by_title = self.by_title.get(entry.title.trim());
        [by_link, by_title]
            .into_iter()
            .flatten()
            .copied()
            .find(|&i| self.chapters[i].is_filled(min_chars))
    }
}

/// Rebuild `existing`'s chapter list from `fresh`, preserving fetched content.
///
/// `fresh` must already be de-duplicated and ordered; chapter numbers are
/// assigned densely from its order.
pub fn merge(existing: &Book, fresh: &[CatalogEntry], min_chars: usize) -> (Book, MergeStats) {
    let index = ChapterIndex::new(&existing.chapters);
    let mut used = HashSet::new();
    let mut stats = MergeStats::default();
    let mut chapters = Vec::with_capacity(fresh.len());

    for (i, entry) in fresh.iter().enumerate() {
        let chapter_number = (i + 1) as u32;
        let carried = index
            .find_filled(entry, min_chars)
            .filter(|&idx| used.insert(idx));

        let chapter = match carried {
            Some(idx) => {
                stats.carried += 1;
                Chapter {
                    title: entry.title.trim().to_string(),
                    link: entry.link.clone(),
                    chapter_number,
                    content: existing.chapters[idx].content.clone(),
                }
            }
            None => {
                stats.pending += 1;
                Chapter::pending(entry.title.trim(), entry.link.clone(), chapter_number)
            }
        };
        chapters.push(chapter);
    }

    let fresh_links: HashSet<&str> = fresh.iter().map(|e| e.link.as_str()).collect();
    let fresh_titles: HashSet<&str> = fresh.iter().map(|e| e.title.trim()).collect();
    stats.dropped = existing
        .chapters
        .iter()
        .filter(|c| {
            let listed = fresh_titles.contains(c.key())
                || (!c.link.is_empty() && fresh_links.contains(c.link.as_str()));
            !listed
        })
        .count();

    let mut merged = existing.clone();
    merged.chapters = chapters;
    (merged, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: usize = 50;

    fn body(n: u32) -> String {
        format!("第{n}章的正文。").repeat(20)
    }

    fn filled(n: u32) -> Chapter {
        Chapter {
            title: format!("第{n}章"),
            link: format!("https://example.com/{n}.html"),
            chapter_number: n,
            content: body(n),
        }
    }

    fn entry(n: u32) -> CatalogEntry {
        CatalogEntry::new(format!("第{n}章"), format!("https://example.com/{n}.html"))
    }

    fn book_with(chapters: Vec<Chapter>) -> Book {
        let mut book = Book::new("测试之书", "作者", "https://example.com/book.htm");
        book.chapters = chapters;
        book
    }

    #[test]
    fn test_new_chapters_become_pending() {
        let existing = book_with((1..=10).map(filled).collect());
        let fresh: Vec<_> = (1..=12).map(entry).collect();

        let (merged, stats) = merge(&existing, &fresh, MIN);

        assert_eq!(merged.chapters.len(), 12);
        assert!(merged.chapters[..10].iter().all(|c| c.is_filled(MIN)));
        assert!(merged.chapters[10..].iter().all(Chapter::is_pending));
        assert_eq!(merged.chapters[11].chapter_number, 12);
        assert_eq!(
            stats,
            MergeStats {
                carried: 10,
                pending: 2,
                dropped: 0
            }
        );
    }

    #[test]
    fn test_reorder_preserves_content() {
        let existing = book_with(vec![filled(2), filled(1), filled(3)]);
        let fresh = vec![entry(1), entry(2), entry(3)];

        let (merged, _) = merge(&existing, &fresh, MIN);

        for (i, chapter) in merged.chapters.iter().enumerate() {
            let n = (i + 1) as u32;
            assert_eq!(chapter.chapter_number, n);
            assert_eq!(chapter.content, body(n));
        }
    }

    #[test]
    fn test_match_by_title_when_link_changed() {
        let existing = book_with(vec![filled(1)]);
        let fresh = vec![CatalogEntry::new(" 第1章 ", "https://mirror.example.com/1")];

        let (merged, stats) = merge(&existing, &fresh, MIN);

        assert_eq!(stats.carried, 1);
        assert_eq!(merged.chapters[0].content, body(1));
        assert_eq!(merged.chapters[0].link, "https://mirror.example.com/1");
        assert_eq!(merged.chapters[0].title, "第1章");
    }

    #[test]
    fn test_match_by_link_when_title_changed() {
        let existing = book_with(vec![filled(1)]);
        let fresh = vec![CatalogEntry::new("第1章 重逢（修）", "https://example.com/1.html")];

        let (merged, _) = merge(&existing, &fresh, MIN);

        assert_eq!(merged.chapters[0].content, body(1));
        assert_eq!(merged.chapters[0].title, "第1章 重逢（修）");
    }

    #[test]
    fn test_short_content_is_not_carried() {
        let mut short = filled(1);
        short.content = "验证中".to_string();
        let existing = book_with(vec![short]);

        let (merged, stats) = merge(&existing, &[entry(1)], MIN);

        assert!(merged.chapters[0].is_pending());
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn test_unlisted_chapters_are_dropped() {
        let existing = book_with(vec![filled(1), filled(2), filled(3)]);
        let fresh = vec![entry(1), entry(3)];

        let (merged, stats) = merge(&existing, &fresh, MIN);

        assert_eq!(merged.chapters.len(), 2);
        assert_eq!(merged.chapters[1].title, "第3章");
        assert_eq!(merged.chapters[1].chapter_number, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_content_is_not_duplicated() {
        let existing = book_with(vec![filled(1)]);
        // Same title twice would be removed by dedup upstream; a link and a
        // title hit on different entries must still only carry once.
        let fresh = vec![
            CatalogEntry::new("第1章", "https://example.com/new-1.html"),
            CatalogEntry::new("第1章 补", "https://example.com/1.html"),
        ];

        let (merged, stats) = merge(&existing, &fresh, MIN);

        assert_eq!(stats.carried, 1);
        assert_eq!(merged.chapters.iter().filter(|c| !c.is_pending()).count(), 1);
    }

    #[test]
    fn test_metadata_is_kept() {
        let mut existing = book_with(vec![filled(1)]);
        existing
            .extra
            .insert("category".into(), serde_json::Value::from("玄幻"));

        let (merged, _) = merge(&existing, &[entry(1), entry(2)], MIN);

        assert_eq!(merged.title, "测试之书");
        assert_eq!(merged.extra.get("category"), existing.extra.get("category"));
    }
}
