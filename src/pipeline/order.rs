//! Chapter ordering from noisy titles.
//!
//! Upstream catalogs mix "latest chapters" blocks with the full listing, so
//! source position is never trusted. Each title gets a numeric sort key from
//! the first tier that matches:
//!
//! 1. an explicit chapter marker (`第12章`, `Chapter 12`)
//! 2. a leading number (`12. 开始`)
//! 3. any digit run in the title (optional, see [`OrderingConfig`])
//! 4. [`UNORDERED`], which sorts last
//!
//! Whitespace is stripped before matching. Sorting is stable, so equal keys
//! keep catalog order.

use regex::Regex;

use crate::error::Result;
use crate::models::{Catalog, CatalogEntry, OrderingConfig};

/// Sort key for titles with no usable number.
pub const UNORDERED: u64 = 999_999;

/// Derives a total order over catalog entries.
#[derive(Debug, Clone)]
pub struct OrderingResolver {
    chapter: Regex,
    leading: Regex,
    any: Option<Regex>,
}

impl OrderingResolver {
    pub fn new(config: &OrderingConfig) -> Result<Self> {
        Ok(Self {
            chapter: Regex::new(&config.chapter_pattern)?,
            leading: Regex::new(r"^([0-9]+)")?,
            any: if config.any_digit_fallback {
                Some(Regex::new(r"([0-9]+)")?)
            } else {
                None
            },
        })
    }

    /// Sort key for a single raw title.
    pub fn sort_key(&self, title: &str) -> u64 {
        let stripped: String = title.chars().filter(|c| !c.is_whitespace()).collect();

        if let Some(caps) = self.chapter.captures(&stripped) {
            // Alternations leave unmatched groups empty; take the first that hit.
            if let Some(m) = caps.iter().skip(1).flatten().next() {
                return parse_number(m.as_str());
            }
        }
        if let Some(caps) = self.leading.captures(&stripped) {
            return parse_number(&caps[1]);
        }
        if let Some(any) = &self.any {
            if let Some(caps) = any.captures(&stripped) {
                return parse_number(&caps[1]);
            }
        }
        UNORDERED
    }

    /// Stable sort ascending by [`Self::sort_key`].
    pub fn sort(&self, entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        let mut keyed: Vec<(u64, CatalogEntry)> = entries
            .into_iter()
            .map(|e| (self.sort_key(&e.title), e))
            .collect();
        keyed.sort_by_key(|(key, _)| *key);
        keyed.into_iter().map(|(_, e)| e).collect()
    }

    /// De-duplicate then order a freshly extracted catalog in place.
    pub fn order_catalog(&self, catalog: &mut Catalog) {
        catalog.dedup();
        let entries = std::mem::take(&mut catalog.entries);
        catalog.entries = self.sort(entries);
    }
}

fn parse_number(digits: &str) -> u64 {
    digits.parse().unwrap_or(UNORDERED)
}
