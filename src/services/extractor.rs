// src/services/extractor.rs

//! Catalog and chapter page extraction.
//!
//! The engine only sees the [`ContentExtractor`] trait. [`HtmlExtractor`]
//! implements it with configured CSS selectors and cleanup patterns.

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Catalog, CatalogEntry, ChapterBody, Config, ExtractorConfig};
use crate::utils::http::{create_async_client, fetch_text};
use crate::utils::resolve_url;

/// Source of catalog listings and chapter bodies.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Fetch the chapter listing of a book, deduplicated by link.
    async fn fetch_catalog(&self, source_url: &str) -> Result<Catalog>;

    /// Fetch and clean the body of one chapter.
    async fn fetch_chapter_body(&self, link: &str) -> Result<ChapterBody>;
}

/// Compiled form of [`ExtractorConfig`].
struct Rules {
    title: Vec<Selector>,
    title_strip: Vec<Regex>,
    author_scope: Selector,
    author: Regex,
    author_max_chars: usize,
    chapter_links: Selector,
    chapter_filter: Regex,
    content: Vec<Selector>,
    content_remove: Vec<Regex>,
}

impl Rules {
    fn compile(config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            title: parse_selectors(&config.title_selectors)?,
            title_strip: compile_all(&config.title_strip_patterns)?,
            author_scope: parse_selector(&config.author_scope)?,
            author: Regex::new(&config.author_pattern)?,
            author_max_chars: config.author_max_chars,
            chapter_links: parse_selector(&config.chapter_link_selector)?,
            chapter_filter: Regex::new(&config.chapter_title_filter)?,
            content: parse_selectors(&config.content_selectors)?,
            content_remove: compile_all(&config.content_remove_patterns)?,
        })
    }
}

/// Scraper-based extractor for server-rendered book sites.
pub struct HtmlExtractor {
    client: Client,
    rules: Rules,
}

impl HtmlExtractor {
    /// Build an extractor with its own HTTP client.
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_async_client(&config.fetch)?;
        Self::with_client(client, &config.extractor)
    }

    pub fn with_client(client: Client, config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            client,
            rules: Rules::compile(config)?,
        })
    }

    /// Parse a catalog page. Links are resolved against `base`.
    pub fn parse_catalog(&self, html: &str, base: &Url) -> Catalog {
        let document = Html::parse_document(html);

        let mut catalog = Catalog {
            title: self.extract_title(&document),
            author: self.extract_author(&document),
            entries: Vec::new(),
        };

        let mut seen = HashSet::new();
        for anchor in document.select(&self.rules.chapter_links) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with("javascript") || href.starts_with('#') {
                continue;
            }

            let title = collapse_whitespace(&anchor.text().collect::<String>());
            if title.is_empty() || !self.rules.chapter_filter.is_match(&title) {
                continue;
            }

            let link = resolve_url(base, href);
            if seen.insert(link.clone()) {
                catalog.entries.push(CatalogEntry::new(title, link));
            }
        }

        catalog
    }

    /// Parse a chapter page into cleaned body text.
    ///
    /// Text nodes of the first matching content container are trimmed and
    /// joined line by line. Returns empty content when nothing matches.
    pub fn parse_chapter(&self, html: &str) -> ChapterBody {
        let document = Html::parse_document(html);

        let raw = self
            .rules
            .content
            .iter()
            .find_map(|sel| document.select(sel).next())
            .map(|el| {
                el.text()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let mut content = raw;
        for pattern in &self.rules.content_remove {
            content = pattern.replace_all(&content, "").into_owned();
        }

        ChapterBody {
            content: content.trim().to_string(),
        }
    }

    fn extract_title(&self, document: &Html) -> String {
        let raw = self
            .rules
            .title
            .iter()
            .filter_map(|sel| document.select(sel).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
            .unwrap_or_default();

        let mut title = raw;
        for pattern in &self.rules.title_strip {
            title = pattern.replace_all(&title, "").into_owned();
        }
        title.trim().to_string()
    }

    fn extract_author(&self, document: &Html) -> Option<String> {
        document
            .select(&self.rules.author_scope)
            .map(|el| el.text().collect::<String>())
            .filter(|text| text.chars().count() < self.rules.author_max_chars)
            .find_map(|text| {
                self.rules
                    .author
                    .captures(&text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|name| !name.is_empty())
            })
    }
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn fetch_catalog(&self, source_url: &str) -> Result<Catalog> {
        let base = Url::parse(source_url)?;
        let html = fetch_text(&self.client, source_url)
            .await
            .map_err(|e| AppError::extraction(source_url, e))?;

        let catalog = self.parse_catalog(&html, &base);
        log::debug!(
            "Catalog {} lists {} chapters",
            source_url,
            catalog.entries.len()
        );
        Ok(catalog)
    }

    async fn fetch_chapter_body(&self, link: &str) -> Result<ChapterBody> {
        let html = fetch_text(&self.client, link)
            .await
            .map_err(|e| AppError::extraction(link, e))?;
        Ok(self.parse_chapter(&html))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn parse_selectors(list: &[String]) -> Result<Vec<Selector>> {
    list.iter().map(|s| parse_selector(s)).collect()
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(AppError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        <html><body>
          <div class="booknav2">
            <h1><a href="/book/1.htm">诡秘之主最新章节列表</a></h1>
            <p>作者：爱潜水的乌贼</p>
            <p>分类：玄幻</p>
          </div>
          <div id="catalog">
            <ul>
              <li><a href="/txt/1/2.html">第2章 二</a></li>
              <li><a href="/txt/1/1.html">第1章 一</a></li>
              <li><a href="/txt/1/1.html">第1章 一</a></li>
              <li><a href="/login">登录</a></li>
              <li><a href="javascript:void(0)">第3章 三</a></li>
              <li><a href="3.html">第3章 三</a></li>
            </ul>
          </div>
        </body></html>
    "#;

    fn extractor() -> HtmlExtractor {
        HtmlExtractor::with_client(Client::new(), &ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_catalog() {
        let base = Url::parse("https://example.com/book/1.htm").unwrap();
        let catalog = extractor().parse_catalog(CATALOG, &base);

        assert_eq!(catalog.title, "诡秘之主");
        assert_eq!(catalog.author.as_deref(), Some("爱潜水的乌贼"));
        assert_eq!(
            catalog.entries,
            vec![
                CatalogEntry::new("第2章 二", "https://example.com/txt/1/2.html"),
                CatalogEntry::new("第1章 一", "https://example.com/txt/1/1.html"),
                CatalogEntry::new("第3章 三", "https://example.com/book/3.html"),
            ]
        );
    }

    #[test]
    fn test_author_stops_at_category() {
        let html = "<div><span>作者：唐家三少分类：玄幻</span></div>";
        let base = Url::parse("https://example.com/").unwrap();
        let catalog = extractor().parse_catalog(html, &base);
        assert_eq!(catalog.author.as_deref(), Some("唐家三少"));
    }

    #[test]
    fn test_title_query_suffix_is_stripped() {
        let html = "<h1>绍宋?from=rank</h1>";
        let base = Url::parse("https://example.com/").unwrap();
        assert_eq!(extractor().parse_catalog(html, &base).title, "绍宋");
    }

    #[test]
    fn test_parse_chapter_cleans_watermarks() {
        let html = r#"
            <div class="txtnav">
              <h1>第1章</h1>
              第一段。<br>
              69书吧 第二段。<br>
              www.69shuba.com
              作者说：求月票
            </div>
        "#;
        let body = extractor().parse_chapter(html);
        assert_eq!(body.content, "第1章\n第一段。\n 第二段。");
    }

    #[test]
    fn test_parse_chapter_falls_back_to_later_selector() {
        let html = r#"<div id="content">正文</div>"#;
        assert_eq!(extractor().parse_chapter(html).content, "正文");
    }

    #[test]
    fn test_parse_chapter_without_container() {
        assert!(extractor().parse_chapter("<p>验证页面</p>").content.is_empty());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let config = ExtractorConfig {
            chapter_link_selector: "[[invalid".into(),
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            HtmlExtractor::with_client(Client::new(), &config),
            Err(AppError::Selector { .. })
        ));
    }
}
