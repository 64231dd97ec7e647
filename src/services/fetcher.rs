// src/services/fetcher.rs

//! Retry, length gate and pacing around a [`ContentExtractor`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::{Catalog, FetchConfig, content_passes};
use crate::services::ContentExtractor;

/// Fetch layer the orchestrator talks to.
///
/// Every call is attempted up to `max_attempts` times with a fixed cooldown
/// before each retry. Non-retryable errors end the loop immediately.
#[derive(Clone)]
pub struct ReliableFetcher {
    extractor: Arc<dyn ContentExtractor>,
    config: FetchConfig,
}

impl ReliableFetcher {
    pub fn new(extractor: Arc<dyn ContentExtractor>, config: FetchConfig) -> Self {
        Self { extractor, config }
    }

    /// Fetch a catalog, rejecting listings below `catalog_min_chapters`.
    pub async fn fetch_catalog(&self, source_url: &str) -> Result<Catalog> {
        let min = self.config.catalog_min_chapters;
        self.with_retry(source_url, move || async move {
            let catalog = self.extractor.fetch_catalog(source_url).await?;
            if catalog.entries.len() < min {
                return Err(AppError::extraction(
                    source_url,
                    format!(
                        "catalog lists {} chapters (need at least {min})",
                        catalog.entries.len()
                    ),
                ));
            }
            Ok(catalog)
        })
        .await
    }

    /// Fetch chapter content that passes the length threshold.
    ///
    /// Short bodies are usually interstitial or verification pages and are
    /// treated like any other failed attempt.
    pub async fn fetch_chapter_content(&self, link: &str) -> Result<String> {
        let min = self.config.min_content_chars;
        self.with_retry(link, move || async move {
            let body = self.extractor.fetch_chapter_body(link).await?;
            if !content_passes(&body.content, min) {
                return Err(AppError::extraction(
                    link,
                    format!(
                        "content too short ({} chars, need more than {min})",
                        body.content.chars().count()
                    ),
                ));
            }
            Ok(body.content)
        })
        .await
    }

    /// Sleep for a random duration within the configured pacing range.
    pub async fn pace(&self) {
        let delay = self.pacing_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn pacing_delay(&self) -> Duration {
        let (min, max) = (self.config.pace_min_ms, self.config.pace_max_ms);
        if max == 0 || min >= max {
            return Duration::from_millis(min.min(max));
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    async fn with_retry<T, F, Fut>(&self, context: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut n = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || n >= max_attempts => {
                    log::warn!("Giving up on {} after {} attempt(s): {}", context, n, e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Attempt {}/{} for {} failed: {}", n, max_attempts, context, e);
                    let cooldown = self.config.retry_cooldown();
                    if !cooldown.is_zero() {
                        tokio::time::sleep(cooldown).await;
                    }
                    n += 1;
                }
            }
        }
    }
}
