//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Request pacing, retries and content thresholds
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Where book archives live
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Chapter ordering heuristic
    #[serde(default)]
    pub ordering: OrderingConfig,

    /// Selectors and cleanup rules for source pages
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Remote library endpoints
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(AppError::validation("fetch.max_attempts must be > 0"));
        }
        if self.fetch.pace_min_ms > self.fetch.pace_max_ms {
            return Err(AppError::validation(
                "fetch.pace_min_ms must not exceed fetch.pace_max_ms",
            ));
        }
        if self.fetch.checkpoint_every == 0 {
            return Err(AppError::validation("fetch.checkpoint_every must be > 0"));
        }
        if self.archive.dir.as_os_str().is_empty() {
            return Err(AppError::validation("archive.dir is empty"));
        }
        if self.remote.batch_size == 0 {
            return Err(AppError::validation("remote.batch_size must be > 0"));
        }
        if !self.remote.base_url.is_empty() {
            url::Url::parse(&self.remote.base_url)?;
        }

        Regex::new(&self.ordering.chapter_pattern)?;
        self.extractor.validate()
    }
}

/// Request pacing, retry and threshold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per chapter (and per catalog page)
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait before each retry
    #[serde(default = "defaults::retry_cooldown")]
    pub retry_cooldown_ms: u64,

    /// Bodies at or below this many characters are treated as failed fetches
    #[serde(default = "defaults::min_content_chars")]
    pub min_content_chars: usize,

    /// Lower bound of the randomized delay between chapters
    #[serde(default = "defaults::pace_min")]
    pub pace_min_ms: u64,

    /// Upper bound of the randomized delay between chapters
    #[serde(default = "defaults::pace_max")]
    pub pace_max_ms: u64,

    /// Delay between books in a batch run
    #[serde(default = "defaults::book_delay")]
    pub book_delay_ms: u64,

    /// Persist the archive after this many newly filled chapters
    #[serde(default = "defaults::checkpoint_every")]
    pub checkpoint_every: usize,

    /// A catalog listing fewer chapters than this counts as a failed fetch
    #[serde(default = "defaults::catalog_min_chapters")]
    pub catalog_min_chapters: usize,
}

impl FetchConfig {
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }

    pub fn book_delay(&self) -> Duration {
        Duration::from_millis(self.book_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            retry_cooldown_ms: defaults::retry_cooldown(),
            min_content_chars: defaults::min_content_chars(),
            pace_min_ms: defaults::pace_min(),
            pace_max_ms: defaults::pace_max(),
            book_delay_ms: defaults::book_delay(),
            checkpoint_every: defaults::checkpoint_every(),
            catalog_min_chapters: defaults::catalog_min_chapters(),
        }
    }
}

/// Local archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory holding one JSON file per book
    #[serde(default = "defaults::archive_dir")]
    pub dir: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: defaults::archive_dir(),
        }
    }
}

/// Chapter ordering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderingConfig {
    /// Pattern for an explicit chapter marker, matched against the
    /// whitespace-stripped title. The first capture group that matched
    /// supplies the number.
    #[serde(default = "defaults::chapter_pattern")]
    pub chapter_pattern: String,

    /// Use the first digit run anywhere in the title as a last resort.
    /// Disable when titles embed volume or part numbers.
    #[serde(default = "defaults::any_digit_fallback")]
    pub any_digit_fallback: bool,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            chapter_pattern: defaults::chapter_pattern(),
            any_digit_fallback: defaults::any_digit_fallback(),
        }
    }
}

/// Selectors and cleanup rules for catalog and chapter pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Candidates for the book title, first non-empty wins
    #[serde(default = "defaults::title_selectors")]
    pub title_selectors: Vec<String>,

    /// Regexes removed from the book title
    #[serde(default = "defaults::title_strip_patterns")]
    pub title_strip_patterns: Vec<String>,

    /// Elements scanned for the author line
    #[serde(default = "defaults::author_scope")]
    pub author_scope: String,

    /// Regex whose first group is the author name
    #[serde(default = "defaults::author_pattern")]
    pub author_pattern: String,

    /// Longest element text considered an author line
    #[serde(default = "defaults::author_max_chars")]
    pub author_max_chars: usize,

    /// Anchors that make up the chapter listing
    #[serde(default = "defaults::chapter_link_selector")]
    pub chapter_link_selector: String,

    /// Anchor text must match this to count as a chapter
    #[serde(default = "defaults::chapter_title_filter")]
    pub chapter_title_filter: String,

    /// Candidates for the chapter body container, first match wins
    #[serde(default = "defaults::content_selectors")]
    pub content_selectors: Vec<String>,

    /// Regexes removed from chapter bodies (watermarks, author notes)
    #[serde(default = "defaults::content_remove_patterns")]
    pub content_remove_patterns: Vec<String>,
}

impl ExtractorConfig {
    fn validate(&self) -> Result<()> {
        if self.content_selectors.is_empty() {
            return Err(AppError::validation("extractor.content_selectors is empty"));
        }
        for s in self
            .title_selectors
            .iter()
            .chain(&self.content_selectors)
            .chain([&self.author_scope, &self.chapter_link_selector])
        {
            Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))?;
        }
        for p in self
            .title_strip_patterns
            .iter()
            .chain(&self.content_remove_patterns)
            .chain([&self.author_pattern, &self.chapter_title_filter])
        {
            Regex::new(p)?;
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            title_selectors: defaults::title_selectors(),
            title_strip_patterns: defaults::title_strip_patterns(),
            author_scope: defaults::author_scope(),
            author_pattern: defaults::author_pattern(),
            author_max_chars: defaults::author_max_chars(),
            chapter_link_selector: defaults::chapter_link_selector(),
            chapter_title_filter: defaults::chapter_title_filter(),
            content_selectors: defaults::content_selectors(),
            content_remove_patterns: defaults::content_remove_patterns(),
        }
    }
}

/// Remote library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote library; empty disables remote sync
    #[serde(default)]
    pub base_url: String,

    /// Environment variable holding the admin secret
    #[serde(default = "defaults::secret_env")]
    pub secret_env: String,

    /// Header the secret is sent in
    #[serde(default = "defaults::secret_header")]
    pub secret_header: String,

    #[serde(default = "defaults::check_sync_path")]
    pub check_sync_path: String,

    #[serde(default = "defaults::upload_path")]
    pub upload_path: String,

    /// Book listing used for the status snapshot and status updates
    #[serde(default = "defaults::books_path")]
    pub books_path: String,

    /// Chapters per upload request
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Status label the remote uses for finished works
    #[serde(default = "defaults::completed_label")]
    pub completed_label: String,

    /// Status label the remote uses for works still being published
    #[serde(default = "defaults::ongoing_label")]
    pub ongoing_label: String,
}

impl RemoteConfig {
    pub fn is_enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// Read the admin secret from the configured environment variable.
    pub fn secret(&self) -> Result<String> {
        std::env::var(&self.secret_env).map_err(|_| {
            AppError::config(format!(
                "remote secret not found in environment variable {}",
                self.secret_env
            ))
        })
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            secret_env: defaults::secret_env(),
            secret_header: defaults::secret_header(),
            check_sync_path: defaults::check_sync_path(),
            upload_path: defaults::upload_path(),
            books_path: defaults::books_path(),
            batch_size: defaults::batch_size(),
            completed_label: defaults::completed_label(),
            ongoing_label: defaults::ongoing_label(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_cooldown() -> u64 {
        3000
    }
    pub fn min_content_chars() -> usize {
        50
    }
    pub fn pace_min() -> u64 {
        2000
    }
    pub fn pace_max() -> u64 {
        4000
    }
    pub fn book_delay() -> u64 {
        2000
    }
    pub fn checkpoint_every() -> usize {
        20
    }
    pub fn catalog_min_chapters() -> usize {
        1
    }

    // Archive defaults
    pub fn archive_dir() -> PathBuf {
        PathBuf::from("downloads")
    }

    // Ordering defaults
    pub fn chapter_pattern() -> String {
        r"(?i)第([0-9]+)章|chapter([0-9]+)".into()
    }
    pub fn any_digit_fallback() -> bool {
        true
    }

    // Extractor defaults
    pub fn title_selectors() -> Vec<String> {
        vec!["h1".into(), ".booknav2 h1 a".into()]
    }
    pub fn title_strip_patterns() -> Vec<String> {
        vec![r"\?.*$".into(), "最新章节.*".into()]
    }
    pub fn author_scope() -> String {
        "p, div, span, td".into()
    }
    pub fn author_pattern() -> String {
        r"作者[:：]\s*([\p{Han}A-Za-z0-9]+?)(?:分类|[0-9]+万字|连载|完结|[^\p{Han}A-Za-z0-9]|$)".into()
    }
    pub fn author_max_chars() -> usize {
        100
    }
    pub fn chapter_link_selector() -> String {
        "li a, dd a".into()
    }
    pub fn chapter_title_filter() -> String {
        r"章|^\d+".into()
    }
    pub fn content_selectors() -> Vec<String> {
        vec![
            ".txtnav".into(),
            "#content".into(),
            ".read_chapter_detail".into(),
            ".mybox".into(),
        ]
    }
    pub fn content_remove_patterns() -> Vec<String> {
        vec![
            "69书吧".into(),
            r"www\.69shuba\.com".into(),
            "作者说：.*".into(),
        ]
    }

    // Remote defaults
    pub fn secret_env() -> String {
        "SECRET_KEY".into()
    }
    pub fn secret_header() -> String {
        "x-admin-secret".into()
    }
    pub fn check_sync_path() -> String {
        "/api/admin/check-sync".into()
    }
    pub fn upload_path() -> String {
        "/api/admin/upload-book".into()
    }
    pub fn books_path() -> String {
        "/api/books".into()
    }
    pub fn batch_size() -> usize {
        25
    }
    pub fn completed_label() -> String {
        "完结".into()
    }
    pub fn ongoing_label() -> String {
        "连载".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetch.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_pacing() {
        let mut config = Config::default();
        config.fetch.pace_min_ms = 5000;
        config.fetch.pace_max_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_selector() {
        let mut config = Config::default();
        config.extractor.content_selectors = vec!["[[invalid".to_string()];
        assert!(matches!(
            config.validate(),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.remote.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [fetch]
            pace_min_ms = 0
            pace_max_ms = 0

            [remote]
            base_url = "https://library.example.com"
            batch_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.pace_max_ms, 0);
        assert_eq!(config.remote.batch_size, 10);
        assert_eq!(config.remote.check_sync_path, "/api/admin/check-sync");
        assert!(config.remote.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sample_config_matches_defaults() {
        let config: Config = toml::from_str(include_str!("../../booksync.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.remote.is_enabled());
        assert_eq!(config.extractor.author_pattern, defaults::author_pattern());
        assert_eq!(config.ordering.chapter_pattern, defaults::chapter_pattern());
        assert_eq!(config.fetch.catalog_min_chapters, 1);
    }
}
