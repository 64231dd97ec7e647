// src/error.rs

//! Unified error handling for the sync engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catalog or chapter page could not be turned into usable content
    #[error("Extraction failed for {context}: {message}")]
    Extraction { context: String, message: String },

    /// Archive file could not be read or replaced
    #[error("Archive error at {path}: {message}")]
    Archive { path: String, message: String },

    /// Remote store rejected our credentials
    #[error("Remote rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    /// Remote store answered with a non-success status
    #[error("Remote {endpoint} failed (HTTP {status}): {message}")]
    Remote {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Batched upload stopped part-way through
    #[error("Upload stopped after {uploaded}/{total} chapters: {source}")]
    Upload {
        uploaded: usize,
        total: usize,
        source: Box<AppError>,
    },

    /// Operator asked the run to stop
    #[error("Interrupted")]
    Interrupted,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an extraction error with context (usually the URL).
    pub fn extraction(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Extraction {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an archive error for the given path.
    pub fn archive(path: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Archive {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a remote protocol error.
    pub fn remote(endpoint: impl Into<String>, status: u16, message: impl fmt::Display) -> Self {
        Self::Remote {
            endpoint: endpoint.into(),
            status,
            message: message.to_string(),
        }
    }

    /// Wrap a failed batch with the count acknowledged before it.
    pub fn upload(uploaded: usize, total: usize, source: AppError) -> Self {
        Self::Upload {
            uploaded,
            total,
            source: Box::new(source),
        }
    }

    /// Whether the remote rejected our credentials, directly or mid-upload.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::Upload { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    /// Whether retrying the same call can possibly help.
    ///
    /// Credential and configuration problems are fatal for the cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload { source, .. } => source.is_retryable(),
            other => !matches!(
                other,
                Self::Auth { .. }
                    | Self::Config(_)
                    | Self::Validation(_)
                    | Self::Selector { .. }
                    | Self::Regex(_)
                    | Self::Interrupted
            ),
        }
    }
}
