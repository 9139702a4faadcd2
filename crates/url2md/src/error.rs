//! Error types for url2md

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// Request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to connect to server
    #[error("Failed to connect to server")]
    Connect(#[source] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server responded with HTTP {0}")]
    Status(u16),

    /// Other request error
    #[error("Request failed: {0}")]
    Request(String),

    /// Response is binary or otherwise not a document
    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    /// JavaScript rendering was requested but no browser is available
    #[error("JavaScript rendering unavailable: {0}")]
    RendererUnavailable(String),

    /// Headless browser failed to produce a DOM
    #[error("Headless rendering failed: {0}")]
    Renderer(String),
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_connect() {
            FetchError::Connect(err)
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// Errors raised by an extraction strategy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The document had no usable main content
    #[error("No meaningful content found ({method})")]
    NoContent {
        /// Strategy that came up empty
        method: &'static str,
    },
}

/// Errors that terminate a single conversion
///
/// [`Converter::convert`](crate::Converter::convert) never returns these
/// directly; they are folded into a failed
/// [`ConversionResult`](crate::ConversionResult).
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Empty, unparsable or non-http(s) URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Fetch failed after exhausting retries
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Neither strategy produced content
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Writing the markdown file failed
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the rate limiter would exceed the configured bound
    #[error("Rate limit wait for {host} would exceed {max_wait:?}")]
    RateLimitTimeout {
        /// Host being throttled
        host: String,
        /// Configured maximum wait
        max_wait: Duration,
    },
}

impl ConvertError {
    /// Shorthand for an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Coarse classification used in results and reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            ConvertError::Fetch(_) => ErrorKind::Fetch,
            ConvertError::Extraction(_) => ErrorKind::Extraction,
            ConvertError::Io { .. } => ErrorKind::Io,
            ConvertError::RateLimitTimeout { .. } => ErrorKind::RateLimitTimeout,
        }
    }
}

/// Failure category recorded on a failed [`ConversionResult`](crate::ConversionResult)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    Fetch,
    Extraction,
    Io,
    RateLimitTimeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidUrl => "InvalidURLError",
            ErrorKind::Fetch => "FetchError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Io => "IOError",
            ErrorKind::RateLimitTimeout => "RateLimitTimeoutError",
        };
        f.write_str(name)
    }
}

/// Errors that abort or mark an item of a batch run
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Concurrency must be at least one
    #[error("Invalid concurrency: must be at least 1")]
    InvalidConcurrency,

    /// A conversion task panicked or was cancelled
    #[error("Conversion of {url} (item {index}) failed: {message}")]
    Task {
        /// Position in the input
        index: usize,
        /// URL being converted
        url: String,
        /// Panic or cancellation description
        message: String,
    },
}

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`Config`](crate::Config)
    #[error("Failed to parse config file {path}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// An environment variable has an unusable value
    #[error("Invalid value for {var}: {value}")]
    Env {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}
