//! Core types for url2md

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Extraction strategy that produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Article/body detection, favors precision
    Structured,
    /// Whole-body DOM rendering with boilerplate removal, favors recall
    Heuristic,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Structured => "structured",
            ExtractionMethod::Heuristic => "heuristic",
        }
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" | "trafilatura" => Ok(ExtractionMethod::Structured),
            "heuristic" | "beautifulsoup" => Ok(ExtractionMethod::Heuristic),
            _ => Err("Invalid method: must be structured or heuristic".to_string()),
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content returned by an extraction strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Document title, if one was found
    pub title: Option<String>,
    /// Markdown body
    pub body: String,
    /// description, language, author, site_name, ...
    pub metadata: BTreeMap<String, String>,
}

impl ExtractedContent {
    /// Body length in characters
    pub fn len(&self) -> usize {
        self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Request handed to a [`Fetcher`](crate::Fetcher)
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Normalized URL
    pub url: String,
    /// Overall deadline for the fetch
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

/// Raw page returned by a [`Fetcher`](crate::Fetcher)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,
    /// HTTP status code (200 for rendered pages)
    pub status_code: u16,
    /// Content-Type header value
    pub content_type: Option<String>,
    /// Document body
    pub html: String,
    /// True if the body was cut short by the read deadline
    pub truncated: bool,
    /// Whether a headless browser produced the DOM
    pub rendered: bool,
}

/// Outcome of one conversion attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Whether markdown was produced (and written, unless previewing)
    pub success: bool,
    /// URL as requested
    pub url: String,
    /// URL after redirects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    /// Resolved page title
    pub title: String,
    /// Content-addressed filename
    pub filename: String,
    /// Where the markdown was written; absent in preview mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Markdown body
    pub markdown: String,
    /// Markdown size in characters
    pub size: usize,
    /// Strategy that produced the markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<ExtractionMethod>,
    /// Wall-clock time spent fetching, extracting and cleaning
    pub processing_ms: u64,
    /// Page metadata plus conversion details
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Human-readable failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ConversionResult {
    /// A failed result carrying only the URL and error
    pub fn failure(url: impl Into<String>, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: url.into(),
            error: Some(error.into()),
            error_kind: Some(kind),
            ..Default::default()
        }
    }

    /// Processing time as a [`Duration`]
    pub fn processing_time(&self) -> Duration {
        Duration::from_millis(self.processing_ms)
    }

    /// Whether this result was served from the cache
    pub fn is_cached(&self) -> bool {
        self.metadata.get("source").is_some_and(|s| s == "cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            ExtractionMethod::from_str("structured").unwrap(),
            ExtractionMethod::Structured
        );
        assert_eq!(
            ExtractionMethod::from_str("Heuristic").unwrap(),
            ExtractionMethod::Heuristic
        );
        assert_eq!(
            ExtractionMethod::from_str("trafilatura").unwrap(),
            ExtractionMethod::Structured
        );
        assert!(ExtractionMethod::from_str("both").is_err());
    }

    #[test]
    fn test_extracted_len_counts_chars() {
        let content = ExtractedContent {
            body: "héllo".to_string(),
            ..Default::default()
        };
        assert_eq!(content.len(), 5);
        assert!(!content.is_empty());
        assert!(ExtractedContent::default().is_empty());
    }

    #[test]
    fn test_failure_result_serialization() {
        let result =
            ConversionResult::failure("not-a-url", ErrorKind::InvalidUrl, "Invalid URL");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"error_kind\":\"invalid_url\""));
        // Optional None fields should be omitted
        assert!(!json.contains("output_path"));
        assert!(!json.contains("extraction_method"));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn test_is_cached() {
        let mut result = ConversionResult::default();
        assert!(!result.is_cached());
        result.metadata.insert("source".into(), "cache".into());
        assert!(result.is_cached());
    }
}
