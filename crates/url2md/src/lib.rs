//! url2md - convert web pages into LLM-ready markdown
//!
//! The library fetches a page (optionally rendering JavaScript in headless
//! Chrome), extracts its main content, normalizes it to markdown and saves
//! it under a filename derived from the URL.
//!
//! ## Pipeline
//!
//! - [`Converter`] converts one URL and folds every failure into a
//!   [`ConversionResult`]
//! - [`BatchCoordinator`] converts many URLs with bounded concurrency
//! - [`RateLimiter`] spaces fetches per host, [`ResponseCache`] skips repeat
//!   work
//! - [`extract`] holds the structured and heuristic extraction strategies
//!
//! ## Example
//!
//! ```no_run
//! use url2md::{Config, ConvertOverrides, Converter};
//!
//! # async fn run() -> Result<(), url2md::FetchError> {
//! let converter = Converter::new(Config::default())?;
//! let result = converter
//!     .convert("https://example.com", &ConvertOverrides::preview())
//!     .await;
//! println!("{}", result.markdown);
//! # Ok(())
//! # }
//! ```

mod batch;
mod cache;
mod clean;
mod config;
mod convert;
mod converter;
mod error;
pub mod extract;
pub mod fetchers;
mod identity;
pub mod persist;
mod rate_limit;
mod types;

pub use batch::{
    BatchCoordinator, BatchOptions, BatchOutcome, BatchSummary, ProgressCallback,
    DEFAULT_CONCURRENCY,
};
pub use cache::{CacheKey, ResponseCache};
pub use clean::{clean_markdown, llm_optimize};
pub use config::{
    Config, ContentFilters, ConvertOverrides, EffectiveConfig, JsMode, OutputTarget,
    StrategyChoice,
};
pub use convert::html_to_markdown;
pub use converter::{
    Converter, ConverterBuilder, ExtractionComparison, MethodReport, MARKDOWN_EXTENSION,
};
pub use error::{BatchError, ConfigError, ConvertError, ErrorKind, ExtractionError, FetchError};
pub use extract::{ExtractionStrategy, MethodSelection};
pub use fetchers::{ChromeRenderer, Fetcher, HttpFetcher};
pub use identity::{compute_filename, compute_identity, host_key, normalize_url, ContentIdentity};
pub use rate_limit::RateLimiter;
pub use types::{ConversionResult, ExtractedContent, ExtractionMethod, FetchRequest, FetchedPage};

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str = concat!("url2md/", env!("CARGO_PKG_VERSION"));
