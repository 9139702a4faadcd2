//! Page fetch engines
//!
//! [`HttpFetcher`] performs plain HTTP GETs; [`ChromeRenderer`] runs a
//! headless Chrome/Chromium and returns the DOM after scripts ran. The
//! converter picks one per request based on the JavaScript mode.

mod chrome;
mod http;

pub use chrome::{find_browser, ChromeRenderer};
pub use http::HttpFetcher;

use crate::error::FetchError;
use crate::types::{FetchRequest, FetchedPage};
use async_trait::async_trait;

/// Trait for page fetch engines
///
/// Implement this trait to plug a custom transport (or a test double) into
/// a [`Converter`](crate::Converter).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identifier used in logs and result metadata
    fn name(&self) -> &'static str;

    /// Fetch the document at `request.url`
    ///
    /// Non-success HTTP statuses are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// Heuristic check for a client-rendered shell
///
/// True when the body carries almost no text but does load scripts, or
/// mounts into a well-known empty root element.
pub fn looks_client_rendered(html: &str) -> bool {
    let lower = html.to_lowercase();
    let scripts = lower.matches("<script").count();
    if scripts == 0 {
        return false;
    }
    let empty_root = ["<div id=\"root\"></div>", "<div id=\"app\"></div>", "<div id=\"__next\"></div>"]
        .iter()
        .any(|marker| lower.contains(marker));
    if empty_root {
        return true;
    }
    let text = crate::convert::html_to_markdown(html);
    text.split_whitespace().count() < 20
}
