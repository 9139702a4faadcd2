//! Content extraction strategies
//!
//! Two strategies turn a fetched document into markdown:
//! [`StructuredExtraction`] locates the main article container, while
//! [`HeuristicDomExtraction`] renders the whole body minus boilerplate.
//! [`extract_with_policy`] arbitrates between them.

mod boilerplate;
mod heuristic;
mod structured;

pub use boilerplate::{classify, should_remove, Boilerplate};
pub use heuristic::HeuristicDomExtraction;
pub use structured::StructuredExtraction;

use crate::config::{ContentFilters, StrategyChoice};
use crate::error::ExtractionError;
use crate::types::{ExtractedContent, ExtractionMethod};
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;
use url::Url;

/// Turns raw HTML into cleaned content
pub trait ExtractionStrategy: Send + Sync {
    /// Which method this strategy implements
    fn method(&self) -> ExtractionMethod;

    /// Extract title, markdown body and metadata from `html`
    ///
    /// `url` is the final document URL, used to resolve relative links.
    fn extract(&self, html: &str, url: &Url) -> Result<ExtractedContent, ExtractionError>;
}

/// Record of a structured attempt that was too short
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    /// Characters produced by structured extraction (0 if it failed)
    pub structured_length: usize,
}

/// Output of [`extract_with_policy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub content: ExtractedContent,
    /// Strategy whose output was kept
    pub method: ExtractionMethod,
    /// Present when structured extraction fell short of the threshold
    pub fallback: Option<Fallback>,
}

/// Run the strategy (or strategies) selected by `choice`
///
/// With [`StrategyChoice::Auto`], structured extraction runs first. If it
/// fails or yields fewer than `min_acceptable_length` characters, heuristic
/// extraction runs as well and the longer body wins; ties go to heuristic.
pub fn extract_with_policy(
    choice: StrategyChoice,
    html: &str,
    url: &Url,
    filters: &ContentFilters,
    min_acceptable_length: usize,
) -> Result<Extraction, ExtractionError> {
    let structured = StructuredExtraction::new();
    let heuristic = HeuristicDomExtraction::new(filters.clone());

    match choice {
        StrategyChoice::Structured => single(&structured, html, url),
        StrategyChoice::Heuristic => single(&heuristic, html, url),
        StrategyChoice::Auto => {
            let first = structured.extract(html, url);
            let structured_length = first.as_ref().map_or(0, ExtractedContent::len);
            if first.is_ok() && structured_length >= min_acceptable_length {
                return single_from(first, ExtractionMethod::Structured);
            }

            debug!(
                url = %url,
                structured_length,
                min_acceptable_length,
                "Structured extraction too short, trying heuristic"
            );
            let fallback = Some(Fallback { structured_length });
            let second = heuristic.extract(html, url);

            match (first, second) {
                (Ok(s), Ok(h)) if s.len() > h.len() => Ok(Extraction {
                    content: s,
                    method: ExtractionMethod::Structured,
                    fallback,
                }),
                (_, Ok(h)) => Ok(Extraction {
                    content: h,
                    method: ExtractionMethod::Heuristic,
                    fallback,
                }),
                (Ok(s), Err(_)) => Ok(Extraction {
                    content: s,
                    method: ExtractionMethod::Structured,
                    fallback,
                }),
                (Err(_), Err(e)) => Err(e),
            }
        }
    }
}

fn single(
    strategy: &dyn ExtractionStrategy,
    html: &str,
    url: &Url,
) -> Result<Extraction, ExtractionError> {
    single_from(strategy.extract(html, url), strategy.method())
}

fn single_from(
    result: Result<ExtractedContent, ExtractionError>,
    method: ExtractionMethod,
) -> Result<Extraction, ExtractionError> {
    result.map(|content| Extraction {
        content,
        method,
        fallback: None,
    })
}

/// Which strategies a diagnostic comparison runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MethodSelection {
    Structured,
    Heuristic,
    #[default]
    Both,
}

impl MethodSelection {
    /// Methods in the order they are run
    pub fn methods(&self) -> Vec<ExtractionMethod> {
        match self {
            MethodSelection::Structured => vec![ExtractionMethod::Structured],
            MethodSelection::Heuristic => vec![ExtractionMethod::Heuristic],
            MethodSelection::Both => vec![ExtractionMethod::Structured, ExtractionMethod::Heuristic],
        }
    }
}

impl FromStr for MethodSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both" => Ok(MethodSelection::Both),
            other => match ExtractionMethod::from_str(other)? {
                ExtractionMethod::Structured => Ok(MethodSelection::Structured),
                ExtractionMethod::Heuristic => Ok(MethodSelection::Heuristic),
            },
        }
    }
}

/// Construct the strategy implementing `method`
pub fn strategy_for(
    method: ExtractionMethod,
    filters: &ContentFilters,
) -> Box<dyn ExtractionStrategy> {
    match method {
        ExtractionMethod::Structured => Box::new(StructuredExtraction::new()),
        ExtractionMethod::Heuristic => Box::new(HeuristicDomExtraction::new(filters.clone())),
    }
}

/// Title and document-level metadata
pub(crate) fn page_metadata(doc: &Html) -> (Option<String>, BTreeMap<String, String>) {
    let mut metadata = BTreeMap::new();
    let mut title = None;
    let mut og_title = None;
    let mut first_h1 = None;

    let root = doc.root_element();
    if let Some(lang) = root.value().attr("lang").map(str::trim).filter(|l| !l.is_empty()) {
        metadata.insert("language".to_string(), lang.to_string());
    }

    for el in root.descendants().filter_map(ElementRef::wrap) {
        let value = el.value();
        match value.name() {
            "title" if title.is_none() => {
                title = non_empty(&el.text().collect::<String>());
            }
            "h1" if first_h1.is_none() => {
                first_h1 = non_empty(&el.text().collect::<String>());
            }
            "meta" => {
                let key = value
                    .attr("name")
                    .or_else(|| value.attr("property"))
                    .unwrap_or("")
                    .to_lowercase();
                let Some(content) = value.attr("content").and_then(non_empty) else {
                    continue;
                };
                let field = match key.as_str() {
                    "description" | "og:description" => "description",
                    "author" | "article:author" => "author",
                    "og:site_name" => "site_name",
                    "keywords" => "keywords",
                    "article:published_time" => "published",
                    "og:title" => {
                        og_title.get_or_insert(content);
                        continue;
                    }
                    _ => continue,
                };
                metadata.entry(field.to_string()).or_insert(content);
            }
            "link" if value.attr("rel") == Some("canonical") => {
                if let Some(href) = value.attr("href").and_then(non_empty) {
                    metadata.entry("canonical".to_string()).or_insert(href);
                }
            }
            _ => {}
        }
    }

    (title.or(og_title).or(first_h1), metadata)
}

fn non_empty(s: &str) -> Option<String> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Body element of a document, or the root when there is none
pub(crate) fn body_of(doc: &Html) -> ElementRef<'_> {
    doc.root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
        .unwrap_or_else(|| doc.root_element())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Rust Ownership Explained</title>
  <meta name="description" content="A tour of ownership.">
  <meta name="author" content="Ferris">
  <meta property="og:site_name" content="Rust Blog">
</head>
<body>
  <nav><a href="/">Home</a> <a href="/blog">Blog</a></nav>
  <div id="cookie-banner">We use cookies. <button>Accept all</button></div>
  <main>
    <article>
      <h1>Rust Ownership Explained</h1>
      <p>Ownership is a set of rules that govern how a Rust program manages memory.</p>
      <p>Every value has a single owner, and the value is dropped when the owner goes out of scope.</p>
      <p>Borrowing lets code use a value without taking ownership of it, either shared or mutable.</p>
    </article>
  </main>
  <div class="share-buttons"><a href="https://twitter.com/share">Tweet</a></div>
  <footer>Copyright 2024 Rust Blog</footer>
</body>
</html>"#;

    const SPARSE: &str = r#"<html><head><title>Links</title></head><body>
  <div class="list">
    <h2>Resources</h2>
    <ul>
      <li>The Book covers the language end to end</li>
      <li>Rust by Example shows small programs</li>
      <li>The Reference documents the syntax</li>
    </ul>
    <h2>Community</h2>
    <ul><li>Forums</li><li>Discord</li><li>Meetups</li></ul>
  </div>
</body></html>"#;

    fn url() -> Url {
        Url::parse("https://blog.example.com/ownership").unwrap()
    }

    #[test]
    fn test_page_metadata() {
        let doc = Html::parse_document(ARTICLE);
        let (title, metadata) = page_metadata(&doc);
        assert_eq!(title.as_deref(), Some("Rust Ownership Explained"));
        assert_eq!(metadata["language"], "en");
        assert_eq!(metadata["description"], "A tour of ownership.");
        assert_eq!(metadata["author"], "Ferris");
        assert_eq!(metadata["site_name"], "Rust Blog");
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let doc = Html::parse_document("<body><h1>Heading  Title</h1><p>x</p></body>");
        let (title, _) = page_metadata(&doc);
        assert_eq!(title.as_deref(), Some("Heading Title"));
    }

    #[test]
    fn test_auto_keeps_long_structured_output() {
        let extraction =
            extract_with_policy(StrategyChoice::Auto, ARTICLE, &url(), &ContentFilters::default(), 50)
                .unwrap();
        assert_eq!(extraction.method, ExtractionMethod::Structured);
        assert!(extraction.fallback.is_none());
        assert!(extraction.content.body.contains("Ownership is a set of rules"));
        assert!(!extraction.content.body.contains("cookies"));
        assert!(!extraction.content.body.contains("Tweet"));
    }

    #[test]
    fn test_auto_falls_back_when_structured_is_short() {
        let filters = ContentFilters::default();
        let structured_len = StructuredExtraction::new()
            .extract(SPARSE, &url())
            .map_or(0, |c| c.len());

        let extraction =
            extract_with_policy(StrategyChoice::Auto, SPARSE, &url(), &filters, 10_000).unwrap();

        assert_eq!(extraction.method, ExtractionMethod::Heuristic);
        assert_eq!(
            extraction.fallback,
            Some(Fallback {
                structured_length: structured_len
            })
        );
        assert!(extraction.content.len() >= structured_len);
        assert!(extraction.content.body.contains("- Forums"));
    }

    #[test]
    fn test_auto_fallback_on_article_prefers_larger_output() {
        let extraction = extract_with_policy(
            StrategyChoice::Auto,
            ARTICLE,
            &url(),
            &ContentFilters::default(),
            10_000,
        )
        .unwrap();
        let structured = StructuredExtraction::new().extract(ARTICLE, &url()).unwrap();

        assert_eq!(extraction.method, ExtractionMethod::Heuristic);
        assert!(extraction.content.len() >= structured.len());
    }

    #[test]
    fn test_layout_wrapper_with_sidebar_class_is_content() {
        let html = r#"<html><body>
  <div id="page" class="site layout-with-sidebar">
    <div class="story">
      <h1>Post</h1>
      <p>Lifetimes describe how long references stay valid, and the compiler checks them at every borrow.</p>
      <p>Most lifetimes are inferred, so annotations are only needed where the relationship is ambiguous.</p>
    </div>
  </div>
</body></html>"#;
        let extraction = extract_with_policy(
            StrategyChoice::Auto,
            html,
            &url(),
            &ContentFilters::default(),
            50,
        )
        .unwrap();
        assert!(extraction.content.body.contains("# Post"));
        assert!(extraction.content.body.contains("Lifetimes describe"));
        assert!(extraction.content.body.contains("annotations are only needed"));
    }

    #[test]
    fn test_pinned_strategies() {
        let filters = ContentFilters::default();
        let s = extract_with_policy(StrategyChoice::Structured, ARTICLE, &url(), &filters, 10_000)
            .unwrap();
        assert_eq!(s.method, ExtractionMethod::Structured);
        assert!(s.fallback.is_none());

        let h = extract_with_policy(StrategyChoice::Heuristic, ARTICLE, &url(), &filters, 0)
            .unwrap();
        assert_eq!(h.method, ExtractionMethod::Heuristic);
    }

    #[test]
    fn test_empty_document_fails_both_ways() {
        let err = extract_with_policy(
            StrategyChoice::Auto,
            "<html><body><script>app()</script></body></html>",
            &url(),
            &ContentFilters::default(),
            100,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::NoContent { .. }));
    }

    #[test]
    fn test_method_selection() {
        assert_eq!("both".parse::<MethodSelection>().unwrap(), MethodSelection::Both);
        assert_eq!(
            "structured".parse::<MethodSelection>().unwrap(),
            MethodSelection::Structured
        );
        assert_eq!(
            "beautifulsoup".parse::<MethodSelection>().unwrap(),
            MethodSelection::Heuristic
        );
        assert!("all".parse::<MethodSelection>().is_err());
        assert_eq!(MethodSelection::Both.methods().len(), 2);
    }

    #[test]
    fn test_strategy_for() {
        let filters = ContentFilters::default();
        assert_eq!(
            strategy_for(ExtractionMethod::Heuristic, &filters).method(),
            ExtractionMethod::Heuristic
        );
        assert_eq!(
            strategy_for(ExtractionMethod::Structured, &filters).method(),
            ExtractionMethod::Structured
        );
    }
}
