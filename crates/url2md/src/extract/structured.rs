//! Main-content detection
//!
//! Scores candidate containers by the paragraph text they hold, discounted
//! by link density, and renders the winner with every boilerplate category
//! removed.

use super::boilerplate::classify;
use super::{page_metadata, ExtractionStrategy};
use crate::convert::{element_to_markdown, is_non_content};
use crate::error::ExtractionError;
use crate::types::{ExtractedContent, ExtractionMethod};
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;
use url::Url;

/// Paragraphs shorter than this do not vote for a container
const MIN_PARAGRAPH_LEN: usize = 25;

/// How many ancestor levels receive a share of a paragraph's score
const SCORE_LEVELS: usize = 3;

const CONTENT_WORDS: &[&str] = &[
    "content",
    "main-content",
    "post-content",
    "entry-content",
    "article-body",
    "article-content",
    "story-body",
    "post-body",
    "entry",
    "post",
];

/// Precision-oriented extraction of the main article container
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredExtraction;

impl StructuredExtraction {
    pub fn new() -> Self {
        Self
    }
}

impl ExtractionStrategy for StructuredExtraction {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Structured
    }

    fn extract(&self, html: &str, url: &Url) -> Result<ExtractedContent, ExtractionError> {
        let doc = Html::parse_document(html);
        let (title, metadata) = page_metadata(&doc);
        let no_content = ExtractionError::NoContent {
            method: ExtractionMethod::Structured.as_str(),
        };

        let container = best_candidate(&doc).ok_or_else(|| no_content.clone())?;
        let body = element_to_markdown(container, Some(url), &|el| classify(el).is_some());
        if body.trim().is_empty() {
            return Err(no_content);
        }

        Ok(ExtractedContent {
            title,
            body,
            metadata,
        })
    }
}

fn best_candidate(doc: &Html) -> Option<ElementRef<'_>> {
    let mut scores: HashMap<_, (ElementRef<'_>, f64)> = HashMap::new();

    for el in doc.root_element().descendants().filter_map(ElementRef::wrap) {
        if is_declared_content(&el) {
            scores.entry(el.id()).or_insert((el, 0.0));
        }
        if !matches!(el.value().name(), "p" | "pre" | "blockquote") || in_boilerplate(&el) {
            continue;
        }
        let len = visible_text(&el).chars().count();
        if len < MIN_PARAGRAPH_LEN {
            continue;
        }
        for (level, ancestor) in el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(SCORE_LEVELS)
            .enumerate()
        {
            let share = len as f64 / (level + 1) as f64;
            scores.entry(ancestor.id()).or_insert((ancestor, 0.0)).1 += share;
        }
    }

    let mut best: Option<(ElementRef<'_>, f64)> = None;
    for (el, paragraph_score) in scores.into_values() {
        let (text_len, link_len) = text_stats(&el);
        if text_len == 0 {
            continue;
        }
        let link_density = link_len as f64 / text_len as f64;
        let base = if paragraph_score > 0.0 {
            paragraph_score
        } else {
            // Declared containers without long paragraphs still count a little
            text_len as f64 * 0.1
        };
        let bonus = if is_declared_content(&el) { 1.25 } else { 1.0 };
        let score = base * (1.0 - link_density) * bonus;

        if best.as_ref().map_or(true, |(_, s)| score > *s) {
            best = Some((el, score));
        }
    }

    best.filter(|(_, score)| *score > 0.0).map(|(el, _)| el)
}

/// Element explicitly marked up as the document's main content
fn is_declared_content(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    if matches!(value.name(), "main" | "article")
        || value.attr("role") == Some("main")
        || value.attr("itemprop") == Some("articleBody")
    {
        return true;
    }
    value
        .id()
        .into_iter()
        .chain(value.classes())
        .any(|token| CONTENT_WORDS.contains(&token.to_ascii_lowercase().as_str()))
}

fn in_boilerplate(el: &ElementRef<'_>) -> bool {
    classify(el).is_some()
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| classify(&a).is_some() || is_non_content(&a))
}

fn visible_text(el: &ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| is_non_content(&a));
            if !hidden {
                out.push_str(text);
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text length and the part of it inside links
fn text_stats(el: &ElementRef<'_>) -> (usize, usize) {
    let mut total = 0;
    let mut linked = 0;
    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let len = text.split_whitespace().map(|w| w.chars().count()).sum::<usize>();
        if len == 0 {
            continue;
        }
        let mut in_link = false;
        let mut hidden = false;
        for ancestor in node.ancestors().filter_map(ElementRef::wrap) {
            if ancestor.id() == el.id() {
                break;
            }
            in_link |= ancestor.value().name() == "a";
            hidden |= is_non_content(&ancestor);
        }
        if hidden {
            continue;
        }
        total += len;
        if in_link {
            linked += len;
        }
    }
    (total, linked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://news.example.com/story").unwrap()
    }

    #[test]
    fn test_picks_article_over_link_farm() {
        let html = r#"<html><head><title>Story</title></head><body>
            <div class="links">
              <p><a href="/a">A long link text that goes on and on and on</a></p>
              <p><a href="/b">Another long link text that goes on and on</a></p>
            </div>
            <div class="story-body">
              <p>The council voted on Tuesday to extend the library opening hours.</p>
              <p>Residents had campaigned for longer weekend hours for over a year.</p>
            </div>
        </body></html>"#;
        let content = StructuredExtraction::new().extract(html, &url()).unwrap();
        assert_eq!(content.title.as_deref(), Some("Story"));
        assert!(content.body.contains("The council voted"));
        assert!(!content.body.contains("link text"));
    }

    #[test]
    fn test_scores_undeclared_containers_by_paragraphs() {
        let html = r#"<body>
            <div id="x"><p>short</p></div>
            <div id="y">
              <p>This paragraph is comfortably longer than the minimum length.</p>
              <p>So is this one, which should make its parent the winner here.</p>
            </div>
        </body>"#;
        let content = StructuredExtraction::new().extract(html, &url()).unwrap();
        assert!(content.body.contains("comfortably longer"));
        assert!(!content.body.contains("short"));
    }

    #[test]
    fn test_strips_boilerplate_inside_container() {
        let html = r#"<body><article>
            <p>Paragraph one has enough characters to count as content.</p>
            <div class="social-share"><a href="https://facebook.com/x">Share</a></div>
            <aside class="ad">Buy now</aside>
            <p>Paragraph two also has enough characters to count here.</p>
        </article></body>"#;
        let content = StructuredExtraction::new().extract(html, &url()).unwrap();
        assert!(content.body.contains("Paragraph one"));
        assert!(content.body.contains("Paragraph two"));
        assert!(!content.body.contains("Share"));
        assert!(!content.body.contains("Buy now"));
    }

    #[test]
    fn test_resolves_relative_links() {
        let html = r#"<body><article>
            <p>Read the <a href="/docs/guide">full guide</a> before continuing with setup.</p>
        </article></body>"#;
        let content = StructuredExtraction::new().extract(html, &url()).unwrap();
        assert!(content
            .body
            .contains("[full guide](https://news.example.com/docs/guide)"));
    }

    #[test]
    fn test_no_content() {
        let err = StructuredExtraction::new()
            .extract("<body><nav><a href=\"/\">Home</a></nav></body>", &url())
            .unwrap_err();
        assert_eq!(
            err,
            ExtractionError::NoContent {
                method: "structured"
            }
        );
    }

    #[test]
    fn test_text_stats() {
        let doc = Html::parse_fragment("<div>abcd <a href=\"#\">ef</a><script>zzz</script></div>");
        let div = doc
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .next()
            .unwrap();
        assert_eq!(text_stats(&div), (6, 2));
    }
}
