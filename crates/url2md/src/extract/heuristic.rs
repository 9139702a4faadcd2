//! Whole-body extraction with configurable boilerplate removal

use super::boilerplate::should_remove;
use super::{body_of, page_metadata, ExtractionStrategy};
use crate::config::ContentFilters;
use crate::convert::element_to_markdown;
use crate::error::ExtractionError;
use crate::types::{ExtractedContent, ExtractionMethod};
use scraper::Html;
use url::Url;

/// Recall-oriented extraction: render `<body>` minus filtered elements
#[derive(Debug, Clone, Default)]
pub struct HeuristicDomExtraction {
    filters: ContentFilters,
}

impl HeuristicDomExtraction {
    pub fn new(filters: ContentFilters) -> Self {
        Self { filters }
    }
}

impl ExtractionStrategy for HeuristicDomExtraction {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Heuristic
    }

    fn extract(&self, html: &str, url: &Url) -> Result<ExtractedContent, ExtractionError> {
        let doc = Html::parse_document(html);
        let (title, metadata) = page_metadata(&doc);

        let body = element_to_markdown(body_of(&doc), Some(url), &|el| {
            should_remove(el, &self.filters)
        });
        if body.trim().is_empty() {
            return Err(ExtractionError::NoContent {
                method: ExtractionMethod::Heuristic.as_str(),
            });
        }

        Ok(ExtractedContent {
            title,
            body,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Shop</title></head><body>
        <nav><a href="/">Home</a></nav>
        <div class="cookie-consent">We use cookies</div>
        <h1>Spring sale</h1>
        <p>All garden tools are 20% off.</p>
        <div class="ad-banner">Sponsored: lawn mowers</div>
        <div class="social-links"><a href="https://twitter.com/shop">Follow</a></div>
        <form><input name="q"><button>Search</button></form>
    </body></html>"#;

    fn url() -> Url {
        Url::parse("https://shop.example.com/").unwrap()
    }

    #[test]
    fn test_default_filters_remove_boilerplate() {
        let content = HeuristicDomExtraction::default()
            .extract(PAGE, &url())
            .unwrap();
        assert_eq!(content.title.as_deref(), Some("Shop"));
        assert!(content.body.contains("# Spring sale"));
        assert!(content.body.contains("All garden tools are 20% off."));
        for gone in ["Home", "cookies", "lawn mowers", "Follow", "Search"] {
            assert!(!content.body.contains(gone), "{gone} should be removed");
        }
    }

    #[test]
    fn test_disabled_filters_keep_categories() {
        let filters = ContentFilters {
            remove_navigation: false,
            remove_ads: false,
            remove_cookie_banners: true,
            remove_social_media: true,
        };
        let content = HeuristicDomExtraction::new(filters)
            .extract(PAGE, &url())
            .unwrap();
        assert!(content.body.contains("Home"));
        assert!(content.body.contains("lawn mowers"));
        assert!(!content.body.contains("cookies"));
        // Forms are dropped regardless of filters
        assert!(!content.body.contains("Search"));
    }

    #[test]
    fn test_empty_body() {
        let err = HeuristicDomExtraction::default()
            .extract("<html><body><nav>Menu</nav></body></html>", &url())
            .unwrap_err();
        assert_eq!(err, ExtractionError::NoContent { method: "heuristic" });
    }
}
