//! Boilerplate element detection
//!
//! Classifies elements by tag, ARIA role and class/id tokens into the
//! categories the [`ContentFilters`] toggles refer to.
//!
//! A class or id token matches a category when the whole token is a marker
//! word (`sidebar`), when its first `-`/`_` part is one (`cookie-banner`,
//! `share_buttons`), or when it is a known compound (`main-menu`). Layout
//! classes that merely mention a marker (`layout-with-sidebar`) do not match,
//! and an element holding most of the page text is never dropped for its
//! class names.

use crate::config::ContentFilters;
use scraper::ElementRef;

const NAVIGATION_WORDS: &[&str] = &[
    "nav",
    "navbar",
    "navigation",
    "menu",
    "breadcrumb",
    "breadcrumbs",
    "sidebar",
    "skip",
    "pagination",
    "footer",
    "masthead",
];

/// Navigation tokens whose marker is not the leading part
const NAVIGATION_COMPOUNDS: &[&str] = &[
    "main-menu",
    "main-nav",
    "main-navigation",
    "primary-menu",
    "primary-nav",
    "site-nav",
    "site-navigation",
    "site-footer",
    "page-footer",
    "global-nav",
    "top-nav",
    "mobile-menu",
    "nav-menu",
    "left-sidebar",
    "right-sidebar",
];

const COOKIE_WORDS: &[&str] = &["cookie", "cookies", "consent", "gdpr", "onetrust", "cmp"];

const AD_WORDS: &[&str] = &[
    "ad",
    "ads",
    "advert",
    "advertisement",
    "advertising",
    "adsbygoogle",
    "sponsor",
    "sponsored",
    "promo",
    "dfp",
];

const SOCIAL_WORDS: &[&str] = &[
    "share",
    "sharing",
    "social",
    "twitter",
    "facebook",
    "linkedin",
    "pinterest",
    "reddit",
    "whatsapp",
];

/// Boilerplate category of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boilerplate {
    Hidden,
    Interactive,
    Navigation,
    CookieBanner,
    Advertising,
    SocialMedia,
}

/// Classify an element, `None` when it looks like content
pub fn classify(el: &ElementRef<'_>) -> Option<Boilerplate> {
    let value = el.value();
    let name = value.name();

    if value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
        || value
            .attr("style")
            .is_some_and(|s| s.replace(' ', "").contains("display:none"))
    {
        return Some(Boilerplate::Hidden);
    }

    if matches!(name, "form" | "button" | "input" | "select" | "textarea" | "dialog") {
        return Some(Boilerplate::Interactive);
    }

    let role = value.attr("role").unwrap_or("");
    if name == "nav" || matches!(role, "navigation" | "menubar" | "search") {
        return Some(Boilerplate::Navigation);
    }
    if matches!(name, "header" | "footer")
        || matches!(role, "banner" | "contentinfo" | "complementary")
    {
        // Article headers and footers hold bylines and dates
        if !inside_content(el) {
            return Some(Boilerplate::Navigation);
        }
    }
    if name == "aside" && !inside_content(el) {
        return Some(Boilerplate::Navigation);
    }
    if name == "ins" && value.classes().any(|c| c == "adsbygoogle") {
        return Some(Boilerplate::Advertising);
    }

    let tokens = marker_tokens(el);
    if tokens.is_empty() {
        return None;
    }
    let has = |list: &[&str]| tokens.iter().any(|t| token_matches(t, list));

    let category = if has(COOKIE_WORDS) {
        Boilerplate::CookieBanner
    } else if has(AD_WORDS) {
        Boilerplate::Advertising
    } else if has(SOCIAL_WORDS) {
        Boilerplate::SocialMedia
    } else if has(NAVIGATION_WORDS)
        || tokens
            .iter()
            .any(|t| NAVIGATION_COMPOUNDS.contains(&t.as_str()))
    {
        Boilerplate::Navigation
    } else {
        return None;
    };

    // Page wrappers often carry state classes like "sidebar-open"
    if holds_most_text(el) {
        return None;
    }
    Some(category)
}

/// Whether the filters ask for this element to be dropped
pub fn should_remove(el: &ElementRef<'_>, filters: &ContentFilters) -> bool {
    match classify(el) {
        Some(Boilerplate::Hidden | Boilerplate::Interactive) => true,
        Some(Boilerplate::Navigation) => filters.remove_navigation,
        Some(Boilerplate::CookieBanner) => filters.remove_cookie_banners,
        Some(Boilerplate::Advertising) => filters.remove_ads,
        Some(Boilerplate::SocialMedia) => filters.remove_social_media,
        None => false,
    }
}

/// Lowercased id and class tokens, `_` folded to `-`
fn marker_tokens(el: &ElementRef<'_>) -> Vec<String> {
    let value = el.value();
    value
        .id()
        .into_iter()
        .chain(value.classes())
        .map(|token| token.to_ascii_lowercase().replace('_', "-"))
        .filter(|token| !token.is_empty())
        .collect()
}

fn token_matches(token: &str, words: &[&str]) -> bool {
    let lead = token.split('-').next().unwrap_or(token);
    words.contains(&token) || words.contains(&lead)
}

/// More than half of the body's visible characters sit inside `el`
fn holds_most_text(el: &ElementRef<'_>) -> bool {
    let Some(body) = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "body")
    else {
        return false;
    };
    let page = text_weight(&body);
    page > 0 && text_weight(el) * 2 > page
}

fn text_weight(el: &ElementRef<'_>) -> usize {
    el.text()
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .count()
}

fn inside_content(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "article" | "main"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn classify_first(html: &str, selector: &str) -> Option<Boilerplate> {
        let doc = Html::parse_document(html);
        let sel = Selector::parse(selector).unwrap();
        let el = doc.select(&sel).next().unwrap();
        classify(&el)
    }

    /// Place a widget next to enough article text to outweigh it
    fn beside_article(widget: &str) -> String {
        format!(
            "<body>{widget}<p>The article itself runs long enough to be most of the page.</p></body>"
        )
    }

    #[test]
    fn test_classify_by_tag_and_role() {
        assert_eq!(
            classify_first("<nav>x</nav>", "nav"),
            Some(Boilerplate::Navigation)
        );
        assert_eq!(
            classify_first("<div role=\"navigation\">x</div>", "div"),
            Some(Boilerplate::Navigation)
        );
        assert_eq!(
            classify_first("<body><footer>x</footer></body>", "footer"),
            Some(Boilerplate::Navigation)
        );
        assert_eq!(
            classify_first("<article><footer>By me</footer></article>", "footer"),
            None
        );
        assert_eq!(
            classify_first("<form><p>x</p></form>", "form"),
            Some(Boilerplate::Interactive)
        );
    }

    #[test]
    fn test_classify_by_class_words() {
        assert_eq!(
            classify_first(&beside_article("<div id=\"cookie-banner\">x</div>"), "div"),
            Some(Boilerplate::CookieBanner)
        );
        assert_eq!(
            classify_first(&beside_article("<div class=\"ad-slot top\">x</div>"), "div"),
            Some(Boilerplate::Advertising)
        );
        assert_eq!(
            classify_first(&beside_article("<div class=\"share_buttons\">x</div>"), "div"),
            Some(Boilerplate::SocialMedia)
        );
        assert_eq!(
            classify_first(&beside_article("<div class=\"main-menu\">x</div>"), "div"),
            Some(Boilerplate::Navigation)
        );
    }

    #[test]
    fn test_content_words_are_not_boilerplate() {
        // "header" and "load" contain ad-like substrings but are whole words
        assert_eq!(
            classify_first("<div class=\"article-header download\">x</div>", "div"),
            None
        );
        assert_eq!(classify_first("<p>x</p>", "p"), None);
    }

    #[test]
    fn test_layout_classes_mentioning_markers_are_content() {
        let layout = beside_article("<div class=\"layout-with-sidebar\">x</div>");
        assert_eq!(classify_first(&layout, "div"), None);
        assert_eq!(
            classify_first(&beside_article("<div class=\"sidebar\">x</div>"), "div"),
            Some(Boilerplate::Navigation)
        );
        assert_eq!(
            classify_first(&beside_article("<div class=\"adapter loader\">x</div>"), "div"),
            None
        );
    }

    #[test]
    fn test_element_holding_most_text_is_kept() {
        let html = "<body><div class=\"sidebar\"><p>Nearly the whole page lives in here.</p></div>\
                    <p>Tail.</p></body>";
        assert_eq!(classify_first(html, "div"), None);
    }

    #[test]
    fn test_hidden() {
        assert_eq!(
            classify_first("<div style=\"display: none\">x</div>", "div"),
            Some(Boilerplate::Hidden)
        );
        assert_eq!(
            classify_first("<div aria-hidden=\"true\">x</div>", "div"),
            Some(Boilerplate::Hidden)
        );
    }

    #[test]
    fn test_should_remove_respects_toggles() {
        let doc = Html::parse_document(&beside_article("<div class=\"cookie-notice\">x</div>"));
        let sel = Selector::parse("div").unwrap();
        let el = doc.select(&sel).next().unwrap();

        let mut filters = ContentFilters::default();
        assert!(should_remove(&el, &filters));
        filters.remove_cookie_banners = false;
        assert!(!should_remove(&el, &filters));
    }
}
