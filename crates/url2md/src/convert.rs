//! HTML to markdown rendering
//!
//! Walks a parsed DOM subtree and emits markdown. Callers decide which
//! elements are dropped by passing a skip predicate, which is how both
//! extraction strategies share one renderer.

use scraper::{ElementRef, Html, Node};
use url::Url;

/// Elements that never carry readable content
const ALWAYS_SKIP: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "svg", "canvas", "object", "embed",
    "head", "link", "meta",
];

/// Convert a full HTML document to markdown, dropping only non-content tags
pub fn html_to_markdown(html: &str) -> String {
    let doc = Html::parse_document(html);
    element_to_markdown(doc.root_element(), None, &|_| false)
}

/// Render an element subtree
///
/// `skip` is consulted for every element below `root`; returning true drops
/// the element and everything inside it. Relative links and image sources
/// are resolved against `base` when given.
pub fn element_to_markdown(
    root: ElementRef<'_>,
    base: Option<&Url>,
    skip: &dyn Fn(&ElementRef<'_>) -> bool,
) -> String {
    let mut renderer = Renderer::new(base, skip);
    renderer.children(root);
    tidy(&renderer.out)
}

/// Should this element be ignored regardless of any filter
pub(crate) fn is_non_content(el: &ElementRef<'_>) -> bool {
    ALWAYS_SKIP.contains(&el.value().name())
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Unordered,
    Ordered(usize),
}

struct Renderer<'a> {
    out: String,
    lists: Vec<ListKind>,
    base: Option<&'a Url>,
    skip: &'a dyn Fn(&ElementRef<'_>) -> bool,
}

impl<'a> Renderer<'a> {
    fn new(base: Option<&'a Url>, skip: &'a dyn Fn(&ElementRef<'_>) -> bool) -> Self {
        Self {
            out: String::new(),
            lists: Vec::new(),
            base,
            skip,
        }
    }

    /// Render the children of `el` into a fresh buffer
    fn capture(&self, el: ElementRef<'_>) -> String {
        let mut sub = Renderer::new(self.base, self.skip);
        sub.lists = self.lists.clone();
        sub.children(el);
        sub.out
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        let mut collapsed = String::with_capacity(text.len());
        let mut last_was_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    collapsed.push(' ');
                }
                last_was_space = true;
            } else {
                collapsed.push(c);
                last_was_space = false;
            }
        }

        let at_line_start =
            self.out.is_empty() || self.out.ends_with('\n') || self.out.ends_with(' ');
        let collapsed = if at_line_start {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        self.out.push_str(collapsed);
    }

    fn element(&mut self, el: ElementRef<'_>) {
        if is_non_content(&el) || (self.skip)(&el) {
            return;
        }

        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let inner = single_line(&self.capture(el));
                if !inner.is_empty() {
                    self.blank_line();
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                    self.out.push_str(&inner);
                    self.blank_line();
                }
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "aside"
            | "nav" | "figure" | "figcaption" | "details" | "summary" | "address" | "dl"
            | "dd" | "dt" | "body" | "html" => {
                self.blank_line();
                self.children(el);
                self.blank_line();
            }
            "br" => {
                self.trim_trailing_spaces();
                self.out.push('\n');
            }
            "hr" => {
                self.blank_line();
                self.out.push_str("---");
                self.blank_line();
            }
            "ul" | "ol" => {
                let kind = if name == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Unordered
                };
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.newline();
                }
                self.lists.push(kind);
                self.children(el);
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            "li" => self.list_item(el),
            "strong" | "b" => self.wrap_inline(el, "**"),
            "em" | "i" => self.wrap_inline(el, "*"),
            "del" | "s" | "strike" => self.wrap_inline(el, "~~"),
            "code" | "kbd" | "samp" => {
                let code: String = el.text().collect();
                let code = code.trim();
                if !code.is_empty() {
                    let fence = if code.contains('`') { "``" } else { "`" };
                    self.out.push_str(fence);
                    self.out.push_str(code);
                    self.out.push_str(fence);
                }
            }
            "pre" => self.preformatted(el),
            "blockquote" => {
                let inner = tidy(&self.capture(el));
                if !inner.is_empty() {
                    self.blank_line();
                    let quoted: Vec<String> = inner
                        .lines()
                        .map(|line| {
                            if line.is_empty() {
                                ">".to_string()
                            } else {
                                format!("> {line}")
                            }
                        })
                        .collect();
                    self.out.push_str(&quoted.join("\n"));
                    self.blank_line();
                }
            }
            "a" => self.anchor(el),
            "img" => {
                let alt = el.value().attr("alt").unwrap_or("").trim();
                let src = el.value().attr("src").unwrap_or("").trim();
                if !alt.is_empty() && !src.is_empty() && !src.starts_with("data:") {
                    let src = self.resolve(src);
                    self.out.push_str(&format!("![{alt}]({src})"));
                }
            }
            "table" => self.table(el),
            _ => self.children(el),
        }
    }

    fn list_item(&mut self, el: ElementRef<'_>) {
        let depth = self.lists.len().max(1);
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("{n}. ")
            }
            _ => "- ".to_string(),
        };

        // Paragraphs inside list items must not break the item apart
        let item = self.capture(el);
        let mut lines = item.lines().filter(|l| !l.trim().is_empty());
        let Some(first) = lines.next() else {
            return;
        };

        self.newline();
        self.out.push_str(&"  ".repeat(depth - 1));
        self.out.push_str(&marker);
        self.out.push_str(first.trim_start());
        for line in lines {
            self.out.push('\n');
            if !line.starts_with(' ') {
                self.out.push_str(&"  ".repeat(depth));
            }
            self.out.push_str(line);
        }
    }

    fn wrap_inline(&mut self, el: ElementRef<'_>, marker: &str) {
        let inner = self.capture(el);
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            self.out.push_str(&inner);
            return;
        }
        if inner.starts_with(' ') && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
        self.out.push_str(marker);
        self.out.push_str(trimmed);
        self.out.push_str(marker);
        if inner.ends_with(' ') {
            self.out.push(' ');
        }
    }

    fn anchor(&mut self, el: ElementRef<'_>) {
        let text = single_line(&self.capture(el));
        if text.is_empty() {
            return;
        }
        let href = el.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            self.out.push_str(&text);
            return;
        }
        let href = self.resolve(href);
        self.out.push_str(&format!("[{text}]({href})"));
    }

    fn preformatted(&mut self, el: ElementRef<'_>) {
        let code: String = el.text().collect();
        let code = code.trim_matches('\n');
        if code.trim().is_empty() {
            return;
        }
        let language = code_language(el).unwrap_or_default();
        self.blank_line();
        self.out.push_str("```");
        self.out.push_str(&language);
        self.out.push('\n');
        self.out.push_str(code);
        self.out.push_str("\n```");
        self.blank_line();
    }

    fn table(&mut self, el: ElementRef<'_>) {
        let rows: Vec<Vec<String>> = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "td" | "th"))
                    .map(|cell| single_line(&self.capture(cell)).replace('|', "\\|"))
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return;
        }

        self.blank_line();
        for (i, row) in rows.iter().enumerate() {
            let mut cells = row.clone();
            cells.resize(width, String::new());
            self.out.push_str(&format!("| {} |\n", cells.join(" | ")));
            if i == 0 {
                let sep = vec!["---"; width];
                self.out.push_str(&format!("| {} |\n", sep.join(" | ")));
            }
        }
        self.blank_line();
    }

    fn resolve(&self, link: &str) -> String {
        match self.base {
            Some(base) => base
                .join(link)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| link.to_string()),
            None => link.to_string(),
        }
    }

    fn trim_trailing_spaces(&mut self) {
        while self.out.ends_with(' ') {
            self.out.pop();
        }
    }

    fn newline(&mut self) {
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn blank_line(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() {
            return;
        }
        if !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        if !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Language hint from `class="language-x"` on a `<pre>` or its `<code>`
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    std::iter::once(pre)
        .chain(
            pre.children()
                .filter_map(ElementRef::wrap)
                .filter(|c| c.value().name() == "code"),
        )
        .flat_map(|e| e.value().classes().collect::<Vec<_>>())
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most one blank line between blocks and drop trailing spaces,
/// leaving fenced code untouched
pub(crate) fn tidy(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut blank_run = 0;
    let mut in_fence = false;

    for line in s.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let line = if in_fence { line } else { line.trim_end() };
        if line.is_empty() && !in_fence {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        result.push_str(line);
        result.push('\n');
    }

    result.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let md = html_to_markdown("<h1>Title</h1><h2>Sub  <em>title</em></h2>");
        assert_eq!(md, "# Title\n\n## Sub *title*");
    }

    #[test]
    fn test_paragraphs() {
        let md = html_to_markdown("<p>First\n   paragraph</p><p>Second paragraph</p>");
        assert_eq!(md, "First paragraph\n\nSecond paragraph");
    }

    #[test]
    fn test_lists() {
        let md = html_to_markdown(
            "<ul><li>Item 1</li><li>Item 2<ul><li>Nested</li></ul></li></ul><ol><li>One</li><li>Two</li></ol>",
        );
        assert!(md.contains("- Item 1\n- Item 2\n  - Nested"), "{md}");
        assert!(md.contains("1. One\n2. Two"), "{md}");
    }

    #[test]
    fn test_list_item_with_paragraph() {
        let md = html_to_markdown("<ul><li><p>Wrapped</p></li><li>Plain</li></ul>");
        assert_eq!(md, "- Wrapped\n- Plain");
    }

    #[test]
    fn test_emphasis() {
        let md = html_to_markdown("<p><strong>bold</strong> and <em>italic</em></p>");
        assert_eq!(md, "**bold** and *italic*");
    }

    #[test]
    fn test_code() {
        let md = html_to_markdown(
            "<p>Run <code>cargo test</code></p><pre><code class=\"language-rust\">fn main() {\n    println!(\"hi\");\n}</code></pre>",
        );
        assert!(md.contains("Run `cargo test`"));
        assert!(md.contains("```rust\nfn main() {\n    println!(\"hi\");\n}\n```"));
    }

    #[test]
    fn test_links_resolve_against_base() {
        let doc = Html::parse_document(
            "<p><a href=\"/docs\">Docs</a> <a href=\"#top\">Top</a> <a href=\"https://x.test/\">X</a></p>",
        );
        let base = Url::parse("https://example.com/guide/intro").unwrap();
        let md = element_to_markdown(doc.root_element(), Some(&base), &|_| false);
        assert_eq!(
            md,
            "[Docs](https://example.com/docs) Top [X](https://x.test/)"
        );
    }

    #[test]
    fn test_images_need_alt_text() {
        let md = html_to_markdown(
            "<p><img src=\"a.png\" alt=\"Chart\"><img src=\"spacer.gif\" alt=\"\"></p>",
        );
        assert_eq!(md, "![Chart](a.png)");
    }

    #[test]
    fn test_blockquote() {
        let md = html_to_markdown("<blockquote><p>Quoted</p><p>Twice</p></blockquote>");
        assert_eq!(md, "> Quoted\n>\n> Twice");
    }

    #[test]
    fn test_table() {
        let md = html_to_markdown(
            "<table><tr><th>Name</th><th>Value</th></tr><tr><td>a|b</td><td>1</td></tr></table>",
        );
        assert_eq!(md, "| Name | Value |\n| --- | --- |\n| a\\|b | 1 |");
    }

    #[test]
    fn test_skip_script_and_style() {
        let md = html_to_markdown(
            "<p>Before</p><script>alert('bad');</script><style>p{}</style><p>After</p>",
        );
        assert_eq!(md, "Before\n\nAfter");
    }

    #[test]
    fn test_skip_predicate() {
        let doc = Html::parse_document("<nav>Menu</nav><p>Body</p>");
        let md = element_to_markdown(doc.root_element(), None, &|el| {
            el.value().name() == "nav"
        });
        assert_eq!(md, "Body");
    }

    #[test]
    fn test_entities_are_decoded() {
        let md = html_to_markdown("<p>&amp; &lt; &gt; &quot; &mdash; &copy;</p>");
        assert_eq!(md, "& < > \" — ©");
    }

    #[test]
    fn test_tidy() {
        assert_eq!(tidy("a  \n\n\n\nb\n"), "a\n\nb");
        assert_eq!(tidy("```\ncode  \n\n\n\nmore\n```"), "```\ncode  \n\n\n\nmore\n```");
    }
}
