//! Markdown post-processing
//!
//! [`clean_markdown`] removes leftovers that survive extraction;
//! [`llm_optimize`] normalizes the heading structure.

use crate::convert::tidy;

/// Lines consisting only of one of these phrases are dropped
const RESIDUAL_PHRASES: &[&str] = &[
    "accept",
    "accept all",
    "accept all cookies",
    "accept cookies",
    "reject all",
    "manage cookies",
    "cookie settings",
    "we use cookies",
    "skip to content",
    "skip to main content",
    "skip to navigation",
    "back to top",
    "share",
    "share this",
    "share this article",
    "share on facebook",
    "share on twitter",
    "share on linkedin",
    "tweet",
    "advertisement",
    "sponsored",
    "subscribe to our newsletter",
    "sign up for our newsletter",
];

/// Collapse whitespace and drop residual boilerplate lines
///
/// Fenced code blocks are passed through untouched.
pub fn clean_markdown(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line.trim_end());
            out.push('\n');
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        if is_residual(line) {
            continue;
        }
        out.push_str(&collapse_inner_whitespace(line));
        out.push('\n');
    }

    tidy(&out)
}

/// Normalize headings for language-model consumption
///
/// A document without an H1 gets `# {title}` prepended. Without a usable
/// title, headings are shifted up so the top level becomes H1.
pub fn llm_optimize(markdown: &str, title: &str) -> String {
    let levels: Vec<usize> = with_fence_state(markdown)
        .filter(|(_, fenced)| !fenced)
        .filter_map(|(line, _)| heading_level(line))
        .collect();
    if levels.contains(&1) {
        return markdown.to_string();
    }

    let title = title.trim();
    if !title.is_empty() && title != crate::converter::UNTITLED {
        return tidy(&format!("# {title}\n\n{markdown}"));
    }

    let Some(shift) = levels.iter().min().map(|min| min - 1) else {
        return markdown.to_string();
    };
    let mut out = String::with_capacity(markdown.len());
    for (line, fenced) in with_fence_state(markdown) {
        match heading_level(line).filter(|_| !fenced) {
            Some(_) => out.push_str(&line[shift..]),
            None => out.push_str(line),
        }
        out.push('\n');
    }
    tidy(&out)
}

/// Lines paired with whether they sit inside a code fence
fn with_fence_state(markdown: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut in_fence = false;
    markdown.lines().map(move |line| {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            return (line, true);
        }
        (line, in_fence)
    })
}

fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) && line[hashes..].starts_with(' ') {
        Some(hashes)
    } else {
        None
    }
}

fn is_residual(line: &str) -> bool {
    let text: String = line
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '_' | '>' | '[' | ']' | '|' | '`'))
        .collect::<String>()
        .trim_start_matches(|c: char| c == '-' || c == ' ')
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | ' ' | ':'))
        .to_lowercase();
    let text = text.trim();
    !text.is_empty() && RESIDUAL_PHRASES.contains(&text)
}

/// Collapse runs of spaces after the leading indentation
fn collapse_inner_whitespace(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let mut out = String::with_capacity(line.len());
    out.push_str(indent);
    out.push_str(&body.split_whitespace().collect::<Vec<_>>().join(" "));
    out
}
