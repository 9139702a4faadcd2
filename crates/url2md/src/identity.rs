//! Deterministic identities and filenames for URLs
//!
//! Equivalent URLs normalize to the same string and therefore hash to the
//! same [`ContentIdentity`], which doubles as cache key and filename stem.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Hex-encoded SHA-256 of a normalized URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Length of the hex digest
    pub const LEN: usize = 64;

    /// Get the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse and normalize a URL
///
/// Scheme and host are lowercased and default ports dropped by the parser.
/// On top of that the fragment is removed and a trailing slash is stripped
/// from every path except the root.
pub fn normalize_url(raw: &str) -> Result<Url, ConvertError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConvertError::invalid_url(raw, "empty URL"));
    }

    let mut url = Url::parse(trimmed).map_err(|e| ConvertError::invalid_url(raw, e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConvertError::invalid_url(
            raw,
            "must start with http:// or https://",
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConvertError::invalid_url(raw, "missing host"));
    }

    url.set_fragment(None);

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let collapsed = path.trim_end_matches('/').to_string();
        let collapsed = if collapsed.is_empty() {
            "/".to_string()
        } else {
            collapsed
        };
        url.set_path(&collapsed);
    }

    Ok(url)
}

/// Compute the identity of a URL
pub fn compute_identity(raw: &str) -> Result<ContentIdentity, ConvertError> {
    let url = normalize_url(raw)?;
    Ok(identity_of(&url))
}

/// Compute `{identity}.{extension}` for a URL
pub fn compute_filename(raw: &str, extension: &str) -> Result<String, ConvertError> {
    let identity = compute_identity(raw)?;
    Ok(filename_for(&identity, extension))
}

/// Identity of an already normalized URL
pub(crate) fn identity_of(url: &Url) -> ContentIdentity {
    ContentIdentity(sha256_hex(url.as_str().as_bytes()))
}

pub(crate) fn filename_for(identity: &ContentIdentity, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    format!("{identity}.{extension}")
}

/// Rate limiting key: host plus any non-default port
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_hex_filename(name: &str) -> bool {
        let Some((stem, ext)) = name.split_once('.') else {
            return false;
        };
        ext == "md"
            && stem.len() == ContentIdentity::LEN
            && stem
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn test_equivalent_urls_share_identity() {
        let base = compute_identity("https://example.com/docs").unwrap();
        for variant in [
            "HTTPS://EXAMPLE.COM/docs",
            "https://example.com:443/docs",
            "https://example.com/docs/",
            "https://Example.com/docs#section-2",
            "  https://example.com/docs  ",
        ] {
            assert_eq!(compute_identity(variant).unwrap(), base, "{variant}");
        }
    }

    #[test]
    fn test_root_path_is_kept() {
        let a = compute_identity("https://example.com").unwrap();
        let b = compute_identity("https://example.com/").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            normalize_url("https://example.com//").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_distinct_urls_differ() {
        let a = compute_identity("https://example.com/a").unwrap();
        let b = compute_identity("https://example.com/b").unwrap();
        let c = compute_identity("http://example.com/a").unwrap();
        let d = compute_identity("https://example.com/a?page=2").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_path_case_is_significant() {
        let a = compute_identity("https://example.com/Docs").unwrap();
        let b = compute_identity("https://example.com/docs").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_filename_shape_is_bounded() {
        let long = format!("https://example.com/{}?q={}", "a/".repeat(500), "%20&x=<>".repeat(100));
        for url in [
            "https://example.com",
            "https://example.com/some page with spaces",
            "https://例え.jp/パス",
            long.as_str(),
        ] {
            let name = compute_filename(url, "md").unwrap();
            assert!(is_hex_filename(&name), "{name}");
        }
    }

    #[test]
    fn test_filename_extension_dot_is_tolerated() {
        let a = compute_filename("https://example.com", "md").unwrap();
        let b = compute_filename("https://example.com", ".md").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_urls_rejected() {
        for bad in ["", "   ", "not-a-url", "ftp://example.com/file", "mailto:a@b.c"] {
            let err = compute_identity(bad).unwrap_err();
            assert!(matches!(err, ConvertError::InvalidUrl { .. }), "{bad}");
        }
    }

    #[test]
    fn test_host_key() {
        let url = normalize_url("https://Example.com:8443/x").unwrap();
        assert_eq!(host_key(&url), "example.com:8443");
        let url = normalize_url("http://example.com:80/x").unwrap();
        assert_eq!(host_key(&url), "example.com");
    }
}
