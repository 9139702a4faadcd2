//! Single-URL conversion pipeline
//!
//! [`Converter::convert`] runs: identity and cache lookup, rate limiting,
//! fetch (with retries and optional JavaScript rendering), extraction,
//! cleaning, persistence and cache store. Every failure is folded into the
//! returned [`ConversionResult`].

use crate::cache::{CacheKey, ResponseCache};
use crate::clean::{clean_markdown, llm_optimize};
use crate::config::{Config, ConvertOverrides, EffectiveConfig, JsMode, OutputTarget};
use crate::error::{ConvertError, ExtractionError, FetchError};
use crate::extract::{extract_with_policy, strategy_for, MethodSelection};
use crate::fetchers::{looks_client_rendered, ChromeRenderer, Fetcher, HttpFetcher};
use crate::identity::{
    compute_identity, filename_for, host_key, identity_of, normalize_url, ContentIdentity,
};
use crate::persist::write_atomic_async;
use crate::rate_limit::RateLimiter;
use crate::types::{ConversionResult, ExtractionMethod, FetchRequest, FetchedPage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Title used when a page has none
pub(crate) const UNTITLED: &str = "Untitled";

/// Extension of written markdown files
pub const MARKDOWN_EXTENSION: &str = "md";

/// Upper bound on a single retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(60);

enum RendererSetting {
    Discover,
    Disabled,
    Custom(Arc<dyn Fetcher>),
}

/// Builder for [`Converter`]
pub struct ConverterBuilder {
    config: Config,
    http: Option<Arc<dyn Fetcher>>,
    renderer: RendererSetting,
    rate_limiter: Option<RateLimiter>,
    cache: Option<ResponseCache>,
}

impl ConverterBuilder {
    /// Start from a base configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            renderer: RendererSetting::Discover,
            rate_limiter: None,
            cache: None,
        }
    }

    /// Replace the plain HTTP fetcher
    pub fn http_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.http = Some(fetcher);
        self
    }

    /// Use a specific JavaScript renderer instead of discovering Chrome
    pub fn renderer(mut self, renderer: Arc<dyn Fetcher>) -> Self {
        self.renderer = RendererSetting::Custom(renderer);
        self
    }

    /// Never render JavaScript
    pub fn without_renderer(mut self) -> Self {
        self.renderer = RendererSetting::Disabled;
        self
    }

    /// Share a rate limiter instead of building one from the config
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Use a cache instead of building one from the config
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the converter
    ///
    /// Fails only if the HTTP client cannot be created. A missing browser
    /// is not an error; rendering requests then fail per conversion.
    pub fn build(self) -> Result<Converter, FetchError> {
        let http = match self.http {
            Some(http) => http,
            None => Arc::new(HttpFetcher::new(&self.config.user_agent)?),
        };

        let renderer = match self.renderer {
            RendererSetting::Custom(renderer) => Some(renderer),
            RendererSetting::Disabled => None,
            RendererSetting::Discover if self.config.javascript == JsMode::Disabled => None,
            RendererSetting::Discover => {
                match ChromeRenderer::discover(
                    self.config.browser_path.as_deref(),
                    &self.config.user_agent,
                ) {
                    Ok(chrome) if self.config.browser_no_sandbox => {
                        Some(Arc::new(chrome.without_sandbox()) as Arc<dyn Fetcher>)
                    }
                    Ok(chrome) => Some(Arc::new(chrome) as Arc<dyn Fetcher>),
                    Err(e) => {
                        debug!(error = %e, "JavaScript rendering disabled");
                        None
                    }
                }
            }
        };

        Ok(Converter {
            rate_limiter: self
                .rate_limiter
                .unwrap_or_else(|| RateLimiter::from_config(&self.config)),
            cache: self
                .cache
                .unwrap_or_else(|| ResponseCache::from_config(&self.config)),
            config: self.config,
            http,
            renderer,
        })
    }
}

/// Output of one strategy in [`Converter::compare_extraction`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReport {
    pub method: ExtractionMethod,
    pub title: Option<String>,
    /// Markdown length in characters, 0 on failure
    pub size: usize,
    pub markdown: String,
    pub error: Option<String>,
}

/// Side-by-side extraction results for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionComparison {
    pub url: String,
    pub final_url: String,
    /// Size of the fetched document in bytes
    pub html_size: usize,
    pub reports: Vec<MethodReport>,
}

impl ExtractionComparison {
    /// Report for `method`, if it was run
    pub fn report(&self, method: ExtractionMethod) -> Option<&MethodReport> {
        self.reports.iter().find(|r| r.method == method)
    }
}

/// Converts URLs to markdown
///
/// Shares its rate limiter and cache across every conversion, including
/// those run concurrently by a [`BatchCoordinator`](crate::BatchCoordinator).
pub struct Converter {
    config: Config,
    http: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Fetcher>>,
    rate_limiter: RateLimiter,
    cache: ResponseCache,
}

impl Converter {
    /// Create a converter with default engines
    pub fn new(config: Config) -> Result<Self, FetchError> {
        ConverterBuilder::new(config).build()
    }

    /// Create a converter builder
    pub fn builder(config: Config) -> ConverterBuilder {
        ConverterBuilder::new(config)
    }

    /// Base configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Result cache
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Whether a JavaScript renderer is available
    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Identity of a URL
    pub fn identity(&self, url: &str) -> Result<ContentIdentity, ConvertError> {
        compute_identity(url)
    }

    /// Convert one URL
    pub async fn convert(&self, url: &str, overrides: &ConvertOverrides) -> ConversionResult {
        let effective = self.config.with_overrides(overrides);

        let normalized = match normalize_url(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(url, error = %e, "Rejected URL");
                return ConversionResult::failure(url, e.kind(), e.to_string());
            }
        };
        let identity = identity_of(&normalized);
        let filename = filename_for(&identity, MARKDOWN_EXTENSION);
        let key = CacheKey::new(identity, effective.fingerprint());

        if !effective.bypass_cache {
            if let Some(mut cached) = self.cache.lookup(&key) {
                debug!(url, "Serving cached result");
                cached.metadata.insert("source".to_string(), "cache".to_string());
                return cached;
            }
        }

        let target = fetch_target(url, &normalized);
        let host = host_key(&normalized);
        let mut result = match self.run(url, &target, &host, &effective, &filename).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url, error = %e, "Conversion failed");
                let mut failed = ConversionResult::failure(url, e.kind(), e.to_string());
                failed.filename = filename;
                return failed;
            }
        };

        let target = match &effective.output {
            OutputTarget::OutputDir => Some(effective.output_dir.join(&filename)),
            OutputTarget::Path(path) => Some(path.clone()),
            OutputTarget::Preview => None,
        };
        if let Some(target) = target {
            match write_atomic_async(target.clone(), result.markdown.clone()).await {
                Ok(()) => result.output_path = Some(target),
                Err(e) => {
                    warn!(url, error = %e, "Failed to save markdown");
                    result.success = false;
                    result.error_kind = Some(e.kind());
                    result.error = Some(e.to_string());
                }
            }
        }

        if result.success {
            info!(
                url,
                method = ?result.extraction_method,
                size = result.size,
                ms = result.processing_ms,
                "Converted"
            );
            self.cache.store(key, result.clone());
        }
        result
    }

    /// Fetch a page once and run the selected strategies on it
    ///
    /// Diagnostic only: nothing is cleaned, cached or written.
    pub async fn compare_extraction(
        &self,
        url: &str,
        selection: MethodSelection,
        overrides: &ConvertOverrides,
    ) -> Result<ExtractionComparison, ConvertError> {
        let effective = self.config.with_overrides(overrides);
        let normalized = normalize_url(url)?;
        let target = fetch_target(url, &normalized);
        let page = self
            .fetch_page(&target, &host_key(&normalized), &effective)
            .await?;
        let page_url = Url::parse(&page.final_url).unwrap_or(target);

        let reports = selection
            .methods()
            .into_iter()
            .map(|method| {
                match strategy_for(method, &effective.filters).extract(&page.html, &page_url) {
                    Ok(content) => MethodReport {
                        method,
                        size: content.len(),
                        title: content.title,
                        markdown: content.body,
                        error: None,
                    },
                    Err(e) => MethodReport {
                        method,
                        title: None,
                        size: 0,
                        markdown: String::new(),
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();

        Ok(ExtractionComparison {
            url: url.to_string(),
            final_url: page.final_url,
            html_size: page.html.len(),
            reports,
        })
    }

    /// Fetch, extract and clean
    async fn run(
        &self,
        raw: &str,
        url: &Url,
        host: &str,
        effective: &EffectiveConfig,
        filename: &str,
    ) -> Result<ConversionResult, ConvertError> {
        let started = Instant::now();
        let page = self.fetch_page(url, host, effective).await?;
        let page_url = Url::parse(&page.final_url).unwrap_or_else(|_| url.clone());

        let extraction = extract_with_policy(
            effective.strategy,
            &page.html,
            &page_url,
            &effective.filters,
            effective.min_acceptable_length,
        )?;
        debug!(url = raw, method = %extraction.method, size = extraction.content.len(), "Extracted");

        let title = extraction
            .content
            .title
            .clone()
            .unwrap_or_else(|| UNTITLED.to_string());
        let mut markdown = extraction.content.body;
        if effective.clean_content {
            markdown = clean_markdown(&markdown);
        }
        if effective.llm_optimized {
            markdown = llm_optimize(&markdown, &title);
        }
        if markdown.trim().is_empty() {
            return Err(ExtractionError::NoContent {
                method: extraction.method.as_str(),
            }
            .into());
        }

        let mut metadata = extraction.content.metadata;
        metadata.insert("status_code".to_string(), page.status_code.to_string());
        if page.rendered {
            metadata.insert("rendered".to_string(), "true".to_string());
        }
        if page.truncated {
            metadata.insert("truncated".to_string(), "true".to_string());
        }
        if let Some(fallback) = &extraction.fallback {
            metadata.insert("fallback".to_string(), "true".to_string());
            metadata.insert(
                "structured_length".to_string(),
                fallback.structured_length.to_string(),
            );
        }

        Ok(ConversionResult {
            success: true,
            url: raw.to_string(),
            final_url: Some(page.final_url),
            title,
            filename: filename.to_string(),
            output_path: None,
            size: markdown.chars().count(),
            markdown,
            extraction_method: Some(extraction.method),
            processing_ms: started.elapsed().as_millis() as u64,
            metadata,
            error: None,
            error_kind: None,
        })
    }

    /// Pick the fetch engine for the JavaScript mode
    async fn fetch_page(
        &self,
        url: &Url,
        host: &str,
        effective: &EffectiveConfig,
    ) -> Result<FetchedPage, ConvertError> {
        let request = FetchRequest::new(url.as_str(), effective.timeout);

        match effective.javascript {
            JsMode::Disabled => {
                self.fetch_with_retry(self.http.as_ref(), &request, host, effective)
                    .await
            }
            JsMode::Enabled => {
                let renderer = self.renderer.as_ref().ok_or_else(|| {
                    FetchError::RendererUnavailable(
                        "no headless browser configured".to_string(),
                    )
                })?;
                self.fetch_with_retry(renderer.as_ref(), &request, host, effective)
                    .await
            }
            JsMode::Auto => {
                let page = self
                    .fetch_with_retry(self.http.as_ref(), &request, host, effective)
                    .await?;
                let Some(renderer) = &self.renderer else {
                    return Ok(page);
                };
                if !looks_client_rendered(&page.html) {
                    return Ok(page);
                }

                debug!(url = %url, renderer = renderer.name(), "Page looks client-rendered");
                match self
                    .fetch_with_retry(renderer.as_ref(), &request, host, effective)
                    .await
                {
                    Ok(rendered) => Ok(rendered),
                    Err(e) => {
                        warn!(url = %url, error = %e, "Rendering failed, using static HTML");
                        Ok(page)
                    }
                }
            }
        }
    }

    /// Fetch through `fetcher`, waiting on the rate limiter before every attempt
    async fn fetch_with_retry(
        &self,
        fetcher: &dyn Fetcher,
        request: &FetchRequest,
        host: &str,
        effective: &EffectiveConfig,
    ) -> Result<FetchedPage, ConvertError> {
        let mut attempt = 0;
        loop {
            self.rate_limiter.acquire(host).await?;
            debug!(url = %request.url, host, fetcher = fetcher.name(), attempt, "Fetching");
            match fetcher.fetch(request).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < effective.max_retries && is_retryable(&e) => {
                    let delay = backoff(effective.retry_backoff, attempt);
                    warn!(
                        url = %request.url,
                        fetcher = fetcher.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// The URL as given, for fetching
///
/// Normalization only feeds the identity and rate limiter; servers may treat
/// `/docs/` and `/docs` differently.
fn fetch_target(raw: &str, normalized: &Url) -> Url {
    Url::parse(raw.trim()).unwrap_or_else(|_| normalized.clone())
}

/// Transient failures worth another attempt
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Timeout(_)
        | FetchError::Connect(_)
        | FetchError::Request(_)
        | FetchError::Renderer(_) => true,
        FetchError::Status(status) => *status >= 500 || *status == 408 || *status == 429,
        FetchError::ClientBuild(_)
        | FetchError::UnsupportedContent(_)
        | FetchError::RendererUnavailable(_) => false,
    }
}

/// `base * 2^attempt`, capped
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_BACKOFF)
}
