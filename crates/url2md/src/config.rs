//! Conversion configuration
//!
//! [`Config`] is the shared, read-only base. Each conversion derives its own
//! [`EffectiveConfig`] by merging a [`ConvertOverrides`] onto it, so
//! concurrent conversions never observe each other's settings.

use crate::error::ConfigError;
use crate::DEFAULT_USER_AGENT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// When to render pages with a headless browser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsMode {
    /// Always render
    Enabled,
    /// Never render
    Disabled,
    /// Plain fetch first, render when the page looks client-rendered
    #[default]
    Auto,
}

impl FromStr for JsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" | "true" | "enabled" | "1" => Ok(JsMode::Enabled),
            "off" | "false" | "disabled" | "0" => Ok(JsMode::Disabled),
            "auto" => Ok(JsMode::Auto),
            _ => Err(format!("Invalid JavaScript mode: {s}")),
        }
    }
}

impl std::fmt::Display for JsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsMode::Enabled => write!(f, "enabled"),
            JsMode::Disabled => write!(f, "disabled"),
            JsMode::Auto => write!(f, "auto"),
        }
    }
}

/// Extraction strategy requested for a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    /// Structured first, heuristic when the result is too short
    #[default]
    Auto,
    /// Structured extraction only
    Structured,
    /// Heuristic DOM extraction only
    Heuristic,
}

/// Named boilerplate-removal toggles for heuristic extraction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentFilters {
    pub remove_cookie_banners: bool,
    pub remove_navigation: bool,
    pub remove_ads: bool,
    pub remove_social_media: bool,
}

impl Default for ContentFilters {
    fn default() -> Self {
        Self {
            remove_cookie_banners: true,
            remove_navigation: true,
            remove_ads: true,
            remove_social_media: true,
        }
    }
}

/// Base configuration shared by every conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory markdown files are written to
    pub output_dir: PathBuf,
    /// JavaScript rendering policy
    pub javascript: JsMode,
    /// Use structured extraction (with heuristic fallback) by default
    pub use_structured_extraction: bool,
    /// Collapse whitespace and strip residual boilerplate
    pub clean_content: bool,
    /// Normalize heading structure for LLM consumption
    pub llm_optimized: bool,
    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Retries after the first failed fetch
    pub max_retries: u32,
    /// Base delay of the exponential retry backoff
    #[serde(with = "duration_secs")]
    pub retry_backoff: Duration,
    pub user_agent: String,
    pub rate_limit_enabled: bool,
    /// Minimum spacing between fetches to the same host
    #[serde(with = "duration_secs")]
    pub rate_limit_min_interval: Duration,
    /// Longest acceptable rate limiter wait, unbounded when absent
    #[serde(with = "opt_duration_secs")]
    pub rate_limit_max_wait: Option<Duration>,
    pub cache_enabled: bool,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    /// LRU capacity, unbounded when absent
    pub cache_max_entries: Option<usize>,
    /// Structured output shorter than this triggers the heuristic fallback
    pub min_acceptable_length: usize,
    /// Explicit Chrome/Chromium executable
    pub browser_path: Option<PathBuf>,
    /// Launch the browser with `--no-sandbox` (needed when running as root)
    pub browser_no_sandbox: bool,
    pub filters: ContentFilters,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            javascript: JsMode::Auto,
            use_structured_extraction: true,
            clean_content: true,
            llm_optimized: true,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_enabled: true,
            rate_limit_min_interval: Duration::from_millis(500),
            rate_limit_max_wait: None,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: None,
            min_acceptable_length: 200,
            browser_path: None,
            browser_no_sandbox: false,
            filters: ContentFilters::default(),
        }
    }
}

impl Config {
    /// Defaults overlaid with `URL2MD_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load a JSON config file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("URL2MD_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("URL2MD_JAVASCRIPT") {
            self.javascript = v.parse().map_err(|_| ConfigError::Env {
                var: "URL2MD_JAVASCRIPT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("URL2MD_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = lookup("URL2MD_BROWSER_PATH") {
            self.browser_path = Some(PathBuf::from(v));
        }

        set_bool(&lookup, "URL2MD_USE_STRUCTURED", &mut self.use_structured_extraction)?;
        set_bool(&lookup, "URL2MD_CLEAN_CONTENT", &mut self.clean_content)?;
        set_bool(&lookup, "URL2MD_LLM_OPTIMIZED", &mut self.llm_optimized)?;
        set_bool(&lookup, "URL2MD_RATE_LIMIT", &mut self.rate_limit_enabled)?;
        set_bool(&lookup, "URL2MD_CACHE", &mut self.cache_enabled)?;
        set_bool(&lookup, "URL2MD_BROWSER_NO_SANDBOX", &mut self.browser_no_sandbox)?;
        set_bool(
            &lookup,
            "URL2MD_REMOVE_COOKIE_BANNERS",
            &mut self.filters.remove_cookie_banners,
        )?;
        set_bool(
            &lookup,
            "URL2MD_REMOVE_NAVIGATION",
            &mut self.filters.remove_navigation,
        )?;
        set_bool(&lookup, "URL2MD_REMOVE_ADS", &mut self.filters.remove_ads)?;
        set_bool(
            &lookup,
            "URL2MD_REMOVE_SOCIAL_MEDIA",
            &mut self.filters.remove_social_media,
        )?;

        set_secs(&lookup, "URL2MD_TIMEOUT", &mut self.timeout)?;
        set_secs(
            &lookup,
            "URL2MD_RATE_LIMIT_INTERVAL",
            &mut self.rate_limit_min_interval,
        )?;
        set_secs(&lookup, "URL2MD_CACHE_TTL", &mut self.cache_ttl)?;
        set_parsed(&lookup, "URL2MD_MAX_RETRIES", &mut self.max_retries)?;
        set_parsed(
            &lookup,
            "URL2MD_MIN_CONTENT_LENGTH",
            &mut self.min_acceptable_length,
        )?;
        Ok(())
    }

    /// Derive the per-call configuration
    pub fn with_overrides(&self, overrides: &ConvertOverrides) -> EffectiveConfig {
        let strategy = overrides.strategy.unwrap_or(if self.use_structured_extraction {
            StrategyChoice::Auto
        } else {
            StrategyChoice::Heuristic
        });

        EffectiveConfig {
            javascript: overrides.javascript.unwrap_or(self.javascript),
            strategy,
            clean_content: overrides.clean_content.unwrap_or(self.clean_content),
            llm_optimized: overrides.llm_optimized.unwrap_or(self.llm_optimized),
            output: overrides.output.clone(),
            bypass_cache: overrides.bypass_cache,
            output_dir: self.output_dir.clone(),
            timeout: self.timeout,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            min_acceptable_length: self.min_acceptable_length,
            filters: self.filters.clone(),
        }
    }
}

/// Where the markdown of a conversion goes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    /// `output_dir/{identity}.md`
    #[default]
    OutputDir,
    /// Explicit file path
    Path(PathBuf),
    /// Do not write anything
    Preview,
}

/// Per-call settings layered over [`Config`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertOverrides {
    pub javascript: Option<JsMode>,
    pub strategy: Option<StrategyChoice>,
    pub clean_content: Option<bool>,
    pub llm_optimized: Option<bool>,
    pub output: OutputTarget,
    /// Skip the cache lookup (the result is still stored)
    pub bypass_cache: bool,
}

impl ConvertOverrides {
    /// Overrides that only switch to preview mode
    pub fn preview() -> Self {
        Self {
            output: OutputTarget::Preview,
            ..Default::default()
        }
    }

    /// Set the JavaScript mode
    pub fn javascript(mut self, mode: JsMode) -> Self {
        self.javascript = Some(mode);
        self
    }

    /// Pin an extraction strategy
    pub fn strategy(mut self, strategy: StrategyChoice) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Raw extraction: no cleaning, no LLM normalization
    pub fn raw(mut self) -> Self {
        self.clean_content = Some(false);
        self.llm_optimized = Some(false);
        self
    }

    /// Write to an explicit path
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = OutputTarget::Path(path.into());
        self
    }

    /// Ignore cached results
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// Immutable configuration snapshot for one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub javascript: JsMode,
    pub strategy: StrategyChoice,
    pub clean_content: bool,
    pub llm_optimized: bool,
    pub output: OutputTarget,
    pub bypass_cache: bool,
    pub output_dir: PathBuf,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub min_acceptable_length: usize,
    pub filters: ContentFilters,
}

impl EffectiveConfig {
    /// Digest of every setting that changes the produced result
    pub fn fingerprint(&self) -> String {
        let output = match &self.output {
            OutputTarget::OutputDir => format!("dir:{}", self.output_dir.display()),
            OutputTarget::Path(path) => format!("path:{}", path.display()),
            OutputTarget::Preview => "preview".to_string(),
        };
        let f = &self.filters;
        let material = format!(
            "js={};strategy={:?};clean={};llm={};min={};filters={},{},{},{};out={}",
            self.javascript,
            self.strategy,
            self.clean_content,
            self.llm_optimized,
            self.min_acceptable_length,
            f.remove_cookie_banners,
            f.remove_navigation,
            f.remove_ads,
            f.remove_social_media,
            output,
        );
        let mut digest = crate::identity::sha256_hex(material.as_bytes());
        digest.truncate(16);
        digest
    }
}

fn set_bool<F>(lookup: &F, var: &'static str, target: &mut bool) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(var) {
        *target = match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(ConfigError::Env { var, value }),
        };
    }
    Ok(())
}

fn set_secs<F>(lookup: &F, var: &'static str, target: &mut Duration) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(var) {
        *target = value
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or(ConfigError::Env { var, value })?;
    }
    Ok(())
}

fn set_parsed<F, T>(lookup: &F, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *target = value.parse().map_err(|_| ConfigError::Env { var, value })?;
    }
    Ok(())
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
