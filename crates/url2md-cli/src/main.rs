//! url2md CLI - Convert web pages to LLM-optimized markdown

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url2md::{
    compute_filename, compute_identity, BatchCoordinator, BatchOptions, BatchSummary,
    Config, ConversionResult, ConvertOverrides, Converter, ExtractionComparison, ExtractionMethod,
    JsMode, MethodSelection, StrategyChoice, DEFAULT_CONCURRENCY, MARKDOWN_EXTENSION,
};

const RULE_WIDTH: usize = 60;
const CONVERT_PREVIEW_CHARS: usize = 500;
const PREVIEW_CONTENT_CHARS: usize = 1000;

/// Output format for config-info
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum InfoFormat {
    /// Grouped, human readable
    #[default]
    Text,
    /// JSON, loadable with --config-file
    Json,
}

/// url2md - convert web pages to LLM-optimized markdown
#[derive(Parser, Debug)]
#[command(name = "url2md")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Output directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Disable JavaScript rendering globally
    #[arg(long, global = true)]
    no_js: bool,

    /// Disable content cleaning globally
    #[arg(long, global = true)]
    no_clean: bool,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Per-conversion switches shared by convert and batch
#[derive(Args, Debug, Default, Clone)]
struct ConversionFlags {
    /// Force JavaScript rendering, takes precedence over --no-js
    #[arg(long)]
    force_js: bool,

    /// Raw extraction without LLM optimization
    #[arg(long)]
    raw: bool,

    /// Display conversion metadata
    #[arg(long)]
    show_metadata: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a single URL to markdown
    Convert {
        /// URL to convert
        url: String,

        /// Output file path
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        flags: ConversionFlags,

        /// Preview without saving to file
        #[arg(long)]
        preview: bool,
    },
    /// Convert multiple URLs with bounded concurrency
    Batch {
        /// URLs to convert
        #[arg(required = true)]
        urls: Vec<String>,

        /// Number of concurrent conversions
        #[arg(long, short, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        #[command(flatten)]
        flags: ConversionFlags,

        /// Keep going when a conversion task faults
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Preview a conversion without saving
    Preview {
        /// URL to preview
        url: String,

        /// Show a content excerpt
        #[arg(long)]
        show_content: bool,
    },
    /// Compare extraction methods on a URL
    TestExtraction {
        /// URL to test
        url: String,

        /// structured, heuristic or both
        #[arg(long, default_value = "both")]
        method: MethodSelection,

        /// Show the size difference between methods
        #[arg(long)]
        show_diff: bool,
    },
    /// Print the content hash and filename for a URL
    Hash {
        /// URL to hash
        url: String,
    },
    /// Show the effective configuration
    ConfigInfo {
        /// Output format
        #[arg(long, default_value = "text")]
        format: InfoFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli).unwrap_or_else(|e| fail(&e));

    match cli.command {
        Commands::Convert {
            url,
            output,
            flags,
            preview,
        } => run_convert(config, &url, output, &flags, preview, cli.no_js).await,
        Commands::Batch {
            urls,
            concurrency,
            flags,
            continue_on_error,
        } => run_batch(config, &urls, concurrency, &flags, continue_on_error, cli.no_js).await,
        Commands::Preview { url, show_content } => run_preview(config, &url, show_content).await,
        Commands::TestExtraction {
            url,
            method,
            show_diff,
        } => run_test_extraction(config, &url, method, show_diff).await,
        Commands::Hash { url } => run_hash(&url),
        Commands::ConfigInfo { format } => run_config_info(&config, format),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("url2md=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("url2md=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the config file, then `URL2MD_*` variables, then flags
fn load_config(cli: &Cli) -> Result<Config, url2md::ConfigError> {
    let mut config = match &cli.config_file {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if cli.no_js {
        config.javascript = JsMode::Disabled;
    }
    if cli.no_clean {
        config.clean_content = false;
        config.llm_optimized = false;
    }
    tracing::debug!(config_file = ?cli.config_file, "Configuration loaded");
    Ok(config)
}

fn build_converter(config: Config) -> Converter {
    Converter::new(config).unwrap_or_else(|e| fail(&e))
}

fn conversion_overrides(flags: &ConversionFlags, no_js: bool) -> ConvertOverrides {
    let mut overrides = ConvertOverrides::default();
    if flags.force_js {
        overrides = overrides.javascript(JsMode::Enabled);
    } else if no_js {
        overrides = overrides.javascript(JsMode::Disabled);
    }
    if flags.raw {
        overrides = overrides.raw().strategy(StrategyChoice::Heuristic);
    }
    overrides
}

async fn run_convert(
    config: Config,
    url: &str,
    output: Option<PathBuf>,
    flags: &ConversionFlags,
    preview: bool,
    no_js: bool,
) {
    let mut overrides = conversion_overrides(flags, no_js);
    if preview {
        overrides.output = url2md::OutputTarget::Preview;
    } else if let Some(path) = output {
        overrides = overrides.output_path(path);
    }

    let converter = build_converter(config);
    let result = converter.convert(url, &overrides).await;
    writeln_safe(&format_result(&result, flags.show_metadata));

    if preview && result.success {
        writeln_safe("");
        writeln_safe(&format!(
            "📄 Content Preview (first {CONVERT_PREVIEW_CHARS} chars):"
        ));
        writeln_safe(&rule());
        writeln_safe(&excerpt(&result.markdown, CONVERT_PREVIEW_CHARS, false));
        writeln_safe(&rule());
    }
    if !result.success {
        std::process::exit(1);
    }
}

async fn run_batch(
    config: Config,
    urls: &[String],
    concurrency: usize,
    flags: &ConversionFlags,
    continue_on_error: bool,
    no_js: bool,
) {
    let output_dir = config.output_dir.clone();
    let options = BatchOptions::new(concurrency)
        .continue_on_error(continue_on_error)
        .overrides(conversion_overrides(flags, no_js));

    writeln_safe(&format!(
        "🚀 Starting batch conversion of {} URLs with {} concurrent workers",
        urls.len(),
        concurrency
    ));

    let coordinator = BatchCoordinator::new(Arc::new(build_converter(config)))
        .with_progress(|done, total| tracing::debug!(done, total, "Batch progress"));
    let outcomes = match coordinator.convert_batch(urls, &options).await {
        Ok(outcomes) => outcomes,
        Err(e) => fail(&e),
    };

    for (url, outcome) in urls.iter().zip(&outcomes) {
        let line = match outcome {
            Ok(result) if result.success && flags.show_metadata => format_result(result, true),
            Ok(result) if result.success => format!("✅ {} <- {}", result.filename, result.url),
            Ok(result) => format!(
                "❌ {}: {}",
                url,
                result.error.as_deref().unwrap_or("Unknown error")
            ),
            Err(e) => format!("❌ {url}: {e}"),
        };
        writeln_safe(&line);
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    writeln_safe(&format_batch_summary(&summary, &output_dir));
}

async fn run_preview(config: Config, url: &str, show_content: bool) {
    let converter = build_converter(config);
    let result = converter.convert(url, &ConvertOverrides::preview()).await;

    if !result.success {
        eprintln!(
            "❌ Preview failed: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
        std::process::exit(1);
    }

    writeln_safe(&format!("✅ Preview for: {}", result.url));
    writeln_safe(&format!("   📄 Title: {}", result.title));
    writeln_safe(&format!("   📊 Size: {} characters", result.size));
    writeln_safe(&format!("   ⚡ Method: {}", method_label(&result)));
    writeln_safe(&format!("   📁 Would save as: {}", result.filename));

    if show_content {
        writeln_safe("");
        writeln_safe("📄 Content Preview:");
        writeln_safe(&rule());
        writeln_safe(&excerpt(&result.markdown, PREVIEW_CONTENT_CHARS, true));
        writeln_safe(&rule());
    }
}

async fn run_test_extraction(config: Config, url: &str, method: MethodSelection, show_diff: bool) {
    writeln_safe(&format!("🧪 Testing extraction methods for: {url}"));

    let converter = build_converter(config);
    let comparison = match converter
        .compare_extraction(url, method, &ConvertOverrides::default())
        .await
    {
        Ok(comparison) => comparison,
        Err(e) => fail(&e),
    };

    for report in &comparison.reports {
        writeln_safe("");
        writeln_safe(&format!("🔍 Testing {}...", report.method));
        match &report.error {
            None => writeln_safe(&format!("   ✅ Size: {} chars", report.size)),
            Some(e) => writeln_safe(&format!("   ❌ Failed: {e}")),
        }
    }

    if show_diff {
        if let Some(diff) = format_size_diff(&comparison) {
            writeln_safe("");
            writeln_safe(&diff);
        }
    }
}

fn run_hash(url: &str) {
    let identity = compute_identity(url).unwrap_or_else(|e| fail(&e));
    let filename = compute_filename(url, MARKDOWN_EXTENSION).unwrap_or_else(|e| fail(&e));

    writeln_safe(&format!("URL: {url}"));
    writeln_safe(&format!("Hash: {}", identity.as_str()));
    writeln_safe(&format!("Filename: {filename}"));
}

fn run_config_info(config: &Config, format: InfoFormat) {
    match format {
        InfoFormat::Json => {
            let json = serde_json::to_string_pretty(config).unwrap_or_else(|e| {
                eprintln!("Error serializing config: {}", e);
                std::process::exit(1);
            });
            writeln_safe(&json);
        }
        InfoFormat::Text => writeln_safe(&format_config_text(config)),
    }
}

fn method_label(result: &ConversionResult) -> &'static str {
    result
        .extraction_method
        .map_or("unknown", |m: ExtractionMethod| m.as_str())
}

/// Multi-line report for one conversion
fn format_result(result: &ConversionResult, show_metadata: bool) -> String {
    let mut out = String::new();
    if !result.success {
        out.push_str(&format!("❌ Failed to convert: {}\n", result.url));
        out.push_str(&format!(
            "   Error: {}",
            result.error.as_deref().unwrap_or("Unknown error")
        ));
        return out;
    }

    out.push_str(&format!("✅ Successfully converted: {}\n", result.url));
    out.push_str(&format!("   📄 Title: {}\n", result.title));
    out.push_str(&format!("   📁 File: {}\n", result.filename));
    if let Some(path) = &result.output_path {
        out.push_str(&format!("   💾 Saved to: {}\n", path.display()));
    }
    out.push_str(&format!("   📊 Size: {} characters\n", result.size));
    out.push_str(&format!("   ⚡ Method: {}\n", method_label(result)));
    out.push_str(&format!(
        "   ⏱️  Time: {:.2}s",
        result.processing_time().as_secs_f64()
    ));

    if show_metadata && !result.metadata.is_empty() {
        let json = serde_json::to_string_pretty(&result.metadata).unwrap_or_default();
        out.push_str(&format!("\n   🔍 Metadata: {json}"));
    }
    out
}

fn format_batch_summary(summary: &BatchSummary, output_dir: &std::path::Path) -> String {
    let mut out = String::from("\n📊 Batch conversion completed:\n");
    out.push_str(&format!("   ✅ Successful: {}\n", summary.succeeded));
    out.push_str(&format!("   ❌ Failed: {}\n", summary.unsuccessful()));
    if summary.cached > 0 {
        out.push_str(&format!("   ♻️  Cached: {}\n", summary.cached));
    }
    out.push_str(&format!("   📁 Output directory: {}", output_dir.display()));
    out
}

/// Structured vs heuristic size comparison, when both succeeded
fn format_size_diff(comparison: &ExtractionComparison) -> Option<String> {
    let structured = comparison.report(ExtractionMethod::Structured)?;
    let heuristic = comparison.report(ExtractionMethod::Heuristic)?;
    if structured.error.is_some() || heuristic.error.is_some() {
        return None;
    }

    let diff = structured.size as i64 - heuristic.size as i64;
    let percent = if heuristic.size > 0 {
        diff as f64 / heuristic.size as f64 * 100.0
    } else {
        0.0
    };
    let verdict = if percent < -50.0 {
        "🎯 Structured extraction produced significantly cleaner content!"
    } else if percent > 50.0 {
        "⚠️  Structured extraction may have missed some content"
    } else {
        "✅ Both methods produced similar amounts of content"
    };

    Some(format!(
        "📊 Comparison:\n   Structured: {} chars\n   Heuristic: {} chars\n   Difference: {:+} chars ({:+.1}%)\n   {}",
        structured.size, heuristic.size, diff, percent, verdict
    ))
}

fn format_config_text(config: &Config) -> String {
    let sections: [(&str, Vec<(&str, String)>); 5] = [
        (
            "Output Settings",
            vec![("Output Directory", config.output_dir.display().to_string())],
        ),
        (
            "Network Settings",
            vec![
                ("Timeout (seconds)", config.timeout.as_secs_f64().to_string()),
                ("User Agent", config.user_agent.clone()),
                ("Max Retries", config.max_retries.to_string()),
                (
                    "Retry Backoff (seconds)",
                    config.retry_backoff.as_secs_f64().to_string(),
                ),
            ],
        ),
        (
            "Rate Limiting & Cache",
            vec![
                ("Rate Limit Enabled", config.rate_limit_enabled.to_string()),
                (
                    "Min Interval (seconds)",
                    config.rate_limit_min_interval.as_secs_f64().to_string(),
                ),
                ("Cache Enabled", config.cache_enabled.to_string()),
                ("Cache TTL (seconds)", config.cache_ttl.as_secs().to_string()),
            ],
        ),
        (
            "Content Extraction",
            vec![
                ("JavaScript", config.javascript.to_string()),
                (
                    "Use Structured Extraction",
                    config.use_structured_extraction.to_string(),
                ),
                ("Clean Content", config.clean_content.to_string()),
                ("LLM Optimized", config.llm_optimized.to_string()),
                (
                    "Min Acceptable Length",
                    config.min_acceptable_length.to_string(),
                ),
            ],
        ),
        (
            "Content Filtering",
            vec![
                (
                    "Remove Cookie Banners",
                    config.filters.remove_cookie_banners.to_string(),
                ),
                (
                    "Remove Navigation",
                    config.filters.remove_navigation.to_string(),
                ),
                ("Remove Ads", config.filters.remove_ads.to_string()),
                (
                    "Remove Social Media",
                    config.filters.remove_social_media.to_string(),
                ),
            ],
        ),
    ];

    let mut out = String::from("🔧 Current Configuration:\n");
    out.push_str(&"─".repeat(40));
    for (section, settings) in sections {
        out.push_str(&format!("\n\n{section}:"));
        for (label, value) in settings {
            out.push_str(&format!("\n  {label}: {value}"));
        }
    }
    out
}

/// First `limit` chars of `text`, marking what was cut
fn excerpt(text: &str, limit: usize, count_remaining: bool) -> String {
    let total = text.chars().count();
    let mut out: String = text.chars().take(limit).collect();
    if total > limit {
        if count_remaining {
            out.push_str(&format!("\n... ({} more characters)", total - limit));
        } else {
            out.push_str("...");
        }
    }
    out
}

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// Print an error with its source chain and exit
fn fail(err: &dyn Error) -> ! {
    eprintln!("Error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
    std::process::exit(1);
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
