//! Headless Chrome/Chromium renderer

use crate::error::FetchError;
use crate::fetchers::Fetcher;
use crate::types::{FetchRequest, FetchedPage};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Environment variables naming a browser executable, checked in order
const BROWSER_ENV_VARS: &[&str] = &["CHROME_PATH", "CHROMIUM_PATH"];

/// Executable names searched on `PATH`
const BROWSER_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Install locations that are often missing from `PATH`
const WELL_KNOWN_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
];

/// Interval between DOM snapshots while waiting for scripts to settle
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Longest time spent waiting for the DOM to stop changing
const SETTLE_BUDGET: Duration = Duration::from_secs(5);

/// A launched browser and the task driving its CDP connection
struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl Drop for RunningBrowser {
    fn drop(&mut self) {
        // Dropping the browser kills the process; the profile dir goes last
        self.handler.abort();
    }
}

/// Renders pages in headless Chrome over the DevTools protocol
///
/// The browser is launched on first use and shared by every fetch; each
/// fetch opens its own tab. A browser that stops responding is relaunched
/// on the next fetch.
pub struct ChromeRenderer {
    executable: PathBuf,
    user_agent: String,
    sandbox: bool,
    running: Mutex<Option<Arc<RunningBrowser>>>,
}

impl std::fmt::Debug for ChromeRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeRenderer")
            .field("executable", &self.executable)
            .field("user_agent", &self.user_agent)
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}

impl ChromeRenderer {
    /// Use a known browser executable
    pub fn new(executable: impl Into<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            user_agent: user_agent.into(),
            sandbox: true,
            running: Mutex::new(None),
        }
    }

    /// Locate a browser, preferring `configured` when given
    pub fn discover(configured: Option<&Path>, user_agent: &str) -> Result<Self, FetchError> {
        let executable = find_browser(configured, |var| std::env::var_os(var)).ok_or_else(|| {
            FetchError::RendererUnavailable(
                "no Chrome or Chromium executable found (set CHROME_PATH)".to_string(),
            )
        })?;
        debug!(executable = %executable.display(), "Using headless browser");
        Ok(Self::new(executable, user_agent))
    }

    /// Run the browser without its sandbox
    pub fn without_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Path of the browser executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn browser_config(&self, profile: &Path) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfigBuilder::default()
            .chrome_executable(&self.executable)
            .user_data_dir(profile)
            .headless_mode(HeadlessMode::default())
            .arg(format!("--user-agent={}", self.user_agent))
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .arg("--mute-audio");
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(FetchError::RendererUnavailable)
    }

    async fn launch(&self) -> Result<RunningBrowser, FetchError> {
        let profile = tempfile::Builder::new()
            .prefix("url2md-chrome-")
            .tempdir()
            .map_err(|e| FetchError::RendererUnavailable(format!("profile dir: {e}")))?;
        let config = self.browser_config(profile.path())?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            FetchError::RendererUnavailable(format!(
                "failed to launch {}: {e}",
                self.executable.display()
            ))
        })?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler error");
                }
            }
        });
        debug!(executable = %self.executable.display(), "Launched headless browser");

        Ok(RunningBrowser {
            browser,
            handler,
            _profile: profile,
        })
    }

    async fn browser(&self) -> Result<Arc<RunningBrowser>, FetchError> {
        let mut running = self.running.lock().await;
        if let Some(browser) = running.as_ref() {
            return Ok(Arc::clone(browser));
        }
        let browser = Arc::new(self.launch().await?);
        *running = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Forget the shared browser so the next fetch relaunches it
    async fn discard(&self, stale: &Arc<RunningBrowser>) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|b| Arc::ptr_eq(b, stale)) {
            *running = None;
        }
    }

    async fn render(&self, running: &RunningBrowser, url: &str) -> Result<FetchedPage, FetchError> {
        let page = running.browser.new_page("about:blank").await.map_err(cdp_error)?;
        let result = navigate(&page, url).await;
        if let Err(e) = page.close().await {
            debug!(error = %e, "Failed to close tab");
        }
        result
    }
}

#[async_trait]
impl Fetcher for ChromeRenderer {
    fn name(&self) -> &'static str {
        "chrome"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let running = self.browser().await?;
        let result = tokio::time::timeout(request.timeout, self.render(&running, &request.url))
            .await
            .map_err(|_| FetchError::Timeout(request.timeout))
            .and_then(|r| r);

        if let Err(FetchError::Renderer(_)) = &result {
            self.discard(&running).await;
        }
        result
    }
}

/// Navigate `page`, wait for the load and for scripts to settle
async fn navigate(page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
    let navigation = page
        .execute(NavigateParams::new(url))
        .await
        .map_err(cdp_error)?;
    if let Some(error) = &navigation.result.error_text {
        return Err(FetchError::Request(format!("navigation failed: {error}")));
    }

    let response = page.wait_for_navigation_response().await.map_err(cdp_error)?;
    let status = response
        .as_ref()
        .and_then(|request| request.response.as_ref())
        .map(|response| response.status);

    let html = settled_content(page).await?;
    let final_url = page.url().await.map_err(cdp_error)?;
    rendered_page(url, status, final_url, html)
}

/// Poll the DOM until two consecutive snapshots match
async fn settled_content(page: &Page) -> Result<String, FetchError> {
    let deadline = Instant::now() + SETTLE_BUDGET;
    let mut html = page.content().await.map_err(cdp_error)?;
    while Instant::now() < deadline {
        tokio::time::sleep(SETTLE_POLL).await;
        let next = page.content().await.map_err(cdp_error)?;
        if next == html {
            break;
        }
        html = next;
    }
    Ok(html)
}

/// Turn navigation results into a page, applying the status check
fn rendered_page(
    request_url: &str,
    status: Option<i64>,
    final_url: Option<String>,
    html: String,
) -> Result<FetchedPage, FetchError> {
    // Pages served without a network response (about:, data:) count as 200
    let status_code = match status {
        Some(code) => u16::try_from(code)
            .map_err(|_| FetchError::Renderer(format!("invalid status {code}")))?,
        None => 200,
    };
    if !(200..300).contains(&status_code) {
        return Err(FetchError::Status(status_code));
    }
    if html.trim().is_empty() {
        return Err(FetchError::Renderer("browser returned an empty DOM".to_string()));
    }

    Ok(FetchedPage {
        final_url: final_url.unwrap_or_else(|| request_url.to_string()),
        status_code,
        content_type: Some("text/html".to_string()),
        html,
        truncated: false,
        rendered: true,
    })
}

fn cdp_error(err: CdpError) -> FetchError {
    FetchError::Renderer(err.to_string())
}

/// Find a browser executable
///
/// Order: `configured`, the `CHROME_PATH`/`CHROMIUM_PATH` variables, well
/// known install locations, then every directory of `PATH`. `env` looks up
/// environment variables.
pub fn find_browser<F>(configured: Option<&Path>, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = configured.filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }

    let from_env = BROWSER_ENV_VARS
        .iter()
        .filter_map(|var| env(var))
        .map(PathBuf::from)
        .find(|p| p.is_file());
    if from_env.is_some() {
        return from_env;
    }

    let well_known = WELL_KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file());
    if well_known.is_some() {
        return well_known;
    }

    let path_var = env("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        BROWSER_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_browser_prefers_configured() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = find_browser(Some(file.path()), |_| None);
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_find_browser_from_env() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().as_os_str().to_os_string();
        let found = find_browser(Some(Path::new("/nonexistent/chrome")), |var| {
            (var == "CHROMIUM_PATH").then(|| path.clone())
        });
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_find_browser_on_path() {
        if WELL_KNOWN_PATHS.iter().any(|p| Path::new(p).is_file()) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let browser = dir.path().join("chromium");
        std::fs::write(&browser, b"").unwrap();

        let path_var = dir.path().as_os_str().to_os_string();
        let found = find_browser(None, |var| (var == "PATH").then(|| path_var.clone()));
        assert_eq!(found, Some(browser));
    }

    #[test]
    fn test_browser_config_sandbox() {
        let profile = tempfile::tempdir().unwrap();
        let renderer = ChromeRenderer::new("/usr/bin/chromium", "TestAgent/1.0");
        assert!(renderer.sandbox);
        assert!(renderer.browser_config(profile.path()).is_ok());

        let renderer = renderer.without_sandbox();
        assert!(!renderer.sandbox);
        assert!(renderer.browser_config(profile.path()).is_ok());
    }

    #[test]
    fn test_rendered_page_keeps_final_url() {
        let page = rendered_page(
            "https://example.com/old",
            Some(200),
            Some("https://example.com/new".to_string()),
            "<html><body>hi</body></html>".to_string(),
        )
        .unwrap();
        assert!(page.rendered);
        assert_eq!(page.status_code, 200);
        assert_eq!(page.final_url, "https://example.com/new");
    }

    #[test]
    fn test_rendered_page_rejects_error_status() {
        let err = rendered_page(
            "https://example.com/missing",
            Some(404),
            Some("https://example.com/missing".to_string()),
            "<html><body>Not Found</body></html>".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[test]
    fn test_rendered_page_without_response() {
        let page = rendered_page("about:blank", None, None, "<html></html>".to_string()).unwrap();
        assert_eq!(page.status_code, 200);
        assert_eq!(page.final_url, "about:blank");

        let err = rendered_page("https://example.com", Some(200), None, "  ".to_string())
            .unwrap_err();
        assert!(matches!(err, FetchError::Renderer(_)));
    }

    #[tokio::test]
    async fn test_missing_executable_is_unavailable() {
        let renderer = ChromeRenderer::new("/nonexistent/chrome", "ua");
        let request = FetchRequest::new("https://example.com", Duration::from_secs(5));
        let err = renderer.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::RendererUnavailable(_)));
    }
}
