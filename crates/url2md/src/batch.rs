//! Bounded concurrent conversion of many URLs
//!
//! Each URL is converted in its own spawned task, admitted in input order
//! with at most `concurrency` in flight. Results come back in input order.
//! A failed conversion is an ordinary [`ConversionResult`]; only a task that
//! panics or is cancelled counts as a batch fault.

use crate::config::ConvertOverrides;
use crate::converter::Converter;
use crate::error::BatchError;
use crate::types::ConversionResult;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{info, warn};

/// Outcome of one batch item
pub type BatchOutcome = Result<ConversionResult, BatchError>;

/// Progress callback: `(completed, total)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Default number of concurrent conversions
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Options for [`BatchCoordinator::convert_batch`]
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum conversions in flight, at least 1
    pub concurrency: usize,
    /// Record task faults in place instead of aborting the batch
    pub continue_on_error: bool,
    /// Overrides applied to every conversion
    pub overrides: ConvertOverrides,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            continue_on_error: false,
            overrides: ConvertOverrides::default(),
        }
    }
}

impl BatchOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    pub fn continue_on_error(mut self, enable: bool) -> Self {
        self.continue_on_error = enable;
        self
    }

    pub fn overrides(mut self, overrides: ConvertOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Counts over a finished batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Conversions with `success == true`
    pub succeeded: usize,
    /// Conversions that returned a failed result
    pub failed: usize,
    /// Tasks that panicked or were cancelled
    pub faults: usize,
    /// Successes served from the cache
    pub cached: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                Ok(result) if result.success => {
                    summary.succeeded += 1;
                    if result.is_cached() {
                        summary.cached += 1;
                    }
                }
                Ok(_) => summary.failed += 1,
                Err(_) => summary.faults += 1,
            }
        }
        summary
    }

    /// Items that did not succeed, for any reason
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.faults
    }
}

/// Runs conversions for a list of URLs
#[derive(Clone)]
pub struct BatchCoordinator {
    converter: Arc<Converter>,
    progress: Option<ProgressCallback>,
}

impl BatchCoordinator {
    pub fn new(converter: Arc<Converter>) -> Self {
        Self {
            converter,
            progress: None,
        }
    }

    /// Call `callback(completed, total)` after every finished item
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Convert every URL, returning outcomes in input order
    ///
    /// Without `continue_on_error` the first task fault is returned and all
    /// in-flight and queued conversions are aborted.
    pub async fn convert_batch<S>(
        &self,
        urls: &[S],
        options: &BatchOptions,
    ) -> Result<Vec<BatchOutcome>, BatchError>
    where
        S: AsRef<str>,
    {
        if options.concurrency == 0 {
            return Err(BatchError::InvalidConcurrency);
        }

        let total = urls.len();
        info!(total, concurrency = options.concurrency, "Starting batch");

        let overrides = Arc::new(options.overrides.clone());
        let completed = Arc::new(AtomicUsize::new(0));

        let tasks = urls.iter().enumerate().map(|(index, url)| {
            let url = url.as_ref().to_string();
            let converter = Arc::clone(&self.converter);
            let overrides = Arc::clone(&overrides);
            let completed = Arc::clone(&completed);
            let progress = self.progress.clone();

            async move {
                let task_url = url.clone();
                let handle = AbortOnDropHandle::new(tokio::spawn(async move {
                    converter.convert(&task_url, &overrides).await
                }));
                let outcome = handle.await.map_err(|e| BatchError::Task {
                    index,
                    url,
                    message: e.to_string(),
                });

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = progress {
                    cb(done, total);
                }
                (index, outcome)
            }
        });

        let mut slots: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
        let mut results = stream::iter(tasks).buffer_unordered(options.concurrency);

        while let Some((index, outcome)) = results.next().await {
            if let Err(fault) = &outcome {
                warn!(error = %fault, "Batch task fault");
                if !options.continue_on_error {
                    // Dropping the stream aborts every spawned task
                    return Err(fault.clone());
                }
            }
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<BatchOutcome> = slots
            .into_iter()
            .zip(urls)
            .enumerate()
            .map(|(index, (slot, url))| {
                slot.unwrap_or_else(|| {
                    Err(BatchError::Task {
                        index,
                        url: url.as_ref().to_string(),
                        message: "not run".to_string(),
                    })
                })
            })
            .collect();

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            faults = summary.faults,
            "Batch finished"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{ErrorKind, FetchError};
    use crate::fetchers::Fetcher;
    use crate::types::{FetchRequest, FetchedPage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves a page after a delay taken from the last path segment (ms);
    /// panics on paths containing "panic"
    #[derive(Default)]
    struct DelayFetcher {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for DelayFetcher {
        fn name(&self) -> &'static str {
            "delay"
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
            if request.url.contains("panic") {
                panic!("fetcher exploded");
            }
            self.started.lock().unwrap().push(request.url.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay: u64 = request
                .url
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(FetchedPage {
                final_url: request.url.clone(),
                status_code: 200,
                content_type: Some("text/html".to_string()),
                html: format!(
                    "<html><head><title>{0}</title></head><body><article><p>Page served for {0} with enough text to pass.</p></article></body></html>",
                    request.url
                ),
                truncated: false,
                rendered: false,
            })
        }
    }

    fn coordinator(fetcher: Arc<DelayFetcher>) -> BatchCoordinator {
        let config = Config {
            rate_limit_enabled: false,
            min_acceptable_length: 10,
            ..Config::default()
        };
        let converter = Converter::builder(config)
            .http_fetcher(fetcher)
            .without_renderer()
            .build()
            .unwrap();
        BatchCoordinator::new(Arc::new(converter))
    }

    fn preview(concurrency: usize) -> BatchOptions {
        BatchOptions::new(concurrency).overrides(ConvertOverrides::preview())
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let fetcher = Arc::new(DelayFetcher::default());
        let err = coordinator(fetcher.clone())
            .convert_batch(&["https://a.test/1"], &preview(0))
            .await
            .unwrap_err();
        assert_eq!(err, BatchError::InvalidConcurrency);
        assert!(fetcher.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcomes = coordinator(Arc::new(DelayFetcher::default()))
            .convert_batch::<&str>(&[], &preview(2))
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_in_input_order() {
        let urls = [
            "https://a.test/300",
            "https://b.test/10",
            "https://c.test/200",
            "https://d.test/0",
        ];
        let outcomes = coordinator(Arc::new(DelayFetcher::default()))
            .convert_batch(&urls, &preview(4))
            .await
            .unwrap();

        let got: Vec<_> = outcomes
            .iter()
            .map(|o| o.as_ref().unwrap().url.as_str())
            .collect();
        assert_eq!(got, urls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_and_fifo_admission() {
        let fetcher = Arc::new(DelayFetcher::default());
        let urls: Vec<String> = (0..6).map(|i| format!("https://h{i}.test/100")).collect();

        let outcomes = coordinator(fetcher.clone())
            .convert_batch(urls.as_slice(), &preview(2))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 6);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
        // The first two start together; later ones in input order
        let started = fetcher.started.lock().unwrap().clone();
        assert_eq!(&started[2..], &urls[2..]);
    }

    #[tokio::test]
    async fn test_invalid_url_is_isolated() {
        let urls = ["https://a.test/0", "not-a-url", "https://c.test/0"];
        let outcomes = coordinator(Arc::new(DelayFetcher::default()))
            .convert_batch(&urls, &preview(3))
            .await
            .unwrap();

        assert!(outcomes[0].as_ref().unwrap().success);
        let bad = outcomes[1].as_ref().unwrap();
        assert!(!bad.success);
        assert_eq!(bad.error_kind, Some(ErrorKind::InvalidUrl));
        assert!(outcomes[2].as_ref().unwrap().success);

        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                succeeded: 2,
                failed: 1,
                faults: 0,
                cached: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_panic_recorded_with_continue_on_error() {
        let urls = ["https://a.test/0", "https://panic.test/0", "https://c.test/0"];
        let outcomes = coordinator(Arc::new(DelayFetcher::default()))
            .convert_batch(&urls, &preview(1).continue_on_error(true))
            .await
            .unwrap();

        assert!(outcomes[0].is_ok());
        match &outcomes[1] {
            Err(BatchError::Task { index, url, .. }) => {
                assert_eq!(*index, 1);
                assert_eq!(url, "https://panic.test/0");
            }
            other => panic!("expected task fault, got {other:?}"),
        }
        assert!(outcomes[2].is_ok());
        assert_eq!(BatchSummary::from_outcomes(&outcomes).faults, 1);
    }

    #[tokio::test]
    async fn test_panic_aborts_without_continue_on_error() {
        let fetcher = Arc::new(DelayFetcher::default());
        let urls = ["https://panic.test/0", "https://b.test/0", "https://c.test/0"];
        let err = coordinator(fetcher.clone())
            .convert_batch(&urls, &preview(1))
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::Task { index: 0, .. }));
        // Later items were never admitted
        assert!(fetcher.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let coordinator = coordinator(Arc::new(DelayFetcher::default()))
            .with_progress(move |done, total| sink.lock().unwrap().push((done, total)));

        coordinator
            .convert_batch(&["https://a.test/0", "https://b.test/0"], &preview(1))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }
}
