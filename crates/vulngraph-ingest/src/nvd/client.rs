//! NVD CVE API 2.0 client
//!
//! Records are requested by publication date. The API accepts ranges of at
//! most 120 days, so a year is split into windows and each window is paged
//! with `startIndex`. Window fetches run on a [`TaskScheduler`]; every page
//! request, including retries, is admitted by one shared [`RateLimiter`].

use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::{Cve, CveResponse};
use crate::config::NvdConfig;
use crate::error::{IngestError, Result, TaskError};
use crate::framework::rate_limit::RateLimiter;
use crate::framework::retry::{retry_transient, RetryPolicy};
use crate::framework::scheduler::TaskScheduler;

/// Largest page the API serves
pub const MAX_RESULTS_PER_PAGE: usize = 2_000;

/// Longest publication date range the API accepts, inclusive
pub const MAX_WINDOW_DAYS: i64 = 120;

/// Request timeout for one page
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

const DATE_START_FORMAT: &str = "%Y-%m-%dT00:00:00.000";
const DATE_END_FORMAT: &str = "%Y-%m-%dT23:59:59.999";

/// Inclusive publication date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    fn query(&self) -> [(&'static str, String); 2] {
        [
            ("pubStartDate", self.start.format(DATE_START_FORMAT).to_string()),
            ("pubEndDate", self.end.format(DATE_END_FORMAT).to_string()),
        ]
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Split whole years into windows the API accepts, never crossing a year end
pub fn year_windows(start_year: i32, end_year: i32) -> Result<Vec<DateWindow>> {
    if start_year > end_year {
        return Err(IngestError::Config(format!(
            "start year {start_year} is after end year {end_year}"
        )));
    }

    let mut windows = Vec::new();
    for year in start_year..=end_year {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Err(IngestError::Config(format!("year {year} is out of range")));
        };

        let mut start = first;
        while start <= last {
            let end = (start + ChronoDuration::days(MAX_WINDOW_DAYS - 1)).min(last);
            windows.push(DateWindow { start, end });
            start = end + ChronoDuration::days(1);
        }
    }
    Ok(windows)
}

/// CVEs fetched for a range of windows
#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<Cve>,
    pub failed_windows: Vec<(DateWindow, TaskError)>,
}

/// Rate-limited NVD API client
#[derive(Debug)]
pub struct NvdClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    page_size: usize,
}

impl NvdClient {
    pub fn new(config: &NvdConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            limiter: Arc::new(RateLimiter::new(config.rate_limit())),
            retry: RetryPolicy::default().with_max_retries(config.max_retries),
            page_size: MAX_RESULTS_PER_PAGE,
        })
    }

    /// Share an admission window with other clients
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_RESULTS_PER_PAGE);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    async fn request_page(
        &self,
        window: DateWindow,
        start_index: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<CveResponse, TaskError> {
        self.limiter
            .acquire_or_cancel(cancel)
            .await
            .map_err(|_| TaskError::Cancelled)?;

        let mut request = self
            .http
            .get(&self.base_url)
            .query(&window.query())
            .query(&[("startIndex", start_index), ("resultsPerPage", self.page_size)]);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TaskError::Transient(e.to_string())
            } else {
                TaskError::Failed(e.to_string())
            }
        })?;

        let status = response.status();
        if is_transient(status) {
            return Err(TaskError::Transient(format!("NVD API returned {status}")));
        }
        if !status.is_success() {
            return Err(TaskError::Failed(format!("NVD API returned {status}")));
        }

        response
            .json::<CveResponse>()
            .await
            .map_err(|e| TaskError::Failed(format!("Malformed NVD response: {e}")))
    }

    /// Fetch every page of one window
    pub async fn fetch_window(
        &self,
        window: DateWindow,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<Cve>, TaskError> {
        let mut records = Vec::new();
        let mut start_index = 0;

        loop {
            let page = retry_transient(&self.retry, "nvd_page", || {
                self.request_page(window, start_index, cancel)
            })
            .await?;

            let received = page.vulnerabilities.len();
            records.extend(page.vulnerabilities.into_iter().map(|item| item.cve));
            debug!(
                window = %window,
                start_index,
                received,
                total = page.total_results,
                "Fetched NVD page"
            );

            let advance = if page.results_per_page > 0 {
                page.results_per_page
            } else {
                received
            };
            start_index += advance;
            if advance == 0 || start_index >= page.total_results {
                break;
            }
        }

        Ok(records)
    }

    /// Fetch every CVE published in `start_year..=end_year`, one task per window
    pub async fn fetch_years(
        self: &Arc<Self>,
        start_year: i32,
        end_year: i32,
        workers: usize,
        cancel: CancellationToken,
    ) -> Result<FetchReport> {
        let windows = year_windows(start_year, end_year)?;
        info!(start_year, end_year, windows = windows.len(), "Fetching CVEs from NVD API");

        let client = Arc::clone(self);
        let task_cancel = cancel.clone();
        let mut scheduler = TaskScheduler::start("nvd_fetch", workers, cancel, move |window| {
            let client = Arc::clone(&client);
            let cancel = task_cancel.clone();
            async move { client.fetch_window(window, &cancel).await }
        });

        for window in &windows {
            scheduler.submit(*window).await?;
        }
        let report = scheduler.join().await;

        // Task ids follow submission order, so task i fetched windows[i]
        let mut fetched = FetchReport::default();
        for (window, task) in windows.into_iter().zip(report.tasks()) {
            match (&task.result, &task.error) {
                (Some(records), _) => fetched.records.extend(records.iter().cloned()),
                (None, Some(err)) => {
                    warn!(window = %window, task_id = %task.id, error = %err, "NVD window fetch failed");
                    fetched.failed_windows.push((window, err.clone()));
                },
                (None, None) => {},
            }
        }

        info!(
            records = fetched.records.len(),
            failed_windows = fetched.failed_windows.len(),
            "NVD fetch complete"
        );
        Ok(fetched)
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}
