//! Rate-limited upload client
//!
//! Wraps a `SheetsApi` with two protections against the service's quota:
//! - a fixed throttle slept before *every* request, whether or not a limit
//!   was observed
//! - retry with exponential backoff (`base * 2^n`, capped) on rate-limit and
//!   transient failures, at most `max_retries` retries per request
//!
//! Fatal failures are returned at once. An unauthorized response becomes
//! `UploadError::Authentication`, which the orchestrator treats as
//! run-scoped.
//!
//! Uploads are not idempotent: a run interrupted after a tab was created
//! leaves that tab behind, and a retried tab creation that had in fact
//! succeeded server-side fails as a duplicate title.

use crate::error::ImportError;
use crate::normalizer::SheetGrid;
use crate::sheets::{a1_range, ApiError, SheetsApi, TabRegistry};
use sheetload_common::ImportConfig;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Throttle, retry, and batching parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub request_delay: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub batch_rows: usize,
}

impl UploadSettings {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            request_delay: config.request_delay(),
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            batch_rows: config.batch_rows.max(1),
        }
    }

    /// Sleep before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

/// Upload client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Rate limit still exceeded after {attempts} attempts: {message}")]
    RateLimitExceeded { attempts: u32, message: String },

    #[error("Upload failed after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("Upload rejected: {0}")]
    Fatal(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl From<UploadError> for ImportError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::RateLimitExceeded { attempts, message } => {
                ImportError::RateLimitExceeded { attempts, message }
            }
            UploadError::Transient { attempts, message } => {
                ImportError::TransientUpload { attempts, message }
            }
            UploadError::Fatal(message) => ImportError::FatalUpload(message),
            UploadError::Authentication(message) => ImportError::Authentication(message),
        }
    }
}

/// How a single request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    TransientError,
    FatalError,
    Unauthorized,
}

impl AttemptOutcome {
    fn of<T>(result: &Result<T, ApiError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(ApiError::RateLimited(_)) => Self::RateLimited,
            Err(ApiError::Transient(_)) => Self::TransientError,
            Err(ApiError::Fatal(_)) => Self::FatalError,
            Err(ApiError::Unauthorized(_)) => Self::Unauthorized,
        }
    }
}

/// One request to the remote service; lives only inside the retry loop
#[derive(Debug, Clone, Copy)]
pub struct UploadAttempt<'a> {
    pub operation: &'a str,
    /// 1-based
    pub attempt: u32,
    /// Grid rows carried by the request (0 for non-write requests)
    pub rows: usize,
    pub outcome: AttemptOutcome,
}

impl UploadAttempt<'_> {
    fn log(&self) {
        tracing::debug!(
            operation = self.operation,
            attempt = self.attempt,
            rows = self.rows,
            outcome = ?self.outcome,
            "Remote request finished"
        );
    }
}

/// What a successful upload produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Final (sanitized, de-duplicated) tab title
    pub tab_name: String,
    pub rows_written: usize,
    pub columns: usize,
    /// Write requests issued (one per batch)
    pub write_batches: usize,
    /// Remote requests spent, retries included
    pub attempts: u32,
}

/// Throttled, retrying front for a `SheetsApi`
pub struct UploadClient<A> {
    api: A,
    settings: UploadSettings,
    /// Known tabs of the spreadsheet last uploaded into
    tabs: Option<(String, TabRegistry)>,
    total_attempts: u64,
}

impl<A: SheetsApi> UploadClient<A> {
    pub fn new(api: A, settings: UploadSettings) -> Self {
        Self {
            api,
            settings,
            tabs: None,
            total_attempts: 0,
        }
    }

    /// Remote requests issued by this client so far, retries included
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    /// Create the target spreadsheet (throttled and retried like any request)
    pub async fn create_spreadsheet(
        &mut self,
        title: &str,
        template_id: Option<&str>,
    ) -> Result<String, UploadError> {
        let Self {
            api,
            settings,
            total_attempts,
            ..
        } = self;
        let api = &*api;

        let id = with_retry(settings, total_attempts, "create_spreadsheet", 0, move || {
            api.create_spreadsheet(title, template_id)
        })
        .await?;

        tracing::info!(spreadsheet_id = %id, title = %title, "Created spreadsheet");
        Ok(id)
    }

    /// Create a tab named after `sheet_name` and write `grid` into it
    ///
    /// The title is sanitized and suffixed on collision. Rows are written
    /// in batches of `batch_rows`; an empty grid creates an empty tab.
    pub async fn upload(
        &mut self,
        spreadsheet_id: &str,
        sheet_name: &str,
        grid: &SheetGrid,
    ) -> Result<UploadResult, UploadError> {
        let attempts_before = self.total_attempts;
        self.prime_tabs(spreadsheet_id).await?;

        let Self {
            api,
            settings,
            tabs,
            total_attempts,
        } = self;
        let api = &*api;
        let registry = match tabs {
            Some((_, registry)) => registry,
            None => return Err(UploadError::Fatal("tab registry not loaded".to_string())),
        };

        let tab_name = registry.unique_name(sheet_name);
        if tab_name != sheet_name {
            tracing::info!(requested = %sheet_name, tab = %tab_name, "Adjusted tab name");
        }

        let rows = grid.row_count();
        let columns = grid.width();
        let tab = tab_name.as_str();
        with_retry(settings, total_attempts, "add_tab", 0, move || {
            api.add_tab(spreadsheet_id, tab, rows.max(1), columns.max(1))
        })
        .await?;
        registry.insert(&tab_name);

        let mut write_batches = 0usize;
        for (first_row, batch) in grid.batches(settings.batch_rows) {
            let range = a1_range(&tab_name, first_row + 1);
            let range_ref = range.as_str();
            with_retry(settings, total_attempts, "write_range", batch.len(), move || {
                api.write_range(spreadsheet_id, range_ref, batch)
            })
            .await?;
            write_batches += 1;

            tracing::debug!(
                tab = %tab_name,
                written = first_row + batch.len(),
                total = rows,
                "Batch written"
            );
        }

        Ok(UploadResult {
            tab_name,
            rows_written: rows,
            columns,
            write_batches,
            attempts: (self.total_attempts - attempts_before) as u32,
        })
    }

    /// Write `[tab, row count]` rows onto the first tab of the spreadsheet
    ///
    /// Returns the title of the tab written to.
    pub async fn write_summary(
        &mut self,
        spreadsheet_id: &str,
        entries: &[(String, usize)],
    ) -> Result<String, UploadError> {
        let Self {
            api,
            settings,
            total_attempts,
            ..
        } = self;
        let api = &*api;

        let titles = with_retry(settings, total_attempts, "list_tabs", 0, move || {
            api.list_tabs(spreadsheet_id)
        })
        .await?;
        let first = titles
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::Fatal("spreadsheet has no tabs".to_string()))?;

        let values: Vec<Vec<String>> = entries
            .iter()
            .map(|(tab, rows)| vec![tab.clone(), rows.to_string()])
            .collect();
        let range = a1_range(&first, 1);
        let range_ref = range.as_str();
        let values_ref = values.as_slice();

        with_retry(settings, total_attempts, "write_summary", values.len(), move || {
            api.write_range(spreadsheet_id, range_ref, values_ref)
        })
        .await?;

        Ok(first)
    }

    /// Load existing tab titles once per target spreadsheet
    async fn prime_tabs(&mut self, spreadsheet_id: &str) -> Result<(), UploadError> {
        if matches!(&self.tabs, Some((id, _)) if id == spreadsheet_id) {
            return Ok(());
        }

        let Self {
            api,
            settings,
            total_attempts,
            ..
        } = self;
        let api = &*api;

        let titles = with_retry(settings, total_attempts, "list_tabs", 0, move || {
            api.list_tabs(spreadsheet_id)
        })
        .await?;

        tracing::debug!(spreadsheet_id = %spreadsheet_id, existing = titles.len(), "Loaded tab titles");
        self.tabs = Some((spreadsheet_id.to_string(), TabRegistry::new(titles)));
        Ok(())
    }
}

/// Run `op` under the throttle and retry policy
///
/// Issues at most `max_retries + 1` requests.
async fn with_retry<T, F, Fut>(
    settings: &UploadSettings,
    counter: &mut u64,
    operation: &str,
    rows: usize,
    mut op: F,
) -> Result<T, UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::time::sleep(settings.request_delay).await;
        *counter += 1;
        let result = op().await;

        UploadAttempt {
            operation,
            attempt,
            rows,
            outcome: AttemptOutcome::of(&result),
        }
        .log();

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(ApiError::Unauthorized(message)) => {
                return Err(UploadError::Authentication(message));
            }
            Err(ApiError::Fatal(message)) => {
                tracing::error!(operation, attempt, error = %message, "Request rejected, not retrying");
                return Err(UploadError::Fatal(message));
            }
            Err(err) => err,
        };

        if attempt > settings.max_retries {
            tracing::error!(operation, attempt, error = %err, "Retries exhausted");
            return Err(match err {
                ApiError::RateLimited(message) => UploadError::RateLimitExceeded {
                    attempts: attempt,
                    message,
                },
                other => UploadError::Transient {
                    attempts: attempt,
                    message: other.message().to_string(),
                },
            });
        }

        let delay = settings.backoff_delay(attempt - 1);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_secs: u64, max_secs: u64) -> UploadSettings {
        UploadSettings {
            request_delay: Duration::ZERO,
            max_retries: 3,
            backoff_base: Duration::from_secs(base_secs),
            backoff_max: Duration::from_secs(max_secs),
            batch_rows: 10,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let s = settings(30, 1000);
        assert_eq!(s.backoff_delay(0), Duration::from_secs(30));
        assert_eq!(s.backoff_delay(1), Duration::from_secs(60));
        assert_eq!(s.backoff_delay(2), Duration::from_secs(120));
    }

    #[test]
    fn test_backoff_is_capped() {
        let s = settings(30, 100);
        assert_eq!(s.backoff_delay(2), Duration::from_secs(100));
        assert_eq!(s.backoff_delay(40), Duration::from_secs(100));
    }

    #[test]
    fn test_settings_from_config() {
        let config = ImportConfig {
            request_delay_secs: 0.25,
            max_retries: 5,
            batch_rows: 0,
            ..Default::default()
        };
        let s = UploadSettings::from_config(&config);
        assert_eq!(s.request_delay, Duration::from_millis(250));
        assert_eq!(s.max_retries, 5);
        assert_eq!(s.batch_rows, 1);
    }

    #[test]
    fn test_upload_error_maps_to_import_error() {
        let err: ImportError = UploadError::Authentication("401".into()).into();
        assert!(err.is_run_fatal());

        let err: ImportError = UploadError::Transient {
            attempts: 4,
            message: "timeout".into(),
        }
        .into();
        assert!(matches!(err, ImportError::TransientUpload { attempts: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_stops_at_bound() {
        let s = settings(1, 8);
        let mut counter = 0u64;
        let mut calls = 0u32;

        let result: Result<(), UploadError> = with_retry(&s, &mut counter, "op", 0, || {
            calls += 1;
            async { Err(ApiError::Transient("timeout".into())) }
        })
        .await;

        assert_eq!(calls, 4);
        assert_eq!(counter, 4);
        assert_eq!(
            result,
            Err(UploadError::Transient {
                attempts: 4,
                message: "timeout".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_fatal_is_not_retried() {
        let s = settings(1, 8);
        let mut counter = 0u64;

        let result: Result<(), UploadError> = with_retry(&s, &mut counter, "op", 0, || async {
            Err(ApiError::Fatal("HTTP 403".into()))
        })
        .await;

        assert_eq!(counter, 1);
        assert_eq!(result, Err(UploadError::Fatal("HTTP 403".into())));
    }
}
