//! Remote spreadsheet service seam
//!
//! `SheetsApi` lists the only operations the importer consumes. Every
//! failure is classified up front so the upload client can decide between
//! retrying, giving up, or aborting the run.

mod google;
mod tab_name;

pub use google::GoogleSheetsClient;
pub use tab_name::{sanitize_tab_name, TabRegistry, MAX_TAB_NAME_LEN};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Classified remote failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Request quota exceeded; worth retrying after a pause
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Timeouts, connection failures, 5xx; worth retrying
    #[error("Transient error: {0}")]
    Transient(String),

    /// Permission denied, unknown spreadsheet, invalid request; never retried
    #[error("Request rejected: {0}")]
    Fatal(String),

    /// Credential missing or refused; no further request can succeed
    #[error("Not authorized: {0}")]
    Unauthorized(String),
}

impl ApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        match status {
            429 => Self::RateLimited(message),
            // Drive reports per-user quota as 403 with a rate-limit reason
            403 if is_rate_limit_reason(body) => Self::RateLimited(message),
            401 => Self::Unauthorized(message),
            408 | 500 | 502 | 503 | 504 => Self::Transient(message),
            _ => Self::Fatal(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimited(m) | Self::Transient(m) | Self::Fatal(m) | Self::Unauthorized(m) => m,
        }
    }
}

fn is_rate_limit_reason(body: &str) -> bool {
    body.contains("rateLimitExceeded")
        || body.contains("userRateLimitExceeded")
        || body.contains("RATE_LIMIT_EXCEEDED")
}

/// A1 range anchored at column A of `row` (1-based) on tab `tab`
pub fn a1_range(tab: &str, row: usize) -> String {
    format!("'{}'!A{}", tab.replace('\'', "''"), row)
}

/// Operations consumed from the spreadsheet service
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Create the target spreadsheet, cloning `template_id` when given; returns its id
    async fn create_spreadsheet(
        &self,
        title: &str,
        template_id: Option<&str>,
    ) -> Result<String, ApiError>;

    /// Tab titles in display order
    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<String>, ApiError>;

    /// Add a tab sized `rows` x `columns`
    async fn add_tab(
        &self,
        spreadsheet_id: &str,
        title: &str,
        rows: usize,
        columns: usize,
    ) -> Result<(), ApiError>;

    /// Overwrite cells starting at `range` with raw (unparsed) string values
    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: SheetsApi + ?Sized> SheetsApi for Arc<T> {
    async fn create_spreadsheet(
        &self,
        title: &str,
        template_id: Option<&str>,
    ) -> Result<String, ApiError> {
        (**self).create_spreadsheet(title, template_id).await
    }

    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<String>, ApiError> {
        (**self).list_tabs(spreadsheet_id).await
    }

    async fn add_tab(
        &self,
        spreadsheet_id: &str,
        title: &str,
        rows: usize,
        columns: usize,
    ) -> Result<(), ApiError> {
        (**self).add_tab(spreadsheet_id, title, rows, columns).await
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), ApiError> {
        (**self).write_range(spreadsheet_id, range, values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(ApiError::from_status(429, ""), ApiError::RateLimited(_)));
        assert!(matches!(ApiError::from_status(503, ""), ApiError::Transient(_)));
        assert!(matches!(ApiError::from_status(504, "gateway"), ApiError::Transient(_)));
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized(_)));
        assert!(matches!(ApiError::from_status(403, "forbidden"), ApiError::Fatal(_)));
        assert!(matches!(ApiError::from_status(404, ""), ApiError::Fatal(_)));
        assert!(matches!(
            ApiError::from_status(403, r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#),
            ApiError::RateLimited(_)
        ));
    }

    #[test]
    fn test_message_includes_status_and_body() {
        let err = ApiError::from_status(400, " bad range ");
        assert_eq!(err.message(), "HTTP 400: bad range");
        assert_eq!(ApiError::from_status(500, "").message(), "HTTP 500");
    }

    #[test]
    fn test_a1_range_quotes_tab_name() {
        assert_eq!(a1_range("sales", 1), "'sales'!A1");
        assert_eq!(a1_range("Bob's data", 1001), "'Bob''s data'!A1001");
    }
}
