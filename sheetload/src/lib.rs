//! sheetload library
//!
//! Bulk-loads local CSV files into a Google spreadsheet, one tab per file.
//! Every file is decoded, normalized, and then uploaded with request
//! throttling and bounded retry. A failed file is recorded and skipped.

pub mod auth;
pub mod encoding;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;
pub mod scanner;
pub mod sheets;
pub mod upload;

pub use error::{FailureReason, ImportError};
pub use models::{FileRecord, FileStatus, ImportJob, ImportReport, SpreadsheetTarget};
pub use orchestrator::ImportOrchestrator;
pub use progress::{LogProgress, NoProgress, ProgressSink};
