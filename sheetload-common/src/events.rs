//! Progress events emitted by an import run
//!
//! Events are plain serializable values. The orchestrator hands them to a
//! caller-supplied sink; `EventBus` is the broadcast-channel sink for
//! consumers that want to subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Category of a per-file or run-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    EncodingError,
    ParseError,
    FileTooLarge,
    FileReadError,
    RateLimitExceeded,
    TransientUploadError,
    FatalUploadError,
    AuthenticationError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EncodingError => "EncodingError",
            Self::ParseError => "ParseError",
            Self::FileTooLarge => "FileTooLarge",
            Self::FileReadError => "FileReadError",
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::TransientUploadError => "TransientUploadError",
            Self::FatalUploadError => "FatalUploadError",
            Self::AuthenticationError => "AuthenticationError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Import run events
///
/// `index` is 1-based so it renders directly as "file 3 of 7".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    /// Target spreadsheet resolved, files about to be processed
    RunStarted {
        run_id: Uuid,
        spreadsheet_id: String,
        total_files: usize,
        timestamp: DateTime<Utc>,
    },

    /// A file left the Pending state
    FileStarted {
        run_id: Uuid,
        index: usize,
        total_files: usize,
        file: String,
        timestamp: DateTime<Utc>,
    },

    /// A file reached Succeeded
    FileSucceeded {
        run_id: Uuid,
        index: usize,
        total_files: usize,
        file: String,
        tab_name: String,
        rows: usize,
        /// Total remote requests spent on this file, retries included
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A file reached Failed
    FileFailed {
        run_id: Uuid,
        index: usize,
        total_files: usize,
        file: String,
        kind: FailureKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Summary rows written onto the first tab
    SummaryWritten {
        run_id: Uuid,
        tab_name: String,
        entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every file reached a terminal state
    RunCompleted {
        run_id: Uuid,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run stopped early on a run-scoped error
    RunAborted {
        run_id: Uuid,
        kind: FailureKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl ImportEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::FileStarted { run_id, .. }
            | Self::FileSucceeded { run_id, .. }
            | Self::FileFailed { run_id, .. }
            | Self::SummaryWritten { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunAborted { run_id, .. } => *run_id,
        }
    }

    /// True for the per-file terminal notifications
    pub fn is_file_terminal(&self) -> bool {
        matches!(self, Self::FileSucceeded { .. } | Self::FileFailed { .. })
    }
}

/// Broadcast bus for `ImportEvent`
///
/// Subscribers only see events emitted after they subscribed.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ImportEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ImportEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of subscribers reached; zero when nobody listens.
    pub fn emit(&self, event: ImportEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}
