//! Error types for sheetload
//!
//! `ImportError` is the full failure taxonomy. Everything except
//! `Authentication` is file-scoped: the orchestrator records it against the
//! file and moves on.

use crate::encoding::EncodingError;
use crate::normalizer::ParseError;
use serde::{Deserialize, Serialize};
use sheetload_common::events::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(
        "File size ({:.2}MB) exceeds maximum allowed size ({:.2}MB)",
        mb(.size_bytes),
        mb(.max_bytes)
    )]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("Cannot read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rate limit still exceeded after {attempts} attempts: {message}")]
    RateLimitExceeded { attempts: u32, message: String },

    #[error("Upload failed after {attempts} attempts: {message}")]
    TransientUpload { attempts: u32, message: String },

    #[error("Upload rejected: {0}")]
    FatalUpload(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

fn mb(bytes: &u64) -> f64 {
    *bytes as f64 / BYTES_PER_MB
}

impl ImportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Encoding(_) => FailureKind::EncodingError,
            Self::Parse(_) => FailureKind::ParseError,
            Self::FileTooLarge { .. } => FailureKind::FileTooLarge,
            Self::FileRead { .. } => FailureKind::FileReadError,
            Self::RateLimitExceeded { .. } => FailureKind::RateLimitExceeded,
            Self::TransientUpload { .. } => FailureKind::TransientUploadError,
            Self::FatalUpload(_) => FailureKind::FatalUploadError,
            Self::Authentication(_) => FailureKind::AuthenticationError,
        }
    }

    /// True when no further file can succeed, so the run must stop
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Recorded reason for a failed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ImportError> for FailureReason {
    fn from(err: &ImportError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
