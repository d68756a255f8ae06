//! Import run data model
//!
//! `ImportJob` is assembled by the caller before the run; `FileRecord` and
//! `ImportReport` are produced by the orchestrator.

use crate::error::FailureReason;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SPREADSHEET_URL_PREFIX: &str = "https://docs.google.com/spreadsheets/d/";

/// Where the run writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SpreadsheetTarget {
    /// Use a spreadsheet that already exists
    Existing { spreadsheet_id: String },
    /// Create one (from the configured template, if any) titled `title`
    Create { title: String },
}

impl SpreadsheetTarget {
    /// Fresh spreadsheet titled `"<name> <DDMMYYYY>"` in local time
    pub fn create_dated(name: &str) -> Self {
        Self::Create {
            title: dated_title(name, Local::now().date_naive()),
        }
    }
}

/// `"<name> <DDMMYYYY>"`
pub fn dated_title(name: &str, date: chrono::NaiveDate) -> String {
    format!("{} {}", name.trim(), date.format("%d%m%Y"))
}

pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("{}{}", SPREADSHEET_URL_PREFIX, spreadsheet_id)
}

/// One import run, fully specified before it starts
#[derive(Debug, Clone)]
pub struct ImportJob {
    pub target: SpreadsheetTarget,
    /// Processed in this order
    pub files: Vec<PathBuf>,
}

impl ImportJob {
    pub fn new(target: SpreadsheetTarget, files: Vec<PathBuf>) -> Self {
        Self { target, files }
    }
}

/// Per-file pipeline state
///
/// Pending → Validating → Decoding → Parsing → Uploading → {Succeeded, Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Pending,
    Validating,
    Decoding,
    Parsing,
    Uploading,
    Succeeded,
    Failed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Outcome ledger entry for one CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub status: FileStatus,
    /// Set once decoding succeeds
    pub encoding: Option<String>,
    /// True when only the permissive fallback could decode the file
    pub used_fallback: bool,
    pub row_count: usize,
    pub column_count: usize,
    /// Tab actually created (after sanitizing and de-duplication)
    pub tab_name: Option<String>,
    /// Remote requests spent on this file, retries included
    pub upload_attempts: u32,
    pub failure: Option<FailureReason>,
}

impl FileRecord {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            status: FileStatus::Pending,
            encoding: None,
            used_fallback: false,
            row_count: 0,
            column_count: 0,
            tab_name: None,
            upload_attempts: 0,
            failure: None,
        }
    }

    /// File name without extension; the requested tab title
    pub fn sheet_name(&self) -> String {
        sheet_name_for(&self.path)
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == FileStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == FileStatus::Failed
    }
}

pub fn sheet_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Final report of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub spreadsheet_id: String,
    pub spreadsheet_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In input order
    pub files: Vec<FileRecord>,
    /// Tab that received the summary rows, if written
    pub summary_tab: Option<String>,
    /// Set when a run-scoped failure stopped the run; files after the
    /// failing one are left Pending
    pub aborted: Option<FailureReason>,
}

impl ImportReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.is_failed()).count()
    }

    /// Files never attempted because the run stopped early
    pub fn pending(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Pending)
            .count()
    }

    /// Failed files with their reasons, in input order
    pub fn failures(&self) -> impl Iterator<Item = (&FileRecord, &FailureReason)> {
        self.files
            .iter()
            .filter_map(|f| f.failure.as_ref().map(|reason| (f, reason)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.aborted.is_none() && self.files.iter().all(FileRecord::is_succeeded)
    }
}
