//! Test doubles for the remote spreadsheet service and progress sink
//!
//! `FakeSheetsApi` keeps tabs in memory, records every call, and can be
//! scripted to fail the next N calls of an operation.

#![allow(dead_code)]

use async_trait::async_trait;
use sheetload::progress::ProgressSink;
use sheetload::sheets::{ApiError, SheetsApi};
use sheetload_common::events::ImportEvent;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CREATED_ID: &str = "created-spreadsheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateSpreadsheet,
    ListTabs,
    AddTab,
    WriteRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateSpreadsheet {
        title: String,
        template: Option<String>,
    },
    ListTabs {
        spreadsheet_id: String,
    },
    AddTab {
        spreadsheet_id: String,
        title: String,
        rows: usize,
        columns: usize,
    },
    WriteRange {
        spreadsheet_id: String,
        range: String,
        values: Vec<Vec<String>>,
    },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::CreateSpreadsheet { .. } => Op::CreateSpreadsheet,
            Call::ListTabs { .. } => Op::ListTabs,
            Call::AddTab { .. } => Op::AddTab,
            Call::WriteRange { .. } => Op::WriteRange,
        }
    }
}

#[derive(Default)]
struct State {
    tabs: Vec<String>,
    calls: Vec<Call>,
    scripted: HashMap<Op, VecDeque<ApiError>>,
    rejected_tabs: HashMap<String, ApiError>,
}

/// In-memory spreadsheet with one initial tab, `Sheet1`
pub struct FakeSheetsApi {
    state: Mutex<State>,
}

impl Default for FakeSheetsApi {
    fn default() -> Self {
        Self::with_tabs(["Sheet1"])
    }
}

impl FakeSheetsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tabs<I, S>(tabs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(State {
                tabs: tabs.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
        }
    }

    /// Fail the next calls of `op` with `errors`, in order
    pub fn fail_next(&self, op: Op, errors: impl IntoIterator<Item = ApiError>) {
        let mut state = self.state.lock().unwrap();
        state.scripted.entry(op).or_default().extend(errors);
    }

    /// Fail the next `n` calls of `op` with clones of `error`
    pub fn fail_times(&self, op: Op, n: usize, error: ApiError) {
        self.fail_next(op, std::iter::repeat(error).take(n));
    }

    /// Every `add_tab` for `title` fails with `error`
    pub fn reject_tab(&self, title: &str, error: ApiError) {
        let mut state = self.state.lock().unwrap();
        state.rejected_tabs.insert(title.to_string(), error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    pub fn tabs(&self) -> Vec<String> {
        self.state.lock().unwrap().tabs.clone()
    }

    /// Successful writes, as (range, values)
    pub fn writes(&self) -> Vec<(String, Vec<Vec<String>>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WriteRange { range, values, .. } => Some((range, values)),
                _ => None,
            })
            .collect()
    }

    /// Titles passed to `add_tab`, retries included
    pub fn added_tab_titles(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddTab { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let op = call.op();
        state.calls.push(call);
        match state.scripted.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetsApi for FakeSheetsApi {
    async fn create_spreadsheet(
        &self,
        title: &str,
        template_id: Option<&str>,
    ) -> Result<String, ApiError> {
        self.record(Call::CreateSpreadsheet {
            title: title.to_string(),
            template: template_id.map(str::to_string),
        })?;
        Ok(CREATED_ID.to_string())
    }

    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<String>, ApiError> {
        self.record(Call::ListTabs {
            spreadsheet_id: spreadsheet_id.to_string(),
        })?;
        Ok(self.tabs())
    }

    async fn add_tab(
        &self,
        spreadsheet_id: &str,
        title: &str,
        rows: usize,
        columns: usize,
    ) -> Result<(), ApiError> {
        self.record(Call::AddTab {
            spreadsheet_id: spreadsheet_id.to_string(),
            title: title.to_string(),
            rows,
            columns,
        })?;

        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.rejected_tabs.get(title) {
            return Err(err.clone());
        }
        if state.tabs.iter().any(|t| t.eq_ignore_ascii_case(title)) {
            return Err(ApiError::Fatal(format!(
                "HTTP 400: A sheet with the name \"{}\" already exists",
                title
            )));
        }
        state.tabs.push(title.to_string());
        Ok(())
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), ApiError> {
        self.record(Call::WriteRange {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            values: values.to_vec(),
        })
    }
}

/// Collects every emitted event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ImportEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ImportEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ImportEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}
