//! Import orchestrator
//!
//! Drives every file of an `ImportJob` through
//! Validating → Decoding → Parsing → Uploading, one file at a time, in input
//! order. A failure is recorded against its file and the run moves on; only
//! an authentication failure stops the run.

use crate::encoding::EncodingResolver;
use crate::error::{FailureReason, ImportError};
use crate::models::{
    spreadsheet_url, FileRecord, FileStatus, ImportJob, ImportReport, SpreadsheetTarget,
};
use crate::normalizer::CsvNormalizer;
use crate::progress::ProgressSink;
use crate::sheets::SheetsApi;
use crate::upload::{UploadClient, UploadResult, UploadSettings};
use chrono::Utc;
use sheetload_common::events::ImportEvent;
use sheetload_common::ImportConfig;
use uuid::Uuid;

/// Runs import jobs against one `SheetsApi`
pub struct ImportOrchestrator<A, P> {
    uploader: UploadClient<A>,
    resolver: EncodingResolver,
    normalizer: CsvNormalizer,
    config: ImportConfig,
    sink: P,
}

impl<A: SheetsApi, P: ProgressSink> ImportOrchestrator<A, P> {
    /// Fails only when the configured encoding labels are unknown
    pub fn new(api: A, config: ImportConfig, sink: P) -> Result<Self, ImportError> {
        let resolver = EncodingResolver::from_config(&config)?;
        let uploader = UploadClient::new(api, UploadSettings::from_config(&config));

        Ok(Self {
            uploader,
            resolver,
            normalizer: CsvNormalizer::default(),
            config,
            sink,
        })
    }

    /// Execute the job
    ///
    /// Returns `Err` only when the target spreadsheet could not be created,
    /// since nothing was imported. A refused credential stops the run but
    /// still returns the report: files already imported stay listed, the
    /// rest stay Pending, and `aborted` holds the reason.
    pub async fn run(&mut self, job: ImportJob) -> Result<ImportReport, ImportError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total_files = job.files.len();

        tracing::info!(run_id = %run_id, total_files, "Starting import run");

        let spreadsheet_id = match self.resolve_target(&job.target).await {
            Ok(id) => id,
            Err(err) => {
                self.abort(run_id, &err);
                return Err(err);
            }
        };

        self.sink.emit(ImportEvent::RunStarted {
            run_id,
            spreadsheet_id: spreadsheet_id.clone(),
            total_files,
            timestamp: Utc::now(),
        });

        let mut records: Vec<FileRecord> = Vec::with_capacity(total_files);
        let mut aborted = None;
        let file_delay = self.config.file_delay();
        let mut files = job.files.into_iter().enumerate();

        for (i, path) in files.by_ref() {
            if i > 0 && !file_delay.is_zero() {
                tracing::debug!(delay_ms = file_delay.as_millis() as u64, "Pausing between files");
                tokio::time::sleep(file_delay).await;
            }

            let index = i + 1;
            let mut record = FileRecord::new(path);
            self.sink.emit(ImportEvent::FileStarted {
                run_id,
                index,
                total_files,
                file: record.display_name(),
                timestamp: Utc::now(),
            });

            match self.process_file(&spreadsheet_id, &mut record).await {
                Ok(upload) => {
                    record.status = FileStatus::Succeeded;
                    record.tab_name = Some(upload.tab_name.clone());

                    self.sink.emit(ImportEvent::FileSucceeded {
                        run_id,
                        index,
                        total_files,
                        file: record.display_name(),
                        tab_name: upload.tab_name,
                        rows: upload.rows_written,
                        attempts: record.upload_attempts,
                        timestamp: Utc::now(),
                    });
                    records.push(record);
                }
                Err(err) => {
                    let reason = FailureReason::from(&err);
                    record.status = FileStatus::Failed;
                    record.failure = Some(reason.clone());

                    self.sink.emit(ImportEvent::FileFailed {
                        run_id,
                        index,
                        total_files,
                        file: record.display_name(),
                        kind: reason.kind,
                        reason: reason.message.clone(),
                        timestamp: Utc::now(),
                    });
                    records.push(record);

                    if err.is_run_fatal() {
                        self.abort(run_id, &err);
                        aborted = Some(reason);
                        break;
                    }
                }
            }
        }

        // Files never reached after an abort
        records.extend(files.map(|(_, path)| FileRecord::new(path)));

        let summary_tab = if aborted.is_none() {
            self.write_summary(run_id, &spreadsheet_id, &records).await
        } else {
            None
        };

        let report = ImportReport {
            run_id,
            spreadsheet_url: spreadsheet_url(&spreadsheet_id),
            spreadsheet_id,
            started_at,
            finished_at: Utc::now(),
            files: records,
            summary_tab,
            aborted,
        };

        if report.aborted.is_none() {
            self.sink.emit(ImportEvent::RunCompleted {
                run_id,
                succeeded: report.succeeded(),
                failed: report.failed(),
                timestamp: Utc::now(),
            });
        }

        Ok(report)
    }

    async fn resolve_target(&mut self, target: &SpreadsheetTarget) -> Result<String, ImportError> {
        match target {
            SpreadsheetTarget::Existing { spreadsheet_id } => Ok(spreadsheet_id.clone()),
            SpreadsheetTarget::Create { title } => {
                let template = self.config.template_spreadsheet_id.clone();
                let id = self
                    .uploader
                    .create_spreadsheet(title, template.as_deref())
                    .await?;
                Ok(id)
            }
        }
    }

    /// One file through the pipeline; `record` is updated stage by stage
    async fn process_file(
        &mut self,
        spreadsheet_id: &str,
        record: &mut FileRecord,
    ) -> Result<UploadResult, ImportError> {
        record.status = FileStatus::Validating;
        let metadata = tokio::fs::metadata(&record.path)
            .await
            .map_err(|source| ImportError::FileRead {
                path: record.path.clone(),
                source,
            })?;

        let max_bytes = self.config.max_file_size_bytes();
        if metadata.len() > max_bytes {
            return Err(ImportError::FileTooLarge {
                size_bytes: metadata.len(),
                max_bytes,
            });
        }

        record.status = FileStatus::Decoding;
        let bytes = tokio::fs::read(&record.path)
            .await
            .map_err(|source| ImportError::FileRead {
                path: record.path.clone(),
                source,
            })?;
        let decoded = self.resolver.resolve(&bytes)?;
        record.encoding = Some(decoded.encoding_name().to_string());
        record.used_fallback = decoded.used_fallback;
        if decoded.used_fallback {
            tracing::warn!(
                file = %record.display_name(),
                encoding = decoded.encoding_name(),
                "No strict encoding matched, decoded with replacement characters"
            );
        } else {
            tracing::debug!(file = %record.display_name(), encoding = decoded.encoding_name(), "Decoded");
        }

        record.status = FileStatus::Parsing;
        let grid = self.normalizer.normalize(&decoded.text)?;
        record.row_count = grid.row_count();
        record.column_count = grid.width();

        record.status = FileStatus::Uploading;
        let before = self.uploader.total_attempts();
        let result = self
            .uploader
            .upload(spreadsheet_id, &record.sheet_name(), &grid)
            .await;
        record.upload_attempts = (self.uploader.total_attempts() - before) as u32;

        Ok(result?)
    }

    /// Write `[tab, rows]` for each imported file onto the first tab
    ///
    /// Never fails the run; returns the tab written to.
    async fn write_summary(
        &mut self,
        run_id: Uuid,
        spreadsheet_id: &str,
        records: &[FileRecord],
    ) -> Option<String> {
        if !self.config.write_summary {
            return None;
        }

        let entries: Vec<(String, usize)> = records
            .iter()
            .filter(|r| r.is_succeeded())
            .filter_map(|r| r.tab_name.clone().map(|tab| (tab, r.row_count)))
            .collect();
        if entries.is_empty() {
            return None;
        }

        match self.uploader.write_summary(spreadsheet_id, &entries).await {
            Ok(tab_name) => {
                self.sink.emit(ImportEvent::SummaryWritten {
                    run_id,
                    tab_name: tab_name.clone(),
                    entries: entries.len(),
                    timestamp: Utc::now(),
                });
                Some(tab_name)
            }
            Err(e) => {
                tracing::warn!("Failed to write summary: {}", e);
                None
            }
        }
    }

    fn abort(&self, run_id: Uuid, err: &ImportError) {
        self.sink.emit(ImportEvent::RunAborted {
            run_id,
            kind: err.kind(),
            reason: err.to_string(),
            timestamp: Utc::now(),
        });
    }
}
