//! Progress sinks
//!
//! The orchestrator does not care how progress is shown. It hands every
//! `ImportEvent` to a `ProgressSink` supplied by the caller.

use sheetload_common::events::{EventBus, ImportEvent};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ImportEvent);
}

/// Renders events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: ImportEvent) {
        match event {
            ImportEvent::RunStarted {
                spreadsheet_id,
                total_files,
                ..
            } => {
                tracing::info!(spreadsheet_id = %spreadsheet_id, total_files, "Import started");
            }
            ImportEvent::FileStarted {
                index,
                total_files,
                file,
                ..
            } => {
                tracing::info!("Processing file {} of {}: {}", index, total_files, file);
            }
            ImportEvent::FileSucceeded {
                file,
                tab_name,
                rows,
                attempts,
                ..
            } => {
                tracing::info!(file = %file, tab = %tab_name, rows, attempts, "Imported");
            }
            ImportEvent::FileFailed {
                file, kind, reason, ..
            } => {
                tracing::error!(file = %file, kind = %kind, "Failed: {}", reason);
            }
            ImportEvent::SummaryWritten {
                tab_name, entries, ..
            } => {
                tracing::info!(tab = %tab_name, entries, "Summary written");
            }
            ImportEvent::RunCompleted {
                succeeded, failed, ..
            } => {
                tracing::info!(succeeded, failed, "Import finished");
            }
            ImportEvent::RunAborted { kind, reason, .. } => {
                tracing::error!(kind = %kind, "Import aborted: {}", reason);
            }
        }
    }
}

/// Discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ImportEvent) {}
}

impl ProgressSink for EventBus {
    fn emit(&self, event: ImportEvent) {
        EventBus::emit(self, event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn emit(&self, event: ImportEvent) {
        (**self).emit(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_event_bus_sink_forwards() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        ProgressSink::emit(
            &bus,
            ImportEvent::RunCompleted {
                run_id,
                succeeded: 2,
                failed: 1,
                timestamp: Utc::now(),
            },
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id(), run_id);
    }
}
