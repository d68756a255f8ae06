//! Upload client: throttle, retry bound, batching, tab naming

mod helpers;

use helpers::{strings, Call, FakeSheetsApi, Op};
use sheetload::normalizer::SheetGrid;
use sheetload::sheets::ApiError;
use sheetload::upload::{UploadClient, UploadError, UploadSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SHEET: &str = "sheet-1";

fn settings() -> UploadSettings {
    UploadSettings {
        request_delay: Duration::from_secs(1),
        max_retries: 3,
        backoff_base: Duration::from_secs(30),
        backoff_max: Duration::from_secs(300),
        batch_rows: 2,
    }
}

fn client(api: &Arc<FakeSheetsApi>) -> UploadClient<Arc<FakeSheetsApi>> {
    UploadClient::new(Arc::clone(api), settings())
}

fn grid(rows: &[&[&str]]) -> SheetGrid {
    SheetGrid::from_rows(strings(rows))
}

#[tokio::test(start_paused = true)]
async fn test_three_rate_limits_then_success_takes_four_attempts() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::WriteRange, 3, ApiError::RateLimited("HTTP 429".into()));
    let mut uploader = client(&api);

    let start = Instant::now();
    let result = uploader
        .upload(SHEET, "orders", &grid(&[&["a", "b"]]))
        .await
        .unwrap();

    assert_eq!(api.count(Op::WriteRange), 4);
    assert_eq!(result.write_batches, 1);
    // list_tabs + add_tab + 4 writes
    assert_eq!(result.attempts, 6);

    // 6 throttle sleeps plus backoff of 30 + 60 + 120 seconds
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(216), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(217), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhausted() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::WriteRange, 10, ApiError::RateLimited("HTTP 429".into()));
    let mut uploader = client(&api);

    let err = uploader
        .upload(SHEET, "orders", &grid(&[&["a"]]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::RateLimitExceeded {
            attempts: 4,
            message: "HTTP 429".into()
        }
    );
    assert_eq!(api.count(Op::WriteRange), 4);
}

#[tokio::test(start_paused = true)]
async fn test_transient_exhausted() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::AddTab, 10, ApiError::Transient("timed out".into()));
    let mut uploader = client(&api);

    let err = uploader
        .upload(SHEET, "orders", &grid(&[&["a"]]))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Transient { attempts: 4, .. }));
    assert_eq!(api.count(Op::AddTab), 4);
    assert_eq!(api.count(Op::WriteRange), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mixed_failures_share_one_bound() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_next(
        Op::WriteRange,
        [
            ApiError::Transient("reset".into()),
            ApiError::RateLimited("HTTP 429".into()),
            ApiError::Transient("reset".into()),
            ApiError::RateLimited("HTTP 429".into()),
        ],
    );
    let mut uploader = client(&api);

    let err = uploader
        .upload(SHEET, "orders", &grid(&[&["a"]]))
        .await
        .unwrap_err();

    // Classified by the last failure
    assert!(matches!(err, UploadError::RateLimitExceeded { attempts: 4, .. }));
    assert_eq!(api.count(Op::WriteRange), 4);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_is_not_retried() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::WriteRange, 1, ApiError::Fatal("HTTP 403: forbidden".into()));
    let mut uploader = client(&api);

    let start = Instant::now();
    let err = uploader
        .upload(SHEET, "orders", &grid(&[&["a"]]))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::Fatal("HTTP 403: forbidden".into()));
    assert_eq!(api.count(Op::WriteRange), 1);
    // Throttle only, no backoff
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_becomes_authentication() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::ListTabs, 1, ApiError::Unauthorized("HTTP 401".into()));
    let mut uploader = client(&api);

    let err = uploader
        .upload(SHEET, "orders", &grid(&[&["a"]]))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::Authentication("HTTP 401".into()));
    assert_eq!(api.count(Op::AddTab), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rows_are_written_in_batches() {
    let api = Arc::new(FakeSheetsApi::new());
    let mut uploader = client(&api);

    let result = uploader
        .upload(
            SHEET,
            "data",
            &grid(&[&["1"], &["2", "x"], &["3"], &["4"], &["5"]]),
        )
        .await
        .unwrap();

    assert_eq!(result.rows_written, 5);
    assert_eq!(result.columns, 2);
    assert_eq!(result.write_batches, 3);

    let writes = api.writes();
    let ranges: Vec<_> = writes.iter().map(|(r, _)| r.as_str()).collect();
    assert_eq!(ranges, vec!["'data'!A1", "'data'!A3", "'data'!A5"]);
    assert_eq!(writes[1].1, strings(&[&["3", ""], &["4", ""]]));

    assert!(api.calls().contains(&Call::AddTab {
        spreadsheet_id: SHEET.into(),
        title: "data".into(),
        rows: 5,
        columns: 2,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_empty_grid_creates_empty_tab() {
    let api = Arc::new(FakeSheetsApi::new());
    let mut uploader = client(&api);

    let result = uploader
        .upload(SHEET, "empty", &SheetGrid::default())
        .await
        .unwrap();

    assert_eq!(result.rows_written, 0);
    assert_eq!(result.write_batches, 0);
    assert_eq!(api.count(Op::WriteRange), 0);
    assert!(api.calls().contains(&Call::AddTab {
        spreadsheet_id: SHEET.into(),
        title: "empty".into(),
        rows: 1,
        columns: 1,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_tab_names_sanitized_and_deduplicated() {
    let api = Arc::new(FakeSheetsApi::with_tabs(["Sheet1", "orders"]));
    let mut uploader = client(&api);
    let rows = grid(&[&["a"]]);

    let first = uploader.upload(SHEET, "Orders", &rows).await.unwrap();
    let second = uploader.upload(SHEET, "orders", &rows).await.unwrap();
    let third = uploader.upload(SHEET, "q1/q2: sales", &rows).await.unwrap();

    assert_eq!(first.tab_name, "Orders (2)");
    assert_eq!(second.tab_name, "orders (3)");
    assert_eq!(third.tab_name, "q1_q2_ sales");

    // Existing titles are fetched once per spreadsheet
    assert_eq!(api.count(Op::ListTabs), 1);
    assert_eq!(
        api.tabs(),
        vec!["Sheet1", "orders", "Orders (2)", "orders (3)", "q1_q2_ sales"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_write_summary_targets_first_tab() {
    let api = Arc::new(FakeSheetsApi::with_tabs(["Overview", "a"]));
    let mut uploader = client(&api);

    let tab = uploader
        .write_summary(SHEET, &[("a".to_string(), 10), ("b".to_string(), 0)])
        .await
        .unwrap();

    assert_eq!(tab, "Overview");
    assert_eq!(
        api.writes(),
        vec![(
            "'Overview'!A1".to_string(),
            strings(&[&["a", "10"], &["b", "0"]])
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_spreadsheet_is_retried() {
    let api = Arc::new(FakeSheetsApi::new());
    api.fail_times(Op::CreateSpreadsheet, 1, ApiError::Transient("HTTP 503".into()));
    let mut uploader = client(&api);

    let id = uploader
        .create_spreadsheet("Sales 01012024", Some("template-1"))
        .await
        .unwrap();

    assert_eq!(id, helpers::CREATED_ID);
    assert_eq!(api.count(Op::CreateSpreadsheet), 2);
    assert_eq!(uploader.total_attempts(), 2);
}
