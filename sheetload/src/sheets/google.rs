//! Google Sheets v4 / Drive v3 implementation of `SheetsApi`
//!
//! API Documentation: https://developers.google.com/sheets/api/reference/rest

use super::{ApiError, SheetsApi};
use crate::auth::TokenProvider;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const USER_AGENT: &str = concat!("sheetload/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CopiedFile {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetTabs {
    #[serde(default)]
    sheets: Vec<Tab>,
}

#[derive(Debug, Deserialize)]
struct Tab {
    properties: TabProperties,
}

#[derive(Debug, Deserialize)]
struct TabProperties {
    title: String,
}

/// HTTP client for the Sheets and Drive REST APIs
///
/// A fresh token is requested from the provider for every call, so a
/// provider that refreshes tokens keeps long runs alive.
pub struct GoogleSheetsClient<T> {
    http: Client,
    tokens: T,
    sheets_base: String,
    drive_base: String,
}

impl<T: TokenProvider> GoogleSheetsClient<T> {
    pub fn new(tokens: T) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::Fatal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            tokens,
            sheets_base: SHEETS_BASE_URL.to_string(),
            drive_base: DRIVE_FILES_URL.to_string(),
        })
    }

    /// Point the client at other endpoints (proxies, local emulators)
    pub fn with_base_urls(mut self, sheets_base: &str, drive_base: &str) -> Self {
        self.sheets_base = sheets_base.trim_end_matches('/').to_string();
        self.drive_base = drive_base.trim_end_matches('/').to_string();
        self
    }

    fn url(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(base)
            .map_err(|e| ApiError::Fatal(format!("Invalid base URL {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Fatal(format!("Base URL cannot take a path: {}", base)))?
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), &body))
    }
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        ApiError::Fatal(format!("Invalid request: {}", err))
    } else {
        // Timeouts, refused connections, resets, truncated bodies
        ApiError::Transient(format!("Request failed: {}", err))
    }
}

#[async_trait]
impl<T: TokenProvider> SheetsApi for GoogleSheetsClient<T> {
    async fn create_spreadsheet(
        &self,
        title: &str,
        template_id: Option<&str>,
    ) -> Result<String, ApiError> {
        match template_id {
            Some(template) => {
                let mut url = Self::url(&self.drive_base, &[template, "copy"])?;
                url.query_pairs_mut()
                    .append_pair("fields", "id")
                    .append_pair("supportsAllDrives", "true");

                tracing::debug!(template = %template, title = %title, "Copying template spreadsheet");

                let response = self
                    .send(self.http.post(url).json(&json!({ "name": title })))
                    .await?;
                let copied: CopiedFile = response
                    .json()
                    .await
                    .map_err(|e| ApiError::Transient(format!("Failed to parse copy response: {}", e)))?;
                Ok(copied.id)
            }
            None => {
                let url = Self::url(&self.sheets_base, &[])?;

                tracing::debug!(title = %title, "Creating blank spreadsheet");

                let response = self
                    .send(self.http.post(url).json(&json!({ "properties": { "title": title } })))
                    .await?;
                let created: CreatedSpreadsheet = response.json().await.map_err(|e| {
                    ApiError::Transient(format!("Failed to parse create response: {}", e))
                })?;
                Ok(created.spreadsheet_id)
            }
        }
    }

    async fn list_tabs(&self, spreadsheet_id: &str) -> Result<Vec<String>, ApiError> {
        let mut url = Self::url(&self.sheets_base, &[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self.send(self.http.get(url)).await?;
        let tabs: SpreadsheetTabs = response
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("Failed to parse spreadsheet: {}", e)))?;

        Ok(tabs.sheets.into_iter().map(|t| t.properties.title).collect())
    }

    async fn add_tab(
        &self,
        spreadsheet_id: &str,
        title: &str,
        rows: usize,
        columns: usize,
    ) -> Result<(), ApiError> {
        let segment = format!("{}:batchUpdate", spreadsheet_id);
        let url = Self::url(&self.sheets_base, &[segment.as_str()])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": rows.max(1),
                            "columnCount": columns.max(1),
                        }
                    }
                }
            }]
        });

        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<(), ApiError> {
        let mut url = Self::url(&self.sheets_base, &[spreadsheet_id, "values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });

        self.send(self.http.put(url).json(&body)).await?;
        Ok(())
    }
}
