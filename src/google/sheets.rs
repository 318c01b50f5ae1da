//! Google Sheets as the record store.
//!
//! Rows live in a single worksheet whose first row is the [`COLUMNS`] header.
//! The worksheet is created (with its header) on first use. Ids come from the
//! worksheet's row count at append time: with the header occupying row 1,
//! the n-th record gets id `format_record_id(n)`.

use super::auth::GoogleAuth;
use crate::error::PipelineError;
use crate::models::{COLUMNS, ORIGINAL_URL_COLUMN, RecordDraft, TITLE_COLUMN, format_record_id};
use crate::store::{RowStore, StoredKey};
use crate::utils::truncate_for_log;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Column span covering every field of a record.
const RECORD_COLUMNS: &str = "A:I";

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

/// A1 range for `columns` on `sheet`, quoted so any title is accepted.
fn a1_range(sheet: &str, columns: &str) -> String {
    format!("'{}'!{columns}", sheet.replace('\'', "''"))
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_header(row: &[serde_json::Value]) -> bool {
    row.first().map(cell_text).as_deref() == Some(COLUMNS[0])
}

/// One worksheet of one spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsStore {
    http: Client,
    auth: Arc<GoogleAuth>,
    base_url: String,
    spreadsheet_id: String,
    worksheet: String,
    timeout: Duration,
}

impl SheetsStore {
    pub fn new(
        http: Client,
        auth: Arc<GoogleAuth>,
        spreadsheet_id: &str,
        worksheet: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            auth,
            base_url: SHEETS_API.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
            timeout,
        }
    }

    /// Point at a different API root (used against local mock servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/{}", self.base_url, self.spreadsheet_id)
    }

    fn values_url(&self, columns: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(&a1_range(&self.worksheet, columns))
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, PipelineError> {
        let token = self
            .auth
            .token()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("{what}: {e}")))?;
        let response = request
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("{what}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::StoreUnavailable(format!(
                "{what}: HTTP {status}: {}",
                truncate_for_log(&body, 200)
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::StoreUnavailable(format!("{what}: {e}")))
    }

    async fn read_values(&self, columns: &str) -> Result<Vec<Vec<serde_json::Value>>, PipelineError> {
        let range: ValueRange = self
            .call(self.http.get(self.values_url(columns)), "read values")
            .await?;
        Ok(range.values)
    }

    async fn append_row(&self, row: Vec<String>) -> Result<(), PipelineError> {
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(RECORD_COLUMNS)
        );
        let _: Ignored = self
            .call(self.http.post(url).json(&json!({ "values": [row] })), "append row")
            .await?;
        Ok(())
    }

    /// Create the worksheet and its header row if either is missing.
    #[instrument(level = "info", skip_all, fields(spreadsheet = %self.spreadsheet_id, worksheet = %self.worksheet))]
    pub async fn ensure_worksheet(&self) -> Result<(), PipelineError> {
        let spreadsheet: Spreadsheet = self
            .call(
                self.http
                    .get(self.spreadsheet_url())
                    .query(&[("fields", "sheets.properties.title")]),
                "read spreadsheet",
            )
            .await?;
        let exists = spreadsheet
            .sheets
            .iter()
            .any(|s| s.properties.title == self.worksheet);

        if !exists {
            let body = json!({
                "requests": [{
                    "addSheet": {
                        "properties": {
                            "title": self.worksheet,
                            "gridProperties": { "rowCount": 1000, "columnCount": COLUMNS.len() }
                        }
                    }
                }]
            });
            let _: Ignored = self
                .call(
                    self.http
                        .post(format!("{}:batchUpdate", self.spreadsheet_url()))
                        .json(&body),
                    "add worksheet",
                )
                .await?;
            info!("Created worksheet");
        }

        let first = self.read_values("A1:I1").await?;
        if first.first().is_none_or(|row| row.is_empty()) {
            self.append_row(COLUMNS.iter().map(|c| c.to_string()).collect())
                .await?;
            info!("Wrote header row");
        }
        Ok(())
    }
}

impl RowStore for SheetsStore {
    #[instrument(level = "info", skip_all, fields(worksheet = %self.worksheet))]
    async fn existing_keys(&self) -> Result<Vec<StoredKey>, PipelineError> {
        let rows = self.read_values(RECORD_COLUMNS).await?;
        let keys: Vec<StoredKey> = rows
            .iter()
            .filter(|row| !is_header(row))
            .filter_map(|row| {
                let original_url = row.get(ORIGINAL_URL_COLUMN).map(cell_text)?;
                (!original_url.is_empty()).then(|| StoredKey {
                    original_url,
                    title: row.get(TITLE_COLUMN).map(cell_text).unwrap_or_default(),
                })
            })
            .collect();
        info!(rows = rows.len(), keys = keys.len(), "Loaded existing records");
        Ok(keys)
    }

    #[instrument(level = "info", skip_all, fields(url = %draft.original_url))]
    async fn append(&self, draft: &RecordDraft) -> Result<String, PipelineError> {
        let row_count = self.read_values("A:A").await?.len();
        let id = format_record_id(row_count.max(1));
        self.append_row(draft.to_row(&id)).await?;
        debug!(%id, "Appended row");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_a1_range_quotes_titles() {
        assert_eq!(a1_range("news_data", "A:I"), "'news_data'!A:I");
        assert_eq!(a1_range("Bob's news", "A:A"), "'Bob''s news'!A:A");
    }

    #[test]
    fn test_header_detection() {
        let header: Vec<Value> = COLUMNS.iter().map(|c| Value::from(*c)).collect();
        assert!(is_header(&header));
        assert!(!is_header(&[Value::from("001")]));
        assert!(!is_header(&[]));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Value::from("x")), "x");
        assert_eq!(cell_text(&Value::from(3)), "3");
        assert_eq!(cell_text(&Value::Null), "");
    }
}
