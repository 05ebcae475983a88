//! Google Sheets v4 REST client.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::auth::{ServiceAccountKey, ServiceAccountTokens, TokenProvider};
use super::{CellUpdate, OfferSheet};
use crate::config::ResolvedConfig;
use crate::error::SheetError;

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

pub struct GoogleSheet {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    tokens: Box<dyn TokenProvider>,
    sheet_ids: Mutex<HashMap<String, i64>>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheet {
    pub fn new(spreadsheet_id: impl Into<String>, tokens: Box<dyn TokenProvider>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            tokens,
            sheet_ids: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Client for the configured spreadsheet, authenticated with the
    /// configured service-account key.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let key = ServiceAccountKey::load(config.service_account_path()?)?;
        let sheet = Self::new(config.spreadsheet_id()?, Box::new(ServiceAccountTokens::new(key)));
        Ok(match &config.sheet.api_base_url {
            Some(base) => sheet.with_base_url(base.as_str()),
            None => sheet,
        })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/v4/spreadsheets/{}", self.base_url, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), urlencoding::encode(range))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Sheets API request failed")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read Sheets API response")?;
        if !status.is_success() {
            return Err(SheetError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).context("Failed to parse Sheets API response")
    }

    async fn batch_update(&self, requests: Vec<Value>) -> Result<Value> {
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        self.send(self.client.post(url).json(&json!({ "requests": requests })))
            .await
    }

    /// Numeric id of the worksheet titled `title`, from cached metadata.
    async fn sheet_id(&self, title: &str) -> Result<Option<i64>> {
        let mut ids = self.sheet_ids.lock().await;
        if let Some(id) = ids.get(title) {
            return Ok(Some(*id));
        }
        let url = format!("{}?fields=sheets.properties(sheetId,title)", self.spreadsheet_url());
        let meta: Spreadsheet = serde_json::from_value(self.send(self.client.get(url)).await?)
            .context("Unexpected spreadsheet metadata")?;
        ids.clear();
        for entry in meta.sheets {
            ids.insert(entry.properties.title, entry.properties.sheet_id);
        }
        Ok(ids.get(title).copied())
    }

    async fn require_sheet_id(&self, title: &str) -> Result<i64> {
        self.sheet_id(title)
            .await?
            .ok_or_else(|| SheetError::MissingWorksheet(title.to_string()).into())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let value = self.send(self.client.get(self.values_url(range))).await?;
        let range: ValueRange = if value.is_null() {
            ValueRange::default()
        } else {
            serde_json::from_value(value).context("Unexpected values response")?
        };
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `'Card Offers'!A1` style reference. Quotes in titles are doubled.
fn a1(title: &str, cells: &str) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    if cells.is_empty() {
        quoted
    } else {
        format!("{quoted}!{cells}")
    }
}

/// 1 -> A, 26 -> Z, 27 -> AA.
fn column_letters(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[async_trait]
impl OfferSheet for GoogleSheet {
    async fn ensure_worksheet(&self, title: &str, headers: &[&str]) -> Result<()> {
        if self.sheet_id(title).await?.is_none() {
            let reply = self
                .batch_update(vec![json!({ "addSheet": { "properties": { "title": title } } })])
                .await?;
            if let Some(id) = reply["replies"][0]["addSheet"]["properties"]["sheetId"].as_i64() {
                self.sheet_ids.lock().await.insert(title.to_string(), id);
            }
            info!(worksheet = title, "Created worksheet");
        }

        let current = self.get_values(&a1(title, "1:1")).await?;
        let wanted: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        if current.first() != Some(&wanted) {
            let url = format!("{}?valueInputOption=RAW", self.values_url(&a1(title, "A1")));
            self.send(self.client.put(url).json(&json!({
                "majorDimension": "ROWS",
                "values": [wanted],
            })))
            .await?;
            debug!(worksheet = title, "Wrote header row");
        }
        Ok(())
    }

    async fn read_rows(&self, title: &str) -> Result<Vec<Vec<String>>> {
        // The values endpoint rejects ranges on worksheets that do not exist.
        if self.sheet_id(title).await?.is_none() {
            debug!(worksheet = title, "Worksheet missing; reading as empty");
            return Ok(Vec::new());
        }
        self.get_values(&a1(title, "")).await
    }

    async fn append_rows(&self, title: &str, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url(&a1(title, "A1"))
        );
        self.send(self.client.post(url).json(&json!({
            "majorDimension": "ROWS",
            "values": rows,
        })))
        .await?;
        Ok(())
    }

    async fn update_cells(&self, title: &str, updates: &[CellUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = updates
            .iter()
            .map(|u| {
                json!({
                    "range": a1(title, &format!("{}{}", column_letters(u.column), u.row)),
                    "values": [[u.value]],
                })
            })
            .collect();
        let url = format!("{}/values:batchUpdate", self.spreadsheet_url());
        self.send(self.client.post(url).json(&json!({
            "valueInputOption": "RAW",
            "data": data,
        })))
        .await?;
        Ok(())
    }

    async fn delete_rows(&self, title: &str, rows: &[usize]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sheet_id = self.require_sheet_id(title).await?;
        let mut rows = rows.to_vec();
        // Bottom-up so earlier deletions do not shift later ones.
        rows.sort_unstable_by(|a, b| b.cmp(a));
        rows.dedup();
        let requests = rows
            .into_iter()
            .filter(|r| *r >= 1)
            .map(|r| {
                json!({
                    "deleteDimension": {
                        "range": {
                            "sheetId": sheet_id,
                            "dimension": "ROWS",
                            "startIndex": r - 1,
                            "endIndex": r,
                        }
                    }
                })
            })
            .collect();
        self.batch_update(requests).await?;
        Ok(())
    }

    async fn reset_filter(&self, title: &str, columns: usize) -> Result<()> {
        let sheet_id = self.require_sheet_id(title).await?;
        self.batch_update(vec![
            json!({ "clearBasicFilter": { "sheetId": sheet_id } }),
            json!({
                "setBasicFilter": {
                    "filter": {
                        "range": {
                            "sheetId": sheet_id,
                            "startRowIndex": 0,
                            "startColumnIndex": 0,
                            "endColumnIndex": columns,
                        }
                    }
                }
            }),
        ])
        .await?;
        Ok(())
    }
}
