//! Google Sheets v4 REST backend for [`SheetStore`]. Each partition is a tab
//! of one spreadsheet.

use super::checked;
use super::traits::{RowUpdate, SheetStore};
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct GoogleSheetsClient {
    http: Client,
    token: String,
    spreadsheet_id: String,
}

impl GoogleSheetsClient {
    pub fn new(http: Client, token: impl Into<String>, spreadsheet_id: impl Into<String>) -> Self {
        Self {
            http,
            token: token.into(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    /// `{api}/{spreadsheet}{suffix}` followed by `segments`, percent-encoded
    fn url(&self, suffix: &str, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(SHEETS_API)
            .map_err(|e| StoreError::InvalidResponse(format!("bad base url: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidResponse("base url cannot hold a path".into()))?;
            path.push(&format!("{}{suffix}", self.spreadsheet_id));
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

/// `'Tab Name'!A1:K1`, with embedded quotes doubled
fn qualified(key: &str, range: &str) -> String {
    format!("'{}'!{range}", key.replace('\'', "''"))
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: Option<String>,
}

/// First row number of an A1 range such as `'Tab'!A5:K6`
fn first_row_of(range: &str) -> Option<usize> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let start = cells.split(':').next()?;
    start
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .parse()
        .ok()
}

#[derive(Debug, Serialize)]
struct ValueRangeBody<'a> {
    range: String,
    values: [&'a [String]; 1],
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn list_partitions(&self) -> Result<Vec<String>, StoreError> {
        let url = self.url("", &[])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await?;
        let meta: SpreadsheetMeta = checked(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn create_partition(&self, key: &str, header: &[String]) -> Result<(), StoreError> {
        let url = self.url(":batchUpdate", &[])?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": key } } }]
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        checked(response).await?;
        debug!("Created tab '{key}'");

        self.append_rows(key, &[header.to_vec()]).await?;
        Ok(())
    }

    async fn read_all_rows(&self, key: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let range = qualified(key, "A:ZZ");
        let url = self.url("", &["values", &range])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;
        let values: ValueRange = checked(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(values.values)
    }

    async fn batch_update(&self, key: &str, updates: &[RowUpdate]) -> Result<(), StoreError> {
        let data: Vec<ValueRangeBody<'_>> = updates
            .iter()
            .map(|u| ValueRangeBody {
                range: qualified(key, &u.range.to_a1()),
                values: [u.values.as_slice()],
            })
            .collect();
        let body = json!({ "valueInputOption": "RAW", "data": data });

        let url = self.url("", &["values:batchUpdate"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn append_rows(
        &self,
        key: &str,
        rows: &[Vec<String>],
    ) -> Result<Option<usize>, StoreError> {
        let range = format!("{}:append", qualified(key, "A1"));
        let url = self.url("", &["values", &range])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        let appended: AppendResponse = checked(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        let first_row = appended
            .updates
            .and_then(|u| u.updated_range)
            .and_then(|range| first_row_of(&range));
        if first_row.is_none() {
            debug!("Append to '{key}' did not report where rows landed");
        }
        Ok(first_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleSheetsClient {
        GoogleSheetsClient::new(Client::new(), "token", "sheet123")
    }

    #[test]
    fn tab_names_are_quoted() {
        assert_eq!(qualified("Montgomery County", "A2:K2"), "'Montgomery County'!A2:K2");
        assert_eq!(qualified("Prince George's", "A1"), "'Prince George''s'!A1");
    }

    #[test]
    fn value_urls_are_percent_encoded() {
        let range = qualified("Montgomery County", "A:ZZ");
        let url = client().url("", &["values", &range]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/'Montgomery%20County'!A:ZZ"
        );
    }

    #[test]
    fn appended_row_is_read_from_updated_range() {
        let body = r#"{"spreadsheetId":"sheet123","tableRange":"'Montgomery County'!A1:K3",
            "updates":{"updatedRange":"'Montgomery County'!A5:K6","updatedRows":2}}"#;
        let appended: AppendResponse = serde_json::from_str(body).unwrap();
        let range = appended.updates.and_then(|u| u.updated_range).unwrap();
        assert_eq!(first_row_of(&range), Some(5));

        assert_eq!(first_row_of("'Tab!1'!B12:C12"), Some(12));
        assert_eq!(first_row_of("A:ZZ"), None);
    }

    #[test]
    fn spreadsheet_level_methods_use_colon_suffix() {
        let url = client().url(":batchUpdate", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123:batchUpdate"
        );
    }
}
