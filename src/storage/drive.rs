//! Google Drive v3 REST backend for [`FileStore`].

use super::checked;
use super::traits::{FileStore, RemoteFolder, UploadedFile};
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const BOUNDARY: &str = "listing-scout-upload-boundary";

pub struct GoogleDriveClient {
    http: Client,
    token: String,
}

impl GoogleDriveClient {
    pub fn new(http: Client, token: impl Into<String>) -> Self {
        Self {
            http,
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    web_view_link: Option<String>,
}

/// Single-quoted literal for a Drive search query
fn query_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `multipart/related` body: JSON metadata part followed by the media part
fn multipart_body(metadata: &serde_json::Value, bytes: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl GoogleDriveClient {
    async fn search(&self, query: &str, fields: &str) -> Result<Vec<DriveFile>, StoreError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(DRIVE_API)
                .bearer_auth(&self.token)
                .query(&[
                    ("q", query),
                    ("spaces", "drive"),
                    ("pageSize", "1000"),
                    ("fields", fields),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = checked(request.send().await?)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(files),
            }
        }
    }
}

#[async_trait]
impl FileStore for GoogleDriveClient {
    async fn list_folders(&self, parent_id: &str) -> Result<Vec<RemoteFolder>, StoreError> {
        let query = format!(
            "{} in parents and mimeType = '{FOLDER_MIME}' and trashed = false",
            query_literal(parent_id)
        );
        let files = self
            .search(&query, "nextPageToken, files(id, name)")
            .await?;
        debug!("Found {} folders under {parent_id}", files.len());
        Ok(files
            .into_iter()
            .map(|f| RemoteFolder { id: f.id, name: f.name })
            .collect())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        let body = json!({ "name": name, "mimeType": FOLDER_MIME, "parents": [parent_id] });
        let response = self
            .http
            .post(DRIVE_API)
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&body)
            .send()
            .await?;
        let folder: DriveFile = checked(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        Ok(folder.id)
    }

    async fn file_exists(
        &self,
        name: &str,
        folder_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let query = format!(
            "name = {} and {} in parents and trashed = false",
            query_literal(name),
            query_literal(folder_id)
        );
        let files = self
            .search(&query, "nextPageToken, files(id, webViewLink)")
            .await?;
        Ok(files.into_iter().next().map(|f| {
            f.web_view_link
                .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", f.id))
        }))
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadedFile, StoreError> {
        let metadata = json!({ "name": name, "parents": [folder_id] });
        let body = multipart_body(&metadata, &bytes, mime_type);

        let response = self
            .http
            .post(DRIVE_UPLOAD_API)
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", "id, webViewLink")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;
        let file: DriveFile = checked(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let link = file
            .web_view_link
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", file.id));
        Ok(UploadedFile { id: file.id, link })
    }

    async fn set_public_readable(&self, file_id: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .post(format!("{DRIVE_API}/{file_id}/permissions"))
            .bearer_auth(&self.token)
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_literals_escape_quotes() {
        assert_eq!(query_literal("abc"), "'abc'");
        assert_eq!(query_literal("O'Neil_1.jpg"), r"'O\'Neil_1.jpg'");
    }

    #[test]
    fn multipart_body_wraps_metadata_and_media() {
        let metadata = json!({ "name": "a.jpg" });
        let body = multipart_body(&metadata, b"JPEGDATA", "image/jpeg");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(&format!("--{BOUNDARY}\r\nContent-Type: application/json")));
        assert!(text.contains(r#"{"name":"a.jpg"}"#));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n"));
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
    }
}
