//! Google Drive as the public thumbnail host.
//!
//! Uploads go into one folder (found by name, created if absent), each file
//! is shared as "anyone with the link can view", and the returned URL is the
//! direct-download form `https://drive.google.com/uc?id=<file id>`.

use super::auth::GoogleAuth;
use crate::error::PublishError;
use crate::store::ImagePublisher;
use crate::utils::truncate_for_log;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

pub const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const BOUNDARY: &str = "brand_news_collector_boundary";

#[derive(Debug, Deserialize)]
struct FileId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileId>,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

/// Public URL for an uploaded file.
pub fn public_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?id={file_id}")
}

fn classify_status(status: StatusCode, context: String) -> PublishError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PublishError::Transient(context)
    } else {
        PublishError::Permanent(context)
    }
}

/// `multipart/related` body: JSON metadata part, then the JPEG part.
fn multipart_body(metadata: &serde_json::Value, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Publishes thumbnails into a shared Drive folder.
#[derive(Debug)]
pub struct DriveImagePublisher {
    http: Client,
    auth: Arc<GoogleAuth>,
    api_base: String,
    upload_base: String,
    folder_name: String,
    folder_id: OnceCell<String>,
    timeout: Duration,
}

impl DriveImagePublisher {
    pub fn new(http: Client, auth: Arc<GoogleAuth>, folder_name: &str, timeout: Duration) -> Self {
        Self {
            http,
            auth,
            api_base: DRIVE_API.to_string(),
            upload_base: DRIVE_UPLOAD_API.to_string(),
            folder_name: folder_name.to_string(),
            folder_id: OnceCell::new(),
            timeout,
        }
    }

    /// Point both the metadata and upload endpoints at `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.api_base = format!("{base}/drive/v3");
        self.upload_base = format!("{base}/upload/drive/v3");
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, PublishError> {
        let token = self.auth.token().await.map_err(|e| {
            let context = format!("{what}: {e}");
            if e.is_transient() {
                PublishError::Transient(context)
            } else {
                PublishError::Permanent(context)
            }
        })?;
        let response = request
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PublishError::Transient(format!("{what}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                format!("{what}: HTTP {status}: {}", truncate_for_log(&body, 200)),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PublishError::Transient(format!("{what}: {e}")))
    }

    /// Id of the upload folder, looked up or created once per publisher.
    async fn folder_id(&self) -> Result<&str, PublishError> {
        let id = self
            .folder_id
            .get_or_try_init(|| self.find_or_create_folder())
            .await?;
        Ok(id.as_str())
    }

    #[instrument(level = "info", skip_all, fields(folder = %self.folder_name))]
    async fn find_or_create_folder(&self) -> Result<String, PublishError> {
        let query = format!(
            "name = '{}' and mimeType = '{FOLDER_MIME}' and trashed = false",
            self.folder_name.replace('\'', "\\'")
        );
        let found: FileList = self
            .call(
                self.http
                    .get(format!("{}/files", self.api_base))
                    .query(&[("q", query.as_str()), ("fields", "files(id,name)")]),
                "find folder",
            )
            .await?;
        if let Some(folder) = found.files.into_iter().next() {
            return Ok(folder.id);
        }
        let created: FileId = self
            .call(
                self.http
                    .post(format!("{}/files", self.api_base))
                    .query(&[("fields", "id")])
                    .json(&json!({ "name": self.folder_name, "mimeType": FOLDER_MIME })),
                "create folder",
            )
            .await?;
        info!(id = %created.id, "Created Drive folder");
        Ok(created.id)
    }
}

impl ImagePublisher for DriveImagePublisher {
    #[instrument(level = "info", skip_all, fields(%filename, bytes = bytes.len()))]
    async fn publish(&self, bytes: &[u8], filename: &str) -> Result<String, PublishError> {
        let folder = self.folder_id().await?.to_string();
        let metadata = json!({ "name": filename, "parents": [folder], "mimeType": "image/jpeg" });

        let uploaded: FileId = self
            .call(
                self.http
                    .post(format!("{}/files", self.upload_base))
                    .query(&[("uploadType", "multipart"), ("fields", "id")])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={BOUNDARY}"),
                    )
                    .body(multipart_body(&metadata, bytes)),
                "upload",
            )
            .await?;

        let _: Ignored = self
            .call(
                self.http
                    .post(format!("{}/files/{}/permissions", self.api_base, uploaded.id))
                    .json(&json!({ "role": "reader", "type": "anyone" })),
                "share",
            )
            .await?;

        let url = public_url(&uploaded.id);
        info!(%url, "Published thumbnail");
        Ok(url)
    }
}
