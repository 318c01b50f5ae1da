//! Google Workspace collaborators: Sheets for records, Drive for thumbnails.

pub mod auth;
pub mod drive;
pub mod sheets;

use crate::error::PipelineError;
use auth::{GoogleAuth, SCOPE_DRIVE, SCOPE_SPREADSHEETS, ServiceAccountAuth};
use reqwest::Client;

/// Build service-account auth for both APIs from the JSON key.
pub fn service_account(credentials_json: &str, http: Client) -> Result<GoogleAuth, PipelineError> {
    ServiceAccountAuth::from_json(credentials_json, &[SCOPE_SPREADSHEETS, SCOPE_DRIVE], http)
        .map(GoogleAuth::ServiceAccount)
        .map_err(|e| PipelineError::Config(e.to_string()))
}
