//! Shared HTTP client for feeds, article pages and images.
//!
//! Every call carries an explicit timeout and treats any non-2xx status as a
//! failure, so callers only ever see a body or a [`FetchError`].

use crate::error::FetchError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Browser-like User-Agent; several Korean news portals refuse unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Thin wrapper around a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// The underlying client, for callers that need custom requests.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET `url` and return the body decoded as text.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        debug!(bytes = text.len(), "Fetched text");
        Ok(text)
    }

    /// GET `url` and return the raw body, refusing bodies over `max_bytes`.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn get_bytes(
        &self,
        url: &str,
        timeout: Duration,
        max_bytes: usize,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(len) = response.content_length()
            && len as usize > max_bytes
        {
            return Err(FetchError::TooLarge(len as usize));
        }
        let bytes = response.bytes().await?;
        if bytes.len() > max_bytes {
            return Err(FetchError::TooLarge(bytes.len()));
        }
        debug!(bytes = bytes.len(), "Fetched bytes");
        Ok(bytes.to_vec())
    }
}
