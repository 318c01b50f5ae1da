//! Optional run notifications.
//!
//! When a webhook URL is configured, the run summary is POSTed as
//! `{"text": <summary>, "report": <RunReport>}`, a shape accepted by Slack,
//! Mattermost and most chat incoming-webhooks. Delivery failures are logged
//! and otherwise ignored; a notification never changes the run outcome.

use crate::pipeline::RunReport;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Posts run outcomes to an incoming webhook, or does nothing.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: Client,
    webhook_url: Option<String>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(http: Client, webhook_url: Option<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            timeout: Duration::from_secs(10),
        }
    }

    /// Whether a webhook URL was configured.
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Report a completed run. Returns whether the webhook accepted it.
    pub async fn run_completed(&self, report: &RunReport) -> bool {
        self.post(json!({ "text": report.summary(), "report": report }))
            .await
    }

    /// Report a run that failed after all attempts.
    pub async fn run_failed(&self, error: &str, attempts: usize) -> bool {
        self.post(json!({
            "text": format!("News collection failed after {attempts} attempt(s): {error}"),
            "error": error,
            "attempts": attempts,
        }))
        .await
    }

    #[instrument(level = "info", skip_all)]
    async fn post(&self, payload: serde_json::Value) -> bool {
        let Some(url) = &self.webhook_url else {
            debug!("No webhook configured; skipping notification");
            return false;
        };
        match self
            .http
            .post(url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Notification sent");
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(%status, body = %truncate_for_log(&body, 200), "Webhook rejected notification");
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to send notification; continuing");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunMode;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_disabled_without_url() {
        let notifier = Notifier::new(Client::new(), Some("  ".to_string()));
        assert!(!notifier.is_enabled());
        assert!(!notifier.run_completed(&RunReport::new(RunMode::Recent)).await);
    }

    #[tokio::test]
    async fn test_posts_summary_and_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({ "report": { "mode": "initial", "appended": 2 } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut report = RunReport::new(RunMode::Initial);
        report.appended = 2;
        let notifier = Notifier::new(Client::new(), Some(format!("{}/hook", server.uri())));
        assert!(notifier.run_completed(&report).await);
    }

    #[tokio::test]
    async fn test_webhook_failure_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = Notifier::new(Client::new(), Some(server.uri()));
        assert!(!notifier.run_failed("store unavailable: 403", 3).await);
    }
}
