//! Error types for the collection pipeline.
//!
//! The taxonomy mirrors how far a failure is allowed to travel:
//!
//! | Variant | Scope | Handling |
//! |---------|-------|----------|
//! | [`PipelineError::SourceUnavailable`] | one feed or one article page | logged, skipped |
//! | [`PipelineError::ImageUnresolvable`] | one article's thumbnail | placeholder substituted |
//! | [`PipelineError::Publish`] | one upload | retried, then placeholder |
//! | [`PipelineError::StoreUnavailable`] | the whole run | propagated, run fails |
//! | [`PipelineError::Config`] | the whole run | propagated, run fails |
//!
//! Only the last two ever leave [`crate::pipeline::Pipeline::run`].

use thiserror::Error;

/// Errors raised while collecting, enriching and storing articles.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A feed or article page could not be fetched or parsed.
    #[error("source unavailable ({source_label}): {reason}")]
    SourceUnavailable {
        /// Feed label or page URL.
        source_label: String,
        /// Human readable cause.
        reason: String,
    },

    /// No extraction strategy produced a usable image.
    #[error("image unresolvable: {0}")]
    ImageUnresolvable(String),

    /// The remote image host rejected or failed an upload.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The destination store cannot be reached, authenticated or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration could not be loaded or credentials could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Whether rerunning the whole collection may succeed.
    ///
    /// Only store outages qualify; a bad configuration fails the same way on
    /// every attempt, and per-candidate errors never leave the run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::StoreUnavailable(_))
    }

    pub(crate) fn unavailable(label: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::SourceUnavailable {
            source_label: label.into(),
            reason: reason.to_string(),
        }
    }
}

/// Upload failures reported by an [`crate::store::ImagePublisher`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// Retryable: timeouts, connection resets, 429 and 5xx responses.
    #[error("transient publish failure: {0}")]
    Transient(String),

    /// Not worth retrying: rejected credentials, malformed requests, quota denial.
    #[error("permanent publish failure: {0}")]
    Permanent(String),
}

impl PublishError {
    /// Whether another upload attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

/// Failures of a single HTTP GET performed by [`crate::http::HttpClient`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response too large ({0} bytes)")]
    TooLarge(usize),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}
