//! Boundaries to the external services the pipeline writes to.
//!
//! - [`RowStore`]: the append-only tabular store (a Google Sheets worksheet
//!   in production, see [`crate::google::sheets`])
//! - [`ImagePublisher`]: the public image host (Google Drive in production,
//!   see [`crate::google::drive`])
//!
//! The pipeline never generates record ids itself; the store assigns one at
//! append time from its current row count. This assumes a single writer: a
//! manual edit to the sheet between the count and the append can produce a
//! duplicate id.

use crate::error::{PipelineError, PublishError};
use crate::models::RecordDraft;

/// The parts of a stored record that identify its story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub original_url: String,
    pub title: String,
}

/// Append-only record store.
#[allow(async_fn_in_trait)]
pub trait RowStore {
    /// URL and title of every record already stored, loaded once per run.
    async fn existing_keys(&self) -> Result<Vec<StoredKey>, PipelineError>;

    /// Append a record and return the id the store assigned to it.
    async fn append(&self, draft: &RecordDraft) -> Result<String, PipelineError>;
}

/// Public hosting for optimized thumbnails.
#[allow(async_fn_in_trait)]
pub trait ImagePublisher {
    /// Upload a JPEG under `filename` and return its public URL.
    async fn publish(&self, bytes: &[u8], filename: &str) -> Result<String, PublishError>;
}
