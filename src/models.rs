//! Data models flowing through the collection pipeline.
//!
//! - [`RawEntry`]: one item as read from a feed
//! - [`ArticleCandidate`]: an entry that matched at least one keyword
//! - [`ImageCandidate`]: a fetched image awaiting optimization (never persisted)
//! - [`RecordDraft`]: a finished row without its id
//! - [`PublishedRecord`]: a row as written to the store, id included
//!
//! The store's column layout is fixed by [`COLUMNS`]; [`RecordDraft::to_row`]
//! produces cells in exactly that order.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Store column headers, order-significant.
pub const COLUMNS: [&str; 9] = [
    "id",
    "title",
    "description",
    "category",
    "tags",
    "upload_date",
    "download_count",
    "thumbnail_url",
    "original_url",
];

/// Index of `title` in [`COLUMNS`].
pub const TITLE_COLUMN: usize = 1;

/// Index of `original_url` in [`COLUMNS`].
pub const ORIGINAL_URL_COLUMN: usize = 8;

/// A single feed item before keyword matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub title: String,
    /// Description or body snippet, possibly HTML.
    pub description: String,
    pub link: String,
    /// Publisher label: item source/author, channel title or feed name.
    pub source_name: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    /// Image suggested by the feed (media thumbnail or image enclosure).
    pub image_url: Option<String>,
}

/// An entry that mentions at least one configured keyword.
///
/// `matched_keywords` is never empty and is ordered as the tags will be
/// written: priority keywords, then title matches, then body-only matches.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleCandidate {
    pub title: String,
    /// Description with markup stripped; keywords were matched against this.
    pub description: String,
    pub source_name: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    /// Canonical link with fragment and tracking parameters removed.
    pub original_url: String,
    pub matched_keywords: Vec<String>,
    /// Feed-suggested image, tried only when the article page yields none.
    pub image_url: Option<String>,
}

impl ArticleCandidate {
    /// Comma-joined tag cell.
    pub fn tags(&self) -> String {
        self.matched_keywords.join(",")
    }
}

/// Where an image was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// `og:image` / `twitter:image` style metadata.
    OgMeta,
    /// An `<img>` in the body meeting the minimum size.
    InBody,
    /// Any other image reference on the page.
    Fallback,
    /// The feed entry's own thumbnail or image enclosure.
    FeedMedia,
}

/// Downloaded image bytes with their decoded dimensions.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub source: ImageSource,
    /// Absolute URL the bytes were fetched from.
    pub url: String,
    pub raw_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A finished record awaiting its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub title: String,
    /// HTML-stripped, length-limited description.
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    /// `YYYY-MM-DD`.
    pub upload_date: String,
    pub download_count: u64,
    pub thumbnail_url: String,
    pub original_url: String,
}

impl RecordDraft {
    /// Row cells in [`COLUMNS`] order for the given id.
    pub fn to_row(&self, id: &str) -> Vec<String> {
        vec![
            id.to_string(),
            self.title.clone(),
            self.description.clone(),
            self.category.clone(),
            self.tags.join(","),
            self.upload_date.clone(),
            self.download_count.to_string(),
            self.thumbnail_url.clone(),
            self.original_url.clone(),
        ]
    }

    pub fn into_record(self, id: String) -> PublishedRecord {
        PublishedRecord { id, draft: self }
    }
}

/// A record as it exists in the store. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRecord {
    /// Assigned by the store from its row count at append time.
    pub id: String,
    #[serde(flatten)]
    pub draft: RecordDraft,
}

/// Format a store row count as a record id (`001`, `002`, ...).
pub fn format_record_id(row_count: usize) -> String {
    format!("{row_count:03}")
}
