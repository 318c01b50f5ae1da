//! Pipeline configuration.
//!
//! Feed sources, keywords and tuning knobs live in one [`PipelineConfig`]
//! passed into the pipeline at construction. The defaults reproduce the
//! production deployment; a YAML file given with `--config` overrides any
//! subset of fields.
//!
//! ```yaml
//! keywords: ["파이프트리", "파머스마인드", "paiptree", "farmersmind"]
//! priority_keywords: ["파이프트리", "파머스마인드"]
//! feeds:
//!   - name: naver
//!     url: "https://newssearch.naver.com/search.naver?where=rss&query={keyword}"
//! image:
//!   max_width: 400
//!   max_height: 300
//! ```

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Placeholder token in a feed URL, replaced by each URL-encoded keyword.
pub const KEYWORD_PLACEHOLDER: &str = "{keyword}";

/// One syndication endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Label used in logs and as the last-resort category.
    pub name: String,
    /// Feed URL, optionally containing [`KEYWORD_PLACEHOLDER`].
    pub url: String,
}

impl FeedSource {
    /// Create a feed entry.
    ///
    /// # Arguments
    ///
    /// * `name` - label used in logs and as the fallback category
    /// * `url` - feed URL; a `{keyword}` placeholder makes it one request per keyword
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    pub fn is_keyword_template(&self) -> bool {
        self.url.contains(KEYWORD_PLACEHOLDER)
    }
}

/// Thumbnail extraction and encoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Body images smaller than this on either side are icons or spacers.
    pub min_body_dimension: u32,
    /// How many `<img>` elements the body strategy inspects.
    pub max_body_candidates: usize,
    /// Downloads larger than this are abandoned.
    pub max_image_bytes: usize,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_width: 400,
            max_height: 300,
            quality: 85,
            min_body_dimension: 100,
            max_body_candidates: 10,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Per-call network timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub feed_secs: u64,
    pub page_secs: u64,
    pub image_secs: u64,
    pub store_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            feed_secs: 15,
            page_secs: 10,
            image_secs: 15,
            store_secs: 30,
        }
    }
}

impl Timeouts {
    pub fn feed(&self) -> Duration {
        Duration::from_secs(self.feed_secs)
    }

    pub fn page(&self) -> Duration {
        Duration::from_secs(self.page_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }
}

/// Everything the pipeline needs to know besides credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub feeds: Vec<FeedSource>,
    /// Match keywords in configuration order; the order breaks tag-ranking ties.
    pub keywords: Vec<String>,
    /// Subset of `keywords` always listed first in tags.
    pub priority_keywords: Vec<String>,
    /// Entries older than this are skipped unless running in initial mode.
    pub lookback_days: i64,
    /// Thumbnail used when nothing else resolves.
    pub placeholder_url: String,
    /// Keyword-specific default thumbnails; the first tag with an entry wins.
    pub keyword_placeholders: BTreeMap<String, String>,
    pub image: ImageSettings,
    pub timeouts: Timeouts,
    /// Retry policy for thumbnail uploads.
    pub publish_retry: RetryPolicy,
    /// Attempts for fetching an article page.
    pub page_retry: RetryPolicy,
    /// Pause between store appends to stay inside API rate limits.
    pub append_delay_ms: u64,
    /// Worksheet (tab) holding the records.
    pub worksheet: String,
    /// Drive folder receiving thumbnails.
    pub drive_folder: String,
    pub title_max_chars: usize,
    pub description_max_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let keywords = ["파이프트리", "파머스마인드", "paiptree", "farmersmind"];
        Self {
            feeds: vec![FeedSource::new(
                "naver",
                "https://newssearch.naver.com/search.naver?where=rss&query={keyword}",
            )],
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            priority_keywords: vec!["파이프트리".to_string(), "파머스마인드".to_string()],
            lookback_days: 7,
            placeholder_url: "https://example.com/paiptree-default.jpg".to_string(),
            keyword_placeholders: BTreeMap::from([
                ("paiptree".to_string(), "https://example.com/paiptree-logo.jpg".to_string()),
                ("farmersmind".to_string(), "https://example.com/farmersmind-logo.jpg".to_string()),
                ("파이프트리".to_string(), "https://example.com/paiptree-kr.jpg".to_string()),
                ("파머스마인드".to_string(), "https://example.com/farmersmind-kr.jpg".to_string()),
            ]),
            image: ImageSettings::default(),
            timeouts: Timeouts::default(),
            publish_retry: RetryPolicy::exponential(3, Duration::from_secs(1)),
            page_retry: RetryPolicy::exponential(2, Duration::from_secs(1)),
            append_delay_ms: 500,
            worksheet: "news_data".to_string(),
            drive_folder: "Paiptree_News_Images".to_string(),
            title_max_chars: 200,
            description_max_chars: 500,
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document; missing fields keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load from a YAML file, or fall back to the built-in defaults.
    ///
    /// # Arguments
    ///
    /// * `path` - YAML file to read; `None` uses [`PipelineConfig::default`]
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] when the file cannot be read or parsed.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub async fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Self::default());
        };
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            feeds = config.feeds.len(),
            keywords = config.keywords.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn append_delay(&self) -> Duration {
        Duration::from_millis(self.append_delay_ms)
    }

    /// Placeholder thumbnail for an article with the given tags.
    pub fn placeholder_for(&self, tags: &[String]) -> &str {
        tags.iter()
            .find_map(|tag| {
                self.keyword_placeholders
                    .get(tag)
                    .or_else(|| self.keyword_placeholders.get(&tag.to_lowercase()))
            })
            .map(String::as_str)
            .unwrap_or(&self.placeholder_url)
    }
}
