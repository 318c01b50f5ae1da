//! Feed fetching.
//!
//! Each configured [`FeedSource`] is expanded into one request per keyword
//! when its URL contains `{keyword}`, or a single request otherwise. Requests
//! run one after another and are exposed as a lazy stream of [`FeedBatch`]es,
//! one per request, so a broken feed shows up as a failed batch and never
//! stops the remaining feeds from being read.
//!
//! In recent mode entries older than the lookback window are dropped here;
//! entries without a parseable date are kept. Initial mode keeps everything.

pub mod rss;

use crate::config::{FeedSource, KEYWORD_PLACEHOLDER};
use crate::error::PipelineError;
use crate::http::HttpClient;
use crate::models::RawEntry;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use futures::stream::{self, Stream, StreamExt};
use std::time::Duration as StdDuration;
use tracing::{debug, info, instrument, warn};

/// One concrete URL to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    /// `feed name` or `feed name:keyword`.
    pub label: String,
    pub feed_name: String,
    pub url: String,
}

/// Entries read from one request, or the reason the request failed.
#[derive(Debug)]
pub struct FeedBatch {
    pub request: FeedRequest,
    pub outcome: Result<Vec<RawEntry>, PipelineError>,
}

/// Expand feed templates against the keyword list.
pub fn expand_requests(feeds: &[FeedSource], keywords: &[String]) -> Vec<FeedRequest> {
    feeds
        .iter()
        .flat_map(|feed| {
            if feed.is_keyword_template() {
                keywords
                    .iter()
                    .map(|kw| FeedRequest {
                        label: format!("{}:{}", feed.name, kw),
                        feed_name: feed.name.clone(),
                        url: feed
                            .url
                            .replace(KEYWORD_PLACEHOLDER, &urlencoding::encode(kw)),
                    })
                    .collect::<Vec<_>>()
            } else {
                vec![FeedRequest {
                    label: feed.name.clone(),
                    feed_name: feed.name.clone(),
                    url: feed.url.clone(),
                }]
            }
        })
        .collect()
}

/// Whether an entry falls inside the lookback window ending at `now`.
pub fn within_lookback(
    published_at: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
    lookback: Duration,
) -> bool {
    match published_at {
        Some(ts) => ts.with_timezone(&Utc) >= now - lookback,
        None => true,
    }
}

/// Turn a parsed RSS document into entries, applying the lookback window.
pub fn entries_from_document(
    doc: rss::RssDocument,
    feed_name: &str,
    cutoff: Option<(DateTime<Utc>, Duration)>,
) -> Vec<RawEntry> {
    let channel_title = doc
        .channel
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    doc.channel
        .items
        .into_iter()
        .filter_map(|item| {
            let link = item.link.as_deref().map(str::trim).unwrap_or_default();
            if link.is_empty() {
                return None;
            }
            let published_at = item.published_at();
            if let Some((now, lookback)) = cutoff
                && !within_lookback(published_at, now, lookback)
            {
                return None;
            }
            let source_name = item
                .publisher()
                .or_else(|| channel_title.clone())
                .unwrap_or_else(|| feed_name.to_string());
            Some(RawEntry {
                image_url: item.image_url(),
                title: item.title.as_deref().unwrap_or_default().trim().to_string(),
                description: item.description.unwrap_or_default(),
                link: link.to_string(),
                source_name,
                published_at,
            })
        })
        .collect()
}

/// Polls the configured feeds.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    http: HttpClient,
    requests: Vec<FeedRequest>,
    timeout: StdDuration,
    /// `None` in initial mode.
    lookback: Option<Duration>,
}

impl FeedFetcher {
    pub fn new(
        http: HttpClient,
        feeds: &[FeedSource],
        keywords: &[String],
        timeout: StdDuration,
        lookback: Option<Duration>,
    ) -> Self {
        Self {
            http,
            requests: expand_requests(feeds, keywords),
            timeout,
            lookback,
        }
    }

    /// Lazily fetch every request in order, one batch per request.
    pub fn batches(&self) -> impl Stream<Item = FeedBatch> + '_ {
        stream::iter(self.requests.iter().cloned()).then(move |request| async move {
            let outcome = self.fetch(&request).await;
            match &outcome {
                Ok(entries) => {
                    info!(feed = %request.label, count = entries.len(), "Fetched feed entries")
                }
                Err(e) => warn!(feed = %request.label, error = %e, "Feed skipped"),
            }
            FeedBatch { request, outcome }
        })
    }

    #[instrument(level = "info", skip_all, fields(feed = %request.label, url = %request.url))]
    async fn fetch(&self, request: &FeedRequest) -> Result<Vec<RawEntry>, PipelineError> {
        let xml = self
            .http
            .get_text(&request.url, self.timeout)
            .await
            .map_err(|e| PipelineError::unavailable(&request.label, e))?;
        let doc = rss::parse(&xml).map_err(|e| PipelineError::unavailable(&request.label, e))?;
        let total = doc.channel.items.len();
        let cutoff = self.lookback.map(|lookback| (Utc::now(), lookback));
        let entries = entries_from_document(doc, &request.feed_name, cutoff);
        debug!(total, kept = entries.len(), "Applied lookback window");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn keywords() -> Vec<String> {
        vec!["파이프트리".to_string(), "paiptree".to_string()]
    }

    #[test]
    fn test_expand_keyword_templates() {
        let feeds = vec![
            FeedSource::new("naver", "https://search.example.com/rss?query={keyword}"),
            FeedSource::new("static", "https://static.example.com/feed.xml"),
        ];
        let requests = expand_requests(&feeds, &keywords());
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].label, "naver:파이프트리");
        assert_eq!(
            requests[0].url,
            "https://search.example.com/rss?query=%ED%8C%8C%EC%9D%B4%ED%94%84%ED%8A%B8%EB%A6%AC"
        );
        assert_eq!(requests[1].url, "https://search.example.com/rss?query=paiptree");
        assert_eq!(requests[2].label, "static");
    }

    #[test]
    fn test_lookback_window() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 0, 0, 0).unwrap();
        let week = Duration::days(7);
        let recent = rss::parse_date("Thu, 08 May 2025 12:00:00 +0900");
        let stale = rss::parse_date("Wed, 01 Jan 2025 12:00:00 +0900");
        assert!(within_lookback(recent, now, week));
        assert!(!within_lookback(stale, now, week));
        assert!(within_lookback(None, now, week));
    }

    const FEED: &str = r#"<rss version="2.0"><channel><title>Channel</title>
<item><title>fresh</title><link>https://a.example/1</link><pubDate>Thu, 08 May 2025 12:00:00 +0900</pubDate></item>
<item><title>stale</title><link>https://a.example/2</link><pubDate>Wed, 01 Jan 2025 12:00:00 +0900</pubDate></item>
<item><title>undated</title><link>https://a.example/3</link></item>
<item><title>no link</title></item>
</channel></rss>"#;

    #[test]
    fn test_entries_from_document_recent_mode() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 0, 0, 0).unwrap();
        let doc = rss::parse(FEED).unwrap();
        let entries = entries_from_document(doc, "feed", Some((now, Duration::days(7))));
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["fresh", "undated"]);
        assert_eq!(entries[0].source_name, "Channel");
    }

    #[test]
    fn test_entries_from_document_initial_mode() {
        let doc = rss::parse(FEED).unwrap();
        let entries = entries_from_document(doc, "feed", None);
        assert_eq!(entries.len(), 3);
    }
}
