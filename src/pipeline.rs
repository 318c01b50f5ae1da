//! One collection run, end to end.
//!
//! ```text
//! store.existing_keys ─┐
//!                      ▼
//! feeds ─▶ matcher ─▶ sort by date ─▶ dedup ─▶ image resolver ─▶ publisher ─▶ store.append
//! ```
//!
//! Candidates are handled strictly one at a time: each is resolved,
//! published and appended before the next is admitted, so records reach the
//! store in acceptance order. Per-feed and per-image failures are contained
//! and counted in the [`RunReport`]; only store failures end the run early.

use crate::config::PipelineConfig;
use crate::dedup::{DedupFilter, Rejection, canonical_url};
use crate::error::{PipelineError, PublishError};
use crate::feeds::{FeedBatch, FeedFetcher};
use crate::http::HttpClient;
use crate::images::optimize::OptimizedImage;
use crate::images::{ImageResolver, Resolution};
use crate::matcher::KeywordMatcher;
use crate::models::{ArticleCandidate, PublishedRecord, RecordDraft};
use crate::store::{ImagePublisher, RowStore};
use crate::utils::truncate_chars;
use chrono::{DateTime, Local, Utc};
use futures::StreamExt;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Whether the lookback window applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Backfill: every entry the feeds return, regardless of age.
    Initial,
    /// Routine: only entries inside the lookback window.
    Recent,
}

impl RunMode {
    /// `--initial` selects a backfill; otherwise the lookback window applies.
    pub fn from_initial_flag(initial: bool) -> Self {
        if initial { RunMode::Initial } else { RunMode::Recent }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub feeds_total: usize,
    pub feeds_failed: usize,
    pub entries_seen: usize,
    pub matched: usize,
    pub rejected_seen: usize,
    pub rejected_duplicate: usize,
    pub appended: usize,
    /// Appended records whose thumbnail is a placeholder.
    pub placeholders: usize,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            feeds_total: 0,
            feeds_failed: 0,
            entries_seen: 0,
            matched: 0,
            rejected_seen: 0,
            rejected_duplicate: 0,
            appended: 0,
            placeholders: 0,
            elapsed_ms: 0,
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mode = match self.mode {
            RunMode::Initial => "initial",
            RunMode::Recent => "recent",
        };
        format!(
            "News collection ({mode}): {} new article(s) appended, {} with placeholder image; \
             {} entries from {}/{} feeds, {} matched, {} already stored, {} duplicates; {:.1}s",
            self.appended,
            self.placeholders,
            self.entries_seen,
            self.feeds_total - self.feeds_failed,
            self.feeds_total,
            self.matched,
            self.rejected_seen,
            self.rejected_duplicate,
            self.elapsed_ms as f64 / 1000.0,
        )
    }
}

/// Upload filename: `news_thumb_{domain}_{W}x{H}_{hash8}_{unix_ts}.jpg`.
pub fn thumbnail_filename(article_url: &str, image: &OptimizedImage, unix_ts: i64) -> String {
    let domain = url::Url::parse(article_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let domain: String = domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(image.origin_url.as_bytes());
    let hash8 = &hex::encode(digest)[..8];
    format!(
        "news_thumb_{domain}_{}x{}_{hash8}_{unix_ts}.jpg",
        image.width, image.height
    )
}

/// Sort key placing undated candidates last, as if published now.
fn chronological_key(candidate: &ArticleCandidate, now: DateTime<Utc>) -> DateTime<Utc> {
    candidate
        .published_at
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now)
}

/// The collection pipeline over a concrete store and image host.
pub struct Pipeline<S, P> {
    config: PipelineConfig,
    fetcher: FeedFetcher,
    matcher: KeywordMatcher,
    resolver: ImageResolver,
    store: S,
    publisher: P,
    mode: RunMode,
}

impl<S: RowStore, P: ImagePublisher> Pipeline<S, P> {
    /// Wire the fetcher, matcher and resolver from `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - feeds, keywords, limits and retry policies
    /// * `http` - shared client for feeds, article pages and images
    /// * `store` - where records are appended
    /// * `publisher` - where thumbnails are hosted
    /// * `mode` - [`RunMode::Recent`] applies the lookback window, [`RunMode::Initial`] does not
    pub fn new(config: PipelineConfig, http: HttpClient, store: S, publisher: P, mode: RunMode) -> Self {
        let lookback = match mode {
            RunMode::Initial => None,
            RunMode::Recent => Some(chrono::Duration::days(config.lookback_days)),
        };
        Self {
            fetcher: FeedFetcher::new(
                http.clone(),
                &config.feeds,
                &config.keywords,
                config.timeouts.feed(),
                lookback,
            ),
            matcher: KeywordMatcher::new(&config.keywords, &config.priority_keywords),
            resolver: ImageResolver::new(http, &config),
            config,
            store,
            publisher,
            mode,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Execute one collection run.
    ///
    /// Loads the stored keys, reads every feed, then admits, resolves,
    /// publishes and appends candidates one at a time, oldest first.
    ///
    /// # Returns
    ///
    /// The [`RunReport`] counters. Failing feeds, unresolvable images and
    /// failed uploads are counted or replaced by placeholders, never returned.
    ///
    /// # Errors
    ///
    /// [`PipelineError::StoreUnavailable`] when the store cannot be read at
    /// the start or an append fails. Records appended before the failure stay
    /// in the store and are skipped as already stored on the next run.
    #[instrument(level = "info", skip_all, fields(mode = ?self.mode))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let mut report = RunReport::new(self.mode);

        let existing = self.store.existing_keys().await?;
        let mut dedup = DedupFilter::new(&existing);
        info!(existing = dedup.seen_count(), "Loaded store state");

        let candidates = self.collect_candidates(&mut report).await;
        info!(
            feeds = report.feeds_total,
            failed = report.feeds_failed,
            entries = report.entries_seen,
            matched = report.matched,
            "Collected candidates"
        );

        for candidate in candidates {
            match dedup.admit(&candidate) {
                Err(Rejection::Seen) => {
                    report.rejected_seen += 1;
                    continue;
                }
                Err(Rejection::DuplicateInRun) => {
                    report.rejected_duplicate += 1;
                    continue;
                }
                Ok(()) => {}
            }

            let (record, placeholder) = match self.process(&candidate).await {
                Ok(done) => done,
                Err(e) => {
                    error!(url = %candidate.original_url, error = %e, "Store append failed; aborting run");
                    return Err(e);
                }
            };
            report.appended += 1;
            if placeholder {
                report.placeholders += 1;
            }
            info!(
                id = %record.id,
                title = %record.draft.title,
                tags = %record.draft.tags.join(","),
                placeholder,
                "Appended record"
            );

            let delay = self.config.append_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            appended = report.appended,
            placeholders = report.placeholders,
            rejected_seen = report.rejected_seen,
            rejected_duplicate = report.rejected_duplicate,
            elapsed_ms = report.elapsed_ms,
            "Run complete"
        );
        Ok(report)
    }

    /// Read every feed, keep keyword matches, oldest first.
    async fn collect_candidates(&self, report: &mut RunReport) -> Vec<ArticleCandidate> {
        let batches: Vec<FeedBatch> = self.fetcher.batches().collect().await;
        report.feeds_total = batches.len();

        let mut candidates = Vec::new();
        for batch in batches {
            let entries = match batch.outcome {
                Ok(entries) => entries,
                Err(_) => {
                    report.feeds_failed += 1;
                    continue;
                }
            };
            report.entries_seen += entries.len();
            for entry in entries {
                let original_url = canonical_url(&entry.link);
                if let Some(candidate) = self.matcher.candidate(entry, original_url) {
                    debug!(feed = %batch.request.label, title = %candidate.title, tags = %candidate.tags(), "Matched");
                    candidates.push(candidate);
                }
            }
        }
        report.matched = candidates.len();

        let now = Utc::now();
        candidates
            .into_iter()
            .sorted_by_key(|c| chronological_key(c, now))
            .collect()
    }

    /// Resolve, publish and append one admitted candidate.
    #[instrument(level = "info", skip_all, fields(url = %candidate.original_url))]
    async fn process(&self, candidate: &ArticleCandidate) -> Result<(PublishedRecord, bool), PipelineError> {
        let (thumbnail_url, placeholder) = self.thumbnail(candidate).await;
        let draft = self.draft(candidate, thumbnail_url);
        let id = self.store.append(&draft).await?;
        Ok((draft.into_record(id), placeholder))
    }

    /// Public thumbnail URL and whether it is a placeholder.
    async fn thumbnail(&self, candidate: &ArticleCandidate) -> (String, bool) {
        let placeholder = || {
            (
                self.config
                    .placeholder_for(&candidate.matched_keywords)
                    .to_string(),
                true,
            )
        };

        let image = match self
            .resolver
            .resolve(&candidate.original_url, candidate.image_url.as_deref())
            .await
        {
            Resolution::Image(image) => image,
            Resolution::Placeholder => return placeholder(),
        };
        let filename = thumbnail_filename(&candidate.original_url, &image, Utc::now().timestamp());
        let published = self
            .config
            .publish_retry
            .run(
                &filename,
                || self.publisher.publish(&image.bytes, &filename),
                PublishError::is_transient,
            )
            .await;
        match published {
            Ok(url) => (url, false),
            Err(e) => {
                warn!(error = %e, "Thumbnail publish failed; using placeholder");
                placeholder()
            }
        }
    }

    fn draft(&self, candidate: &ArticleCandidate, thumbnail_url: String) -> RecordDraft {
        let upload_date = candidate
            .published_at
            .map(|ts| ts.date_naive())
            .unwrap_or_else(|| Local::now().date_naive())
            .format("%Y-%m-%d")
            .to_string();
        RecordDraft {
            title: truncate_chars(&candidate.title, self.config.title_max_chars),
            description: truncate_chars(&candidate.description, self.config.description_max_chars),
            category: candidate.source_name.clone(),
            tags: candidate.matched_keywords.clone(),
            upload_date,
            download_count: 0,
            thumbnail_url,
            original_url: candidate.original_url.clone(),
        }
    }
}
