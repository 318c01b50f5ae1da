//! Thumbnail resolution.
//!
//! Given an article URL, the [`ImageResolver`] fetches the page once, runs
//! its [`ImageStrategy`] chain until one produces an image that also survives
//! [`ImageOptimizer`], and otherwise reports [`Resolution::Placeholder`].
//! Nothing here returns an error: a missing image must never keep an article
//! out of the store.
//!
//! # Strategy order
//!
//! 1. `og:image`-style metadata ([`strategy::MetaTagStrategy`])
//! 2. first body `<img>` of at least 100×100 ([`strategy::BodyImageStrategy`])
//! 3. any other image on the page ([`strategy::AnyImageStrategy`])
//! 4. the image the feed entry itself suggested, if any

pub mod optimize;
pub mod page;
pub mod strategy;

use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::models::ImageSource;
use crate::retry::RetryPolicy;
use optimize::{ImageOptimizer, OptimizedImage};
use page::ArticlePage;
use std::time::Duration;
use strategy::{ImageFetcher, ImageStrategy, default_strategies};
use tracing::{debug, info, instrument, warn};

/// Outcome of resolving one article's thumbnail.
#[derive(Debug, Clone)]
pub enum Resolution {
    Image(OptimizedImage),
    Placeholder,
}

/// Article URL → optimized thumbnail.
pub struct ImageResolver {
    http: HttpClient,
    fetcher: ImageFetcher,
    strategies: Vec<Box<dyn ImageStrategy>>,
    optimizer: ImageOptimizer,
    page_timeout: Duration,
    page_retry: RetryPolicy,
}

impl std::fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResolver")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("optimizer", &self.optimizer)
            .field("page_timeout", &self.page_timeout)
            .finish()
    }
}

impl ImageResolver {
    /// Build the default strategy chain and optimizer from `config`.
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            fetcher: ImageFetcher::new(
                http.clone(),
                config.timeouts.image(),
                config.image.max_image_bytes,
            ),
            strategies: default_strategies(&config.image),
            optimizer: ImageOptimizer::new(&config.image),
            page_timeout: config.timeouts.page(),
            page_retry: config.page_retry.clone(),
            http,
        }
    }

    /// Resolve the thumbnail for one article.
    ///
    /// # Arguments
    ///
    /// * `article_url` - page to fetch; retried per the page retry policy
    /// * `feed_image` - image URL the feed entry carried, used only when the
    ///   page is unavailable or none of its images is usable
    ///
    /// # Returns
    ///
    /// [`Resolution::Image`] with a bounded JPEG from the first strategy that
    /// yields a decodable image, or [`Resolution::Placeholder`] when none does.
    /// Never fails: every error is logged and the next source is tried.
    #[instrument(level = "info", skip_all, fields(url = %article_url))]
    pub async fn resolve(&self, article_url: &str, feed_image: Option<&str>) -> Resolution {
        match self.fetch_page(article_url).await {
            Ok(html) => {
                let page = ArticlePage::parse(article_url, &html);
                if let Some(image) = self.resolve_page(&page).await {
                    return Resolution::Image(image);
                }
            }
            Err(e) => warn!(error = %e, "Article page unavailable"),
        }

        if let Some(url) = feed_image
            && let Some(image) = self.resolve_feed_image(url).await
        {
            return Resolution::Image(image);
        }
        warn!("No usable image; using placeholder");
        Resolution::Placeholder
    }

    async fn resolve_feed_image(&self, url: &str) -> Option<OptimizedImage> {
        let candidate = match self.fetcher.fetch(url, ImageSource::FeedMedia).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "Feed image unusable");
                return None;
            }
        };
        match self.optimizer.optimize(&candidate) {
            Ok(image) => {
                info!(image_url = %image.origin_url, width = image.width, height = image.height, "Resolved thumbnail from feed");
                Some(image)
            }
            Err(e) => {
                warn!(error = %e, "Feed image optimization failed");
                None
            }
        }
    }

    /// Run the strategy chain over an already-parsed page.
    async fn resolve_page(&self, page: &ArticlePage) -> Option<OptimizedImage> {
        for strategy in &self.strategies {
            let Some(candidate) = strategy.attempt(page, &self.fetcher).await else {
                continue;
            };
            match self.optimizer.optimize(&candidate) {
                Ok(image) => {
                    info!(
                        strategy = strategy.name(),
                        image_url = %image.origin_url,
                        width = image.width,
                        height = image.height,
                        bytes = image.bytes.len(),
                        "Resolved thumbnail"
                    );
                    return Some(image);
                }
                Err(e) => warn!(strategy = strategy.name(), error = %e, "Optimization failed; trying next strategy"),
            }
        }
        debug!(page = %page.url, "No usable image on page");
        None
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.page_retry
            .run(
                url,
                || self.http.get_text(url, self.page_timeout),
                |e| match e {
                    FetchError::Status(code) => *code == 429 || *code >= 500,
                    FetchError::TooLarge(_) => false,
                    _ => true,
                },
            )
            .await
    }
}
