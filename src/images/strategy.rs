//! Image extraction strategies.
//!
//! Each strategy inspects an [`ArticlePage`] and tries to download one image.
//! The resolver runs them in order and stops at the first usable result, so a
//! new heuristic is added by inserting one more implementation into
//! [`default_strategies`].

use super::page::ArticlePage;
use crate::config::ImageSettings;
use crate::error::PipelineError;
use crate::http::HttpClient;
use crate::models::{ImageCandidate, ImageSource};
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, instrument};

/// Downloads an image and reads its dimensions without fully decoding it.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    http: HttpClient,
    timeout: Duration,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(http: HttpClient, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            http,
            timeout,
            max_bytes,
        }
    }

    #[instrument(level = "debug", skip_all, fields(%url, ?source))]
    pub async fn fetch(&self, url: &str, source: ImageSource) -> Result<ImageCandidate, PipelineError> {
        let raw_bytes = self
            .http
            .get_bytes(url, self.timeout, self.max_bytes)
            .await
            .map_err(|e| PipelineError::ImageUnresolvable(format!("{url}: {e}")))?;
        let (width, height) = header_dimensions(&raw_bytes)
            .map_err(|e| PipelineError::ImageUnresolvable(format!("{url}: {e}")))?;
        debug!(width, height, bytes = raw_bytes.len(), "Fetched image");
        Ok(ImageCandidate {
            source,
            url: url.to_string(),
            raw_bytes,
            width,
            height,
        })
    }
}

/// Read width and height from the image header.
pub fn header_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// One way of finding an article's representative image.
#[async_trait]
pub trait ImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Try to produce an image; `None` advances to the next strategy.
    async fn attempt(&self, page: &ArticlePage, fetcher: &ImageFetcher) -> Option<ImageCandidate>;
}

/// `og:image`, `twitter:image` and similar page metadata.
#[derive(Debug, Default)]
pub struct MetaTagStrategy;

#[async_trait]
impl ImageStrategy for MetaTagStrategy {
    fn name(&self) -> &'static str {
        "og_meta"
    }

    async fn attempt(&self, page: &ArticlePage, fetcher: &ImageFetcher) -> Option<ImageCandidate> {
        for url in &page.meta_images {
            match fetcher.fetch(url, ImageSource::OgMeta).await {
                Ok(candidate) => return Some(candidate),
                Err(e) => debug!(error = %e, "Meta image unusable"),
            }
        }
        None
    }
}

/// The first body `<img>` at least `min_dimension` on both sides.
///
/// Declared `width`/`height` attributes are trusted when both are present,
/// so undersized icons are skipped without a download; otherwise the
/// decoded size decides.
#[derive(Debug)]
pub struct BodyImageStrategy {
    pub min_dimension: u32,
    pub max_candidates: usize,
}

impl BodyImageStrategy {
    fn large_enough(&self, width: u32, height: u32) -> bool {
        width >= self.min_dimension && height >= self.min_dimension
    }
}

#[async_trait]
impl ImageStrategy for BodyImageStrategy {
    fn name(&self) -> &'static str {
        "in_body"
    }

    async fn attempt(&self, page: &ArticlePage, fetcher: &ImageFetcher) -> Option<ImageCandidate> {
        for image in page.body_images.iter().take(self.max_candidates) {
            if let Some((w, h)) = image.declared_size()
                && !self.large_enough(w, h)
            {
                debug!(url = %image.url, w, h, "Skipping declared-small image");
                continue;
            }
            match fetcher.fetch(&image.url, ImageSource::InBody).await {
                Ok(candidate) if image.declared_size().is_some() => return Some(candidate),
                Ok(candidate) if self.large_enough(candidate.width, candidate.height) => {
                    return Some(candidate);
                }
                Ok(candidate) => {
                    debug!(url = %image.url, w = candidate.width, h = candidate.height, "Image below minimum size")
                }
                Err(e) => debug!(error = %e, "Body image unusable"),
            }
        }
        None
    }
}

/// Any image on the page, whatever its size.
#[derive(Debug)]
pub struct AnyImageStrategy {
    pub max_candidates: usize,
}

#[async_trait]
impl ImageStrategy for AnyImageStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn attempt(&self, page: &ArticlePage, fetcher: &ImageFetcher) -> Option<ImageCandidate> {
        for image in page.body_images.iter().take(self.max_candidates) {
            match fetcher.fetch(&image.url, ImageSource::Fallback).await {
                Ok(candidate) => return Some(candidate),
                Err(e) => debug!(error = %e, "Fallback image unusable"),
            }
        }
        None
    }
}

/// Metadata image, then a sizeable body image, then anything.
pub fn default_strategies(settings: &ImageSettings) -> Vec<Box<dyn ImageStrategy>> {
    vec![
        Box::new(MetaTagStrategy),
        Box::new(BodyImageStrategy {
            min_dimension: settings.min_body_dimension,
            max_candidates: settings.max_body_candidates,
        }),
        Box::new(AnyImageStrategy {
            max_candidates: settings.max_body_candidates,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_header_dimensions() {
        assert_eq!(header_dimensions(&png(120, 80)).unwrap(), (120, 80));
        assert!(header_dimensions(b"definitely not an image").is_err());
    }

    #[test]
    fn test_strategy_order() {
        let names: Vec<_> = default_strategies(&ImageSettings::default())
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["og_meta", "in_body", "fallback"]);
    }

    #[test]
    fn test_large_enough_threshold() {
        let strategy = BodyImageStrategy {
            min_dimension: 100,
            max_candidates: 10,
        };
        assert!(strategy.large_enough(100, 100));
        assert!(!strategy.large_enough(99, 400));
        assert!(!strategy.large_enough(400, 20));
    }
}
