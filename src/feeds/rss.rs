//! RSS 2.0 document parsing.
//!
//! Only the handful of elements the pipeline reads are modelled; everything
//! else (`<guid>`, `<category>`, most namespaced extensions) is ignored by
//! serde. Media RSS thumbnails and image enclosures are kept as the feed's own
//! image suggestion. Publish dates are parsed best-effort: RFC 2822 first,
//! then RFC 3339.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RssDocument {
    pub channel: RssChannel,
}

#[derive(Debug, Deserialize)]
pub struct RssChannel {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "item", default)]
    pub items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
pub struct RssItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub source: Option<RssItemSource>,
    #[serde(rename = "media:thumbnail", default)]
    pub media_thumbnails: Vec<RssMedia>,
    #[serde(rename = "media:content", default)]
    pub media_contents: Vec<RssMedia>,
    #[serde(rename = "enclosure", default)]
    pub enclosures: Vec<RssMedia>,
}

/// `<media:thumbnail>`, `<media:content>` or `<enclosure>` attributes.
#[derive(Debug, Deserialize)]
pub struct RssMedia {
    #[serde(rename = "@url", default)]
    pub url: String,
    #[serde(rename = "@type", default)]
    pub mime_type: Option<String>,
    #[serde(rename = "@medium", default)]
    pub medium: Option<String>,
}

impl RssMedia {
    fn is_image(&self) -> bool {
        self.medium.as_deref() == Some("image")
            || self
                .mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image/"))
    }
}

/// `<source url="...">Publisher</source>`
#[derive(Debug, Deserialize)]
pub struct RssItemSource {
    #[serde(rename = "$text", default)]
    pub name: String,
}

impl RssItem {
    /// Publisher named by the item itself, if any.
    pub fn publisher(&self) -> Option<String> {
        self.source
            .as_ref()
            .map(|s| s.name.trim().to_string())
            .or_else(|| self.author.as_ref().map(|a| a.trim().to_string()))
            .filter(|s| !s.is_empty())
    }

    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        self.pub_date.as_deref().and_then(parse_date)
    }

    /// Image the feed itself suggests: a media thumbnail, else an image
    /// enclosure, else image-typed media content.
    pub fn image_url(&self) -> Option<String> {
        self.media_thumbnails
            .iter()
            .chain(self.enclosures.iter().filter(|m| m.is_image()))
            .chain(self.media_contents.iter().filter(|m| m.is_image()))
            .map(|m| m.url.trim())
            .find(|url| !url.is_empty())
            .map(str::to_string)
    }
}

/// Parse an RSS document.
pub fn parse(xml: &str) -> Result<RssDocument, quick_xml::DeError> {
    quick_xml::de::from_str(xml)
}

/// Parse a feed date in RFC 2822 or RFC 3339 form.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
