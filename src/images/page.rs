//! Image references found on an article page.
//!
//! The HTML is parsed once into an [`ArticlePage`] holding absolute image
//! URLs; the parsed DOM is dropped before any image is downloaded, so the
//! strategies only ever see plain data.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Metadata selectors in priority order, with the attribute holding the URL.
static META_SELECTORS: Lazy<Vec<(Selector, &'static str)>> = Lazy::new(|| {
    [
        (r#"meta[property="og:image"]"#, "content"),
        (r#"meta[name="og:image"]"#, "content"),
        (r#"meta[property="og:image:url"]"#, "content"),
        (r#"meta[property="og:image:secure_url"]"#, "content"),
        (r#"meta[name="twitter:image"]"#, "content"),
        (r#"meta[name="twitter:image:src"]"#, "content"),
        (r#"meta[property="twitter:image"]"#, "content"),
        (r#"link[rel="image_src"]"#, "href"),
    ]
    .into_iter()
    .map(|(css, attr)| (Selector::parse(css).unwrap(), attr))
    .collect()
});

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Attributes carrying an `<img>` URL, eager first, then common lazy-load ones.
const IMG_SRC_ATTRS: &[&str] = &["src", "data-src", "data-original", "data-lazy-src"];

/// An `<img>` reference with its declared size, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageRef {
    /// Declared size when both attributes are present.
    pub fn declared_size(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

/// Image references extracted from one article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePage {
    pub url: String,
    /// Metadata images (`og:image` and equivalents), deduplicated, in priority order.
    pub meta_images: Vec<String>,
    /// `<img>` elements in document order, deduplicated by URL.
    pub body_images: Vec<ImageRef>,
}

impl ArticlePage {
    /// Extract image references, resolving relative URLs against `page_url`.
    pub fn parse(page_url: &str, html: &str) -> Self {
        let base = Url::parse(page_url).ok();
        let document = Html::parse_document(html);

        let mut meta_images: Vec<String> = Vec::new();
        for (selector, attr) in META_SELECTORS.iter() {
            for element in document.select(selector) {
                if let Some(url) = element.value().attr(attr).and_then(|v| resolve(base.as_ref(), v))
                    && !meta_images.contains(&url)
                {
                    meta_images.push(url);
                }
            }
        }

        let mut body_images: Vec<ImageRef> = Vec::new();
        for element in document.select(&IMG_SELECTOR) {
            let Some(url) = img_url(&element).and_then(|v| resolve(base.as_ref(), v)) else {
                continue;
            };
            if body_images.iter().any(|i| i.url == url) {
                continue;
            }
            body_images.push(ImageRef {
                url,
                width: dimension(element.value().attr("width")),
                height: dimension(element.value().attr("height")),
            });
        }

        Self {
            url: page_url.to_string(),
            meta_images,
            body_images,
        }
    }
}

fn img_url<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    IMG_SRC_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
}

/// Resolve against the page URL and keep only http(s) targets.
fn resolve(base: Option<&Url>, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let url = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Parse `"600"` or `"600px"`; percentages and garbage yield `None`.
fn dimension(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let digits = raw.strip_suffix("px").unwrap_or(raw).trim();
    digits.parse::<u32>().ok()
}
