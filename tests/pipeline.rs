use brand_news_collector::config::{FeedSource, PipelineConfig};
use brand_news_collector::error::{PipelineError, PublishError};
use brand_news_collector::http::HttpClient;
use brand_news_collector::models::{RecordDraft, format_record_id};
use brand_news_collector::pipeline::{Pipeline, RunMode};
use brand_news_collector::retry::RetryPolicy;
use brand_news_collector::store::{ImagePublisher, RowStore, StoredKey};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLACEHOLDER: &str = "https://images.example.com/default.jpg";
const PAIPTREE_PLACEHOLDER: &str = "https://images.example.com/paiptree-kr.jpg";

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<(String, RecordDraft)>>,
}

impl MemoryStore {
    fn rows(&self) -> Vec<(String, RecordDraft)> {
        self.rows.lock().unwrap().clone()
    }
}

impl RowStore for MemoryStore {
    async fn existing_keys(&self) -> Result<Vec<StoredKey>, PipelineError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|(_, draft)| StoredKey {
                original_url: draft.original_url.clone(),
                title: draft.title.clone(),
            })
            .collect())
    }

    async fn append(&self, draft: &RecordDraft) -> Result<String, PipelineError> {
        let mut rows = self.rows.lock().unwrap();
        let id = format_record_id(rows.len() + 1);
        rows.push((id.clone(), draft.clone()));
        Ok(id)
    }
}

struct UnreachableStore;

impl RowStore for UnreachableStore {
    async fn existing_keys(&self) -> Result<Vec<StoredKey>, PipelineError> {
        Err(PipelineError::StoreUnavailable("HTTP 403 Forbidden".to_string()))
    }

    async fn append(&self, _draft: &RecordDraft) -> Result<String, PipelineError> {
        Err(PipelineError::StoreUnavailable("HTTP 403 Forbidden".to_string()))
    }
}

#[derive(Default)]
struct MemoryPublisher {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ImagePublisher for MemoryPublisher {
    async fn publish(&self, bytes: &[u8], filename: &str) -> Result<String, PublishError> {
        self.uploads
            .lock()
            .unwrap()
            .push((filename.to_string(), bytes.to_vec()));
        Ok(format!("https://images.example.com/uploads/{filename}"))
    }
}

#[derive(Default)]
struct FlakyPublisher {
    attempts: AtomicUsize,
}

impl ImagePublisher for FlakyPublisher {
    async fn publish(&self, _bytes: &[u8], _filename: &str) -> Result<String, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::Transient("HTTP 503".to_string()))
    }
}

fn rgba_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 120, 60, 128]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn rss(channel: &str, items: &[(&str, &str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, description, date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description><![CDATA[{description}]]></description>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>{channel}</title>{items}</channel></rss>"#
    )
}

fn config(server: &MockServer) -> PipelineConfig {
    let uri = server.uri();
    PipelineConfig {
        feeds: vec![
            FeedSource::new("alpha", &format!("{uri}/feeds/alpha.xml")),
            FeedSource::new("beta", &format!("{uri}/feeds/beta.xml")),
            FeedSource::new("gamma", &format!("{uri}/feeds/gamma.xml")),
            FeedSource::new("broken", &format!("{uri}/feeds/broken.xml")),
        ],
        keywords: ["파이프트리", "파머스마인드", "paiptree", "farmersmind"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        priority_keywords: vec!["파이프트리".to_string(), "파머스마인드".to_string()],
        placeholder_url: PLACEHOLDER.to_string(),
        keyword_placeholders: BTreeMap::from([(
            "파이프트리".to_string(),
            PAIPTREE_PLACEHOLDER.to_string(),
        )]),
        publish_retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
        page_retry: RetryPolicy::fixed(1, Duration::from_millis(1)),
        append_delay_ms: 0,
        ..PipelineConfig::default()
    }
}

/// Four feeds (one failing), two matching stories, one cross-feed repeat.
async fn mount_sources(server: &MockServer) {
    let uri = server.uri();
    let link_1 = format!("{uri}/articles/1?utm_source=rss&amp;utm_medium=feed");
    let link_1_repost = format!("{uri}/articles/1?fbclid=abc#comments");
    let link_2 = format!("{uri}/articles/2");
    let link_3 = format!("{uri}/articles/3");

    let alpha = rss(
        "연합뉴스",
        &[(
            "파이프트리, 파머스마인드와 스마트팜 협력",
            link_1.as_str(),
            "<b>파이프트리</b>가 파머스마인드와 &lt;스마트팜&gt; 협력을 발표했다.",
            "Mon, 05 May 2025 09:00:00 +0900",
        )],
    );
    let beta = rss(
        "농민신문",
        &[
            (
                "스마트 축산 신기술 공개",
                link_2.as_str(),
                "FarmersMind 플랫폼이 축산 농가에 도입된다.",
                "Tue, 06 May 2025 10:00:00 +0900",
            ),
            (
                "오늘의 날씨",
                link_3.as_str(),
                "전국 맑음",
                "Tue, 06 May 2025 11:00:00 +0900",
            ),
        ],
    );
    let gamma = rss(
        "지역일보",
        &[(
            "[속보] 파이프트리, 파머스마인드와 스마트팜 협력",
            link_1_repost.as_str(),
            "같은 기사",
            "Mon, 05 May 2025 12:00:00 +0900",
        )],
    );

    for (name, body) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
        Mock::given(method("GET"))
            .and(path(format!("/feeds/{name}.xml")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/feeds/broken.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    let article = format!(
        r#"<html><head><meta property="og:image" content="{uri}/img/og.png"></head>
        <body><img src="/img/icon.png" width="16" height="16"></body></html>"#
    );
    Mock::given(method("GET"))
        .and(path("/articles/1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(article, "text/html; charset=utf-8"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/articles/2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/og.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(rgba_png(800, 600), "image/png"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_survives_failing_feed_and_appends_in_order() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let pipeline = Pipeline::new(
        config(&server),
        HttpClient::new(),
        MemoryStore::default(),
        MemoryPublisher::default(),
        RunMode::Initial,
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.feeds_total, 4);
    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.entries_seen, 4);
    assert_eq!(report.matched, 3);
    assert_eq!(report.rejected_duplicate, 1);
    assert_eq!(report.appended, 2);
    assert_eq!(report.placeholders, 1);

    let rows = pipeline.store().rows();
    assert_eq!(rows.len(), 2);

    let (id, first) = &rows[0];
    assert_eq!(id, "001");
    assert_eq!(first.title, "파이프트리, 파머스마인드와 스마트팜 협력");
    assert_eq!(first.tags, vec!["파이프트리", "파머스마인드"]);
    assert_eq!(first.category, "연합뉴스");
    assert_eq!(first.upload_date, "2025-05-05");
    assert_eq!(first.download_count, 0);
    assert_eq!(first.description, "파이프트리가 파머스마인드와 <스마트팜> 협력을 발표했다.");
    assert_eq!(first.original_url, format!("{}/articles/1", server.uri()));
    assert!(
        first
            .thumbnail_url
            .starts_with("https://images.example.com/uploads/news_thumb_"),
        "{}",
        first.thumbnail_url
    );

    let (id, second) = &rows[1];
    assert_eq!(id, "002");
    assert_eq!(second.tags, vec!["farmersmind"]);
    assert_eq!(second.category, "농민신문");
    assert_eq!(second.thumbnail_url, PLACEHOLDER);
}

#[tokio::test]
async fn test_published_thumbnail_is_bounded_opaque_jpeg() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let pipeline = Pipeline::new(
        config(&server),
        HttpClient::new(),
        MemoryStore::default(),
        MemoryPublisher::default(),
        RunMode::Initial,
    );
    pipeline.run().await.unwrap();

    let uploads = pipeline.publisher().uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    let (filename, bytes) = &uploads[0];
    assert!(filename.contains("_400x300_"), "{filename}");
    assert!(filename.ends_with(".jpg"));

    assert_eq!(image::guess_format(bytes).unwrap(), ImageFormat::Jpeg);
    let decoded = image::load_from_memory(bytes).unwrap();
    assert!(decoded.width() <= 400 && decoded.height() <= 300);
    assert!(!decoded.color().has_alpha());
}

#[tokio::test]
async fn test_second_run_appends_nothing() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let pipeline = Pipeline::new(
        config(&server),
        HttpClient::new(),
        MemoryStore::default(),
        MemoryPublisher::default(),
        RunMode::Initial,
    );
    let first = pipeline.run().await.unwrap();
    assert_eq!(first.appended, 2);

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.appended, 0);
    assert_eq!(second.rejected_seen, 3);
    assert_eq!(pipeline.store().rows().len(), 2);
}

#[tokio::test]
async fn test_syndicated_story_stays_rejected_on_second_run() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let original = format!("{uri}/yna/view/100");
    let syndicated = format!("{uri}/partner/news/55");
    let earlier = rss(
        "연합뉴스",
        &[(
            "파이프트리, 스마트팜 투자 유치",
            original.as_str(),
            "파이프트리가 투자를 유치했다.",
            "Mon, 05 May 2025 09:00:00 +0900",
        )],
    );
    let later = rss(
        "제휴언론",
        &[(
            "[종합] 파이프트리 스마트팜 투자 유치",
            syndicated.as_str(),
            "파이프트리 투자 소식",
            "Mon, 05 May 2025 15:00:00 +0900",
        )],
    );
    for (name, body) in [("earlier", earlier), ("later", later)] {
        Mock::given(method("GET"))
            .and(path(format!("/feeds/{name}.xml")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"))
            .mount(&server)
            .await;
    }

    let mut config = config(&server);
    config.feeds = vec![
        FeedSource::new("earlier", &format!("{uri}/feeds/earlier.xml")),
        FeedSource::new("later", &format!("{uri}/feeds/later.xml")),
    ];
    let pipeline = Pipeline::new(
        config,
        HttpClient::new(),
        MemoryStore::default(),
        MemoryPublisher::default(),
        RunMode::Initial,
    );

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.appended, 1);
    assert_eq!(first.rejected_duplicate, 1);

    let second = pipeline.run().await.unwrap();
    assert_eq!(second.appended, 0);
    assert_eq!(second.rejected_seen, 2);

    let rows = pipeline.store().rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1.original_url, original);
}

#[tokio::test]
async fn test_exhausted_publish_retries_fall_back_to_keyword_placeholder() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let pipeline = Pipeline::new(
        config(&server),
        HttpClient::new(),
        MemoryStore::default(),
        FlakyPublisher::default(),
        RunMode::Initial,
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.appended, 2);
    assert_eq!(report.placeholders, 2);
    assert_eq!(pipeline.publisher().attempts.load(Ordering::SeqCst), 3);
    let rows = pipeline.store().rows();
    assert_eq!(rows[0].1.thumbnail_url, PAIPTREE_PLACEHOLDER);
}

#[tokio::test]
async fn test_recent_mode_drops_stale_entries() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let mut config = config(&server);
    config.lookback_days = 7;
    let pipeline = Pipeline::new(
        config,
        HttpClient::new(),
        MemoryStore::default(),
        MemoryPublisher::default(),
        RunMode::Recent,
    );
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.entries_seen, 0);
    assert_eq!(report.appended, 0);
}

#[tokio::test]
async fn test_unreachable_store_fails_the_run() {
    let server = MockServer::start().await;
    mount_sources(&server).await;

    let pipeline = Pipeline::new(
        config(&server),
        HttpClient::new(),
        UnreachableStore,
        MemoryPublisher::default(),
        RunMode::Initial,
    );
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::StoreUnavailable(_)));
    assert!(err.is_retryable());
    assert!(pipeline.publisher().uploads.lock().unwrap().is_empty());
}
