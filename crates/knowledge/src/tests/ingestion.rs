//! Learning sources into tiers and reporting tier statistics.

use crate::config::{get_index_path, get_scraped_content_dir};
use crate::embeddings::create_provider;
use crate::index::SqliteIndex;
use crate::scraper::PageScraper;
use crate::types::LearnOptions;
use crate::vector_index::VectorIndex;
use crate::{learn, learn_with_scraper, stats};
use kbqa_core::{AppConfig, AppError};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn config(temp: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.workspace = temp.path().to_path_buf();
    config.storage_dir = temp.path().join("persistent_storage");
    config
}

/// A directory with one markdown and one plain text source.
fn corpus(temp: &TempDir) -> PathBuf {
    let dir = temp.path().join("corpus");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("digital_india.md"),
        "# Digital India\n\nDigital India is a flagship programme of the Government of India \
         to transform the country into a digitally empowered society and knowledge economy.",
    )
    .unwrap();
    std::fs::write(
        dir.join("monsoon.txt"),
        "The monsoon season brings heavy rainfall to the western coast between June and September.",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn test_learn_directory_into_tier() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let learned = learn(&config, LearnOptions::new("documents", vec![corpus(&temp)]))
        .await
        .unwrap();

    assert_eq!(learned.tier, "documents");
    assert_eq!(learned.sources_count, 2);
    assert_eq!(learned.skipped_count, 0);
    assert_eq!(learned.chunks_count, 2);

    let tiers = stats(&config).unwrap();
    assert_eq!(tiers.len(), 3);
    assert!(tiers[0].index_exists);
    assert_eq!(tiers[0].passages_count, 2);
    assert_eq!(tiers[0].sources_count, 2);
    assert!(tiers[0].index_size_bytes > 0);
    assert!(tiers[0].last_learn_at.is_some());
    assert!(!tiers[1].index_exists);
    assert!(tiers[2].last_learn_at.is_none());
}

#[tokio::test]
async fn test_relearning_unchanged_sources_is_skipped() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let dir = corpus(&temp);

    learn(&config, LearnOptions::new("documents", vec![dir.clone()]))
        .await
        .unwrap();
    let again = learn(&config, LearnOptions::new("documents", vec![dir]))
        .await
        .unwrap();

    assert_eq!(again.sources_count, 0);
    assert_eq!(again.skipped_count, 2);
    assert_eq!(stats(&config).unwrap()[0].passages_count, 2);
}

#[tokio::test]
async fn test_reset_clears_tier_before_learning() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let dir = corpus(&temp);

    learn(&config, LearnOptions::new("documents", vec![dir.clone()]))
        .await
        .unwrap();

    let mut options = LearnOptions::new("documents", vec![dir.join("monsoon.txt")]);
    options.reset = true;
    let relearned = learn(&config, options).await.unwrap();

    assert_eq!(relearned.sources_count, 1);
    let tiers = stats(&config).unwrap();
    assert_eq!(tiers[0].passages_count, 1);
    assert_eq!(tiers[0].sources_count, 1);
}

#[tokio::test]
async fn test_unknown_tier_is_config_error() {
    let temp = TempDir::new().unwrap();
    let result = learn(&config(&temp), LearnOptions::new("podcasts", vec![])).await;

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test]
async fn test_learned_passages_are_retrievable() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    learn(&config, LearnOptions::new("documents", vec![corpus(&temp)]))
        .await
        .unwrap();

    let embedder = create_provider(&config.embedding).unwrap();
    let query = embedder.embed("What is Digital India?").await.unwrap();
    let index = SqliteIndex::new(get_index_path(&config.storage_dir, &config.tiers[0]));
    let results = index.search(&query, 5).await.unwrap();

    assert_eq!(results.len(), 2);
    let best = &results[0].passage;
    assert!(best.content().contains("Digital India"));
    assert_eq!(best.title(), Some("digital_india"));
    assert_eq!(best.metadata()["source"], "digital_india.md");
    assert!(results[0].score > results[1].score);
}

const PORTAL_HTML: &str = "<html><head><title>Digital India Portal</title>\
    <style>body { margin: 0 }</style><script>analytics()</script></head>\
    <body><noscript>Please enable JavaScript</noscript>\
    <h1>Digital India</h1><p>Digital India connects citizens to government services \
    through broadband, mobile identity and online public platforms.</p></body></html>";

/// Serve `PORTAL_HTML` on every path except `/missing`, which is a 404.
async fn serve_portal() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let read = socket.read(&mut request).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&request[..read]);

                let (status, body) = if request.starts_with("GET /missing") {
                    ("404 Not Found", "")
                } else {
                    ("200 OK", PORTAL_HTML)
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn local_scraper() -> PageScraper {
    PageScraper::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
}

#[tokio::test]
async fn test_learn_web_pages_into_scraped_tier() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let base = serve_portal().await;
    let page_url = format!("{}/digital-india", base);

    let mut options = LearnOptions::new("scraped", vec![]);
    options.urls = vec![page_url.clone(), format!("{}/missing", base)];
    let learned = learn_with_scraper(&config, options, &local_scraper())
        .await
        .unwrap();

    assert_eq!(learned.tier, "scraped");
    assert_eq!(learned.sources_count, 1);
    assert_eq!(learned.skipped_count, 0);

    let scraped = &config.tiers[1];
    let embedder = create_provider(&config.embedding).unwrap();
    let query = embedder.embed("Digital India services").await.unwrap();
    let results = SqliteIndex::new(get_index_path(&config.storage_dir, scraped))
        .search(&query, 5)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let passage = &results[0].passage;
    assert_eq!(passage.source_identifier(), page_url);
    assert_eq!(passage.title(), Some("Digital India Portal"));
    assert!(passage.content().contains("government services"));
    assert!(!passage.content().contains("analytics()"));
    assert!(!passage.content().contains("enable JavaScript"));

    let saved: Vec<_> = std::fs::read_dir(get_scraped_content_dir(&config.storage_dir, scraped))
        .unwrap()
        .collect();
    assert_eq!(saved.len(), 1);
}

#[tokio::test]
async fn test_relearning_same_page_content_is_skipped() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let base = serve_portal().await;

    let mut options = LearnOptions::new("scraped", vec![]);
    options.urls = vec![format!("{}/a", base)];
    learn_with_scraper(&config, options, &local_scraper())
        .await
        .unwrap();

    // Same content under another URL
    let mut options = LearnOptions::new("scraped", vec![]);
    options.urls = vec![format!("{}/b", base)];
    let again = learn_with_scraper(&config, options, &local_scraper())
        .await
        .unwrap();

    assert_eq!(again.sources_count, 0);
    assert_eq!(again.skipped_count, 1);
    assert_eq!(stats(&config).unwrap()[1].passages_count, 1);
}

#[tokio::test]
async fn test_invalid_url_is_skipped() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let mut options = LearnOptions::new("scraped", vec![]);
    options.urls = vec!["not a url".to_string()];
    let learned = learn_with_scraper(&config, options, &local_scraper())
        .await
        .unwrap();

    assert_eq!(learned.sources_count, 0);
    assert_eq!(learned.skipped_count, 0);
}
