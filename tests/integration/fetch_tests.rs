//! Page fetcher behaviour against a mock server

use crate::common::html;
use link_scraper::config::FetchConfig;
use link_scraper::scrape::{FetchError, PageFetcher};
use link_scraper::UrlSafetyFilter;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(config: FetchConfig) -> PageFetcher {
    PageFetcher::new(&config, UrlSafetyFilter::permissive()).expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_html_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("accept", "text/html"))
        .respond_with(html("<html><title>Hi</title></html>"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/page", mock_server.uri());
    let page = fetcher(FetchConfig::default()).fetch(&url).await.unwrap();

    assert_eq!(page.final_url, url);
    assert_eq!(page.status_code, 200);
    assert!(page.content_type.starts_with("text/html"));
    assert!(page.html.contains("<title>Hi</title>"));
}

#[tokio::test]
async fn test_sends_configured_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("user-agent", "TestBot/1.0"))
        .respond_with(html("<html></html>"))
        .mount(&mock_server)
        .await;

    let config = FetchConfig {
        user_agent: "TestBot/1.0".to_string(),
        ..FetchConfig::default()
    };
    let result = fetcher(config).fetch(&mock_server.uri()).await;
    assert!(result.is_ok(), "unexpected error: {:?}", result.err());
}

#[tokio::test]
async fn test_pdf_is_not_html() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/doc.pdf", mock_server.uri());
    let err = fetcher(FetchConfig::default()).fetch(&url).await.unwrap_err();

    assert!(matches!(err, FetchError::NotHtml { .. }));
    assert!(err.to_string().contains("Not an HTML page"));
    assert!(err.to_string().contains("application/pdf"));
}

#[tokio::test]
async fn test_missing_content_type_is_not_html() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html></html>".to_vec()))
        .mount(&mock_server)
        .await;

    let err = fetcher(FetchConfig::default())
        .fetch(&mock_server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotHtml { .. }));
}

#[tokio::test]
async fn test_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = fetcher(FetchConfig::default())
        .fetch(&mock_server.uri())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_body_over_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html("x".repeat(4096)))
        .mount(&mock_server)
        .await;

    let config = FetchConfig {
        max_content_size: 1024,
        ..FetchConfig::default()
    };
    let err = fetcher(config).fetch(&mock_server.uri()).await.unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
}

#[tokio::test]
async fn test_redirect_sets_final_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html><title>New</title></html>"))
        .mount(&mock_server)
        .await;

    let url = format!("{}/old", mock_server.uri());
    let page = fetcher(FetchConfig::default()).fetch(&url).await.unwrap();
    assert_eq!(page.final_url, format!("{}/new", mock_server.uri()));
}

#[tokio::test]
async fn test_redirect_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&mock_server)
        .await;

    let config = FetchConfig {
        max_redirects: 2,
        ..FetchConfig::default()
    };
    let url = format!("{}/loop", mock_server.uri());
    let err = fetcher(config).fetch(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::RedirectLimit { limit: 2, .. }));
}

#[tokio::test]
async fn test_redirect_to_private_target_blocked() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "http://192.168.1.1/admin"),
        )
        .mount(&mock_server)
        .await;

    // Only redirect hops are screened here; the first URL is checked by the scraper
    let fetcher = PageFetcher::new(&FetchConfig::default(), UrlSafetyFilter::restricted())
        .expect("Failed to build fetcher");
    let err = fetcher.fetch(&mock_server.uri()).await.unwrap_err();

    match err {
        FetchError::UnsafeRedirect { target } => assert_eq!(target, "http://192.168.1.1/admin"),
        other => panic!("expected UnsafeRedirect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(html("<html></html>").set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let config = FetchConfig {
        request_timeout: 100,
        ..FetchConfig::default()
    };
    let err = fetcher(config).fetch(&mock_server.uri()).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout { .. }));
}
