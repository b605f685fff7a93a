//! End-to-end job processing: fetch, extract, dedupe, persist

use crate::common::{html, processor};
use link_scraper::queue::ScrapeJob;
use link_scraper::scrape::FetchError;
use link_scraper::state::PageStatus;
use link_scraper::storage::{Pagination, Storage};
use link_scraper::ScrapeError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFERENCE_PAGE: &str = r#"<html><head><title>Test Page</title></head><body>
<a href="https://example.com/link1">Link 1</a>
<a href="/relative-link">Relative Link</a>
</body></html>"#;

#[tokio::test]
async fn test_reference_page_scraped_and_stored() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(html(REFERENCE_PAGE))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = format!("{}/test", mock_server.uri());
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url: url.clone(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.title, "Test Page");
    assert_eq!(outcome.final_url, url);
    assert_eq!(outcome.links, 2);

    let page = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Done);
    assert_eq!(page.title.as_deref(), Some("Test Page"));
    // Not redirected, so no final URL is recorded
    assert_eq!(page.final_url, None);
    assert_eq!(page.link_count, 2);
    assert!(page.error.is_none());
    assert!(page.started_at.is_some());
    assert!(page.finished_at.is_some());

    let links = storage
        .find_links(page.id, Pagination::new(1, 20).unwrap())
        .unwrap();
    let pairs: Vec<(String, Option<String>)> = links
        .items
        .into_iter()
        .map(|link| (link.href, link.name))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (
                "https://example.com/link1".to_string(),
                Some("Link 1".to_string())
            ),
            (
                format!("{}/relative-link", mock_server.uri()),
                Some("Relative Link".to_string())
            ),
        ]
    );
}

#[tokio::test]
async fn test_redirected_page_records_final_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/landing"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(html(r#"<title>Landing</title><a href="next">Next</a>"#))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = format!("{}/start", mock_server.uri());
    let page = storage.create_page(&url).unwrap();

    processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap();

    let page = storage.find_page(page.id).unwrap().unwrap();
    let landing = format!("{}/landing", mock_server.uri());
    assert_eq!(page.final_url.as_deref(), Some(landing.as_str()));

    // Relative links resolve against the final URL
    let links = storage
        .find_links(page.id, Pagination::new(1, 20).unwrap())
        .unwrap();
    assert_eq!(links.items[0].href, format!("{}/next", mock_server.uri()));
}

#[tokio::test]
async fn test_pdf_marks_page_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = format!("{}/file.pdf", mock_server.uri());
    let page = storage.create_page(&url).unwrap();

    let err = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::Fetch(FetchError::NotHtml { .. })));

    let page = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Failed);
    assert!(page.error.as_deref().unwrap().contains("Not an HTML page"));
    assert!(page.finished_at.is_some());
    assert_eq!(storage.count_links(page.id).unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_links_last_write_wins() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(
            r#"<title>Dupes</title>
            <a href="https://example.com/a?y=2&x=1#top">First</a>
            <a href="https://example.com/b">Other</a>
            <a href="https://EXAMPLE.com/a?x=1&y=2">Second</a>"#,
        ))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap();
    assert_eq!(outcome.links, 2);

    let links = storage
        .find_links(page.id, Pagination::new(1, 20).unwrap())
        .unwrap();
    let names: Vec<Option<String>> = links.items.iter().map(|l| l.name.clone()).collect();
    assert_eq!(
        names,
        vec![Some("Second".to_string()), Some("Other".to_string())]
    );
}

#[tokio::test]
async fn test_non_http_links_dropped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(
            r#"<a href="http://192.168.1.1/">Router</a>
            <a href="mailto:someone@example.com">Mail</a>
            <a href="javascript:void(0)">Script</a>
            <a href="https://example.com/">Public</a>"#,
        ))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap();

    // Private targets pass when unrestricted; other schemes never do
    assert_eq!(outcome.links, 2);
}

#[tokio::test]
async fn test_rescrape_replaces_link_set() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(concat!(
            r#"<a href="https://example.com/1">1</a>"#,
            r#"<a href="https://example.com/2">2</a>"#,
            r#"<a href="https://example.com/3">3</a>"#,
        )))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(r#"<a href="https://example.com/only">Only</a>"#))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();
    let job = ScrapeJob {
        page_id: page.id,
        url,
    };

    assert_eq!(processor.process(&job).await.unwrap().links, 3);
    assert_eq!(storage.count_links(page.id).unwrap(), 3);
    // The client adds a trailing slash to the bare origin; that is not a redirect
    let first = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(first.final_url, None);

    assert_eq!(processor.process(&job).await.unwrap().links, 1);
    let page = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(page.link_count, 1);
    assert_eq!(storage.count_links(page.id).unwrap(), 1);
}

#[tokio::test]
async fn test_failed_page_recovers_on_redelivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(r#"<title>Back</title><a href="https://example.com/">Home</a>"#))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();
    let job = ScrapeJob {
        page_id: page.id,
        url,
    };

    let err = processor.process(&job).await.unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Fetch(FetchError::Status { status: 503, .. })
    ));
    let failed = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(failed.status, PageStatus::Failed);

    processor.process(&job).await.unwrap();
    let done = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(done.status, PageStatus::Done);
    assert!(done.error.is_none());
    assert_eq!(done.link_count, storage.count_links(page.id).unwrap() as u32);
}

#[tokio::test]
async fn test_page_without_links_is_done_with_zero_count() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body><p>No anchors here</p></body></html>"))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url: url.clone(),
        })
        .await
        .unwrap();

    // No <title>, so the final URL stands in
    assert_eq!(outcome.title, outcome.final_url);
    let page = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Done);
    assert_eq!(page.link_count, 0);
}

#[tokio::test]
async fn test_latin1_page_decoded_by_charset() {
    let mock_server = MockServer::start().await;
    let body = b"<title>Caf\xe9</title><a href=\"https://example.com/\">Men\xfa</a>";
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.to_vec(), "text/html; charset=iso-8859-1"),
        )
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap();

    assert_eq!(outcome.title, "Café");
    let links = storage
        .find_links(page.id, Pagination::new(1, 20).unwrap())
        .unwrap();
    assert_eq!(links.items[0].name.as_deref(), Some("Menú"));
}

#[tokio::test]
async fn test_stray_nul_byte_still_scraped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<title>T</title><a href=\"/a\">A</a>\0"))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let url = mock_server.uri();
    let page = storage.create_page(&url).unwrap();

    let outcome = processor
        .process(&ScrapeJob {
            page_id: page.id,
            url,
        })
        .await
        .unwrap();

    assert_eq!(outcome.title, "T");
    let page = storage.find_page(page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Done);
    assert_eq!(page.link_count, 1);
}
