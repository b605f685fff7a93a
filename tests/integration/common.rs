//! Shared fixtures

use link_scraper::config::FetchConfig;
use link_scraper::scrape::Scraper;
use link_scraper::storage::SqliteStorage;
use link_scraper::worker::JobProcessor;
use link_scraper::UrlSafetyFilter;
use std::sync::Arc;
use wiremock::ResponseTemplate;

/// The mock server listens on 127.0.0.1, so tests run with the private
/// network block switched off
pub fn permissive_scraper() -> Scraper {
    Scraper::new(&FetchConfig::default(), UrlSafetyFilter::permissive())
        .expect("Failed to build scraper")
}

pub fn processor() -> (Arc<SqliteStorage>, JobProcessor<SqliteStorage>) {
    let storage = Arc::new(SqliteStorage::open_in_memory().expect("Failed to open database"));
    let processor = JobProcessor::new(Arc::clone(&storage), permissive_scraper());
    (storage, processor)
}

/// 200 response carrying `body` as HTML
pub fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html; charset=utf-8")
}
