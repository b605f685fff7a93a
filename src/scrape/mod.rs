//! Scrape pipeline: fetch, extract, filter
//!
//! This module contains the per-job page work:
//! - HTTP fetching with size, time, redirect and content-type limits
//! - HTML parsing and link extraction
//! - Safety screening of extracted links
//! - Deduplication by canonical URL

mod dedupe;
mod extractor;
mod fetcher;

pub use dedupe::dedupe;
pub use extractor::{extract, extract_links, ExtractedPage, ScrapedLink, MAX_NAME_LENGTH};
pub use fetcher::{build_http_client, FetchError, FetchedPage, PageFetcher};

use crate::config::FetchConfig;
use crate::url::UrlSafetyFilter;
use crate::ScrapeError;

/// Fresh result of one scrape attempt, before deduplication
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub title: String,
    pub final_url: String,
    /// Safe links in document order, possibly with duplicates
    pub links: Vec<ScrapedLink>,
}

/// Fetches a page and turns it into a [`ScrapeResult`]
#[derive(Debug, Clone)]
pub struct Scraper {
    fetcher: PageFetcher,
    filter: UrlSafetyFilter,
}

impl Scraper {
    pub fn new(config: &FetchConfig, filter: UrlSafetyFilter) -> Result<Self, reqwest::Error> {
        Ok(Self {
            fetcher: PageFetcher::new(config, filter)?,
            filter,
        })
    }

    pub fn filter(&self) -> UrlSafetyFilter {
        self.filter
    }

    /// Runs fetch, extract and filter for one URL
    ///
    /// 1. Reject the URL up front if the safety filter does
    /// 2. Fetch the page (see [`PageFetcher::fetch`])
    /// 3. Extract title and links relative to the final URL
    /// 4. Drop every link that fails the safety filter
    pub async fn scrape(&self, url: &str) -> Result<ScrapeResult, ScrapeError> {
        if !self.filter.is_safe(url) {
            return Err(ScrapeError::UnsafeUrl {
                url: url.to_string(),
            });
        }

        let fetched = self.fetcher.fetch(url).await?;

        let extracted =
            extract(&fetched.html, &fetched.final_url).map_err(|message| ScrapeError::Parse {
                url: fetched.final_url.clone(),
                message,
            })?;

        let total = extracted.links.len();
        let links: Vec<ScrapedLink> = extracted
            .links
            .into_iter()
            .filter(|link| self.filter.is_safe(&link.href))
            .collect();

        if links.len() < total {
            tracing::debug!(
                "Dropped {} unsafe links from {}",
                total - links.len(),
                fetched.final_url
            );
        }

        Ok(ScrapeResult {
            title: extracted.title,
            final_url: fetched.final_url,
            links,
        })
    }
}
