//! Job processor - one scrape attempt from delivery to terminal status
//!
//! A delivered job moves its page through `queued -> processing -> done` or
//! `-> failed`. Every error is recorded onto the page and then returned, so
//! the queue can decide whether to redeliver.

use crate::queue::ScrapeJob;
use crate::scrape::{dedupe, Scraper};
use crate::storage::{NewLink, PageUpdate, Storage};
use crate::ScrapeError;
use chrono::Utc;
use std::sync::Arc;

/// Outcome of a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub title: String,
    pub final_url: String,
    /// Number of unique links stored for the page
    pub links: u32,
}

/// Runs the scrape pipeline for delivered jobs and records the result
pub struct JobProcessor<S: Storage> {
    storage: Arc<S>,
    scraper: Scraper,
}

impl<S: Storage> Clone for JobProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            scraper: self.scraper.clone(),
        }
    }
}

impl<S: Storage> JobProcessor<S> {
    pub fn new(storage: Arc<S>, scraper: Scraper) -> Self {
        Self { storage, scraper }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Processes one delivery of `job`
    ///
    /// # Returns
    ///
    /// * `Ok(JobOutcome)` - page is `done` with its link set replaced
    /// * `Err(ScrapeError)` - page is `failed` with the error message, unless
    ///   recording the failure itself failed (logged, original error kept)
    pub async fn process(&self, job: &ScrapeJob) -> Result<JobOutcome, ScrapeError> {
        tracing::info!("Processing page {} ({})", job.page_id, job.url);

        match self.run(job).await {
            Ok(outcome) => {
                tracing::info!(
                    "Page {} done: {} unique links, title {:?}",
                    job.page_id,
                    outcome.links,
                    outcome.title
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("Page {} failed: {}", job.page_id, e);
                self.record_failure(job.page_id, &e);
                Err(e)
            }
        }
    }

    async fn run(&self, job: &ScrapeJob) -> Result<JobOutcome, ScrapeError> {
        self.storage.update_page(
            job.page_id,
            &PageUpdate::Processing {
                started_at: Utc::now(),
            },
        )?;

        let result = self.scraper.scrape(&job.url).await?;
        let unique = dedupe(result.links);
        tracing::debug!(
            "Page {}: {} unique links after dedupe",
            job.page_id,
            unique.len()
        );

        let links: Vec<NewLink> = unique
            .into_iter()
            .map(|link| NewLink {
                href: link.href,
                name: Some(link.name),
            })
            .collect();
        let stored = self.storage.replace_links(job.page_id, &links)?;
        let link_count = stored as u32;

        let final_url =
            was_redirected(&job.url, &result.final_url).then(|| result.final_url.clone());
        self.storage.update_page(
            job.page_id,
            &PageUpdate::Done {
                title: result.title.clone(),
                final_url,
                link_count,
                finished_at: Utc::now(),
            },
        )?;

        Ok(JobOutcome {
            title: result.title,
            final_url: result.final_url,
            links: link_count,
        })
    }

    /// Best-effort `failed` update; never replaces the original error
    fn record_failure(&self, page_id: i64, error: &ScrapeError) {
        let update = PageUpdate::Failed {
            error: error.to_string(),
            finished_at: Utc::now(),
        };

        if let Err(e) = self.storage.update_page(page_id, &update) {
            tracing::error!(
                "Failed to record failure for page {}: {} (original error: {})",
                page_id,
                e,
                error
            );
        }
    }
}

/// True when the response came from a different URL than the one submitted
///
/// The submitted URL is compared in its parsed form, so `https://a.com` and
/// the client's `https://a.com/` count as the same address.
fn was_redirected(submitted: &str, final_url: &str) -> bool {
    match url::Url::parse(submitted) {
        Ok(parsed) => parsed.as_str() != final_url,
        Err(_) => submitted != final_url,
    }
}
