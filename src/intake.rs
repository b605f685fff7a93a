//! Job intake - turns a submitted URL into a queued page and its scrape job

use crate::queue::{JobId, JobOptions, JobQueue, ScrapeJob};
use crate::storage::{PageRecord, Storage};
use crate::url::UrlSafetyFilter;
use crate::{Result, ScrapeError};

/// A page that was created and handed to the queue
#[derive(Debug, Clone)]
pub struct Submission {
    pub page: PageRecord,
    pub job_id: JobId,
}

/// Creates a `queued` page for `url` and submits its job
///
/// The URL is screened by the safety filter first; a rejected URL creates
/// nothing.
pub async fn submit_url<S, Q>(
    storage: &S,
    queue: &Q,
    filter: UrlSafetyFilter,
    url: &str,
    options: JobOptions,
) -> Result<Submission>
where
    S: Storage + ?Sized,
    Q: JobQueue + ?Sized,
{
    let url = url.trim();
    if !filter.is_safe(url) {
        return Err(ScrapeError::UnsafeUrl {
            url: url.to_string(),
        });
    }

    let page = storage.create_page(url)?;
    let job = ScrapeJob {
        page_id: page.id,
        url: page.url.clone(),
    };
    let job_id = queue.submit(job, options).await?;

    tracing::info!("Queued page {} as job {}: {}", page.id, job_id, page.url);
    Ok(Submission { page, job_id })
}
