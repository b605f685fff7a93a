//! Worker pool with the in-process queue: retries, events, concurrency

use crate::common::{html, processor};
use link_scraper::intake::submit_url;
use link_scraper::queue::{Backoff, JobOptions, JobQueue, MemoryQueue};
use link_scraper::state::PageStatus;
use link_scraper::storage::Storage;
use link_scraper::worker::{JobEvent, WorkerPool};
use link_scraper::UrlSafetyFilter;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries(attempts: u32) -> JobOptions {
    JobOptions {
        attempts,
        backoff: Backoff::exponential(Duration::from_millis(10)),
    }
}

#[tokio::test]
async fn test_job_retried_until_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(r#"<title>Ok</title><a href="https://example.com/">Home</a>"#))
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let queue = Arc::new(MemoryQueue::new());
    let submission = submit_url(
        storage.as_ref(),
        queue.as_ref(),
        UrlSafetyFilter::permissive(),
        &mock_server.uri(),
        fast_retries(3),
    )
    .await
    .unwrap();
    queue.close().await;

    let pool = WorkerPool::new(processor, Arc::clone(&queue), 2);
    let mut events = pool.subscribe();
    let stats = tokio::time::timeout(Duration::from_secs(10), pool.run())
        .await
        .expect("pool did not drain");

    assert_eq!(stats.completed, 1);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.failed, 0);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), 3);
    assert!(matches!(
        &received[0],
        JobEvent::Failed {
            attempt: 1,
            will_retry: true,
            ..
        }
    ));
    assert!(matches!(
        &received[1],
        JobEvent::Failed {
            attempt: 2,
            will_retry: true,
            ..
        }
    ));
    assert_eq!(
        received[2],
        JobEvent::Completed {
            job_id: submission.job_id,
            page_id: submission.page.id,
            links: 1,
        }
    );

    let page = storage.find_page(submission.page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Done);
    assert!(page.error.is_none());
    assert!(queue.is_drained());
}

#[tokio::test]
async fn test_attempts_exhausted_leaves_page_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (storage, processor) = processor();
    let queue = Arc::new(MemoryQueue::new());
    let submission = submit_url(
        storage.as_ref(),
        queue.as_ref(),
        UrlSafetyFilter::permissive(),
        &mock_server.uri(),
        fast_retries(2),
    )
    .await
    .unwrap();
    queue.close().await;

    let pool = WorkerPool::new(processor, Arc::clone(&queue), 1);
    let mut events = pool.subscribe();
    let stats = tokio::time::timeout(Duration::from_secs(10), pool.run())
        .await
        .expect("pool did not drain");

    assert_eq!(stats.completed, 0);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.failed, 1);

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    match last {
        Some(JobEvent::Failed {
            attempt,
            will_retry,
            error,
            ..
        }) => {
            assert_eq!(attempt, 2);
            assert!(!will_retry);
            assert!(error.contains("404"));
        }
        other => panic!("expected a final failure event, got {:?}", other),
    }

    let page = storage.find_page(submission.page.id).unwrap().unwrap();
    assert_eq!(page.status, PageStatus::Failed);
    assert!(page.error.as_deref().unwrap().contains("404"));
}

#[tokio::test]
async fn test_pool_processes_jobs_concurrently() {
    let mock_server = MockServer::start().await;
    for i in 0..6 {
        Mock::given(method("GET"))
            .and(path(format!("/page{}", i)))
            .respond_with(
                html(format!(
                    r#"<title>Page {i}</title><a href="https://example.com/{i}">Link</a>"#
                ))
                .set_delay(Duration::from_millis(50)),
            )
            .mount(&mock_server)
            .await;
    }

    let (storage, processor) = processor();
    let queue = Arc::new(MemoryQueue::new());
    let mut page_ids = Vec::new();
    for i in 0..6 {
        let url = format!("{}/page{}", mock_server.uri(), i);
        let submission = submit_url(
            storage.as_ref(),
            queue.as_ref(),
            UrlSafetyFilter::permissive(),
            &url,
            fast_retries(1),
        )
        .await
        .unwrap();
        page_ids.push(submission.page.id);
    }
    queue.close().await;

    let pool = WorkerPool::new(processor, Arc::clone(&queue), 3);
    let stats = tokio::time::timeout(Duration::from_secs(10), pool.run())
        .await
        .expect("pool did not drain");
    assert_eq!(stats.completed, 6);

    for (i, page_id) in page_ids.into_iter().enumerate() {
        let page = storage.find_page(page_id).unwrap().unwrap();
        assert_eq!(page.status, PageStatus::Done);
        assert_eq!(page.title, Some(format!("Page {}", i)));
        assert_eq!(page.link_count, 1);
    }
}

#[tokio::test]
async fn test_shutdown_stops_idle_workers() {
    let (_storage, processor) = processor();
    let queue = Arc::new(MemoryQueue::new());
    let pool = WorkerPool::new(processor, Arc::clone(&queue), 2);

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        pool.run_until(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .expect("pool did not stop on shutdown");

    assert_eq!(stats.completed, 0);
}
