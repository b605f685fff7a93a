//! Integration tests for the scrape pipeline
//!
//! These tests use wiremock to stand in for the pages being scraped and an
//! in-memory SQLite database for persistence.

mod common;
mod fetch_tests;
mod pipeline_tests;
mod worker_tests;
