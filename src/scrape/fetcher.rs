//! HTTP fetcher implementation
//!
//! This module performs the single bounded GET a scrape job needs:
//! - Building the HTTP client with the configured user agent and timeout
//! - Following redirects up to a hop limit, re-checking every hop for safety
//! - Rejecting non-2xx/3xx statuses and non-HTML content types
//! - Streaming the body while enforcing the maximum content size
//! - Classifying failures into [`FetchError`]

use crate::config::FetchConfig;
use crate::url::UrlSafetyFilter;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use std::error::Error as StdError;
use thiserror::Error;

/// Reasons a page fetch can fail
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Too many redirects from {url} (limit {limit})")]
    RedirectLimit { url: String, limit: usize },

    #[error("Redirect to unsafe URL blocked: {target}")]
    UnsafeRedirect { target: String },

    #[error("Response status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Not an HTML page. Content-Type: {content_type}")]
    NotHtml { content_type: String },

    #[error("Response body exceeds maximum size of {limit} bytes")]
    TooLarge { limit: u64 },
}

impl FetchError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Network { .. } => "network",
            Self::RedirectLimit { .. } => "redirect_limit",
            Self::UnsafeRedirect { .. } => "unsafe_redirect",
            Self::Status { .. } => "status",
            Self::NotHtml { .. } => "not_html",
            Self::TooLarge { .. } => "too_large",
        }
    }
}

/// Raised from inside the redirect policy and recovered when classifying
#[derive(Debug, Error)]
enum RedirectRejected {
    #[error("redirect limit of {0} reached")]
    TooMany(usize),

    #[error("redirect target {0} is not safe")]
    Unsafe(String),
}

/// A successfully fetched HTML document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Decoded page body
    pub html: String,
    /// Content-Type header value
    pub content_type: String,
    /// URL after all redirects
    pub final_url: String,
    /// HTTP status code of the final response
    pub status_code: u16,
}

/// Bounded HTTP GET for scrape jobs
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    max_content_size: u64,
    max_redirects: usize,
}

impl PageFetcher {
    /// Builds a fetcher from the fetch limits and the safety filter
    ///
    /// The filter is consulted on every redirect hop so a public URL cannot
    /// bounce the request onto a blocked target.
    pub fn new(config: &FetchConfig, filter: UrlSafetyFilter) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config, filter)?;
        Ok(Self {
            client,
            max_content_size: config.max_content_size,
            max_redirects: config.max_redirects,
        })
    }

    /// Fetches `url` and returns its HTML body
    ///
    /// # Request Flow
    ///
    /// 1. GET with the configured timeout, following redirects (hop limit)
    /// 2. Final status must be 2xx or 3xx
    /// 3. Content-Type must contain `text/html`
    /// 4. Body is read in chunks; exceeding the size limit aborts
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Timeout (connect or body) | `Timeout` |
    /// | Connection / TLS / DNS error | `Network` |
    /// | Redirect chain over limit | `RedirectLimit` |
    /// | Redirect to blocked target | `UnsafeRedirect` |
    /// | Status outside 200..400 | `Status` |
    /// | Content-Type without `text/html` | `NotHtml` |
    /// | Body over `max_content_size` | `TooLarge` |
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        tracing::debug!("Fetching {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify_error(url, e))?;

        let status = response.status();
        // reqwest exposes the post-redirect URL directly
        let final_url = response.url().to_string();

        if !(status.is_success() || status.is_redirection()) {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") {
            return Err(FetchError::NotHtml { content_type });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_content_size {
                return Err(FetchError::TooLarge {
                    limit: self.max_content_size,
                });
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify_error(&final_url, e))?
        {
            if body.len() as u64 + chunk.len() as u64 > self.max_content_size {
                return Err(FetchError::TooLarge {
                    limit: self.max_content_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            "Fetched {} ({} bytes, status {}, final URL {})",
            url,
            body.len(),
            status.as_u16(),
            final_url
        );

        Ok(FetchedPage {
            html: decode_body(&body, &content_type),
            content_type,
            final_url,
            status_code: status.as_u16(),
        })
    }

    fn classify_error(&self, url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
            };
        }

        if error.is_redirect() {
            let mut source = error.source();
            while let Some(inner) = source {
                if let Some(rejected) = inner.downcast_ref::<RedirectRejected>() {
                    return match rejected {
                        RedirectRejected::TooMany(limit) => FetchError::RedirectLimit {
                            url: url.to_string(),
                            limit: *limit,
                        },
                        RedirectRejected::Unsafe(target) => FetchError::UnsafeRedirect {
                            target: target.clone(),
                        },
                    };
                }
                source = inner.source();
            }
            return FetchError::RedirectLimit {
                url: url.to_string(),
                limit: self.max_redirects,
            };
        }

        let message = if error.is_connect() {
            "Connection refused".to_string()
        } else {
            error.to_string()
        };

        FetchError::Network {
            url: url.to_string(),
            message,
        }
    }
}

/// Decodes a response body using the `charset` of its Content-Type
///
/// Unknown or missing charsets fall back to UTF-8; a byte order mark wins
/// over the header. Malformed sequences become U+FFFD.
fn decode_body(body: &[u8], content_type: &str) -> String {
    let encoding = charset_of(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (decoded, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!("Body had invalid {} sequences", used.name());
    }
    decoded.into_owned()
}

fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Builds an HTTP client with the fetch limits applied
///
/// # Example
///
/// ```no_run
/// use link_scraper::config::FetchConfig;
/// use link_scraper::scrape::build_http_client;
/// use link_scraper::url::UrlSafetyFilter;
///
/// let client = build_http_client(&FetchConfig::default(), UrlSafetyFilter::permissive()).unwrap();
/// ```
pub fn build_http_client(
    config: &FetchConfig,
    filter: UrlSafetyFilter,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(config.request_timeout())
        .redirect(redirect_policy(config.max_redirects, filter))
        .gzip(true)
        .brotli(true)
        .build()
}

fn redirect_policy(max_redirects: usize, filter: UrlSafetyFilter) -> Policy {
    Policy::custom(move |attempt| {
        // previous() includes the originally requested URL
        if attempt.previous().len() > max_redirects {
            attempt.error(RedirectRejected::TooMany(max_redirects))
        } else if !filter.is_safe_url(attempt.url()) {
            let target = attempt.url().to_string();
            attempt.error(RedirectRejected::Unsafe(target))
        } else {
            attempt.follow()
        }
    })
}
