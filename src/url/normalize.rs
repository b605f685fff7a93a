use url::form_urlencoded;
use url::Url;

/// Rewrites a URL into its comparison-stable form for deduplication
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; if it does not parse, return the input unchanged
/// 2. Lowercase scheme and host (the parser already does both)
/// 3. Drop userinfo and default ports
/// 4. Keep the path as-is; an empty path becomes `/`. Trailing slashes on
///    non-root paths are preserved, so `/docs` and `/docs/` stay distinct
/// 5. Sort query parameters by key (stable, so repeated keys keep their
///    relative order) and re-encode them; an empty query is dropped
/// 6. Drop the fragment
///
/// This never fails: it is a comparison key, not a validator.
///
/// # Examples
///
/// ```
/// use link_scraper::url::canonicalize;
///
/// assert_eq!(
///     canonicalize("HTTPS://Example.COM/page?b=2&a=1#top"),
///     "https://example.com/page?a=1&b=2"
/// );
/// assert_eq!(canonicalize("not-a-url"), "not-a-url");
/// ```
pub fn canonicalize(url_str: &str) -> String {
    let url = match Url::parse(url_str) {
        Ok(url) => url,
        Err(_) => return url_str.to_string(),
    };

    let mut canonical = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        canonical.push_str(&host.to_lowercase());
    }
    if let Some(port) = url.port() {
        canonical.push(':');
        canonical.push_str(&port.to_string());
    }

    let path = url.path();
    if path.is_empty() {
        canonical.push('/');
    } else {
        canonical.push_str(path);
    }

    if let Some(query) = sorted_query(&url) {
        canonical.push('?');
        canonical.push_str(&query);
    }

    canonical
}

/// Alias kept for callers that think of this as URL normalization
pub fn normalize_url(url_str: &str) -> String {
    canonicalize(url_str)
}

/// Sorts query parameters by key and re-encodes them
fn sorted_query(url: &Url) -> Option<String> {
    match url.query() {
        None | Some("") => return None,
        Some(_) => {}
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // sort_by is stable: duplicate keys keep their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();

    Some(encoded)
}
