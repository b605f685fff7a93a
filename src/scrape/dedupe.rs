//! Link deduplication by canonical URL

use crate::scrape::ScrapedLink;
use crate::url::canonicalize;
use indexmap::IndexMap;

/// Collapses links that share a canonical URL
///
/// Later occurrences overwrite earlier ones (last write wins), while the
/// output keeps the position at which each canonical key was first seen.
/// The stored `href` is the winning link's original href, not the canonical
/// key.
///
/// Links are expected to have passed the safety filter already.
///
/// # Example
///
/// ```
/// use link_scraper::scrape::{dedupe, ScrapedLink};
///
/// let links = vec![
///     ScrapedLink { href: "https://example.com/a#top".into(), name: "First".into() },
///     ScrapedLink { href: "https://EXAMPLE.com/a".into(), name: "Second".into() },
/// ];
/// let unique = dedupe(links);
/// assert_eq!(unique.len(), 1);
/// assert_eq!(unique[0].name, "Second");
/// ```
pub fn dedupe(links: Vec<ScrapedLink>) -> Vec<ScrapedLink> {
    let mut table: IndexMap<String, ScrapedLink> = IndexMap::with_capacity(links.len());

    for link in links {
        // insert() on an existing key replaces the value in place
        table.insert(canonicalize(&link.href), link);
    }

    table.into_values().collect()
}
