//! HTML link extractor
//!
//! This module parses a fetched HTML document and extracts:
//! - The page title (from the first `<title>`)
//! - Every `<a href>` resolved against the page's final URL, with a display name

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Display names longer than this are truncated
pub const MAX_NAME_LENGTH: usize = 255;

const ELLIPSIS: &str = "...";

/// A link found on a page, before safety screening and deduplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedLink {
    /// Absolute URL
    pub href: String,
    /// Trimmed anchor text, or a synthesized name
    pub name: String,
}

/// Title and links extracted from one document
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Trimmed `<title>` text, falling back to the final URL
    pub title: String,
    /// Links in order of first appearance in the document
    pub links: Vec<ScrapedLink>,
}

/// Parses HTML content and extracts the title and links
///
/// # Link Extraction Rules
///
/// - Every `<a>` element is considered; anchors without an `href`, or with an
///   empty one, are skipped
/// - `href` is resolved against `final_url`; hrefs that fail to resolve are
///   skipped. No scheme filtering happens here, that is the safety filter's job
/// - Name is the trimmed anchor text; if empty it becomes `Link to <href>`;
///   names over 255 characters are cut to 252 plus `...`
///
/// Malformed markup, including stray NUL bytes, is tolerated by the HTML5
/// parser. Only an unusable base URL is reported as an error.
///
/// # Example
///
/// ```
/// use link_scraper::scrape::extract;
///
/// let html = r#"<title>Test</title><a href="/page">Link</a>"#;
/// let page = extract(html, "https://example.com/").unwrap();
/// assert_eq!(page.title, "Test");
/// assert_eq!(page.links[0].href, "https://example.com/page");
/// ```
pub fn extract(html: &str, final_url: &str) -> Result<ExtractedPage, String> {
    let base_url =
        Url::parse(final_url).map_err(|e| format!("Invalid base URL {}: {}", final_url, e))?;

    let document = Html::parse_document(html);

    let title = extract_title(&document).unwrap_or_else(|| final_url.to_string());

    let anchor_selector =
        Selector::parse("a").map_err(|e| format!("Invalid anchor selector: {:?}", e))?;
    let links: Vec<ScrapedLink> = extract_links(&document, &anchor_selector, &base_url).collect();

    tracing::debug!("Extracted {} links from {}", links.len(), final_url);

    Ok(ExtractedPage { title, links })
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lazily walks the anchors of a parsed document in document order
///
/// The iterator borrows the parsed tree; extracting again means iterating again
/// over the same `Html`, or re-parsing.
pub fn extract_links<'a>(
    document: &'a Html,
    selector: &'a Selector,
    base_url: &'a Url,
) -> impl Iterator<Item = ScrapedLink> + 'a {
    document
        .select(selector)
        .filter_map(move |element| link_from_anchor(element, base_url))
}

fn link_from_anchor(element: ElementRef<'_>, base_url: &Url) -> Option<ScrapedLink> {
    let raw_href = element.value().attr("href")?;
    if raw_href.is_empty() {
        return None;
    }

    let href = base_url.join(raw_href).ok()?.to_string();

    let text = element.text().collect::<String>();
    let text = text.trim();
    let name = if text.is_empty() {
        format!("Link to {}", href)
    } else {
        text.to_string()
    };

    Some(ScrapedLink {
        name: truncate_name(name),
        href,
    })
}

/// Cuts names over [`MAX_NAME_LENGTH`] characters down to 252 plus `...`
fn truncate_name(name: String) -> String {
    if name.chars().count() <= MAX_NAME_LENGTH {
        return name;
    }

    let keep = MAX_NAME_LENGTH - ELLIPSIS.len();
    let mut truncated: String = name.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
