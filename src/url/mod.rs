//! URL handling module for Link-Scraper
//!
//! This module provides the URL Safety Filter, which decides whether a URL may
//! be fetched or stored, and canonicalization, which produces the key used to
//! collapse duplicate links.

mod normalize;
mod safety;

// Re-export main functions
pub use normalize::{canonicalize, normalize_url};
pub use safety::{DeploymentMode, UrlSafetyFilter};
