//! Upper-bound discovery for a collection's id space
//!
//! A collection either declares a fixed `max-id` or names a listing page and a
//! pattern; the largest id the pattern captures on that page is taken as the
//! newest item.

use crate::config::CollectionConfig;
use crate::crawler::Downloader;
use crate::HarvestError;
use regex::Regex;

/// Largest id captured by group 1 of `pattern` anywhere in `html`
pub fn scan_max_id(html: &str, pattern: &Regex) -> Option<i64> {
    pattern
        .captures_iter(html)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<i64>().ok())
        .max()
}

/// Resolves the highest known id for `collection`
///
/// # Returns
///
/// * `Ok(i64)` - The fixed bound, or the largest id found on the discovery page
/// * `Err(HarvestError::Discovery)` - The page could not be fetched or held no ids
pub async fn discover_max_id(
    collection: &CollectionConfig,
    downloader: &Downloader,
) -> Result<i64, HarvestError> {
    if let Some(max_id) = collection.max_id {
        return Ok(max_id);
    }

    let fail = |message: String| HarvestError::Discovery {
        collection: collection.name.clone(),
        message,
    };

    let (url, pattern) = match (&collection.discovery_url, &collection.id_pattern) {
        (Some(url), Some(pattern)) => (url, pattern),
        _ => return Err(fail("no max-id or discovery-url configured".to_string())),
    };

    let pattern = Regex::new(pattern).map_err(|e| fail(e.to_string()))?;

    tracing::debug!("Discovering max id for {} from {}", collection.name, url);
    let html = downloader
        .download_body(url)
        .await
        .map_err(|e| fail(e.to_string()))?;

    scan_max_id(&html, &pattern).ok_or_else(|| fail(format!("no ids matched on {}", url)))
}
