use anyhow::Result;
use async_trait::async_trait;

use super::types::RawListing;

/// Common trait for listing-page sources.
/// Lets the pipeline run against plain HTTP or a headless browser.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one listing page and extract every listing on it, including the
    /// fields that live on each listing's own detail page.
    async fn fetch_listings(&self, page_url: &str) -> Result<Vec<RawListing>>;

    /// Name of the backing fetch mechanism.
    fn source_name(&self) -> &'static str;
}
