//! Listing source backed by headless Chrome, for when the site only renders
//! its cards client-side. Extraction is shared with the HTTP source: the
//! rendered DOM is captured as HTML and parsed the same way.

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use tracing::{debug, info, warn};

use super::q84sale;
use super::traits::ListingSource;
use super::types::RawListing;

pub struct BrowserSource {
    browser: Browser,
}

impl BrowserSource {
    pub fn new() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser })
    }

    /// Navigate to a page and capture its rendered HTML.
    fn page_html(&self, url: &str) -> Result<String> {
        let tab = self.browser.new_tab()?;
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        let result = tab.evaluate("document.documentElement.outerHTML", false)?;
        let html = result
            .value
            .and_then(|value| value.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        if html.is_empty() {
            anyhow::bail!("Empty document for {}", url);
        }
        Ok(html)
    }
}

#[async_trait]
impl ListingSource for BrowserSource {
    async fn fetch_listings(&self, page_url: &str) -> Result<Vec<RawListing>> {
        let html = self.page_html(page_url)?;
        let stubs = q84sale::parse_listing_cards(&html);
        debug!(url = page_url, cards = stubs.len(), "parsed listing cards");

        let mut listings = Vec::with_capacity(stubs.len());
        for stub in &stubs {
            match self.page_html(&stub.link) {
                Ok(detail_html) => listings.push(q84sale::parse_detail_page(&detail_html, stub)),
                Err(e) => {
                    warn!(link = %stub.link, error = %e, "detail page failed");
                    listings.push(q84sale::listing_from_stub(stub));
                }
            }
        }
        Ok(listings)
    }

    fn source_name(&self) -> &'static str {
        "q84sale-browser"
    }
}
