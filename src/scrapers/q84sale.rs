//! q84sale.com extraction: listing-card parsing, detail-page parsing, and the
//! HTTP-backed source. The browser source reuses the same parse functions on
//! captured page HTML.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::traits::ListingSource;
use super::types::RawListing;

const BASE_URL: &str = "https://www.q84sale.com";

fn ad_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Ad ID:\s*(\d+)").unwrap())
}

fn ads_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d+\s+ads$").unwrap())
}

fn member_since_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Member since .+$").unwrap())
}

/// The slice of a listing visible on the category page itself.
#[derive(Debug, Clone)]
pub struct CardStub {
    pub link: String,
    pub category: Option<String>,
    pub title: Option<String>,
    pub pinned: bool,
}

fn text_of(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).unwrap();
    document.select(&selector).next().map(|el| text_of(&el)).filter(|t| !t.is_empty())
}

/// Parse the stacked listing cards off one category page.
pub(crate) fn parse_listing_cards(html: &str) -> Vec<CardStub> {
    let document = Html::parse_document(html);
    let card_selector = Selector::parse(".StackedCard_card__Kvggc").unwrap();
    let category_selector =
        Selector::parse(".text-6-med.text-neutral_600.styles_category__NQAci").unwrap();
    let title_selector =
        Selector::parse(".text-4-med.text-neutral_900.styles_title__l5TTA.undefined").unwrap();
    let pin_selector = Selector::parse(".styles_tail__82mnX p.text-6-med.text-neutral_600").unwrap();

    let mut stubs = Vec::new();
    for card in document.select(&card_selector) {
        let Some(href) = card.value().attr("href") else {
            continue;
        };
        let link = if href.starts_with('/') {
            format!("{}{}", BASE_URL, href)
        } else {
            href.to_string()
        };
        let category = card.select(&category_selector).next().map(|el| text_of(&el));
        let title = card.select(&title_selector).next().map(|el| text_of(&el));
        let pinned = card
            .select(&pin_selector)
            .next()
            .map(|el| text_of(&el) == "Pinned today")
            .unwrap_or(false);
        stubs.push(CardStub { link, category, title, pinned });
    }
    stubs
}

/// A listing for which only the card fields are known, e.g. when the detail
/// page could not be fetched. Without a relative time it is filtered out
/// downstream instead of erroring the page.
pub(crate) fn listing_from_stub(stub: &CardStub) -> RawListing {
    RawListing {
        category: stub.category.clone(),
        title: stub.title.clone(),
        link: stub.link.clone(),
        pinned: stub.pinned,
        ..RawListing::default()
    }
}

/// Combine a card stub with the fields on the listing's detail page.
pub(crate) fn parse_detail_page(html: &str, stub: &CardStub) -> RawListing {
    let document = Html::parse_document(html);
    let (submitter_name, submitter_ads, member_since) = extract_submitter(&document);
    RawListing {
        id: extract_ad_id(&document),
        category: stub.category.clone(),
        title: stub.title.clone(),
        link: stub.link.clone(),
        relative_time: extract_relative_time(&document),
        pinned: stub.pinned,
        description: select_text(&document, ".styles_description__DpRnU"),
        image_url: extract_image(&document),
        price: select_text(&document, ".h3.m-h5.text-prim_4sale_500"),
        address: select_text(&document, ".text-4-regular.m-text-5-med.text-neutral_600"),
        additional_details: extract_additional_details(&document),
        specifications: extract_specifications(&document),
        views: extract_views(&document),
        submitter_name,
        submitter_ads,
        member_since,
        phone: extract_phone(&document),
    }
}

fn extract_ad_id(document: &Html) -> Option<String> {
    let wrapper_selector = Selector::parse(
        ".el-lvl-1.d-flex.align-items-center.justify-content-between.styles_sectionWrapper__v97PG",
    )
    .unwrap();
    let inner_selector = Selector::parse(".text-4-regular.m-text-5-med.text-neutral_600").unwrap();
    let wrapper = document.select(&wrapper_selector).next()?;
    let text = wrapper.select(&inner_selector).next().map(|el| text_of(&el))?;
    ad_id_re().captures(&text).map(|caps| caps[1].to_string())
}

fn extract_image(document: &Html) -> Option<String> {
    let selector = Selector::parse(".styles_img__PC9G3").unwrap();
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("src"))
        .map(|src| src.to_string())
}

/// The top data strip holds view count first and relative publish time second.
fn top_data_entries(document: &Html) -> Vec<String> {
    let parent_selector = Selector::parse(".d-flex.styles_topData__Sx1GF").unwrap();
    let entry_selector =
        Selector::parse(".d-flex.align-items-center.styles_dataWithIcon__For9u").unwrap();
    let value_selector =
        Selector::parse("div.text-5-regular.m-text-6-med.text-neutral_600").unwrap();

    let Some(parent) = document.select(&parent_selector).next() else {
        return Vec::new();
    };
    parent
        .select(&entry_selector)
        .filter_map(|entry| entry.select(&value_selector).next().map(|el| text_of(&el)))
        .collect()
}

fn extract_views(document: &Html) -> Option<String> {
    top_data_entries(document).into_iter().next().filter(|t| !t.is_empty())
}

fn extract_relative_time(document: &Html) -> Option<String> {
    top_data_entries(document).into_iter().nth(1).filter(|t| !t.is_empty())
}

fn extract_additional_details(document: &Html) -> Vec<String> {
    let selector = Selector::parse(".styles_boolAttrs__Ce6YV .styles_boolAttr__Fkh_j div").unwrap();
    document
        .select(&selector)
        .map(|el| text_of(&el))
        .filter(|t| !t.is_empty())
        .collect()
}

fn extract_specifications(document: &Html) -> std::collections::HashMap<String, String> {
    let attr_selector = Selector::parse(".styles_attrs__PX5Fs .styles_attr__BN3w_").unwrap();
    let img_selector = Selector::parse("img").unwrap();
    let value_selector = Selector::parse(".text-4-med.m-text-5-med.text-neutral_900").unwrap();

    let mut attributes = std::collections::HashMap::new();
    for attr in document.select(&attr_selector) {
        let label = attr
            .select(&img_selector)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(|alt| alt.to_string());
        let value = attr.select(&value_selector).next().map(|el| text_of(&el));
        if let (Some(label), Some(value)) = (label, value) {
            if !label.is_empty() && !value.is_empty() {
                attributes.insert(label, value);
            }
        }
    }
    attributes
}

fn extract_submitter(document: &Html) -> (Option<String>, Option<String>, Option<String>) {
    let wrapper_selector =
        Selector::parse(".styles_infoWrapper__v4P8_.undefined.align-items-center").unwrap();
    let Some(wrapper) = document.select(&wrapper_selector).next() else {
        return (None, None, None);
    };

    let name_selector = Selector::parse(".text-4-med.m-h6.text-neutral_900").unwrap();
    let name = wrapper.select(&name_selector).next().map(|el| text_of(&el));

    let details_selector =
        Selector::parse(".styles_memberDate__qdUsm span.text-neutral_600").unwrap();
    let details: Vec<String> = wrapper.select(&details_selector).map(|el| text_of(&el)).collect();

    let ads = details
        .first()
        .map(|t| if ads_count_re().is_match(t) { t.clone() } else { "0 ads".to_string() });
    // The second span is the membership line; if it is missing or malformed
    // the site shows the first span there instead.
    let member_since = match details.get(1) {
        Some(t) if member_since_re().is_match(t) => Some(t.clone()),
        _ => details.first().cloned(),
    };

    (name, ads, member_since)
}

/// The phone number only appears in the embedded Next.js state blob.
fn extract_phone(document: &Html) -> Option<String> {
    let selector = Selector::parse("script#__NEXT_DATA__").unwrap();
    let script = document.select(&selector).next()?;
    let text: String = script.text().collect();
    let data: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    match data.pointer("/props/pageProps/listing/phone")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Listing source backed by plain HTTP requests.
pub struct Q84SaleSource {
    client: Client,
}

impl Q84SaleSource {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            warn!(url, status = %response.status(), "non-success response");
            anyhow::bail!("Failed to fetch {}: {}", url, response.status());
        }

        response.text().await.context("Failed to read response body")
    }
}

#[async_trait]
impl ListingSource for Q84SaleSource {
    async fn fetch_listings(&self, page_url: &str) -> Result<Vec<RawListing>> {
        let html = self.get_text(page_url).await?;
        let stubs = parse_listing_cards(&html);
        debug!(url = page_url, cards = stubs.len(), "parsed listing cards");

        let mut listings = Vec::with_capacity(stubs.len());
        for stub in &stubs {
            match self.get_text(&stub.link).await {
                Ok(detail_html) => listings.push(parse_detail_page(&detail_html, stub)),
                Err(e) => {
                    // Keep the card-level fields; the record is dropped by the
                    // temporal filter instead of failing the page.
                    warn!(link = %stub.link, error = %e, "detail page failed");
                    listings.push(listing_from_stub(stub));
                }
            }
        }
        Ok(listings)
    }

    fn source_name(&self) -> &'static str {
        "q84sale-http"
    }
}
