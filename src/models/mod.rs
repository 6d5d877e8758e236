use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::scrapers::types::RawListing;

/// Sentinel for listings that do not show a price.
pub const PRICE_UNKNOWN: &str = "0 KWD";
/// Sentinel for listings without a usable address.
pub const ADDRESS_UNKNOWN: &str = "Not Mentioned";
/// Category tag for listings whose category could not be extracted.
pub const CATEGORY_UNKNOWN: &str = "unknown";

/// Seller details shown on a listing's detail page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submitter {
    pub name: Option<String>,
    /// Ad-count text, e.g. "12 ads".
    pub ads: String,
    pub member_since: Option<String>,
}

/// One extracted listing, normalized. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Option<String>,
    pub published_at: Option<DateTime<Local>>,
    /// Raw relative-time text as it appeared on the page.
    pub relative_time: Option<String>,
    pub pinned: bool,
    /// Never empty; whitespace-only tags are coerced to [`CATEGORY_UNKNOWN`].
    pub category: String,
    pub title: Option<String>,
    pub description: String,
    pub link: String,
    pub image_url: Option<String>,
    pub price: String,
    pub address: String,
    pub additional_details: Vec<String>,
    pub specifications: HashMap<String, String>,
    pub views: Option<String>,
    pub submitter: Submitter,
    pub phone: Option<String>,
}

impl Listing {
    /// Normalize a raw extraction into the record the rest of the pipeline
    /// owns: timestamp attached, category/price/address defaulted.
    pub fn from_raw(raw: RawListing, published_at: Option<DateTime<Local>>) -> Self {
        let category = match raw.category {
            Some(c) if !c.trim().is_empty() => c,
            _ => CATEGORY_UNKNOWN.to_string(),
        };
        // The site sometimes surfaces the ad-id line where the address
        // belongs; treat that the same as a missing address.
        let address = match raw.address {
            Some(a) if !a.trim().is_empty() && !is_ad_id_text(a.trim()) => a,
            _ => ADDRESS_UNKNOWN.to_string(),
        };
        let price = match raw.price {
            Some(p) if !p.trim().is_empty() => p,
            _ => PRICE_UNKNOWN.to_string(),
        };
        Self {
            id: raw.id,
            published_at,
            relative_time: raw.relative_time,
            pinned: raw.pinned,
            category,
            title: raw.title,
            description: raw.description.unwrap_or_else(|| "No Description".to_string()),
            link: raw.link,
            image_url: raw.image_url,
            price,
            address,
            additional_details: raw.additional_details,
            specifications: raw.specifications,
            views: raw.views,
            submitter: Submitter {
                name: raw.submitter_name,
                ads: raw.submitter_ads.unwrap_or_else(|| "0 ads".to_string()),
                member_since: raw.member_since,
            },
            phone: raw.phone,
        }
    }
}

fn is_ad_id_text(text: &str) -> bool {
    text.strip_prefix("Ad ID:")
        .map(|rest| {
            let rest = rest.trim();
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

/// Per-category record lists for one category job, keyed by category tag.
#[derive(Debug, Clone, Default)]
pub struct CategoryDataset(BTreeMap<String, Vec<Listing>>);

impl CategoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a listing under its own category tag.
    pub fn push(&mut self, listing: Listing) {
        self.0.entry(listing.category.clone()).or_default().push(listing);
    }

    /// Merge another fragment in, preserving record order within categories.
    pub fn merge(&mut self, other: CategoryDataset) {
        for (category, listings) in other.0 {
            self.0.entry(category).or_default().extend(listings);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_records(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Listing>)> {
        self.0.iter()
    }
}

/// A serialized export file waiting in the spool directory.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub path: PathBuf,
    /// Category job (brand) the artifact was built from.
    pub job: String,
    pub records: usize,
}
