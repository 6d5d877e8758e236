use std::collections::HashMap;

/// One listing as it comes off the site, before temporal normalization.
/// The pipeline turns this into a [`crate::models::Listing`] once the
/// publish time has been resolved and defaults applied.
#[derive(Debug, Clone, Default)]
pub struct RawListing {
    pub id: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub link: String,
    pub relative_time: Option<String>,
    pub pinned: bool,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub address: Option<String>,
    pub additional_details: Vec<String>,
    pub specifications: HashMap<String, String>,
    pub views: Option<String>,
    pub submitter_name: Option<String>,
    pub submitter_ads: Option<String>,
    pub member_since: Option<String>,
    pub phone: Option<String>,
}
