//! One category job: every page of one brand, fetched strictly in order with
//! a politeness delay in between.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use tokio::time::sleep;
use tracing::info;

use crate::config::PageSpec;
use crate::models::CategoryDataset;
use crate::retry::RetryPolicy;
use crate::scrapers::ListingSource;

use super::page::fetch_page;

/// Scrape all pages for one category and accumulate the day's records.
///
/// `now` is captured once per invocation by the caller, so page pacing never
/// shifts the filter boundary mid-job. Page failures are absorbed inside the
/// page unit; the job always returns whatever it accumulated.
pub async fn run_category(
    source: &dyn ListingSource,
    name: &str,
    specs: &[PageSpec],
    now: DateTime<Local>,
    target: NaiveDate,
    page_delay: Duration,
    policy: &RetryPolicy,
) -> CategoryDataset {
    info!(category = name, "starting category job");

    let mut dataset = CategoryDataset::new();
    for spec in specs {
        for page in 1..=spec.pages {
            let url = spec.page_url(page);
            let fragment = fetch_page(source, &url, now, target, policy).await;
            dataset.merge(fragment);
            sleep(page_delay).await;
        }
    }

    info!(category = name, records = dataset.total_records(), "category job finished");
    dataset
}
