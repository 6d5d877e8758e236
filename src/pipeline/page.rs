//! One (category, page-number) fetch unit: retried fetch + extraction,
//! temporal normalization, and the target-day filter.

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, warn};

use crate::models::{CategoryDataset, Listing};
use crate::relative_time;
use crate::retry::{with_retry, RetryPolicy};
use crate::scrapers::ListingSource;

/// Fetch one listing page and reduce it to the records published on the
/// target day, grouped by category tag.
///
/// Retry exhaustion yields an empty fragment: a bad page must never lose the
/// data already collected from its siblings.
pub async fn fetch_page(
    source: &dyn ListingSource,
    url: &str,
    now: DateTime<Local>,
    target: NaiveDate,
    policy: &RetryPolicy,
) -> CategoryDataset {
    let raw = match with_retry(policy, "page fetch", |_: &anyhow::Error| true, || {
        source.fetch_listings(url)
    })
    .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(url, error = %e, "page failed after all attempts, keeping partial results");
            return CategoryDataset::new();
        }
    };

    let total = raw.len();
    let mut fragment = CategoryDataset::new();
    for item in raw {
        let published =
            item.relative_time.as_deref().and_then(|text| relative_time::parse_relative(text, now));
        match published {
            Some(ts) if ts.date_naive() == target => {
                fragment.push(Listing::from_raw(item, Some(ts)));
            }
            Some(_) => {}
            None => debug!(url, "listing without a parseable publish time, skipped"),
        }
    }
    debug!(url, kept = fragment.total_records(), total, "page filtered");
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::scrapers::types::RawListing;

    fn raw(category: &str, relative_time: Option<&str>) -> RawListing {
        RawListing {
            category: Some(category.to_string()),
            relative_time: relative_time.map(|t| t.to_string()),
            link: "https://example.com/ad".to_string(),
            ..RawListing::default()
        }
    }

    struct FixedSource(Vec<RawListing>);

    #[async_trait]
    impl ListingSource for FixedSource {
        async fn fetch_listings(&self, _page_url: &str) -> Result<Vec<RawListing>> {
            Ok(self.0.clone())
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingSource(AtomicU32);

    #[async_trait]
    impl ListingSource for FailingSource {
        async fn fetch_listings(&self, _page_url: &str) -> Result<Vec<RawListing>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("navigation timeout")
        }

        fn source_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn keeps_only_records_published_on_the_target_day() {
        // Run at 10:00: "26 hours ago" lands on yesterday, the others today.
        let now = Local.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let target = relative_time::default_target(now);
        let source = FixedSource(vec![
            raw("X", Some("2 hours ago")),
            raw("X", Some("26 hours ago")),
            raw("X", Some("5 hours ago")),
        ]);
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));

        let fragment = fetch_page(&source, "https://example.com/x/1", now, target, &policy).await;

        assert_eq!(fragment.total_records(), 1);
        let (category, listings) = fragment.iter().next().unwrap();
        assert_eq!(category, "X");
        assert_eq!(listings[0].relative_time.as_deref(), Some("26 hours ago"));
        assert_eq!(listings[0].published_at.unwrap().date_naive(), target);
    }

    #[tokio::test]
    async fn unparseable_relative_times_are_excluded_without_error() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let target = relative_time::default_target(now);
        let source = FixedSource(vec![
            raw("X", Some("yesterday")),
            raw("X", None),
            raw("X", Some("26 hours ago")),
        ]);
        let policy = RetryPolicy::linear(1, Duration::from_millis(1));

        let fragment = fetch_page(&source, "https://example.com/x/1", now, target, &policy).await;
        assert_eq!(fragment.total_records(), 1);
    }

    #[tokio::test]
    async fn groups_records_by_their_own_category_tag() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let target = relative_time::default_target(now);
        let source = FixedSource(vec![
            raw("Toyota", Some("26 hours ago")),
            raw("", Some("26 hours ago")),
        ]);
        let policy = RetryPolicy::linear(1, Duration::from_millis(1));

        let fragment = fetch_page(&source, "https://example.com/x/1", now, target, &policy).await;
        let categories: Vec<&str> = fragment.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(categories, vec!["Toyota", crate::models::CATEGORY_UNKNOWN]);
    }

    #[tokio::test]
    async fn exhausted_retries_return_an_empty_fragment() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let target = relative_time::default_target(now);
        let source = FailingSource(AtomicU32::new(0));
        let policy = RetryPolicy::linear(3, Duration::from_millis(1));

        let fragment = fetch_page(&source, "https://example.com/x/1", now, target, &policy).await;
        assert!(fragment.is_empty());
        assert_eq!(source.0.load(Ordering::SeqCst), 3);
    }
}
