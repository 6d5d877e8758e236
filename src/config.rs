//! Run settings: the category/page map, pacing, retry bounds, and upload
//! destinations. Loaded from a JSON file before any work starts; everything
//! has a default except the categories and destinations themselves.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::retry::RetryPolicy;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One paginated URL template; `{}` is replaced with the page number.
#[derive(Debug, Clone, Deserialize)]
pub struct PageSpec {
    pub url_template: String,
    pub pages: u32,
}

impl PageSpec {
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{}", &page.to_string())
    }
}

/// One category job: a brand name and the URL templates that cover it.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub pages: Vec<PageSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    Http,
    Browser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub categories: Vec<CategorySpec>,
    /// Drive folder ids every artifact is uploaded to.
    pub destinations: Vec<String>,
    pub chunk_size: usize,
    /// Semaphore capacity: category jobs in flight at once.
    pub max_concurrent: usize,
    pub page_delay_secs: u64,
    pub chunk_delay_secs: u64,
    /// Delay between job launches within a chunk.
    pub launch_stagger_secs: u64,
    pub fetch_attempts: u32,
    pub fetch_backoff_secs: u64,
    pub fetch_timeout_secs: u64,
    pub upload_attempts: u32,
    pub upload_backoff_secs: u64,
    pub upload_backoff_cap_secs: u64,
    /// Directory holding export artifacts until their uploads are confirmed.
    pub spool_dir: PathBuf,
    /// Override for backfill and tests; defaults to yesterday at run start.
    pub target_date: Option<NaiveDate>,
    pub backend: FetchBackend,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            destinations: Vec::new(),
            chunk_size: 3,
            max_concurrent: 2,
            page_delay_secs: 3,
            chunk_delay_secs: 30,
            launch_stagger_secs: 2,
            fetch_attempts: 3,
            fetch_backoff_secs: 5,
            fetch_timeout_secs: 60,
            upload_attempts: 5,
            upload_backoff_secs: 1,
            upload_backoff_cap_secs: 60,
            spool_dir: PathBuf::from("spool"),
            target_date: None,
            backend: FetchBackend::Http,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `SOUQ_SCOUT_CONFIG`, falling back to `config.json`.
    pub fn load() -> Result<Self> {
        let path = env::var("SOUQ_SCOUT_CONFIG").unwrap_or_else(|_| "config.json".to_string());
        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            bail!("no categories configured");
        }
        if self.destinations.is_empty() {
            bail!("no destination folders configured");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        if self.fetch_attempts == 0 || self.upload_attempts == 0 {
            bail!("retry attempt counts must be at least 1");
        }
        for category in &self.categories {
            for page_spec in &category.pages {
                if !page_spec.url_template.contains("{}") {
                    bail!("url template for '{}' is missing the {{}} page placeholder", category.name);
                }
            }
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.fetch_attempts, Duration::from_secs(self.fetch_backoff_secs))
    }

    pub fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.upload_attempts,
            Duration::from_secs(self.upload_backoff_secs),
            Duration::from_secs(self.upload_backoff_cap_secs),
        )
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_secs(self.chunk_delay_secs)
    }

    pub fn launch_stagger(&self) -> Duration {
        Duration::from_secs(self.launch_stagger_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "categories": [
                {"name": "Toyota", "pages": [{"url_template": "https://example.com/toyota/{}", "pages": 3}]}
            ],
            "destinations": ["folder-a", "folder-b"]
        }"#
    }

    #[test]
    fn defaults_match_the_documented_tuning() {
        let settings = Settings::default();
        assert_eq!(settings.chunk_size, 3);
        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.page_delay_secs, 3);
        assert_eq!(settings.chunk_delay_secs, 30);
        assert_eq!(settings.fetch_attempts, 3);
        assert_eq!(settings.upload_attempts, 5);
        assert_eq!(settings.backend, FetchBackend::Http);
    }

    #[test]
    fn minimal_config_parses_with_defaults_applied() {
        let settings: Settings = serde_json::from_str(minimal_json()).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.categories.len(), 1);
        assert_eq!(settings.categories[0].pages[0].page_url(2), "https://example.com/toyota/2");
        assert_eq!(settings.chunk_size, 3);
    }

    #[test]
    fn validation_rejects_empty_categories_and_destinations() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let mut settings: Settings = serde_json::from_str(minimal_json()).unwrap();
        settings.destinations.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validation_rejects_templates_without_page_placeholder() {
        let mut settings: Settings = serde_json::from_str(minimal_json()).unwrap();
        settings.categories[0].pages[0].url_template = "https://example.com/toyota".to_string();
        let error = settings.validate().unwrap_err().to_string();
        assert!(error.contains("placeholder"), "unexpected error: {error}");
    }

    #[test]
    fn target_date_override_parses() {
        let mut json: serde_json::Value = serde_json::from_str(minimal_json()).unwrap();
        json["target_date"] = serde_json::json!("2026-03-09");
        let settings: Settings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.target_date, NaiveDate::from_ymd_opt(2026, 3, 9));
    }
}
