mod config;
mod drive;
mod export;
mod models;
mod pipeline;
mod relative_time;
mod retry;
mod scrapers;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{FetchBackend, Settings};
use drive::{DriveClient, UploadManager};
use export::{ExportWriter, XlsxExporter};
use pipeline::Pipeline;
use scrapers::{BrowserSource, ListingSource, Q84SaleSource};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configuration problems abort here, before any scraping starts.
    let settings = Settings::load()?;
    let token = std::env::var("DRIVE_ACCESS_TOKEN")
        .context("DRIVE_ACCESS_TOKEN environment variable not found")?;

    let source: Arc<dyn ListingSource> = match settings.backend {
        FetchBackend::Http => {
            Arc::new(Q84SaleSource::new(settings.fetch_timeout(), &settings.user_agent)?)
        }
        FetchBackend::Browser => Arc::new(BrowserSource::new()?),
    };

    let target = settings
        .target_date
        .unwrap_or_else(|| relative_time::default_target(Local::now()));
    info!(
        source = source.source_name(),
        categories = settings.categories.len(),
        %target,
        "souq-scout starting"
    );

    let store = Arc::new(DriveClient::new(token)?);
    let uploader = Arc::new(UploadManager::new(
        store,
        settings.destinations.clone(),
        target.format("%Y-%m-%d").to_string(),
        settings.upload_policy(),
    ));
    let exporter: Arc<dyn ExportWriter> = Arc::new(XlsxExporter);

    let pipeline = Pipeline::new(settings, target, source, exporter, uploader);
    let summary = pipeline.run().await?;

    info!(
        jobs = summary.jobs,
        records = summary.records,
        exported = summary.exported,
        uploaded = summary.uploaded,
        upload_failures = summary.upload_failures,
        "run complete"
    );

    Ok(())
}
