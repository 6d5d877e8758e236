//! Chunked orchestration of category jobs: small waves of concurrent jobs
//! under a semaphore, each wave exported and uploaded before the next starts.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::drive::UploadManager;
use crate::export::ExportWriter;
use crate::models::{CategoryDataset, ExportArtifact};
use crate::scrapers::ListingSource;

use super::category::run_category;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs: usize,
    pub records: usize,
    pub exported: usize,
    pub uploaded: usize,
    pub upload_failures: usize,
}

pub struct Pipeline {
    settings: Settings,
    target: NaiveDate,
    source: Arc<dyn ListingSource>,
    exporter: Arc<dyn ExportWriter>,
    uploader: Arc<UploadManager>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        target: NaiveDate,
        source: Arc<dyn ListingSource>,
        exporter: Arc<dyn ExportWriter>,
        uploader: Arc<UploadManager>,
    ) -> Self {
        Self { settings, target, source, exporter, uploader }
    }

    /// Run the whole pipeline: requeue leftovers, then scrape, export, and
    /// upload chunk by chunk. Always completes; partial failures end up in
    /// the summary, not in an error.
    pub async fn run(&self) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.settings.spool_dir).await.with_context(|| {
            format!("failed to create spool directory {}", self.settings.spool_dir.display())
        })?;

        let mut summary = RunSummary::default();

        // Artifacts stranded by a partial upload failure in an earlier run
        // get another pass before any new scraping starts.
        let leftovers = self.sweep_spool().await?;
        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "re-queueing artifacts from a previous run");
            self.upload_batch(leftovers, &mut summary).await;
        }

        let fetch_policy = self.settings.fetch_policy();
        let page_delay = self.settings.page_delay();
        let chunks: Vec<&[crate::config::CategorySpec]> =
            self.settings.categories.chunks(self.settings.chunk_size).collect();
        let total_chunks = chunks.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent));

        for (index, chunk) in chunks.into_iter().enumerate() {
            info!(chunk = index + 1, total = total_chunks, "processing chunk");

            let mut tasks: Vec<(String, JoinHandle<CategoryDataset>)> = Vec::new();
            for spec in chunk {
                let source = Arc::clone(&self.source);
                let semaphore = Arc::clone(&semaphore);
                let name = spec.name.clone();
                let spec = spec.clone();
                let target = self.target;
                let policy = fetch_policy;
                let handle = tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            error!(category = %spec.name, "scheduler semaphore closed");
                            return CategoryDataset::new();
                        }
                    };
                    // Captured once per job so pacing never moves the boundary.
                    let now = Local::now();
                    run_category(
                        source.as_ref(),
                        &spec.name,
                        &spec.pages,
                        now,
                        target,
                        page_delay,
                        &policy,
                    )
                    .await
                });
                tasks.push((name, handle));
                // Spread out connection establishment within the chunk.
                sleep(self.settings.launch_stagger()).await;
            }

            let mut artifacts = Vec::new();
            for (name, handle) in tasks {
                let dataset = match handle.await {
                    Ok(dataset) => dataset,
                    Err(e) => {
                        error!(category = %name, error = %e, "category job crashed");
                        continue;
                    }
                };
                summary.jobs += 1;
                summary.records += dataset.total_records();
                if dataset.is_empty() {
                    info!(category = %name, "no records for the target day");
                    continue;
                }
                match self.export(&name, &dataset) {
                    Ok(artifact) => {
                        info!(
                            category = %name,
                            path = %artifact.path.display(),
                            records = artifact.records,
                            "dataset exported"
                        );
                        summary.exported += 1;
                        artifacts.push(artifact);
                    }
                    Err(e) => {
                        error!(category = %name, error = %e, "export failed, artifact not queued");
                    }
                }
            }

            self.upload_batch(artifacts, &mut summary).await;

            if index + 1 < total_chunks {
                info!(
                    secs = self.settings.chunk_delay_secs,
                    "waiting before the next chunk"
                );
                sleep(self.settings.chunk_delay()).await;
            }
        }

        Ok(summary)
    }

    fn export(&self, job: &str, dataset: &CategoryDataset) -> Result<ExportArtifact> {
        let file_name = format!("{}_{}.xlsx", job, Local::now().format("%Y%m%d"));
        let path = self.settings.spool_dir.join(file_name);
        self.exporter.write(&path, dataset)?;
        Ok(ExportArtifact { path, job: job.to_string(), records: dataset.total_records() })
    }

    /// Upload a batch of artifacts; delete local files only once every
    /// destination confirmed, otherwise keep them for the next run.
    async fn upload_batch(&self, artifacts: Vec<ExportArtifact>, summary: &mut RunSummary) {
        for artifact in artifacts {
            let report = self.uploader.upload_artifact(&artifact).await;
            if report.fully_confirmed() {
                summary.uploaded += 1;
                match tokio::fs::remove_file(&artifact.path).await {
                    Ok(()) => info!(path = %artifact.path.display(), "cleaned up local artifact"),
                    Err(e) => {
                        warn!(path = %artifact.path.display(), error = %e, "could not remove uploaded artifact");
                    }
                }
            } else {
                summary.upload_failures += 1;
                warn!(
                    path = %artifact.path.display(),
                    confirmed = report.confirmed.len(),
                    failed = report.failed.len(),
                    "artifact retained for the next run"
                );
            }
        }
    }

    /// Collect export files left in the spool directory by earlier runs.
    async fn sweep_spool(&self) -> Result<Vec<ExportArtifact>> {
        let mut entries = tokio::fs::read_dir(&self.settings.spool_dir)
            .await
            .context("failed to read spool directory")?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("failed to list spool entry")? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("xlsx") {
                continue;
            }
            let job = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            found.push(ExportArtifact { path, job, records: 0 });
        }
        Ok(found)
    }
}
