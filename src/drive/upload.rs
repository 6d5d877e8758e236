//! Pushes export artifacts into every configured destination folder, each
//! under its own dated subfolder, isolating failures per destination.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::models::ExportArtifact;
use crate::retry::{with_retry, RetryPolicy};

use super::{RemoteStore, StoreError};

/// Where one artifact ended up across the redundant destinations.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub confirmed: Vec<String>,
    pub failed: Vec<String>,
}

impl UploadReport {
    /// True when every destination confirmed; only then may the local copy go.
    pub fn fully_confirmed(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct UploadManager {
    store: Arc<dyn RemoteStore>,
    destinations: Vec<String>,
    /// Name of the dated subfolder artifacts land in, e.g. "2026-03-09".
    folder_name: String,
    policy: RetryPolicy,
}

impl UploadManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        destinations: Vec<String>,
        folder_name: String,
        policy: RetryPolicy,
    ) -> Self {
        Self { store, destinations, folder_name, policy }
    }

    /// Resolve-or-create the dated folder under a destination. Querying
    /// before creating keeps repeated runs on the same day from piling up
    /// duplicate folders.
    async fn ensure_folder(&self, parent: &str) -> Result<String, StoreError> {
        if let Some(id) = self.store.find_folder(&self.folder_name, parent).await? {
            debug!(folder = %self.folder_name, parent, "dated folder already exists");
            return Ok(id);
        }
        let id = self.store.create_folder(&self.folder_name, parent).await?;
        info!(folder = %self.folder_name, parent, "created dated folder");
        Ok(id)
    }

    async fn upload_to(&self, destination: &str, path: &Path) -> Result<String, StoreError> {
        let folder_id = self.ensure_folder(destination).await?;
        with_retry(&self.policy, "artifact upload", StoreError::is_transient, || {
            self.store.upload_file(path, &folder_id)
        })
        .await
    }

    /// Upload one artifact to every destination. A destination that fails,
    /// transiently past the retry bound or fatally, never blocks the others.
    pub async fn upload_artifact(&self, artifact: &ExportArtifact) -> UploadReport {
        let mut report = UploadReport::default();
        for destination in &self.destinations {
            match self.upload_to(destination, &artifact.path).await {
                Ok(file_id) => {
                    info!(
                        job = %artifact.job,
                        path = %artifact.path.display(),
                        destination = %destination,
                        file_id = %file_id,
                        "artifact uploaded"
                    );
                    report.confirmed.push(destination.clone());
                }
                Err(e) => {
                    error!(
                        job = %artifact.job,
                        path = %artifact.path.display(),
                        destination = %destination,
                        error = %e,
                        "upload failed for destination"
                    );
                    report.failed.push(destination.clone());
                }
            }
        }
        report
    }
}
