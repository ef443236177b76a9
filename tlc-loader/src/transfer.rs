use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Error};
use tracing::{debug, info, warn};

use common::minio::{Bucket, ObjectStore};
use common::{Job, JobResult};

use crate::fetch::{gunzip, Fetcher};
use crate::staging::StagedFiles;

/// Moves one monthly file from the upstream host into the bucket.
///
/// Shared read-only between all tasks of a run.
pub struct Transfer {
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn Fetcher>,
    bucket: Bucket,
    staging_dir: PathBuf,
    base_url: String,
}

impl Transfer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn Fetcher>,
        bucket: Bucket,
        staging_dir: PathBuf,
        base_url: String,
    ) -> Self {
        Self {
            store,
            fetcher,
            bucket,
            staging_dir,
            base_url,
        }
    }

    /// Run a job to completion. Errors never escape, they become [`JobResult::Failed`].
    pub async fn run(&self, job: &Job) -> JobResult {
        let key = job.storage_key();

        match self.store.exists(&self.bucket, &key).await {
            Ok(true) => {
                debug!("{key} already in {}, skipping", self.bucket.name);
                return JobResult::Skipped(key);
            }
            Ok(false) => {}
            Err(e) => {
                let e = e.context("existence check failed");
                warn!("{job} failed: {e:#}");
                return JobResult::Failed(key, e);
            }
        }

        match self.transfer(job, &key).await {
            Ok(()) => JobResult::Succeeded(key),
            Err(e) => {
                warn!("{job} failed: {e:#}");
                JobResult::Failed(key, e)
            }
        }
    }

    async fn transfer(&self, job: &Job, key: &str) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("could not create {}", self.staging_dir.display()))?;

        let staged = StagedFiles::new(&self.staging_dir, job);
        let url = job.url(&self.base_url);

        self.fetcher
            .fetch(&url, &staged.gz)
            .await
            .with_context(|| format!("download of {url} failed"))?;

        let size = gunzip(&staged.gz, &staged.csv)
            .await
            .context("decompression failed")?;

        self.store
            .upload(&self.bucket, key, &staged.csv)
            .await
            .context("upload failed")?;

        info!("uploaded {key} ({size} bytes)");
        Ok(())
    }
}
