//! Shared types for loading the NYC TLC trip-record dumps into an
//! S3-compatible object store. Each monthly file is a separate job, and the
//! object key of a job is fully determined by its (dataset, year, month).

use std::fmt;
use std::fmt::Formatter;

use itertools::iproduct;

pub mod minio;

/////////////////////////////////////////////////////////////////////////////
// Jobs
/////////////////////////////////////////////////////////////////////////////

/// A single unit of transfer work: one month of one dataset.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Job {
    /// Dataset name, e.g. `yellow` or `green`.
    pub dataset: String,

    /// Calendar year.
    pub year: u16,

    /// Calendar month, `1..=12`.
    pub month: u8,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{:02}", self.dataset, self.year, self.month)
    }
}

impl Job {
    pub fn new(dataset: impl Into<String>, year: u16, month: u8) -> Self {
        Self {
            dataset: dataset.into(),
            year,
            month,
        }
    }

    /// Every combination of the given axes, dataset outermost and month innermost.
    pub fn enumerate(datasets: &[String], years: &[u16], months: &[u8]) -> Vec<Job> {
        iproduct!(datasets, years, months)
            .map(|(dataset, &year, &month)| Job::new(dataset.as_str(), year, month))
            .collect()
    }

    /// Name of the decompressed file, e.g. `yellow_tripdata_2019-03.csv`.
    ///
    /// Everything else a job is addressed by (remote URL, object key, staging
    /// paths) is derived from this name, so the skip check and the upload
    /// always agree on the key.
    pub fn csv_name(&self) -> String {
        format!(
            "{}_tripdata_{}-{:02}.csv",
            self.dataset, self.year, self.month
        )
    }

    /// Name of the compressed file as published upstream.
    pub fn gz_name(&self) -> String {
        format!("{}.gz", self.csv_name())
    }

    /// Object key the decompressed file is stored under.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.dataset, self.csv_name())
    }

    /// Download URL of the compressed file below `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            self.dataset,
            self.gz_name()
        )
    }
}

/////////////////////////////////////////////////////////////////////////////
// Results
/////////////////////////////////////////////////////////////////////////////

/// Outcome of one job. Every variant carries the storage key it was about.
#[derive(Debug)]
pub enum JobResult {
    /// The object already existed, nothing was transferred.
    Skipped(String),

    /// The file was downloaded, decompressed and uploaded.
    Succeeded(String),

    /// Some step failed. The error carries the context chain.
    Failed(String, anyhow::Error),
}

impl JobResult {
    pub fn key(&self) -> &str {
        match self {
            JobResult::Skipped(key) | JobResult::Succeeded(key) | JobResult::Failed(key, _) => key,
        }
    }

    /// Status line printed for this result, e.g. `OK    s3://bucket/key`.
    pub fn render(&self, bucket: &str) -> String {
        match self {
            JobResult::Skipped(key) => format!("SKIP  s3://{bucket}/{key}"),
            JobResult::Succeeded(key) => format!("OK    s3://{bucket}/{key}"),
            JobResult::Failed(key, err) => format!("FAIL  s3://{bucket}/{key}: {err:#}"),
        }
    }
}

/// Tally of a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub ok: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, result: &JobResult) {
        match result {
            JobResult::Skipped(_) => self.skipped += 1,
            JobResult::Succeeded(_) => self.ok += 1,
            JobResult::Failed(..) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.skipped + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done. ok={} skipped={} failed={}",
            self.ok, self.skipped, self.failed
        )
    }
}
