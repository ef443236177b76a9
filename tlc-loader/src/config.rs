use std::path::PathBuf;

use itertools::Itertools;
use thiserror::Error;
use url::Url;

use common::Job;

use crate::args::Args;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    EmptyPool,

    #[error("month {0} is outside 1..=12")]
    BadMonth(u8),

    #[error("no {0} given")]
    NothingToDo(&'static str),

    #[error("invalid {0} url `{1}`")]
    BadUrl(&'static str, String),
}

/// Everything a run needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: Option<String>,
    pub bucket: String,
    pub credentials: PathBuf,
    pub staging_dir: PathBuf,
    pub datasets: Vec<String>,
    pub years: Vec<u16>,
    pub months: Vec<u8>,
    pub pool_size: usize,
    pub base_url: String,
    pub endpoint: String,
    pub region: String,
    pub location: String,
}

impl Config {
    /// The full job set: every dataset for every year and month.
    pub fn jobs(&self) -> Vec<Job> {
        Job::enumerate(&self.datasets, &self.years, &self.months)
    }
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if let Some(&month) = args.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(ConfigError::BadMonth(month));
        }
        let datasets: Vec<String> = args
            .datasets
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unique()
            .collect();
        // Repeated values would give two jobs sharing one key and one set of staging files.
        let years: Vec<u16> = args.years.into_iter().unique().collect();
        let months: Vec<u8> = args.months.into_iter().unique().collect();
        if datasets.is_empty() {
            return Err(ConfigError::NothingToDo("datasets"));
        }
        if years.is_empty() {
            return Err(ConfigError::NothingToDo("years"));
        }
        if months.is_empty() {
            return Err(ConfigError::NothingToDo("months"));
        }
        Url::parse(&args.base_url).map_err(|_| ConfigError::BadUrl("base", args.base_url.clone()))?;
        Url::parse(&args.endpoint)
            .map_err(|_| ConfigError::BadUrl("endpoint", args.endpoint.clone()))?;

        let project_id = Some(args.project_id).filter(|p| !p.is_empty());

        Ok(Self {
            project_id,
            bucket: args.bucket,
            credentials: args.credentials,
            staging_dir: args.staging_dir,
            datasets,
            years,
            months,
            pool_size: args.pool_size,
            base_url: args.base_url,
            endpoint: args.endpoint,
            region: args.region,
            location: args.location,
        })
    }
}
