use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Error};
use tokio::task::JoinSet;
use tracing::{error, info};

use common::minio::{Client, ClientConfig, Credentials, ObjectStore};
use common::{Job, JobResult, Summary};

use crate::config::Config;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::transfer::Transfer;

/// Runs `jobs` with at most `pool_size` of them in flight at once.
///
/// `on_result` sees every result in completion order. A job that panics is
/// reported as failed; the others keep going. Returns once every job is done.
pub async fn run_pool<F, Fut>(
    jobs: Vec<Job>,
    pool_size: usize,
    job_fn: F,
    mut on_result: impl FnMut(&JobResult),
) -> Summary
where
    F: Fn(Job) -> Fut,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    let pool_size = pool_size.max(1);
    let mut pending = jobs.into_iter();
    let mut in_flight = HashMap::new();
    let mut join_set = JoinSet::new();
    let mut summary = Summary::default();

    loop {
        while join_set.len() < pool_size {
            let Some(job) = pending.next() else {
                break;
            };
            let key = job.storage_key();
            let handle = join_set.spawn(job_fn(job));
            in_flight.insert(handle.id(), key);
        }

        let Some(joined) = join_set.join_next_with_id().await else {
            break;
        };

        let result = match joined {
            Ok((id, result)) => {
                in_flight.remove(&id);
                result
            }
            Err(e) => {
                let key = in_flight.remove(&e.id()).unwrap_or_default();
                JobResult::Failed(key, anyhow!("transfer task died: {e}"))
            }
        };

        summary.record(&result);
        on_result(&result);
    }

    summary
}

/// Runs every configured job through `transfer`.
pub async fn run_jobs(
    transfer: Arc<Transfer>,
    jobs: Vec<Job>,
    pool_size: usize,
    on_result: impl FnMut(&JobResult),
) -> Summary {
    run_pool(
        jobs,
        pool_size,
        |job| {
            let transfer = transfer.clone();
            async move { transfer.run(&job).await }
        },
        on_result,
    )
    .await
}

/// Makes sure the bucket is there, then transfers the full job set.
///
/// `out` receives the lines meant for the user: the job count, one line per
/// result, and the summary.
pub async fn execute(
    config: &Config,
    store: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn Fetcher>,
    mut out: impl FnMut(String),
) -> Result<Summary, Error> {
    let bucket = store.ensure_bucket(&config.bucket).await?;
    info!("Using bucket {}", bucket.name);

    let transfer = Arc::new(Transfer::new(
        store,
        fetcher,
        bucket.clone(),
        config.staging_dir.clone(),
        config.base_url.clone(),
    ));

    let jobs = config.jobs();
    out(format!("Jobs: {}", jobs.len()));

    let summary = run_jobs(transfer, jobs, config.pool_size, |result| {
        out(result.render(&bucket.name))
    })
    .await;

    out(summary.to_string());
    Ok(summary)
}

/// Builds the S3 client from the credentials file.
pub fn connect(config: &Config) -> Result<Client, Error> {
    let credentials = Credentials::load(&config.credentials).map_err(|e| {
        error!("{e}");
        e
    })?;

    let client_config = ClientConfig {
        access_key_id: credentials.access_key_id,
        secret_access_key: credentials.secret_access_key,
        region: config.region.clone(),
        url: config.endpoint.clone(),
        location: config.location.clone(),
        project_id: config.project_id.clone(),
    };
    info!("Connecting to {}", config.endpoint);

    Ok(Client::from_conf(client_config))
}

/// Full run against the real object store and file host, printing to stdout.
pub async fn run(config: Config) -> Result<Summary, Error> {
    let client = connect(&config)?;
    execute(
        &config,
        Arc::new(client),
        Arc::new(HttpFetcher::new()),
        |line| println!("{line}"),
    )
    .await
}
