use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod args;
use args::Args;

mod config;
use config::Config;

mod core;
mod fetch;
mod staging;
mod transfer;

#[cfg(test)]
mod test_utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout is reserved for the per-job result lines.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::try_from(Args::parse())?;
    info!(
        "Loading {:?} for {:?} into bucket {}",
        config.datasets, config.years, config.bucket
    );

    core::run(config).await?;

    Ok(())
}
