//! Getting a compressed file onto local disk and unpacking it.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Source of the compressed monthly files.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into a new file at `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error>;
}

/// Plain HTTP(S) GET, streamed to disk.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} returned {status}"));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("could not create {}", dest.display()))?;

        let mut written = 0u64;
        while let Some(bytes) = response.chunk().await? {
            file.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        file.flush().await?;

        debug!("fetched {url} ({written} bytes)");
        Ok(())
    }
}

/// Decompress the gzip file at `src` into `dest`, returning the decompressed size.
///
/// Runs on the blocking pool. Files made of several concatenated gzip members
/// are decoded in full.
pub async fn gunzip(src: &Path, dest: &Path) -> Result<u64, Error> {
    let src: PathBuf = src.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let input = File::open(&src).with_context(|| format!("could not open {}", src.display()))?;
        let output =
            File::create(&dest).with_context(|| format!("could not create {}", dest.display()))?;

        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        let mut writer = BufWriter::new(output);
        let size = io::copy(&mut decoder, &mut writer)
            .with_context(|| format!("corrupt gzip stream in {}", src.display()))?;
        writer.flush()?;

        Ok::<u64, Error>(size)
    })
    .await?
}
