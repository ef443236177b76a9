//! In-memory stand-ins for the object store and the file host.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::minio::{Bucket, BucketError, ObjectStore};

use crate::fetch::Fetcher;

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Answers a single HTTP request on a local port with `status` and `body`.
/// Returns the base url to reach it.
pub async fn serve_once(status: &str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let status = status.to_string();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}")
}

/// Object store backed by a map. Uploads read the local file, like the real thing.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: AtomicUsize,
    fail_uploads: bool,
    fail_lookups: bool,
    bucket_unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn failing_lookups() -> Self {
        Self {
            fail_lookups: true,
            ..Self::default()
        }
    }

    pub fn unavailable_bucket() -> Self {
        Self {
            bucket_unavailable: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_bucket(&self, name: &str) -> Result<Bucket, BucketError> {
        if self.bucket_unavailable {
            return Err(BucketError::Unavailable(name.to_string()));
        }
        Ok(Bucket {
            name: name.to_string(),
        })
    }

    async fn exists(&self, _bucket: &Bucket, key: &str) -> Result<bool, Error> {
        if self.fail_lookups {
            return Err(anyhow!("503 slow down"));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn upload(&self, _bucket: &Bucket, key: &str, path: &Path) -> Result<(), Error> {
        if self.fail_uploads {
            return Err(anyhow!("connection reset"));
        }
        let data = tokio::fs::read(path).await?;
        self.insert(key, &data);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Serves the same gzipped body for every url and remembers what was asked for.
pub struct GzipFetcher {
    body: Vec<u8>,
    urls: Mutex<Vec<String>>,
}

impl GzipFetcher {
    pub fn new(plain: &[u8]) -> Self {
        Self {
            body: gzip(plain),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for GzipFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error> {
        self.urls.lock().unwrap().push(url.to_string());
        tokio::fs::write(dest, &self.body).await?;
        Ok(())
    }
}

/// Writes a gzip stream cut off halfway, so decompression starts and then fails.
pub struct CorruptFetcher;

#[async_trait]
impl Fetcher for CorruptFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<(), Error> {
        let body: Vec<u8> = (0..64 * 1024u32).map(|i| (i * 7919 % 251) as u8).collect();
        let body = gzip(&body);
        tokio::fs::write(dest, &body[..body.len() / 2]).await?;
        Ok(())
    }
}

/// Leaves a partial file behind and then reports a network error.
pub struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<(), Error> {
        tokio::fs::write(dest, b"\x1f\x8b").await?;
        Err(anyhow!("connection reset by peer"))
    }
}

/// For jobs that must never reach the network.
pub struct UnreachableFetcher;

#[async_trait]
impl Fetcher for UnreachableFetcher {
    async fn fetch(&self, url: &str, _dest: &Path) -> Result<(), Error> {
        panic!("unexpected download of {url}");
    }
}

/// Wraps another fetcher, holds each call open for a while and records how
/// many calls overlapped.
pub struct SlowFetcher<F> {
    inner: F,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<F> SlowFetcher<F> {
    pub fn new(inner: F, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for SlowFetcher<F> {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let fetched = self.inner.fetch(url, dest).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        fetched
    }
}
