//! Helper functions and structures for dealing with the object store.
//!
//! Anything S3-compatible works: MinIO, AWS S3, or Google Cloud Storage
//! through its XML API with an HMAC key pair.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_smithy_types::byte_stream::Length;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Size of a single multipart upload part. Files below this go up in one request.
pub const CHUNK_SIZE: u64 = 1024 * 1024 * 5;

/// Region S3 treats as the default, which must not be sent as a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Sizes of the parts a file of `file_size` bytes is uploaded in, in order.
/// Every part is `CHUNK_SIZE` except a shorter last one.
pub fn part_sizes(file_size: u64) -> Vec<u64> {
    if file_size == 0 {
        return Vec::new();
    }

    let mut chunk_count = (file_size / CHUNK_SIZE) + 1;
    let mut size_of_last_chunk = file_size % CHUNK_SIZE;
    if size_of_last_chunk == 0 {
        size_of_last_chunk = CHUNK_SIZE;
        chunk_count -= 1;
    }

    let mut parts = vec![CHUNK_SIZE; chunk_count as usize];
    if let Some(last) = parts.last_mut() {
        *last = size_of_last_chunk;
    }
    parts
}

/////////////////////////////////////////////////////////////////////////////
// Credentials
/////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("missing credentials file: {}", .0.display())]
    Missing(PathBuf, #[source] std::io::Error),

    #[error("malformed credentials file: {}", .0.display())]
    Malformed(PathBuf, #[source] serde_json::Error),
}

/// HMAC key pair, read from a JSON file of the form
/// `{"access_key_id": "...", "secret_access_key": "..."}`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CredentialsError::Missing(path.to_path_buf(), e))?;
        serde_json::from_str(&raw).map_err(|e| CredentialsError::Malformed(path.to_path_buf(), e))
    }
}

/////////////////////////////////////////////////////////////////////////////
// Gateway
/////////////////////////////////////////////////////////////////////////////

/// Read-only handle to a bucket that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum BucketError {
    /// The name belongs to someone else, or we are not allowed to touch it.
    #[error("bucket name taken or forbidden: {0}")]
    Unavailable(String),

    #[error("failed to look up or create bucket {0}")]
    Other(String, #[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The three object-store capabilities the loader relies on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return the bucket, creating it if it does not exist yet.
    async fn ensure_bucket(&self, name: &str) -> Result<Bucket, BucketError>;

    /// Whether an object is stored under `key`.
    async fn exists(&self, bucket: &Bucket, key: &str) -> Result<bool, Error>;

    /// Create or replace the object at `key` with the contents of `path`.
    async fn upload(&self, bucket: &Bucket, key: &str, path: &Path) -> Result<(), Error>;
}

/////////////////////////////////////////////////////////////////////////////
// S3 client
/////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// id
    pub access_key_id: String,

    /// password
    pub secret_access_key: String,

    /// object store region
    pub region: String,

    /// object store url
    pub url: String,

    /// location new buckets are created in
    pub location: String,

    /// sent as `x-goog-project-id` when creating buckets on GCS
    pub project_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub client: s3::Client,
    location: String,
    project_id: Option<String>,
}

impl Client {
    pub fn from_conf(cfg: ClientConfig) -> Self {
        let cred = s3::config::Credentials::new(
            cfg.access_key_id,
            cfg.secret_access_key,
            None,
            None,
            "credentials-file",
        );
        let region = s3::config::Region::new(cfg.region);
        let conf_builder = s3::config::Builder::new()
            .credentials_provider(cred)
            .region(region)
            .endpoint_url(cfg.url)
            .force_path_style(true)
            .behavior_version_latest();
        let conf = conf_builder.build();

        Self {
            client: s3::Client::from_conf(conf),
            location: cfg.location,
            project_id: cfg.project_id,
        }
    }

    async fn create_bucket(&self, name: &str) -> Result<Bucket, BucketError> {
        let mut request = self.client.create_bucket().bucket(name);
        if !self.location.is_empty() && self.location != DEFAULT_REGION {
            let conf = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.location.as_str()))
                .build();
            request = request.create_bucket_configuration(conf);
        }

        let project_id = self.project_id.clone();
        let created = request
            .customize()
            .mutate_request(move |req| {
                if let Some(project_id) = &project_id {
                    req.headers_mut()
                        .insert("x-goog-project-id", project_id.clone());
                }
            })
            .send()
            .await;

        match created {
            Ok(_) => {
                info!("Created bucket {name} in {}", self.location);
                Ok(Bucket { name: name.to_string() })
            }
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_bucket_already_owned_by_you() => {
                Ok(Bucket { name: name.to_string() })
            }
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_bucket_already_exists() || ctx.raw().status().as_u16() == 403 =>
            {
                Err(BucketError::Unavailable(name.to_string()))
            }
            Err(err) => Err(BucketError::Other(name.to_string(), err.into())),
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), Error> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        parts: &[u64],
    ) -> Result<(), Error> {
        let multipart_upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        let upload_id = multipart_upload
            .upload_id
            .ok_or(anyhow!("no upload id returned for {key}"))?;

        let uploaded = self
            .upload_parts(bucket, key, path, parts, &upload_id)
            .await;

        if uploaded.is_err() {
            let aborted = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(e) = aborted {
                warn!("failed to abort multipart upload of {key}: {e}");
            }
        }

        uploaded
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        parts: &[u64],
        upload_id: &str,
    ) -> Result<(), Error> {
        let mut upload_parts = Vec::new();

        for (chunk_index, this_chunk) in parts.iter().copied().enumerate() {
            let stream = ByteStream::read_from()
                .path(path)
                .offset(chunk_index as u64 * CHUNK_SIZE)
                .length(Length::Exact(this_chunk))
                .build()
                .await?;

            // Chunk index starts at 0, part numbers start at 1.
            let part_number = (chunk_index as i32) + 1;
            let upload_part_res = self
                .client
                .upload_part()
                .key(key)
                .bucket(bucket)
                .upload_id(upload_id)
                .body(stream)
                .part_number(part_number)
                .send()
                .await?;

            upload_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag.unwrap_or_default())
                    .part_number(part_number)
                    .build(),
            );
        }

        let completed_multipart_upload: CompletedMultipartUpload =
            CompletedMultipartUpload::builder()
                .set_parts(Some(upload_parts))
                .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .multipart_upload(completed_multipart_upload)
            .upload_id(upload_id)
            .send()
            .await?;

        debug!("uploaded {key} in {} parts", parts.len());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Client {
    async fn ensure_bucket(&self, name: &str) -> Result<Bucket, BucketError> {
        let lookup = self.client.head_bucket().bucket(name).send().await;

        match lookup {
            Ok(_) => {
                debug!("bucket {name} already exists");
                Ok(Bucket { name: name.to_string() })
            }
            Err(SdkError::ServiceError(ctx)) if ctx.err().is_not_found() => {
                self.create_bucket(name).await
            }
            Err(SdkError::ServiceError(ctx)) if ctx.raw().status().as_u16() == 403 => {
                Err(BucketError::Unavailable(name.to_string()))
            }
            Err(err) => Err(BucketError::Other(name.to_string(), err.into())),
        }
    }

    async fn exists(&self, bucket: &Bucket, key: &str) -> Result<bool, Error> {
        let object_request = self
            .client
            .head_object()
            .bucket(&bucket.name)
            .key(key)
            .send()
            .await;

        match object_request {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    return Ok(false);
                }
                Err(anyhow!(err).context(format!("could not check s3://{}/{key}", bucket.name)))
            }
        }
    }

    async fn upload(&self, bucket: &Bucket, key: &str, path: &Path) -> Result<(), Error> {
        let file_size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("could not stat {}", path.display()))?
            .len();

        let parts = part_sizes(file_size);
        if parts.len() < 2 {
            self.put_file(&bucket.name, key, path).await
        } else {
            self.multipart_upload(&bucket.name, key, path, &parts)
                .await
        }
    }
}
