//! Object storage over a Supabase-compatible REST API.
//!
//! Objects are written with `POST /storage/v1/object/{bucket}/{key}` and served
//! from `/storage/v1/object/public/{bucket}/{key}`. Uploads never overwrite
//! (`x-upsert: false`); an existing key comes back as a conflict.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use super::{BlobStore, StorageError, PHOTO_BUCKET};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StorageBucketConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Sent both as bearer token and `apikey` header.
    pub api_key: String,
    pub bucket: String,
    pub timeout: Duration,
}

impl StorageBucketConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: PHOTO_BUCKET.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Blob store backed by a storage bucket.
pub struct StorageBucket {
    client: Client,
    config: StorageBucketConfig,
}

impl StorageBucket {
    #[instrument(level = "debug", skip_all, fields(base_url = %config.base_url, bucket = %config.bucket))]
    pub fn new(config: StorageBucketConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.base_url, self.config.bucket, key
        )
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.base_url, self.config.bucket, key
        )
    }

    fn classify_status(status: StatusCode, body: String) -> StorageError {
        match status {
            StatusCode::CONFLICT => StorageError::Conflict(body),
            StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE
                if body.contains("Duplicate") =>
            {
                StorageError::Conflict(body)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StorageError::Connection(format!("storage rejected credentials ({status}): {body}"))
            }
            _ => StorageError::Upload(format!("storage returned {status}: {body}")),
        }
    }
}

#[async_trait]
impl BlobStore for StorageBucket {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn upload(
        &self,
        bytes: &[u8],
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.config.api_key)
            .header("apikey", &self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Upload request failed");
                if e.is_connect() || e.is_timeout() {
                    StorageError::Connection(e.to_string())
                } else {
                    StorageError::Upload(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Upload rejected");
            return Err(Self::classify_status(status, body));
        }

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Upload completed"
        );
        Ok(self.public_url(key))
    }
}
