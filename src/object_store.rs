//! Object retrieval from S3-compatible storage.
//!
//! The extractor only ever needs two reads per object: the store-reported
//! attributes and the full body as UTF-8 text. Both are addressed by
//! (bucket, key) and both fail with [`RetrievalError`], which aborts the
//! batch being processed.

use crate::config::S3Config;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from the object retrieval collaborator
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to read object attributes for {key}: {message}")]
    Attributes { key: String, message: String },

    #[error("Failed to read object body for {key}: {message}")]
    Body { key: String, message: String },

    #[error("Object body for {key} is not valid UTF-8: {message}")]
    Utf8 { key: String, message: String },
}

/// Store-reported attributes of one object at read time
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectAttributes {
    /// Byte length as reported by the store
    pub size: i64,
    /// Store-reported last-modification instant
    pub last_modified: DateTime<Utc>,
}

/// Read access to an object store, addressed by (bucket, key)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch size and last-modified instant for a key
    async fn fetch_attributes(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectAttributes, RetrievalError>;

    /// Fetch the full object body decoded as UTF-8 text. The whole body is
    /// collected before inspection; there is no streamed read.
    async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, RetrievalError>;
}

/// Object store backed by S3 or an S3-compatible endpoint
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3-backed object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 object store initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn fetch_attributes(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectAttributes, RetrievalError> {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| RetrievalError::Attributes {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let size = head.content_length().ok_or_else(|| RetrievalError::Attributes {
            key: key.to_string(),
            message: "response carried no content length".to_string(),
        })?;

        let last_modified = head
            .last_modified()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
            .ok_or_else(|| RetrievalError::Attributes {
                key: key.to_string(),
                message: "response carried no last-modified timestamp".to_string(),
            })?;

        debug!(size = size, "Fetched object attributes");

        Ok(ObjectAttributes {
            size,
            last_modified,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, RetrievalError> {
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| RetrievalError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| RetrievalError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        String::from_utf8(bytes.to_vec()).map_err(|e| RetrievalError::Utf8 {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}
