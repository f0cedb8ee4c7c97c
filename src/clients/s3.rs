//! Convenience wrapper over the S3 API.

use crate::helpers::check_written_s3;
use crate::paging::{collect_pages, Page};
use crate::retry::{throttled_call_with, RetryConfig};
use crate::tags::{map_to_tags, tag_list_to_map, Tag};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Objects are hashed in blocks of this many bytes.
pub const HASH_BLOCK_SIZE: usize = 5 * 1024 * 1024;

/// Streaming body of an object.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// An object, optionally pinned to one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: Option<String>,
    pub is_latest: bool,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: String,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsPage {
    pub contents: Vec<ObjectSummary>,
    pub next_continuation_token: Option<String>,
}

impl Page for ListObjectsPage {
    type Item = ObjectSummary;
    type Token = String;

    fn into_parts(self) -> (Vec<ObjectSummary>, Option<String>) {
        (self.contents, self.next_continuation_token)
    }
}

/// Where a version listing resumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub key_marker: String,
    pub version_id_marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListVersionsRequest {
    pub bucket: String,
    pub prefix: String,
    pub marker: Option<VersionMarker>,
}

#[derive(Debug, Clone, Default)]
pub struct ListVersionsPage {
    pub versions: Vec<ObjectVersion>,
    pub next_marker: Option<VersionMarker>,
}

impl Page for ListVersionsPage {
    type Item = ObjectVersion;
    type Token = VersionMarker;

    fn into_parts(self) -> (Vec<ObjectVersion>, Option<VersionMarker>) {
        (self.versions, self.next_marker)
    }
}

/// The S3 operations the wrapper needs. Implemented for `aws_sdk_s3::Client`
/// with the `aws-sdk` feature.
#[async_trait]
pub trait S3Api: Send + Sync {
    async fn list_objects_v2(&self, request: ListObjectsRequest) -> Result<ListObjectsPage>;

    async fn list_object_versions(&self, request: ListVersionsRequest) -> Result<ListVersionsPage>;

    /// Block until the object exists, failing with [`Error::Waiter`] after the
    /// service waiter gives up.
    async fn wait_until_object_exists(&self, object: &ObjectRef) -> Result<()>;

    async fn get_object(&self, object: &ObjectRef) -> Result<ObjectBody>;

    /// Store `body`; returns the number of bytes written.
    async fn put_object(&self, object: &ObjectRef, body: Bytes) -> Result<u64>;

    async fn put_bucket_tagging(&self, bucket: &str, tags: Vec<Tag>) -> Result<()>;

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Vec<Tag>>;

    async fn put_object_tagging(&self, object: &ObjectRef, tags: Vec<Tag>) -> Result<()>;

    async fn get_object_tagging(&self, object: &ObjectRef) -> Result<Vec<Tag>>;

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()>;
}

/// A simple wrapper for managing interaction with the S3 API.
///
/// Every call is retried while S3 throttles it.
pub struct S3<C> {
    client: C,
    retry: RetryConfig,
}

impl<C: S3Api> S3<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry: RetryConfig::from_env(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// List every object under `prefix`, following continuation tokens.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        collect_pages(
            |token: Option<String>| {
                self.client.list_objects_v2(ListObjectsRequest {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    continuation_token: token,
                })
            },
            &self.retry,
        )
        .await
    }

    /// List every version of every object under `prefix`.
    pub async fn list_versions(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectVersion>> {
        collect_pages(
            |marker: Option<VersionMarker>| {
                self.client.list_object_versions(ListVersionsRequest {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    marker,
                })
            },
            &self.retry,
        )
        .await
    }

    async fn open(&self, object: &ObjectRef, wait: bool) -> Result<ObjectBody> {
        if wait {
            tracing::info!(
                bucket = %object.bucket,
                key = %object.key,
                version_id = ?object.version_id,
                "Waiting for object to exist"
            );
            self.client.wait_until_object_exists(object).await?;
        }
        throttled_call_with(&self.retry, || self.client.get_object(object)).await
    }

    /// Read an object and decode it as UTF-8.
    ///
    /// With `wait`, first block until the object exists.
    pub async fn read_file(&self, object: &ObjectRef, wait: bool) -> Result<String> {
        let mut body = self.open(object, wait).await?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        String::from_utf8(buf).map_err(|e| {
            Error::validation_with_context(
                "Object is not valid UTF-8",
                ErrorContext::new()
                    .with_field_path(format!("s3://{}/{}", object.bucket, object.key))
                    .with_details(e.to_string())
                    .with_source("s3"),
            )
        })
    }

    /// Stream an object into `writer`. Returns the number of bytes copied.
    pub async fn download_file<W>(&self, object: &ObjectRef, writer: &mut W, wait: bool) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut body = self.open(object, wait).await?;
        let copied = tokio::io::copy(&mut body, writer).await?;
        writer.flush().await?;
        Ok(copied)
    }

    /// Write `body` to an object and check that all of it arrived.
    pub async fn write_file(&self, object: &ObjectRef, body: impl Into<Bytes>) -> Result<()> {
        let body: Bytes = body.into();
        let expected = body.len() as u64;
        let written =
            throttled_call_with(&self.retry, || self.client.put_object(object, body.clone())).await?;
        check_written_s3(&object.key, expected, written)
    }

    /// Tag a bucket. With `merge`, the new tags are layered over the existing
    /// ones instead of replacing them.
    pub async fn put_bucket_tags(
        &self,
        bucket: &str,
        tags: &BTreeMap<String, String>,
        merge: bool,
    ) -> Result<()> {
        let tags = if merge {
            let mut existing = self.get_bucket_tags(bucket).await?;
            existing.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            existing
        } else {
            tags.clone()
        };

        throttled_call_with(&self.retry, || {
            self.client.put_bucket_tagging(bucket, map_to_tags(&tags))
        })
        .await
    }

    /// Tags of a bucket; a bucket without tags (or any other service error) yields
    /// an empty map.
    pub async fn get_bucket_tags(&self, bucket: &str) -> Result<BTreeMap<String, String>> {
        match throttled_call_with(&self.retry, || self.client.get_bucket_tagging(bucket)).await {
            Ok(tags) => Ok(tag_list_to_map(&tags)),
            Err(err @ Error::Service { .. }) => {
                tracing::warn!(bucket, error = %err, "Bucket has no tags");
                Ok(BTreeMap::new())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn put_object_tags(&self, object: &ObjectRef, tags: &BTreeMap<String, String>) -> Result<()> {
        throttled_call_with(&self.retry, || {
            self.client.put_object_tagging(object, map_to_tags(tags))
        })
        .await
    }

    pub async fn get_object_tags(&self, object: &ObjectRef) -> Result<BTreeMap<String, String>> {
        let tags = throttled_call_with(&self.retry, || self.client.get_object_tagging(object)).await?;
        Ok(tag_list_to_map(&tags))
    }

    /// Hex encoded SHA-256 of an object's contents.
    pub async fn hash_file(&self, object: &ObjectRef) -> Result<String> {
        let mut body = throttled_call_with(&self.retry, || self.client.get_object(object)).await?;

        let mut hasher = Sha256::new();
        let mut block = vec![0u8; HASH_BLOCK_SIZE];
        loop {
            let read = body.read(&mut block).await?;
            if read == 0 {
                break;
            }
            hasher.update(&block[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub async fn copy_file(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        throttled_call_with(&self.retry, || self.client.copy_object(source, destination)).await
    }
}
