// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of Arbor.
//
// Arbor is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Arbor is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Arbor. If not, see <https://www.gnu.org/licenses/>.

//! Blob store adapter.
//!
//! ## Purpose
//! Everything the gateway needs from object storage: logical bucket
//! lifecycle, single-object put, ranged get, delete, server-side copy and
//! multipart sessions that assemble one object from numbered parts.
//!
//! ## Design
//! Logical buckets are key prefixes inside one physical container, so
//! creating one never needs provider-level permissions. The backend is any
//! `object_store` implementation that also supports `MultipartStore`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    aws::AmazonS3Builder,
    azure::MicrosoftAzureBuilder,
    gcp::GoogleCloudStorageBuilder,
    memory::InMemory,
    multipart::{MultipartStore, PartId},
    GetOptions, GetRange, ObjectStore, PutPayload,
};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::helpers::{bucket_path, object_path, validate_name, BUCKET_MARKER};
use crate::{BlobConfig, BlobError, BlobResult};

/// Receipt for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReceipt {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

/// Receipt for one uploaded part of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    pub part_number: u32,
    pub etag: String,
    pub size: i64,
}

/// Byte stream returned by object reads.
pub type ByteStream = BoxStream<'static, BlobResult<Bytes>>;

/// Blob store operations used by the gateway.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create a logical bucket. Succeeds if it already exists.
    async fn create_bucket(&self, bucket: &str) -> BlobResult<()>;

    /// Delete every object in a logical bucket, then the bucket itself.
    /// Returns the number of objects removed; stopping partway yields
    /// `PartialFailure`.
    async fn delete_bucket(&self, bucket: &str) -> BlobResult<usize>;

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> BlobResult<ObjectReceipt>;

    /// Read an object, or only `range` of it.
    async fn get_object(&self, bucket: &str, key: &str, range: Option<Range<u64>>) -> BlobResult<ByteStream>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()>;

    /// Server-side copy, possibly across logical buckets.
    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> BlobResult<()>;

    /// Start a multipart session for `bucket/key`; returns the session id.
    async fn open_multipart(&self, bucket: &str, key: &str) -> BlobResult<String>;

    /// Upload part `part_number` (1-based) of a session.
    async fn put_multipart_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<PartReceipt>;

    /// Assemble the parts, in part-number order, into the final object.
    async fn close_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> BlobResult<ObjectReceipt>;

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> BlobResult<()>;

    /// Read a whole object (or range) into memory.
    async fn get_object_bytes(&self, bucket: &str, key: &str, range: Option<Range<u64>>) -> BlobResult<Bytes> {
        let chunks: Vec<Bytes> = self.get_object(bucket, key, range).await?.try_collect().await?;
        let mut buf = Vec::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            buf.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(buf))
    }
}

/// Object-store backends usable by [`ObjectBlobStore`].
pub trait ObjectBackend: ObjectStore + MultipartStore {}

impl<T: ObjectStore + MultipartStore> ObjectBackend for T {}

/// [`BlobStore`] over an `object_store` backend.
#[derive(Clone)]
pub struct ObjectBlobStore {
    prefix: String,
    backend: Arc<dyn ObjectBackend>,
}

impl ObjectBlobStore {
    /// Create a store with a custom backend (for testing)
    pub fn with_backend(prefix: impl Into<String>, backend: Arc<dyn ObjectBackend>) -> Self {
        Self {
            prefix: prefix.into(),
            backend,
        }
    }

    /// In-memory store.
    pub fn in_memory() -> Self {
        Self::with_backend("/arbor", Arc::new(InMemory::new()))
    }

    /// Create a store from configuration
    pub fn from_config(config: &BlobConfig) -> BlobResult<Self> {
        config.validate().map_err(BlobError::ConfigError)?;

        let prefix = if config.prefix.is_empty() {
            "/arbor".to_string()
        } else {
            config.prefix.clone()
        };

        let backend: Arc<dyn ObjectBackend> = match config.backend.as_str() {
            "s3" => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.container);

                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }

                if let Some(access_key_id) = &config.access_key_id {
                    builder = builder.with_access_key_id(access_key_id);
                }

                if let Some(secret_access_key) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret_access_key);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobError::ConfigError(format!("Failed to build S3 store: {}", e)))?,
                )
            }
            "minio" => {
                let endpoint = config
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| BlobError::ConfigError("endpoint required for MinIO".to_string()))?;

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&config.container)
                    .with_endpoint(endpoint)
                    .with_region(config.region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(!config.use_ssl);

                if let Some(access_key_id) = &config.access_key_id {
                    builder = builder.with_access_key_id(access_key_id);
                }

                if let Some(secret_access_key) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret_access_key);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobError::ConfigError(format!("Failed to build MinIO store: {}", e)))?,
                )
            }
            "gcp" => {
                let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&config.container);

                if let Some(path) = &config.gcp_service_account_path {
                    builder = builder.with_service_account_path(path);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobError::ConfigError(format!("Failed to build GCP store: {}", e)))?,
                )
            }
            "azure" => {
                let account = config
                    .azure_account_name
                    .as_deref()
                    .ok_or_else(|| BlobError::ConfigError("azure_account_name required".to_string()))?;

                let mut builder = MicrosoftAzureBuilder::new()
                    .with_account(account)
                    .with_container_name(&config.container);

                if let Some(key) = &config.azure_account_key {
                    builder = builder.with_access_key(key);
                }

                Arc::new(
                    builder
                        .build()
                        .map_err(|e| BlobError::ConfigError(format!("Failed to build Azure store: {}", e)))?,
                )
            }
            "memory" => Arc::new(InMemory::new()),
            _ => {
                return Err(BlobError::ConfigError(format!(
                    "Unsupported backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { prefix, backend })
    }

    fn path(&self, bucket: &str, key: &str) -> BlobResult<object_store::path::Path> {
        validate_name("bucket", bucket).map_err(BlobError::InvalidInput)?;
        validate_name("key", key).map_err(BlobError::InvalidInput)?;
        Ok(object_path(&self.prefix, bucket, key))
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn create_bucket(&self, bucket: &str) -> BlobResult<()> {
        let marker = self.path(bucket, BUCKET_MARKER)?;
        match self.backend.head(&marker).await {
            Ok(_) => {
                debug!(bucket = %bucket, "[BLOB] bucket already exists");
                Ok(())
            }
            Err(object_store::Error::NotFound { .. }) => {
                self.backend.put(&marker, PutPayload::new()).await?;
                debug!(bucket = %bucket, "[BLOB] bucket created");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> BlobResult<usize> {
        validate_name("bucket", bucket).map_err(BlobError::InvalidInput)?;
        let prefix = bucket_path(&self.prefix, bucket);
        let objects: Vec<_> = self.backend.list(Some(&prefix)).try_collect().await?;

        let mut deleted = 0;
        let mut failures = Vec::new();
        for object in objects {
            match self.backend.delete(&object.location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => deleted += 1,
                Err(e) => {
                    warn!(bucket = %bucket, location = %object.location, error = %e, "[BLOB] delete failed");
                    failures.push(format!("{}: {}", object.location, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(BlobError::PartialFailure {
                deleted,
                failed: failures.len(),
                message: failures.join("; "),
            });
        }
        debug!(bucket = %bucket, deleted, "[BLOB] bucket deleted");
        Ok(deleted)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> BlobResult<ObjectReceipt> {
        let path = self.path(bucket, key)?;
        let result = self.backend.put(&path, PutPayload::from(data)).await?;
        Ok(ObjectReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            e_tag: result.e_tag,
            version: result.version,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str, range: Option<Range<u64>>) -> BlobResult<ByteStream> {
        let path = self.path(bucket, key)?;
        let options = GetOptions {
            range: range.map(|r| GetRange::Bounded(r.start as usize..r.end as usize)),
            ..Default::default()
        };
        let result = self.backend.get_opts(&path, options).await?;
        Ok(result.into_stream().map_err(BlobError::from).boxed())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        let path = self.path(bucket, key)?;
        match self.backend.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> BlobResult<()> {
        let from = self.path(src_bucket, src_key)?;
        let to = self.path(dst_bucket, dst_key)?;
        self.backend.copy(&from, &to).await?;
        Ok(())
    }

    async fn open_multipart(&self, bucket: &str, key: &str) -> BlobResult<String> {
        let path = self.path(bucket, key)?;
        Ok(self.backend.create_multipart(&path).await?)
    }

    async fn put_multipart_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<PartReceipt> {
        if part_number == 0 {
            return Err(BlobError::InvalidInput("part numbers start at 1".to_string()));
        }
        let path = self.path(bucket, key)?;
        let size = data.len() as i64;
        let upload_id = upload_id.to_string();
        let part = self
            .backend
            .put_part(&path, &upload_id, (part_number - 1) as usize, PutPayload::from(data))
            .await?;
        Ok(PartReceipt {
            part_number,
            etag: part.content_id,
            size,
        })
    }

    async fn close_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> BlobResult<ObjectReceipt> {
        let path = self.path(bucket, key)?;
        let mut ordered: Vec<&PartReceipt> = parts.iter().collect();
        ordered.sort_by_key(|p| p.part_number);
        let part_ids = ordered
            .into_iter()
            .map(|p| PartId {
                content_id: p.etag.clone(),
            })
            .collect();
        let upload_id = upload_id.to_string();
        let result = self.backend.complete_multipart(&path, &upload_id, part_ids).await?;
        Ok(ObjectReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            e_tag: result.e_tag,
            version: result.version,
        })
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> BlobResult<()> {
        let path = self.path(bucket, key)?;
        let upload_id = upload_id.to_string();
        self.backend.abort_multipart(&path, &upload_id).await?;
        Ok(())
    }
}
