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

//! Arbor Blob Store Adapter
//!
//! ## Purpose
//! Stores file content for Arbor in S3-compatible object storage.
//! Supports multiple backends: S3, MinIO, GCP Cloud Storage, Azure Blob
//! Storage and an in-memory store for tests.
//!
//! ## Architecture
//! - **Logical buckets**: key prefixes inside one physical container
//! - **Objects**: one per file part, or one per file for multipart sessions
//! - **Path Structure**: {prefix}/{bucket}/{key}
//!
//! ## Usage
//! ```rust,no_run
//! use arbor_blob::{BlobConfig, BlobStore, ObjectBlobStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ObjectBlobStore::from_config(&BlobConfig::from_env())?;
//! store.create_bucket("group-1").await?;
//! store.put_object("group-1", "part-1", bytes::Bytes::from_static(b"hello")).await?;
//! let data = store.get_object_bytes("group-1", "part-1", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod helpers;
pub mod store;

pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use store::{BlobStore, ByteStream, ObjectBackend, ObjectBlobStore, ObjectReceipt, PartReceipt};
