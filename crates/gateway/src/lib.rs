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

//! # Arbor Gateway
//!
//! ## Purpose
//! Storage gateway that keeps folder/file metadata and the bytes behind it
//! consistent:
//! - [`tree`]: folder hierarchy, cumulative sizes, moves and copies
//! - [`transfer`]: multipart uploads and part downloads
//! - [`poller`] / [`datasets`]: Copernicus dataset requests ingested as files
//! - [`access`]: which group owns a request's target and how the caller may
//!   act on it
//! - `server` (feature `server`): the axum HTTP surface
//!
//! ## Architecture
//! Components share one [`arbor_meta::MetaStore`], one
//! [`arbor_blob::BlobStore`] and one [`arbor_locks::LeaseManager`];
//! [`service::Gateway`] wires them from a [`GatewayConfig`].

pub mod access;
pub mod bucket;
pub mod config;
pub mod copernicus;
pub mod datasets;
pub mod error;
pub mod poller;
pub mod pool;
pub mod service;
pub mod transfer;
pub mod tree;

#[cfg(feature = "server")]
pub mod server;

pub use access::{AccessResolver, Collection, Scope, ScopeHint, ScopeRequest, ScopeTarget, TargetSource};
pub use bucket::{BucketRemoval, BucketService};
pub use config::{GatewayConfig, ServiceEndpoint};
pub use copernicus::{CopernicusClient, FetchedAsset, RemoteState, RemoteTask, Service, TaskClient};
pub use datasets::{DatasetService, DatasetTask};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use poller::TaskPoller;
pub use pool::{PoolStats, TaskHandle, TaskOutcome, WorkerPool};
pub use service::Gateway;
pub use transfer::{FileInfo, NewUpload, TransferCoordinator, TransferState};
pub use tree::{FolderListing, TreeEngine};
