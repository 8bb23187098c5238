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

//! Gateway assembly.
//!
//! Builds every component from a [`GatewayConfig`] and shares the metadata
//! store, blob store and lease table between them.

use arbor_blob::{BlobStore, ObjectBlobStore};
use arbor_locks::memory::MemoryLeaseManager;
use arbor_locks::LeaseManager;
use arbor_meta::MetaStore;
use std::sync::Arc;
use tracing::info;

use crate::access::AccessResolver;
use crate::bucket::BucketService;
use crate::config::GatewayConfig;
use crate::copernicus::{CopernicusClient, TaskClient};
use crate::datasets::DatasetService;
use crate::poller::TaskPoller;
use crate::pool::{TaskHandle, WorkerPool};
use crate::transfer::TransferCoordinator;
use crate::tree::TreeEngine;
use crate::{GatewayError, GatewayResult};

/// All gateway components, wired together.
#[derive(Clone)]
pub struct Gateway {
    pub config: Arc<GatewayConfig>,
    pub tree: TreeEngine,
    pub buckets: BucketService,
    pub transfer: TransferCoordinator,
    pub poller: TaskPoller,
    pub datasets: DatasetService,
    pub access: AccessResolver,
}

impl Gateway {
    /// Wire components over already-built backends.
    pub fn new(
        config: GatewayConfig,
        store: MetaStore,
        blobs: Arc<dyn BlobStore>,
        leases: Arc<dyn LeaseManager>,
        client: Arc<dyn TaskClient>,
    ) -> Self {
        let tree = TreeEngine::new(store, blobs);
        let transfer =
            TransferCoordinator::new(tree.clone(), config.part_size).with_ingest_concurrency(config.ingest_concurrency);
        let pool = WorkerPool::new("copernicus-poller", config.poller_workers);
        let poller = TaskPoller::new(tree.clone(), transfer.clone(), client.clone(), leases, pool)
            .with_poll_interval(config.poll_interval())
            .with_lease_duration(config.lease_duration_secs);
        let datasets = DatasetService::new(tree.clone(), client, poller.clone(), config.copernicus_folder_id.clone());

        Self {
            buckets: BucketService::new(tree.clone()),
            access: AccessResolver::new(tree.clone()),
            config: Arc::new(config),
            tree,
            transfer,
            poller,
            datasets,
        }
    }

    /// In-memory backends with the given task client; used by tests and
    /// local runs.
    pub fn in_memory(config: GatewayConfig, client: Arc<dyn TaskClient>) -> Self {
        Self::new(
            config,
            MetaStore::in_memory(),
            Arc::new(ObjectBlobStore::in_memory()),
            Arc::new(MemoryLeaseManager::new()),
            client,
        )
    }

    /// Build the backends named by `config`.
    pub async fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate().map_err(GatewayError::Validation)?;
        let blobs: Arc<dyn BlobStore> = Arc::new(ObjectBlobStore::from_config(&config.blob)?);
        let client: Arc<dyn TaskClient> = Arc::new(CopernicusClient::from_config(&config));

        if config.metadata_url == "memory" {
            info!("[HTTP] using in-memory metadata");
            return Ok(Self::new(
                config,
                MetaStore::in_memory(),
                blobs,
                Arc::new(MemoryLeaseManager::new()),
                client,
            ));
        }
        Self::from_sqlite(config, blobs, client).await
    }

    #[cfg(feature = "sql-backend")]
    async fn from_sqlite(
        config: GatewayConfig,
        blobs: Arc<dyn BlobStore>,
        client: Arc<dyn TaskClient>,
    ) -> GatewayResult<Self> {
        use arbor_locks::sql::SqliteLeaseManager;
        use arbor_meta::SqliteMetaStore;

        let meta = SqliteMetaStore::new(&config.metadata_url).await?;
        let leases = SqliteLeaseManager::from_pool(meta.pool().clone()).await?;
        info!(url = %config.metadata_url, "[HTTP] using SQLite metadata");
        Ok(Self::new(config, MetaStore::sqlite(meta), blobs, Arc::new(leases), client))
    }

    #[cfg(not(feature = "sql-backend"))]
    async fn from_sqlite(
        config: GatewayConfig,
        _blobs: Arc<dyn BlobStore>,
        _client: Arc<dyn TaskClient>,
    ) -> GatewayResult<Self> {
        Err(GatewayError::Validation(format!(
            "{} needs the sql-backend feature",
            config.metadata_url
        )))
    }

    /// Restart polling for every record that has not finished.
    pub async fn resume_unfinished(&self) -> GatewayResult<Vec<TaskHandle>> {
        self.poller.resume_unfinished().await
    }

    /// Wait for background work to settle.
    pub async fn shutdown(&self) {
        self.poller.pool().drain().await;
    }
}
