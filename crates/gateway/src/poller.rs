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

//! External Task Poller
//!
//! ## Purpose
//! Follows a submitted Copernicus job until it reaches a terminal state and,
//! when it succeeds, ingests the result asset into the record's File as
//! `part_size` parts.
//!
//! ## Re-entry guard
//! Each poll loop holds the lease `copernicus:{record_id}` in the shared lease
//! table, taken with a fresh holder id per attempt. A second `schedule` for
//! the same record finds the lease held and returns without starting a loop,
//! whichever instance it runs on. A heartbeat task renews the lease every
//! third of its duration for as long as the loop runs, fetch and ingest
//! included. If a renewal fails the loop is dropped mid-step, since another
//! holder may already own the record. Otherwise the lease is released on
//! every exit path.
//!
//! ## Failure semantics
//! Remote `failed`/`denied` states are recorded as terminal statuses. Any
//! other error is written to `task_details.error` and ends the loop without
//! changing the status, so a later status request can schedule a new loop.

use arbor_common::RequestContext;
use arbor_locks::{AcquireLeaseOptions, Lease, LeaseError, LeaseManager, ReleaseLeaseOptions, RenewLeaseOptions};
use arbor_meta::{TaskError, TaskRecord, TaskStatus};
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::copernicus::{RemoteState, RemoteTask, Service, TaskClient};
use crate::pool::{TaskHandle, WorkerPool};
use crate::transfer::TransferCoordinator;
use crate::tree::TreeEngine;
use crate::{GatewayError, GatewayResult};

const MSG_BAD_SERVICE: &str = "Please contact the Core Platform Support Team (Code: GO0001).";
const MSG_INGEST_FAILED: &str = "Please contact the Core Platform Support Team (Code: GO0002).";
const MSG_REMOTE_UNAVAILABLE: &str = "There might be a problem on the Copernicus side. Try again later.";
const MSG_NO_LOCATION: &str = "Destination doesn't exist (Code: GO0004).";
const MSG_FETCH_FAILED: &str = "Bad Request (Code: GO0005).";
const MSG_SIZE_MISMATCH: &str = "Could not calcute size of dataset (Code: GO0006).";
const MSG_NO_REFERENCE: &str = "Could not retrieve reference file (Code: GO0007).";

/// Lease key guarding the poll loop of a record.
pub fn lease_key(record_id: &str) -> String {
    format!("copernicus:{record_id}")
}

#[derive(Clone)]
pub struct TaskPoller {
    tree: TreeEngine,
    transfer: TransferCoordinator,
    client: Arc<dyn TaskClient>,
    leases: Arc<dyn LeaseManager>,
    pool: WorkerPool,
    poll_interval: Duration,
    lease_duration_secs: u32,
}

impl TaskPoller {
    pub fn new(
        tree: TreeEngine,
        transfer: TransferCoordinator,
        client: Arc<dyn TaskClient>,
        leases: Arc<dyn LeaseManager>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            tree,
            transfer,
            client,
            leases,
            pool,
            poll_interval: Duration::from_secs(5),
            lease_duration_secs: 300,
        }
    }

    /// Set sleep between polls (builder pattern)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set lease duration (builder pattern)
    pub fn with_lease_duration(mut self, lease_duration_secs: u32) -> Self {
        self.lease_duration_secs = lease_duration_secs;
        self
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Start a poll loop for `record_id` unless one is already running.
    ///
    /// Returns `None` when another holder has the lease.
    pub async fn schedule(&self, record_id: &str) -> GatewayResult<Option<TaskHandle>> {
        let holder = Ulid::new().to_string();
        let options = AcquireLeaseOptions::new(lease_key(record_id), holder, self.lease_duration_secs)
            .with_metadata("record_id", record_id);
        let lease = match self.leases.acquire_lease(options).await {
            Ok(lease) => lease,
            Err(LeaseError::LeaseAlreadyHeld(holder)) => {
                debug!(record_id = %record_id, holder = %holder, "[POLLER] already being polled");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let this = self.clone();
        let id = record_id.to_string();
        let handle = self
            .pool
            .spawn(format!("poll:{record_id}"), async move { this.run(id, lease).await })
            .await;
        info!(record_id = %record_id, "[POLLER] poll loop scheduled");
        Ok(Some(handle))
    }

    /// Schedule every record that has not reached a terminal state.
    pub async fn resume_unfinished(&self) -> GatewayResult<Vec<TaskHandle>> {
        let mut handles = Vec::new();
        for record in self.tree.store().tasks.list_unfinished().await? {
            if let Some(handle) = self.schedule(&record.id).await? {
                handles.push(handle);
            }
        }
        if !handles.is_empty() {
            info!(count = handles.len(), "[POLLER] resumed unfinished records");
        }
        Ok(handles)
    }

    async fn run(&self, record_id: String, lease: Lease) -> GatewayResult<()> {
        let (stop, stopped) = oneshot::channel();
        let mut heartbeat = tokio::spawn(keep_alive(
            self.leases.clone(),
            lease,
            self.lease_duration_secs,
            stopped,
        ));

        let result = tokio::select! {
            result = self.poll_loop(&record_id) => result,
            lost = &mut heartbeat => {
                let err = match lost {
                    Ok(Err(e)) => e,
                    Ok(Ok(_)) => GatewayError::Internal("lease heartbeat stopped".to_string()),
                    Err(e) => GatewayError::Internal(e.to_string()),
                };
                warn!(record_id = %record_id, error = %err, "[POLLER] lease lost, poll loop aborted");
                return Err(err);
            }
        };

        // Receiver gone means the heartbeat already ended; its result says why.
        let _ = stop.send(());
        match heartbeat.await {
            Ok(Ok(lease)) => {
                if let Err(e) = self.leases.release_lease(ReleaseLeaseOptions::for_lease(&lease)).await {
                    warn!(record_id = %record_id, error = %e, "[POLLER] could not release lease");
                }
            }
            Ok(Err(e)) => warn!(record_id = %record_id, error = %e, "[POLLER] lease lost before release"),
            Err(e) => warn!(record_id = %record_id, error = %e, "[POLLER] lease heartbeat panicked"),
        }
        result
    }

    async fn poll_loop(&self, record_id: &str) -> GatewayResult<()> {
        loop {
            let mut record = self
                .tree
                .store()
                .tasks
                .get(record_id)
                .await?
                .ok_or_else(|| GatewayError::not_found("task record", record_id))?;
            if record.task_details.status.is_terminal() {
                return Ok(());
            }

            let service: Service = match record.task_details.service.parse() {
                Ok(service) => service,
                Err(e) => return self.record_error(record, e, MSG_BAD_SERVICE).await,
            };
            let remote = match self.client.status(service, &record.task_details.job_id).await {
                Ok(remote) => remote,
                Err(e) => return self.record_error(record, e, MSG_REMOTE_UNAVAILABLE).await,
            };

            match remote.remote_state() {
                RemoteState::Failed => {
                    let error = remote.error.unwrap_or_default();
                    record.task_details.status = TaskStatus::Failed;
                    record.task_details.error = Some(TaskError {
                        reason: error.reason,
                        message: error.message,
                    });
                    self.tree.store().tasks.update(&record).await?;
                    info!(record_id = %record_id, "[POLLER] remote job failed");
                    return Ok(());
                }
                RemoteState::Denied => {
                    record.task_details.status = TaskStatus::Denied;
                    record.task_details.error = Some(TaskError {
                        reason: String::new(),
                        message: remote.message.unwrap_or_default(),
                    });
                    self.tree.store().tasks.update(&record).await?;
                    info!(record_id = %record_id, "[POLLER] remote job denied");
                    return Ok(());
                }
                RemoteState::Completed => return self.ingest_result(record, &remote).await,
                RemoteState::Running | RemoteState::Queued => {
                    if remote.remote_state() == RemoteState::Running
                        && record.task_details.status != TaskStatus::Running
                    {
                        record.task_details.status = TaskStatus::Running;
                        self.tree.store().tasks.update(&record).await?;
                    }
                    debug!(record_id = %record_id, state = %remote.state, "[POLLER] job not ready");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn ingest_result(&self, mut record: TaskRecord, remote: &RemoteTask) -> GatewayResult<()> {
        let Some(location) = remote.location.clone() else {
            let err = GatewayError::Upstream("completed job has no location".to_string());
            return self.record_error(record, err, MSG_NO_LOCATION).await;
        };
        let asset = match self.client.fetch(&location).await {
            Ok(asset) => asset,
            Err(e) => return self.record_error(record, e, MSG_FETCH_FAILED).await,
        };
        let declared = asset.content_length.or(remote.content_length);

        let file = match self.tree.store().files.get(&record.file_id).await? {
            Some(file) => file,
            None => {
                let err = GatewayError::not_found("file", &record.file_id);
                return self.record_error(record, err, MSG_NO_REFERENCE).await;
            }
        };

        let chunks = match split_into_parts(asset.stream, self.transfer.part_size()).await {
            Ok(chunks) => chunks,
            Err(e) => return self.record_error(record, e, MSG_FETCH_FAILED).await,
        };
        let received: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        if let Some(expected) = declared {
            if expected != received {
                let err = GatewayError::Upstream(format!("expected {expected} bytes, received {received}"));
                return self.record_error(record, err, MSG_SIZE_MISMATCH).await;
            }
        }

        let ctx = RequestContext::internal(record.submitted_by.clone()).with_metadata("task_record", record.id.clone());
        let file = match self.transfer.ingest(&ctx, &file.id, chunks).await {
            Ok(file) => file,
            Err(e) => return self.record_error(record, e, MSG_INGEST_FAILED).await,
        };
        self.tree
            .touch_ancestors(&file.ancestors, &record.submitted_by)
            .await?;

        record.task_details.status = TaskStatus::Successful;
        record.task_details.error = None;
        self.tree.store().tasks.update(&record).await?;
        info!(record_id = %record.id, file_id = %file.id, size = file.size, parts = file.total_parts, "[POLLER] dataset ingested");
        Ok(())
    }

    /// Persist `err` on the record and end the loop with it.
    async fn record_error(&self, mut record: TaskRecord, err: GatewayError, message: &str) -> GatewayResult<()> {
        warn!(record_id = %record.id, error = %err, "[POLLER] poll loop stopped");
        record.task_details.error = Some(TaskError {
            reason: err.to_string(),
            message: message.to_string(),
        });
        self.tree.store().tasks.update(&record).await?;
        Err(err)
    }
}

/// Renew `lease` every third of its duration until `stop` fires, then hand
/// back the latest copy. A renewal in flight always completes first.
async fn keep_alive(
    leases: Arc<dyn LeaseManager>,
    mut lease: Lease,
    duration_secs: u32,
    mut stop: oneshot::Receiver<()>,
) -> GatewayResult<Lease> {
    let period = Duration::from_millis((u64::from(duration_secs) * 1000 / 3).max(100));
    let mut ticks = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = &mut stop => return Ok(lease),
            _ = ticks.tick() => {
                lease = leases
                    .renew_lease(RenewLeaseOptions::for_lease(&lease, duration_secs))
                    .await?;
                debug!(lease_key = %lease.lease_key, "[POLLER] lease renewed");
            }
        }
    }
}

/// Cut a byte stream into `part_size` chunks; the last one may be shorter.
async fn split_into_parts(
    mut stream: BoxStream<'static, GatewayResult<Bytes>>,
    part_size: usize,
) -> GatewayResult<Vec<Bytes>> {
    let mut chunks = Vec::new();
    let mut buffer = BytesMut::with_capacity(part_size);
    while let Some(piece) = stream.next().await {
        let mut piece = piece?;
        while !piece.is_empty() {
            let take = (part_size - buffer.len()).min(piece.len());
            buffer.extend_from_slice(&piece.split_to(take));
            if buffer.len() == part_size {
                chunks.push(buffer.split().freeze());
            }
        }
    }
    if !buffer.is_empty() {
        chunks.push(buffer.freeze());
    }
    Ok(chunks)
}
