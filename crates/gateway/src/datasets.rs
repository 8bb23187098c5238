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

//! Copernicus dataset requests.
//!
//! ## Purpose
//! Turns a dataset request into an External-Task-Record plus the landing File
//! the result will be ingested into, submits the remote job and hands the
//! record to the [`TaskPoller`].
//!
//! ## Deduplication
//! Records are keyed by the request fingerprint. Two concurrent submissions
//! of the same request race on `insert_if_absent`; the loser removes the
//! landing File it created and answers with the winner's record.

use arbor_common::RequestContext;
use arbor_meta::{ChildKind, File, Meta, TaskDetails, TaskError, TaskRecord, TaskStatus, TransferMode};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use ulid::Ulid;

use crate::copernicus::{fingerprint, RemoteState, Service, TaskClient};
use crate::poller::TaskPoller;
use crate::pool::TaskHandle;
use crate::tree::TreeEngine;
use crate::{GatewayError, GatewayResult};

/// A dataset record together with its landing file.
#[derive(Clone)]
pub struct DatasetTask {
    pub record: TaskRecord,
    pub file: Option<File>,
    /// `true` when this call created the record
    pub created: bool,
    /// Poll loop started by this call, if any
    pub handle: Option<TaskHandle>,
}

#[derive(Clone)]
pub struct DatasetService {
    tree: TreeEngine,
    client: Arc<dyn TaskClient>,
    poller: TaskPoller,
    landing_folder_id: String,
}

impl DatasetService {
    pub fn new(
        tree: TreeEngine,
        client: Arc<dyn TaskClient>,
        poller: TaskPoller,
        landing_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            client,
            poller,
            landing_folder_id: landing_folder_id.into(),
        }
    }

    pub fn poller(&self) -> &TaskPoller {
        &self.poller
    }

    pub async fn list_datasets(&self, service: Service) -> GatewayResult<Vec<String>> {
        self.client.list_datasets(service).await
    }

    pub async fn dataset_form(&self, service: Service, dataset_id: &str) -> GatewayResult<Value> {
        self.client.dataset_form(service, dataset_id).await
    }

    /// Submit `dataset` with `params`, or join an identical earlier request.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        service: Service,
        dataset: &str,
        params: Value,
    ) -> GatewayResult<DatasetTask> {
        if dataset.trim().is_empty() {
            return Err(GatewayError::Validation("dataset_name is required".to_string()));
        }
        let id = fingerprint(dataset, &params);
        if let Some(record) = self.tree.store().tasks.get(&id).await? {
            return self.existing(record).await;
        }

        let folder = self.tree.get_folder(&self.landing_folder_id).await?;
        let format = params
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut meta = Meta::new(ctx.subject(), dataset);
        meta.read = folder.meta.read.clone();
        meta.write = folder.meta.write.clone();
        let file = File {
            id: Ulid::new().to_string(),
            meta,
            folder_id: folder.id.clone(),
            ancestors: folder.lineage(),
            original_title: if format.is_empty() {
                dataset.to_string()
            } else {
                format!("{dataset}.{format}")
            },
            file_type: if format.is_empty() { String::new() } else { format!(".{format}") },
            size: 0,
            total_parts: 0,
            copernicus_fingerprint: Some(id.clone()),
            transfer_mode: TransferMode::Parts,
        };
        self.tree.store().files.insert(&file).await?;

        let candidate = TaskRecord {
            id: id.clone(),
            file_id: file.id.clone(),
            dataset_name: dataset.to_string(),
            request_params: params.clone(),
            task_details: TaskDetails {
                job_id: String::new(),
                service: service.to_string(),
                status: TaskStatus::Submitted,
                error: None,
            },
            submitted_by: ctx.subject().to_string(),
            created_at: Utc::now(),
        };
        let (mut record, inserted) = self.tree.store().tasks.insert_if_absent(&candidate).await?;
        if !inserted {
            self.tree.store().files.delete(&file.id).await?;
            info!(record_id = %id, "[POLLER] joined concurrent submission");
            return self.existing(record).await;
        }

        self.tree
            .store()
            .folders
            .push_child(&folder.id, ChildKind::File, &file.id)
            .await?;
        self.tree.touch_ancestors(&file.ancestors, ctx.subject()).await?;

        let remote = match self.client.submit(service, dataset, &params).await {
            Ok(remote) => remote,
            Err(e) => {
                self.mark_failed(&mut record, &e).await?;
                return Err(e);
            }
        };
        let Some(job_id) = remote.request_id.clone().filter(|j| !j.is_empty()) else {
            let err = GatewayError::Upstream("Copernicus did not return a request id".to_string());
            self.mark_failed(&mut record, &err).await?;
            return Err(err);
        };

        record.task_details.job_id = job_id;
        record.task_details.status = match remote.remote_state() {
            RemoteState::Queued => TaskStatus::Submitted,
            RemoteState::Running | RemoteState::Completed => TaskStatus::Running,
            RemoteState::Failed => TaskStatus::Failed,
            RemoteState::Denied => TaskStatus::Denied,
        };
        if record.task_details.status.is_terminal() {
            let error = remote.error.clone().unwrap_or_default();
            record.task_details.error = Some(TaskError {
                reason: error.reason,
                message: remote.message.clone().unwrap_or(error.message),
            });
        }
        self.tree.store().tasks.update(&record).await?;
        info!(record_id = %id, service = %service, dataset = %dataset, status = ?record.task_details.status, "[POLLER] dataset requested");

        let handle = if record.task_details.status.is_terminal() {
            None
        } else {
            self.poller.schedule(&record.id).await?
        };
        Ok(DatasetTask {
            record,
            file: Some(file),
            created: true,
            handle,
        })
    }

    /// Current record; polling is re-scheduled while it is not terminal.
    pub async fn status(&self, id: &str) -> GatewayResult<DatasetTask> {
        let record = self
            .tree
            .store()
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::not_found("task record", id))?;
        self.existing(record).await
    }

    /// A record without a job id is still being submitted by another caller.
    async fn existing(&self, record: TaskRecord) -> GatewayResult<DatasetTask> {
        let handle = if record.task_details.status.is_terminal() || record.task_details.job_id.is_empty() {
            None
        } else {
            self.poller.schedule(&record.id).await?
        };
        let file = self.tree.store().files.get(&record.file_id).await?;
        Ok(DatasetTask {
            record,
            file,
            created: false,
            handle,
        })
    }

    async fn mark_failed(&self, record: &mut TaskRecord, err: &GatewayError) -> GatewayResult<()> {
        warn!(record_id = %record.id, error = %err, "[POLLER] submission failed");
        record.task_details.status = TaskStatus::Failed;
        record.task_details.error = Some(TaskError {
            reason: err.to_string(),
            message: "There might be a problem on the Copernicus side. Try again later.".to_string(),
        });
        self.tree.store().tasks.update(record).await?;
        Ok(())
    }
}
