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

//! Metadata model.
//!
//! Serialized field names follow the wire format clients already depend on
//! (`_id`, `parent`, `folder`, `files`, `folders`, `total`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of entries kept in [`Meta::history`].
pub const MAX_UPDATE_HISTORY: usize = 25;

/// Who changed something, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUpdate {
    pub user: String,
    pub date: DateTime<Utc>,
}

impl LastUpdate {
    pub fn now(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            date: Utc::now(),
        }
    }
}

/// Descriptive metadata shared by folders and files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub creator: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_update: Option<LastUpdate>,
    /// Oldest first, at most [`MAX_UPDATE_HISTORY`] entries.
    #[serde(default)]
    pub history: Vec<LastUpdate>,
}

impl Meta {
    pub fn new(creator: impl Into<String>, title: impl Into<String>) -> Self {
        let creator = creator.into();
        let stamp = LastUpdate::now(creator.clone());
        Self {
            creator,
            title: title.into(),
            description: String::new(),
            read: Vec::new(),
            write: Vec::new(),
            tags: Vec::new(),
            created_at: stamp.date,
            last_update: Some(stamp.clone()),
            history: vec![stamp],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Record a change, trimming the history to its cap.
    pub fn record_update(&mut self, update: LastUpdate) {
        self.history.push(update.clone());
        if self.history.len() > MAX_UPDATE_HISTORY {
            let excess = self.history.len() - MAX_UPDATE_HISTORY;
            self.history.drain(..excess);
        }
        self.last_update = Some(update);
    }
}

/// A node of the folder tree. Roots (groups) have an empty `parent_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: String,
    pub meta: Meta,
    #[serde(rename = "parent", default)]
    pub parent_id: String,
    #[serde(default)]
    pub ancestors: Vec<String>,
    pub level: u32,
    #[serde(rename = "files", default)]
    pub child_file_ids: Vec<String>,
    #[serde(rename = "folders", default)]
    pub child_folder_ids: Vec<String>,
    #[serde(default)]
    pub size: i64,
}

impl Folder {
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Root folder id of the tree this folder belongs to.
    pub fn group_id(&self) -> &str {
        self.ancestors.first().map(String::as_str).unwrap_or(&self.id)
    }

    /// Ancestor chain a direct child of this folder must carry.
    pub fn lineage(&self) -> Vec<String> {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.id.clone());
        ancestors
    }
}

/// How a file's bytes are laid out in the blob store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// One independent object per part.
    #[default]
    Parts,
    /// One multipart object per file, assembled when the last part lands.
    Stream,
}

/// File metadata. Content lives in Part objects or in one Stream object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    #[serde(rename = "_id")]
    pub id: String,
    pub meta: Meta,
    #[serde(rename = "folder")]
    pub folder_id: String,
    #[serde(default)]
    pub ancestors: Vec<String>,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(rename = "total", default)]
    pub total_parts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copernicus_fingerprint: Option<String>,
    #[serde(default)]
    pub transfer_mode: TransferMode,
}

impl File {
    /// Root folder id of the tree this file belongs to.
    pub fn group_id(&self) -> &str {
        self.ancestors.first().map(String::as_str).unwrap_or(&self.folder_id)
    }
}

/// Where a stored object ended up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub e_tag: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One independently stored chunk of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "_id")]
    pub id: String,
    pub file_id: String,
    pub part_number: u32,
    pub size: i64,
    pub upload_info: UploadInfo,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Pending,
    /// Every receipt is in and one caller is assembling the object.
    Closing,
    Completed,
}

/// Receipt for one part of a blob-store multipart session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPart {
    pub part_number: u32,
    pub etag: String,
    pub size: i64,
}

/// A blob-store multipart session; `id` is the session id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "_id")]
    pub id: String,
    pub file_id: String,
    pub bucket: String,
    pub object_key: String,
    #[serde(default)]
    pub parts: Vec<StreamPart>,
    pub total: u32,
    #[serde(default)]
    pub status: StreamStatus,
}

impl Stream {
    /// Byte range of `part_number` inside the assembled object.
    pub fn part_range(&self, part_number: u32) -> Option<std::ops::Range<u64>> {
        let mut parts: Vec<&StreamPart> = self.parts.iter().collect();
        parts.sort_by_key(|p| p.part_number);
        let mut offset = 0u64;
        for part in parts {
            let len = part.size.max(0) as u64;
            if part.part_number == part_number {
                return Some(offset..offset + len);
            }
            offset += len;
        }
        None
    }
}

/// Lifecycle of a remote dataset-preparation job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Submitted,
    Running,
    Successful,
    Failed,
    Denied,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Successful | TaskStatus::Failed | TaskStatus::Denied)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(default)]
    pub job_id: String,
    pub service: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// External-task record. `id` is the request fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub file_id: String,
    pub dataset_name: String,
    #[serde(default)]
    pub request_params: Value,
    pub task_details: TaskDetails,
    /// Subject that submitted the request; background ingestion runs as them.
    #[serde(default)]
    pub submitted_by: String,
    pub created_at: DateTime<Utc>,
}

/// Which child list of a folder an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKind {
    File,
    Folder,
}
