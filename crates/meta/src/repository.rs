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

//! Repository traits for metadata storage.
//!
//! ## Purpose
//! Abstracts the document store behind one trait per collection so the core
//! can run against the in-memory backend in tests and SQLite in production.
//!
//! ## Design
//! Every method that mutates an array or counter field (`push_child`,
//! `remove_child`, `increment_size`, `touch`, `add_part`, the stream status
//! swaps, `insert_if_absent`) is a single atomic operation at the
//! storage layer. Callers never read-modify-write those fields.

use crate::models::{ChildKind, File, Folder, LastUpdate, Part, Stream, StreamPart, TaskRecord};
use crate::MetaResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Folder collection.
#[async_trait]
pub trait FolderRepository: Send + Sync {
    /// Insert a new folder; `AlreadyExists` if the id is taken.
    async fn insert(&self, folder: &Folder) -> MetaResult<()>;

    async fn get(&self, id: &str) -> MetaResult<Option<Folder>>;

    /// Folders whose id is in `ids`, in no particular order.
    async fn get_many(&self, ids: &[String]) -> MetaResult<Vec<Folder>>;

    /// Replace a folder document; `NotFound` if absent.
    async fn update(&self, folder: &Folder) -> MetaResult<()>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: &str) -> MetaResult<bool>;

    /// Delete every folder carrying `ancestor_id` in its ancestors.
    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64>;

    async fn list_by_parent(&self, parent_id: &str) -> MetaResult<Vec<Folder>>;

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<Folder>>;

    /// Root folder (level 0) titled `title`.
    async fn find_root_by_title(&self, title: &str) -> MetaResult<Option<Folder>>;

    /// Folders titled `title` at depth `level`.
    async fn find_by_title_and_level(&self, title: &str, level: u32) -> MetaResult<Vec<Folder>>;

    /// Append `child_id` to a child list unless already present.
    async fn push_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()>;

    /// Remove `child_id` from a child list, preserving the order of the rest.
    async fn remove_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()>;

    /// `size += delta` for every id in `ids`; missing ids are skipped.
    async fn increment_size(&self, ids: &[String], delta: i64) -> MetaResult<()>;

    /// Record `update` on every id in `ids`; missing ids are skipped.
    async fn touch(&self, ids: &[String], update: &LastUpdate) -> MetaResult<()>;

    /// Set parent, ancestors and level (= len(ancestors)).
    async fn set_lineage(&self, id: &str, parent_id: &str, ancestors: &[String]) -> MetaResult<()>;

    /// Set title (and description when given) and record `update`.
    async fn set_title(&self, id: &str, title: &str, description: Option<&str>, update: &LastUpdate) -> MetaResult<()>;
}

/// File collection.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn insert(&self, file: &File) -> MetaResult<()>;

    async fn get(&self, id: &str) -> MetaResult<Option<File>>;

    async fn update(&self, file: &File) -> MetaResult<()>;

    async fn delete(&self, id: &str) -> MetaResult<bool>;

    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64>;

    async fn list_by_folder(&self, folder_id: &str) -> MetaResult<Vec<File>>;

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<File>>;

    async fn find_by_fingerprint(&self, fingerprint: &str) -> MetaResult<Option<File>>;

    /// `size += delta`, returning the new size.
    async fn increment_size(&self, id: &str, delta: i64) -> MetaResult<i64>;

    async fn set_total_parts(&self, id: &str, total_parts: u32) -> MetaResult<()>;

    /// Set folder, ancestors and record `update`.
    async fn set_lineage(&self, id: &str, folder_id: &str, ancestors: &[String], update: &LastUpdate) -> MetaResult<()>;

    /// Set title/description/tags (each when given) and record `update`.
    async fn set_meta(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        tags: Option<&[String]>,
        update: &LastUpdate,
    ) -> MetaResult<()>;
}

/// Part collection.
#[async_trait]
pub trait PartRepository: Send + Sync {
    /// Insert a part; `AlreadyExists` when `(file_id, part_number)` is taken.
    async fn insert(&self, part: &Part) -> MetaResult<()>;

    async fn get_by_number(&self, file_id: &str, part_number: u32) -> MetaResult<Option<Part>>;

    /// Parts of a file ordered by part number.
    async fn list_by_file(&self, file_id: &str) -> MetaResult<Vec<Part>>;

    async fn delete(&self, id: &str) -> MetaResult<bool>;

    async fn delete_by_file(&self, file_id: &str) -> MetaResult<u64>;
}

/// Stream (multipart session) collection.
#[async_trait]
pub trait StreamRepository: Send + Sync {
    async fn insert(&self, stream: &Stream) -> MetaResult<()>;

    async fn get(&self, id: &str) -> MetaResult<Option<Stream>>;

    async fn get_by_file(&self, file_id: &str) -> MetaResult<Option<Stream>>;

    /// Record the receipt for `part.part_number`; returns the stream as it
    /// is after the write. Fails with `AlreadyExists` when that part number
    /// already has a receipt.
    async fn add_part(&self, id: &str, part: &StreamPart) -> MetaResult<Stream>;

    /// `Pending -> Closing`; true only for the caller that made the change.
    async fn begin_close(&self, id: &str) -> MetaResult<bool>;

    /// `Closing -> Completed`, once the blob session is assembled.
    async fn mark_completed(&self, id: &str) -> MetaResult<bool>;

    /// `Closing -> Pending`, after a failed close, so the close can be retried.
    async fn abort_close(&self, id: &str) -> MetaResult<bool>;

    async fn delete_by_file(&self, file_id: &str) -> MetaResult<u64>;
}

/// External-task record collection.
#[async_trait]
pub trait TaskRecordRepository: Send + Sync {
    /// Insert unless a record with the same id exists. Returns the stored
    /// record and whether this call created it.
    async fn insert_if_absent(&self, record: &TaskRecord) -> MetaResult<(TaskRecord, bool)>;

    async fn get(&self, id: &str) -> MetaResult<Option<TaskRecord>>;

    async fn update(&self, record: &TaskRecord) -> MetaResult<()>;

    /// Records whose status is not terminal.
    async fn list_unfinished(&self) -> MetaResult<Vec<TaskRecord>>;
}

/// All collections, as consumed by the gateway.
#[derive(Clone)]
pub struct MetaStore {
    pub folders: Arc<dyn FolderRepository>,
    pub files: Arc<dyn FileRepository>,
    pub parts: Arc<dyn PartRepository>,
    pub streams: Arc<dyn StreamRepository>,
    pub tasks: Arc<dyn TaskRecordRepository>,
}

impl MetaStore {
    /// Fresh in-memory store.
    pub fn in_memory() -> Self {
        let store = crate::memory::InMemoryMetaStore::new();
        Self {
            folders: Arc::new(store.clone()),
            files: Arc::new(store.clone()),
            parts: Arc::new(store.clone()),
            streams: Arc::new(store.clone()),
            tasks: Arc::new(store),
        }
    }

    /// SQLite-backed store sharing one pool across collections.
    #[cfg(feature = "sql-backend")]
    pub fn sqlite(store: crate::sql::SqliteMetaStore) -> Self {
        Self {
            folders: Arc::new(store.clone()),
            files: Arc::new(store.clone()),
            parts: Arc::new(store.clone()),
            streams: Arc::new(store.clone()),
            tasks: Arc::new(store),
        }
    }
}
