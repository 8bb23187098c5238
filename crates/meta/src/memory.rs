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

//! In-memory metadata store.
//!
//! ## Purpose
//! Implements every repository trait over `HashMap`s behind one `RwLock` per
//! collection. Each trait method holds the write lock for its whole body,
//! which gives the same per-call atomicity the SQL backend gets from single
//! statements.

use crate::models::{ChildKind, File, Folder, LastUpdate, Part, Stream, StreamPart, StreamStatus, TaskRecord};
use crate::repository::{FileRepository, FolderRepository, PartRepository, StreamRepository, TaskRecordRepository};
use crate::{MetaError, MetaResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of all metadata collections.
#[derive(Clone, Default)]
pub struct InMemoryMetaStore {
    folders: Arc<RwLock<HashMap<String, Folder>>>,
    files: Arc<RwLock<HashMap<String, File>>>,
    parts: Arc<RwLock<HashMap<String, Part>>>,
    streams: Arc<RwLock<HashMap<String, Stream>>>,
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn swap_status(&self, id: &str, from: StreamStatus, to: StreamStatus) -> MetaResult<bool> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(id).ok_or_else(|| MetaError::not_found("stream", id))?;
        if stream.status != from {
            return Ok(false);
        }
        stream.status = to;
        Ok(true)
    }
}

fn child_list(folder: &mut Folder, kind: ChildKind) -> &mut Vec<String> {
    match kind {
        ChildKind::File => &mut folder.child_file_ids,
        ChildKind::Folder => &mut folder.child_folder_ids,
    }
}

#[async_trait]
impl FolderRepository for InMemoryMetaStore {
    async fn insert(&self, folder: &Folder) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        if folders.contains_key(&folder.id) {
            return Err(MetaError::already_exists("folder", &folder.id));
        }
        folders.insert(folder.id.clone(), folder.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> MetaResult<Option<Folder>> {
        Ok(self.folders.read().await.get(id).cloned())
    }

    async fn get_many(&self, ids: &[String]) -> MetaResult<Vec<Folder>> {
        let folders = self.folders.read().await;
        Ok(ids.iter().filter_map(|id| folders.get(id).cloned()).collect())
    }

    async fn update(&self, folder: &Folder) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        match folders.get_mut(&folder.id) {
            Some(existing) => {
                *existing = folder.clone();
                Ok(())
            }
            None => Err(MetaError::not_found("folder", &folder.id)),
        }
    }

    async fn delete(&self, id: &str) -> MetaResult<bool> {
        Ok(self.folders.write().await.remove(id).is_some())
    }

    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64> {
        let mut folders = self.folders.write().await;
        let before = folders.len();
        folders.retain(|_, f| !f.ancestors.iter().any(|a| a == ancestor_id));
        Ok((before - folders.len()) as u64)
    }

    async fn list_by_parent(&self, parent_id: &str) -> MetaResult<Vec<Folder>> {
        let folders = self.folders.read().await;
        let mut found: Vec<Folder> = folders.values().filter(|f| f.parent_id == parent_id).cloned().collect();
        found.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<Folder>> {
        let folders = self.folders.read().await;
        let mut found: Vec<Folder> = folders
            .values()
            .filter(|f| f.ancestors.iter().any(|a| a == ancestor_id))
            .cloned()
            .collect();
        found.sort_by_key(|f| f.level);
        Ok(found)
    }

    async fn find_root_by_title(&self, title: &str) -> MetaResult<Option<Folder>> {
        let folders = self.folders.read().await;
        Ok(folders.values().find(|f| f.level == 0 && f.meta.title == title).cloned())
    }

    async fn find_by_title_and_level(&self, title: &str, level: u32) -> MetaResult<Vec<Folder>> {
        let folders = self.folders.read().await;
        Ok(folders
            .values()
            .filter(|f| f.level == level && f.meta.title == title)
            .cloned()
            .collect())
    }

    async fn push_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        let parent = folders
            .get_mut(parent_id)
            .ok_or_else(|| MetaError::not_found("folder", parent_id))?;
        let list = child_list(parent, kind);
        if !list.iter().any(|c| c == child_id) {
            list.push(child_id.to_string());
        }
        Ok(())
    }

    async fn remove_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        if let Some(parent) = folders.get_mut(parent_id) {
            child_list(parent, kind).retain(|c| c != child_id);
        }
        Ok(())
    }

    async fn increment_size(&self, ids: &[String], delta: i64) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        for id in ids {
            if let Some(folder) = folders.get_mut(id) {
                folder.size += delta;
            }
        }
        Ok(())
    }

    async fn touch(&self, ids: &[String], update: &LastUpdate) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        for id in ids {
            if let Some(folder) = folders.get_mut(id) {
                folder.meta.record_update(update.clone());
            }
        }
        Ok(())
    }

    async fn set_lineage(&self, id: &str, parent_id: &str, ancestors: &[String]) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        let folder = folders.get_mut(id).ok_or_else(|| MetaError::not_found("folder", id))?;
        folder.parent_id = parent_id.to_string();
        folder.ancestors = ancestors.to_vec();
        folder.level = ancestors.len() as u32;
        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str, description: Option<&str>, update: &LastUpdate) -> MetaResult<()> {
        let mut folders = self.folders.write().await;
        let folder = folders.get_mut(id).ok_or_else(|| MetaError::not_found("folder", id))?;
        folder.meta.title = title.to_string();
        if let Some(description) = description {
            folder.meta.description = description.to_string();
        }
        folder.meta.record_update(update.clone());
        Ok(())
    }
}

#[async_trait]
impl FileRepository for InMemoryMetaStore {
    async fn insert(&self, file: &File) -> MetaResult<()> {
        let mut files = self.files.write().await;
        if files.contains_key(&file.id) {
            return Err(MetaError::already_exists("file", &file.id));
        }
        files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> MetaResult<Option<File>> {
        Ok(self.files.read().await.get(id).cloned())
    }

    async fn update(&self, file: &File) -> MetaResult<()> {
        let mut files = self.files.write().await;
        match files.get_mut(&file.id) {
            Some(existing) => {
                *existing = file.clone();
                Ok(())
            }
            None => Err(MetaError::not_found("file", &file.id)),
        }
    }

    async fn delete(&self, id: &str) -> MetaResult<bool> {
        Ok(self.files.write().await.remove(id).is_some())
    }

    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64> {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|_, f| !f.ancestors.iter().any(|a| a == ancestor_id));
        Ok((before - files.len()) as u64)
    }

    async fn list_by_folder(&self, folder_id: &str) -> MetaResult<Vec<File>> {
        let files = self.files.read().await;
        let mut found: Vec<File> = files.values().filter(|f| f.folder_id == folder_id).cloned().collect();
        found.sort_by(|a, b| a.meta.created_at.cmp(&b.meta.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<File>> {
        let files = self.files.read().await;
        Ok(files
            .values()
            .filter(|f| f.ancestors.iter().any(|a| a == ancestor_id))
            .cloned()
            .collect())
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> MetaResult<Option<File>> {
        let files = self.files.read().await;
        Ok(files
            .values()
            .find(|f| f.copernicus_fingerprint.as_deref() == Some(fingerprint))
            .cloned())
    }

    async fn increment_size(&self, id: &str, delta: i64) -> MetaResult<i64> {
        let mut files = self.files.write().await;
        let file = files.get_mut(id).ok_or_else(|| MetaError::not_found("file", id))?;
        file.size += delta;
        Ok(file.size)
    }

    async fn set_total_parts(&self, id: &str, total_parts: u32) -> MetaResult<()> {
        let mut files = self.files.write().await;
        let file = files.get_mut(id).ok_or_else(|| MetaError::not_found("file", id))?;
        file.total_parts = total_parts;
        Ok(())
    }

    async fn set_lineage(&self, id: &str, folder_id: &str, ancestors: &[String], update: &LastUpdate) -> MetaResult<()> {
        let mut files = self.files.write().await;
        let file = files.get_mut(id).ok_or_else(|| MetaError::not_found("file", id))?;
        file.folder_id = folder_id.to_string();
        file.ancestors = ancestors.to_vec();
        file.meta.record_update(update.clone());
        Ok(())
    }

    async fn set_meta(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        tags: Option<&[String]>,
        update: &LastUpdate,
    ) -> MetaResult<()> {
        let mut files = self.files.write().await;
        let file = files.get_mut(id).ok_or_else(|| MetaError::not_found("file", id))?;
        if let Some(title) = title {
            file.meta.title = title.to_string();
        }
        if let Some(description) = description {
            file.meta.description = description.to_string();
        }
        if let Some(tags) = tags {
            file.meta.tags = tags.to_vec();
        }
        file.meta.record_update(update.clone());
        Ok(())
    }
}

#[async_trait]
impl PartRepository for InMemoryMetaStore {
    async fn insert(&self, part: &Part) -> MetaResult<()> {
        let mut parts = self.parts.write().await;
        let taken = parts
            .values()
            .any(|p| p.id == part.id || (p.file_id == part.file_id && p.part_number == part.part_number));
        if taken {
            return Err(MetaError::already_exists(
                "part",
                format!("{}#{}", part.file_id, part.part_number),
            ));
        }
        parts.insert(part.id.clone(), part.clone());
        Ok(())
    }

    async fn get_by_number(&self, file_id: &str, part_number: u32) -> MetaResult<Option<Part>> {
        let parts = self.parts.read().await;
        Ok(parts
            .values()
            .find(|p| p.file_id == file_id && p.part_number == part_number)
            .cloned())
    }

    async fn list_by_file(&self, file_id: &str) -> MetaResult<Vec<Part>> {
        let parts = self.parts.read().await;
        let mut found: Vec<Part> = parts.values().filter(|p| p.file_id == file_id).cloned().collect();
        found.sort_by_key(|p| p.part_number);
        Ok(found)
    }

    async fn delete(&self, id: &str) -> MetaResult<bool> {
        Ok(self.parts.write().await.remove(id).is_some())
    }

    async fn delete_by_file(&self, file_id: &str) -> MetaResult<u64> {
        let mut parts = self.parts.write().await;
        let before = parts.len();
        parts.retain(|_, p| p.file_id != file_id);
        Ok((before - parts.len()) as u64)
    }
}

#[async_trait]
impl StreamRepository for InMemoryMetaStore {
    async fn insert(&self, stream: &Stream) -> MetaResult<()> {
        let mut streams = self.streams.write().await;
        if streams.contains_key(&stream.id) {
            return Err(MetaError::already_exists("stream", &stream.id));
        }
        streams.insert(stream.id.clone(), stream.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> MetaResult<Option<Stream>> {
        Ok(self.streams.read().await.get(id).cloned())
    }

    async fn get_by_file(&self, file_id: &str) -> MetaResult<Option<Stream>> {
        let streams = self.streams.read().await;
        Ok(streams.values().find(|s| s.file_id == file_id).cloned())
    }

    async fn add_part(&self, id: &str, part: &StreamPart) -> MetaResult<Stream> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(id).ok_or_else(|| MetaError::not_found("stream", id))?;
        if stream.parts.iter().any(|p| p.part_number == part.part_number) {
            return Err(MetaError::already_exists("stream part", format!("{id}#{}", part.part_number)));
        }
        stream.parts.push(part.clone());
        stream.parts.sort_by_key(|p| p.part_number);
        Ok(stream.clone())
    }

    async fn begin_close(&self, id: &str) -> MetaResult<bool> {
        self.swap_status(id, StreamStatus::Pending, StreamStatus::Closing).await
    }

    async fn mark_completed(&self, id: &str) -> MetaResult<bool> {
        self.swap_status(id, StreamStatus::Closing, StreamStatus::Completed).await
    }

    async fn abort_close(&self, id: &str) -> MetaResult<bool> {
        self.swap_status(id, StreamStatus::Closing, StreamStatus::Pending).await
    }

    async fn delete_by_file(&self, file_id: &str) -> MetaResult<u64> {
        let mut streams = self.streams.write().await;
        let before = streams.len();
        streams.retain(|_, s| s.file_id != file_id);
        Ok((before - streams.len()) as u64)
    }
}

#[async_trait]
impl TaskRecordRepository for InMemoryMetaStore {
    async fn insert_if_absent(&self, record: &TaskRecord) -> MetaResult<(TaskRecord, bool)> {
        let mut tasks = self.tasks.write().await;
        if let Some(existing) = tasks.get(&record.id) {
            return Ok((existing.clone(), false));
        }
        tasks.insert(record.id.clone(), record.clone());
        Ok((record.clone(), true))
    }

    async fn get(&self, id: &str) -> MetaResult<Option<TaskRecord>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn update(&self, record: &TaskRecord) -> MetaResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(MetaError::not_found("task", &record.id)),
        }
    }

    async fn list_unfinished(&self) -> MetaResult<Vec<TaskRecord>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<TaskRecord> = tasks
            .values()
            .filter(|t| !t.task_details.status.is_terminal())
            .cloned()
            .collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }
}
