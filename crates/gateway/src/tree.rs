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

//! Tree Consistency Engine
//!
//! ## Purpose
//! Keeps the folder/file hierarchy consistent: ancestor chains, parent child
//! lists, cumulative folder sizes and `last_update` stamps.
//!
//! ## Architecture
//! All state lives in the [`MetaStore`]; every multi-row change is expressed
//! with the repository's atomic primitives (`push_child`, `remove_child`,
//! `increment_size`, `touch`, `set_lineage`). Object bytes are touched only
//! through the [`BlobStore`] and always addressed through the bucket recorded
//! on the Part or Stream row.
//!
//! ## Design
//! - Size deltas always go to the full ancestor chain; moves only adjust the
//!   symmetric difference of the old and new chains.
//! - Sibling title checks are a scan of the current children followed by the
//!   insert, so two concurrent creations of the same title can both succeed.
//! - Cascading deletes are not rolled back: the first failure is returned and
//!   whatever was already removed stays removed.

use arbor_blob::BlobStore;
use arbor_common::RequestContext;
use arbor_meta::{
    ChildKind, File, Folder, LastUpdate, Meta, MetaError, MetaStore, Part, Stream, StreamStatus, TransferMode,
    UploadInfo,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use crate::{GatewayError, GatewayResult};

/// Description given to every root folder.
pub const ROOT_DESCRIPTION: &str = "Main folder.";

/// Direct children of a folder, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderListing {
    pub files: BTreeMap<String, Meta>,
    pub folders: BTreeMap<String, Meta>,
}

/// Folder/file hierarchy operations.
#[derive(Clone)]
pub struct TreeEngine {
    store: MetaStore,
    blobs: Arc<dyn BlobStore>,
}

impl TreeEngine {
    pub fn new(store: MetaStore, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    pub async fn get_folder(&self, id: &str) -> GatewayResult<Folder> {
        self.store
            .folders
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::not_found("folder", id))
    }

    pub async fn get_file(&self, id: &str) -> GatewayResult<File> {
        self.store
            .files
            .get(id)
            .await?
            .ok_or_else(|| GatewayError::not_found("file", id))
    }

    /// Look a folder up by id or by path; exactly one must be given.
    pub async fn locate_folder(&self, id: Option<&str>, path: Option<&str>) -> GatewayResult<Folder> {
        let id = id.filter(|s| !s.is_empty());
        let path = path.filter(|s| !s.is_empty());
        match (id, path) {
            (Some(_), Some(_)) => Err(GatewayError::Validation(
                "Provide either an id or a path, not both".to_string(),
            )),
            (Some(id), None) => self.get_folder(id).await,
            (None, Some(path)) => self.resolve_path(path).await,
            (None, None) => Err(GatewayError::Validation("An id or a path is required".to_string())),
        }
    }

    /// Resolve `/root/a/b`: the first segment names a root, each further
    /// segment a child of the previous one.
    pub async fn resolve_path(&self, path: &str) -> GatewayResult<Folder> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (root_title, rest) = segments
            .split_first()
            .ok_or_else(|| GatewayError::Validation("Path is empty".to_string()))?;

        let mut current = self
            .store
            .folders
            .find_root_by_title(root_title)
            .await?
            .ok_or_else(|| GatewayError::not_found("folder", path))?;

        for (depth, segment) in rest.iter().enumerate() {
            let level = depth as u32 + 1;
            let parent_id = current.id.clone();
            current = self
                .store
                .folders
                .find_by_title_and_level(segment, level)
                .await?
                .into_iter()
                .find(|f| f.parent_id == parent_id)
                .ok_or_else(|| GatewayError::not_found("folder", path))?;
        }
        Ok(current)
    }

    pub async fn list_folder(&self, id: &str) -> GatewayResult<FolderListing> {
        let folder = self.get_folder(id).await?;
        let files = self
            .store
            .files
            .list_by_folder(&folder.id)
            .await?
            .into_iter()
            .map(|f| (f.id, f.meta))
            .collect();
        let folders = self
            .store
            .folders
            .list_by_parent(&folder.id)
            .await?
            .into_iter()
            .map(|f| (f.id, f.meta))
            .collect();
        Ok(FolderListing { files, folders })
    }

    // ---------------------------------------------------------------------
    // Creation and updates
    // ---------------------------------------------------------------------

    /// Root folder of a bucket: `id == title == bucket`. Idempotent.
    pub async fn create_root(&self, ctx: &RequestContext, bucket: &str) -> GatewayResult<Folder> {
        if let Some(existing) = self.store.folders.get(bucket).await? {
            debug!(bucket = %bucket, "[TREE] root already exists");
            return Ok(existing);
        }

        let folder = Folder {
            id: bucket.to_string(),
            meta: Meta::new(ctx.subject(), bucket).with_description(ROOT_DESCRIPTION),
            parent_id: String::new(),
            ancestors: Vec::new(),
            level: 0,
            child_file_ids: Vec::new(),
            child_folder_ids: Vec::new(),
            size: 0,
        };
        match self.store.folders.insert(&folder).await {
            Ok(()) => {
                info!(bucket = %bucket, subject = %ctx.subject(), "[TREE] root created");
                Ok(folder)
            }
            Err(MetaError::AlreadyExists { .. }) => self.get_folder(bucket).await,
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, ctx, description), fields(subject = %ctx.subject()))]
    pub async fn create_folder(
        &self,
        ctx: &RequestContext,
        parent_id: &str,
        title: &str,
        description: &str,
    ) -> GatewayResult<Folder> {
        validate_title(title)?;
        let parent = self.get_folder(parent_id).await?;
        self.ensure_folder_name_free(&parent.id, title, None).await?;

        let mut meta = Meta::new(ctx.subject(), title).with_description(description);
        meta.read = parent.meta.read.clone();
        meta.write = parent.meta.write.clone();
        let ancestors = parent.lineage();
        let folder = Folder {
            id: Ulid::new().to_string(),
            meta,
            parent_id: parent.id.clone(),
            level: ancestors.len() as u32,
            ancestors,
            child_file_ids: Vec::new(),
            child_folder_ids: Vec::new(),
            size: 0,
        };

        self.store.folders.insert(&folder).await?;
        self.store
            .folders
            .push_child(&parent.id, ChildKind::Folder, &folder.id)
            .await?;
        self.touch_ancestors(&folder.ancestors, ctx.subject()).await?;

        info!(folder_id = %folder.id, parent_id = %parent.id, "[TREE] folder created");
        Ok(folder)
    }

    /// Rename and/or redescribe a folder.
    pub async fn update_folder(
        &self,
        ctx: &RequestContext,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> GatewayResult<Folder> {
        let folder = self.get_folder(id).await?;
        let title = title.filter(|t| *t != folder.meta.title);
        if let Some(title) = title {
            if folder.is_root() {
                return Err(GatewayError::Validation("Root folders cannot be renamed".to_string()));
            }
            validate_title(title)?;
            self.ensure_folder_name_free(&folder.parent_id, title, Some(&folder.id))
                .await?;
        }
        if title.is_none() && description.is_none() {
            return Ok(folder);
        }

        let update = LastUpdate::now(ctx.subject());
        let new_title = title.unwrap_or(&folder.meta.title);
        self.store
            .folders
            .set_title(&folder.id, new_title, description, &update)
            .await?;
        self.store.folders.touch(&folder.ancestors, &update).await?;
        self.get_folder(id).await
    }

    /// Rename, redescribe or retag a file.
    pub async fn update_file(
        &self,
        ctx: &RequestContext,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        tags: Option<&[String]>,
    ) -> GatewayResult<File> {
        let file = self.get_file(id).await?;
        let title = title.filter(|t| *t != file.meta.title);
        if let Some(title) = title {
            validate_title(title)?;
            self.ensure_file_name_free(&file.folder_id, title, Some(&file.id)).await?;
        }
        if title.is_none() && description.is_none() && tags.is_none() {
            return Ok(file);
        }

        let update = LastUpdate::now(ctx.subject());
        self.store
            .files
            .set_meta(&file.id, title, description, tags, &update)
            .await?;
        self.store.folders.touch(&file.ancestors, &update).await?;
        self.get_file(id).await
    }

    // ---------------------------------------------------------------------
    // Bookkeeping primitives
    // ---------------------------------------------------------------------

    /// Stamp `last_update` on every folder in `ids` in one pass.
    pub async fn touch_ancestors(&self, ids: &[String], user: &str) -> GatewayResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.folders.touch(ids, &LastUpdate::now(user)).await?;
        Ok(())
    }

    /// Add (or subtract) `delta` bytes on every folder in `ids`.
    pub async fn propagate_size(&self, ids: &[String], delta: i64, add: bool) -> GatewayResult<()> {
        if delta == 0 || ids.is_empty() {
            return Ok(());
        }
        let signed = if add { delta } else { -delta };
        self.store.folders.increment_size(ids, signed).await?;
        Ok(())
    }

    /// Move `size` bytes from the `old` chain to the `new` chain; folders on
    /// both chains are left alone.
    async fn shift_size(&self, old: &[String], new: &[String], size: i64) -> GatewayResult<()> {
        let old_set: HashSet<&String> = old.iter().collect();
        let new_set: HashSet<&String> = new.iter().collect();
        let leaving: Vec<String> = old.iter().filter(|id| !new_set.contains(id)).cloned().collect();
        let joining: Vec<String> = new.iter().filter(|id| !old_set.contains(id)).cloned().collect();
        self.propagate_size(&leaving, size, false).await?;
        self.propagate_size(&joining, size, true).await
    }

    async fn ensure_folder_name_free(&self, parent_id: &str, title: &str, except: Option<&str>) -> GatewayResult<()> {
        let taken = self
            .store
            .folders
            .list_by_parent(parent_id)
            .await?
            .iter()
            .any(|f| f.meta.title == title && Some(f.id.as_str()) != except);
        if taken {
            return Err(GatewayError::NameConflict(format!(
                "Folders in the same path must have different names: {title}"
            )));
        }
        Ok(())
    }

    async fn ensure_file_name_free(&self, folder_id: &str, title: &str, except: Option<&str>) -> GatewayResult<()> {
        let taken = self
            .store
            .files
            .list_by_folder(folder_id)
            .await?
            .iter()
            .any(|f| f.meta.title == title && Some(f.id.as_str()) != except);
        if taken {
            return Err(GatewayError::NameConflict(format!(
                "Files in the same folder must have different names: {title}"
            )));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    /// Remove a file's stored bytes together with its part and stream rows.
    pub(crate) async fn purge_content(&self, file: &File) -> GatewayResult<()> {
        for part in self.store.parts.list_by_file(&file.id).await? {
            self.blobs
                .delete_object(&part.upload_info.bucket, &part.upload_info.key)
                .await?;
        }
        self.store.parts.delete_by_file(&file.id).await?;

        if let Some(stream) = self.store.streams.get_by_file(&file.id).await? {
            match stream.status {
                StreamStatus::Pending | StreamStatus::Closing => {
                    if let Err(e) = self
                        .blobs
                        .abort_multipart(&stream.bucket, &stream.object_key, &stream.id)
                        .await
                    {
                        warn!(file_id = %file.id, error = %e, "[TREE] could not abort multipart session");
                    }
                }
                StreamStatus::Completed => {
                    self.blobs.delete_object(&stream.bucket, &stream.object_key).await?;
                }
            }
            self.store.streams.delete_by_file(&file.id).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn delete_file(&self, ctx: &RequestContext, id: &str) -> GatewayResult<File> {
        let file = self.get_file(id).await?;
        self.purge_content(&file).await?;
        self.store.files.delete(&file.id).await?;
        self.store
            .folders
            .remove_child(&file.folder_id, ChildKind::File, &file.id)
            .await?;
        self.propagate_size(&file.ancestors, file.size, false).await?;
        self.touch_ancestors(&file.ancestors, ctx.subject()).await?;

        info!(file_id = %file.id, size = file.size, "[TREE] file deleted");
        Ok(file)
    }

    /// Delete a folder with every descendant folder, file and stored object.
    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn delete_folder(&self, ctx: &RequestContext, id: &str) -> GatewayResult<Folder> {
        let folder = self.get_folder(id).await?;
        if folder.is_root() {
            return Err(GatewayError::Validation(
                "Root folders are removed together with their bucket".to_string(),
            ));
        }

        for file in self.store.files.list_by_ancestor(&folder.id).await? {
            self.purge_content(&file).await?;
        }
        let files = self.store.files.delete_by_ancestor(&folder.id).await?;
        let folders = self.store.folders.delete_by_ancestor(&folder.id).await?;
        self.store.folders.delete(&folder.id).await?;
        self.store
            .folders
            .remove_child(&folder.parent_id, ChildKind::Folder, &folder.id)
            .await?;
        self.propagate_size(&folder.ancestors, folder.size, false).await?;
        self.touch_ancestors(&folder.ancestors, ctx.subject()).await?;

        info!(folder_id = %folder.id, files, folders, "[TREE] folder deleted");
        Ok(folder)
    }

    // ---------------------------------------------------------------------
    // Moves
    // ---------------------------------------------------------------------

    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn move_file(
        &self,
        ctx: &RequestContext,
        id: &str,
        dest_id: &str,
        new_name: Option<&str>,
    ) -> GatewayResult<File> {
        let file = self.get_file(id).await?;
        let dest = self.get_folder(dest_id).await?;
        let name = pick_name(new_name, &file.meta.title);
        validate_title(&name)?;
        self.ensure_file_name_free(&dest.id, &name, Some(&file.id)).await?;

        if dest.group_id() != file.group_id() {
            self.ensure_relocatable(&file).await?;
            self.relocate_content(&file, dest.group_id()).await?;
        }

        let update = LastUpdate::now(ctx.subject());
        let new_ancestors = dest.lineage();
        self.store
            .files
            .set_lineage(&file.id, &dest.id, &new_ancestors, &update)
            .await?;
        if name != file.meta.title {
            self.store
                .files
                .set_meta(&file.id, Some(&name), None, None, &update)
                .await?;
        }
        if dest.id != file.folder_id {
            self.store
                .folders
                .remove_child(&file.folder_id, ChildKind::File, &file.id)
                .await?;
            self.store.folders.push_child(&dest.id, ChildKind::File, &file.id).await?;
        }
        self.shift_size(&file.ancestors, &new_ancestors, file.size).await?;
        self.touch_ancestors(&merge_chains(&file.ancestors, &new_ancestors), ctx.subject())
            .await?;

        info!(file_id = %file.id, from = %file.folder_id, to = %dest.id, "[TREE] file moved");
        self.get_file(&file.id).await
    }

    /// Move a folder and re-stamp the ancestor chain of everything below it.
    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn move_folder(
        &self,
        ctx: &RequestContext,
        id: &str,
        dest_id: &str,
        new_name: Option<&str>,
    ) -> GatewayResult<Folder> {
        let folder = self.get_folder(id).await?;
        if folder.is_root() {
            return Err(GatewayError::Validation("Root folders cannot be moved".to_string()));
        }
        let dest = self.get_folder(dest_id).await?;
        if dest.id == folder.id || dest.ancestors.contains(&folder.id) {
            return Err(GatewayError::Validation(
                "Destination can't be child of target folder".to_string(),
            ));
        }
        let name = pick_name(new_name, &folder.meta.title);
        validate_title(&name)?;
        self.ensure_folder_name_free(&dest.id, &name, Some(&folder.id)).await?;

        let files = self.store.files.list_by_ancestor(&folder.id).await?;
        let cross_tree = dest.group_id() != folder.group_id();
        if cross_tree {
            for file in &files {
                self.ensure_relocatable(file).await?;
            }
        }

        let update = LastUpdate::now(ctx.subject());
        let new_ancestors = dest.lineage();
        self.store
            .folders
            .set_lineage(&folder.id, &dest.id, &new_ancestors)
            .await?;
        if name != folder.meta.title {
            self.store.folders.set_title(&folder.id, &name, None, &update).await?;
        } else {
            self.store.folders.touch(&[folder.id.clone()], &update).await?;
        }

        for child in self.store.folders.list_by_ancestor(&folder.id).await? {
            let ancestors = restamp(&child.ancestors, &folder.id, &new_ancestors);
            self.store
                .folders
                .set_lineage(&child.id, &child.parent_id, &ancestors)
                .await?;
        }
        for file in &files {
            if cross_tree {
                self.relocate_content(file, dest.group_id()).await?;
            }
            let ancestors = restamp(&file.ancestors, &folder.id, &new_ancestors);
            self.store
                .files
                .set_lineage(&file.id, &file.folder_id, &ancestors, &update)
                .await?;
        }

        self.store
            .folders
            .remove_child(&folder.parent_id, ChildKind::Folder, &folder.id)
            .await?;
        self.store
            .folders
            .push_child(&dest.id, ChildKind::Folder, &folder.id)
            .await?;
        self.shift_size(&folder.ancestors, &new_ancestors, folder.size).await?;
        self.touch_ancestors(&merge_chains(&folder.ancestors, &new_ancestors), ctx.subject())
            .await?;

        info!(folder_id = %folder.id, to = %dest.id, files = files.len(), "[TREE] folder moved");
        self.get_folder(&folder.id).await
    }

    async fn ensure_relocatable(&self, file: &File) -> GatewayResult<()> {
        if let Some(stream) = self.store.streams.get_by_file(&file.id).await? {
            if stream.status != StreamStatus::Completed {
                return Err(GatewayError::Validation(format!(
                    "File {} is still being uploaded",
                    file.id
                )));
            }
        }
        Ok(())
    }

    /// Copy a file's objects into `bucket` and drop the originals.
    async fn relocate_content(&self, file: &File, bucket: &str) -> GatewayResult<()> {
        for part in self.store.parts.list_by_file(&file.id).await? {
            if part.upload_info.bucket == bucket {
                continue;
            }
            let key = part.upload_info.key.clone();
            self.blobs
                .copy_object(&part.upload_info.bucket, &key, bucket, &key)
                .await?;
            self.blobs.delete_object(&part.upload_info.bucket, &key).await?;

            let relocated = Part {
                upload_info: UploadInfo {
                    bucket: bucket.to_string(),
                    key,
                    e_tag: None,
                    version: None,
                },
                ..part.clone()
            };
            self.store.parts.delete(&part.id).await?;
            self.store.parts.insert(&relocated).await?;
        }

        if let Some(stream) = self.store.streams.get_by_file(&file.id).await? {
            if stream.bucket != bucket {
                self.blobs
                    .copy_object(&stream.bucket, &stream.object_key, bucket, &stream.object_key)
                    .await?;
                self.blobs.delete_object(&stream.bucket, &stream.object_key).await?;
                self.store.streams.delete_by_file(&file.id).await?;
                self.store
                    .streams
                    .insert(&Stream {
                        bucket: bucket.to_string(),
                        ..stream
                    })
                    .await?;
            }
        }
        debug!(file_id = %file.id, bucket = %bucket, "[TREE] content relocated");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Copies
    // ---------------------------------------------------------------------

    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn copy_file(
        &self,
        ctx: &RequestContext,
        id: &str,
        dest_id: &str,
        new_name: Option<&str>,
    ) -> GatewayResult<File> {
        let file = self.get_file(id).await?;
        let dest = self.get_folder(dest_id).await?;
        let name = pick_name(new_name, &file.meta.title);
        validate_title(&name)?;
        self.ensure_file_name_free(&dest.id, &name, None).await?;

        let copy = self.copy_file_into(ctx, &file, &dest, &name).await?;
        self.touch_ancestors(&dest.lineage(), ctx.subject()).await?;
        info!(file_id = %file.id, copy_id = %copy.id, to = %dest.id, "[TREE] file copied");
        Ok(copy)
    }

    /// Copy `file` under `dest` as `name`. Objects land in the destination
    /// tree's bucket.
    async fn copy_file_into(&self, ctx: &RequestContext, file: &File, dest: &Folder, name: &str) -> GatewayResult<File> {
        let bucket = dest.group_id().to_string();
        let mut meta = Meta::new(ctx.subject(), name).with_description(file.meta.description.clone());
        meta.read = file.meta.read.clone();
        meta.write = file.meta.write.clone();
        meta.tags = file.meta.tags.clone();

        let mut copy = File {
            id: Ulid::new().to_string(),
            meta,
            folder_id: dest.id.clone(),
            ancestors: dest.lineage(),
            original_title: file.original_title.clone(),
            file_type: file.file_type.clone(),
            size: file.size,
            total_parts: file.total_parts,
            copernicus_fingerprint: None,
            transfer_mode: file.transfer_mode,
        };

        match file.transfer_mode {
            TransferMode::Parts => {
                let mut copied = 0i64;
                for part in self.store.parts.list_by_file(&file.id).await? {
                    let part_id = Ulid::new().to_string();
                    self.blobs
                        .copy_object(&part.upload_info.bucket, &part.upload_info.key, &bucket, &part_id)
                        .await?;
                    self.store
                        .parts
                        .insert(&Part {
                            id: part_id.clone(),
                            file_id: copy.id.clone(),
                            part_number: part.part_number,
                            size: part.size,
                            upload_info: UploadInfo {
                                bucket: bucket.clone(),
                                key: part_id,
                                e_tag: None,
                                version: None,
                            },
                        })
                        .await?;
                    copied += part.size;
                }
                copy.size = copied;
            }
            TransferMode::Stream => {
                if let Some(stream) = self.store.streams.get_by_file(&file.id).await? {
                    if stream.status != StreamStatus::Completed {
                        return Err(GatewayError::Validation(format!(
                            "File {} is still being uploaded",
                            file.id
                        )));
                    }
                    self.blobs
                        .copy_object(&stream.bucket, &stream.object_key, &bucket, &copy.id)
                        .await?;
                    self.store
                        .streams
                        .insert(&Stream {
                            id: Ulid::new().to_string(),
                            file_id: copy.id.clone(),
                            bucket: bucket.clone(),
                            object_key: copy.id.clone(),
                            parts: stream.parts.clone(),
                            total: stream.total,
                            status: StreamStatus::Completed,
                        })
                        .await?;
                }
            }
        }

        self.store.files.insert(&copy).await?;
        self.store.folders.push_child(&dest.id, ChildKind::File, &copy.id).await?;
        self.propagate_size(&copy.ancestors, copy.size, true).await?;
        Ok(copy)
    }

    #[instrument(skip(self, ctx), fields(subject = %ctx.subject()))]
    pub async fn copy_folder(
        &self,
        ctx: &RequestContext,
        id: &str,
        dest_id: &str,
        new_name: Option<&str>,
    ) -> GatewayResult<Folder> {
        let folder = self.get_folder(id).await?;
        let dest = self.get_folder(dest_id).await?;
        if dest.id == folder.id || dest.ancestors.contains(&folder.id) {
            return Err(GatewayError::Validation(
                "Destination can't be child of target folder".to_string(),
            ));
        }
        let name = pick_name(new_name, &folder.meta.title);
        validate_title(&name)?;
        self.ensure_folder_name_free(&dest.id, &name, None).await?;

        let copy = self.copy_folder_into(ctx, &folder, &dest, &name).await?;
        self.touch_ancestors(&dest.lineage(), ctx.subject()).await?;
        info!(folder_id = %folder.id, copy_id = %copy.id, to = %dest.id, "[TREE] folder copied");
        self.get_folder(&copy.id).await
    }

    /// Depth-first copy of `source` under `dest`.
    fn copy_folder_into<'a>(
        &'a self,
        ctx: &'a RequestContext,
        source: &'a Folder,
        dest: &'a Folder,
        name: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Folder>> {
        Box::pin(async move {
            let mut meta = Meta::new(ctx.subject(), name).with_description(source.meta.description.clone());
            meta.read = source.meta.read.clone();
            meta.write = source.meta.write.clone();
            let ancestors = dest.lineage();
            let copy = Folder {
                id: Ulid::new().to_string(),
                meta,
                parent_id: dest.id.clone(),
                level: ancestors.len() as u32,
                ancestors,
                child_file_ids: Vec::new(),
                child_folder_ids: Vec::new(),
                size: 0,
            };
            self.store.folders.insert(&copy).await?;
            self.store
                .folders
                .push_child(&dest.id, ChildKind::Folder, &copy.id)
                .await?;

            for file in self.store.files.list_by_folder(&source.id).await? {
                self.copy_file_into(ctx, &file, &copy, &file.meta.title).await?;
            }
            for child in self.store.folders.list_by_parent(&source.id).await? {
                self.copy_folder_into(ctx, &child, &copy, &child.meta.title).await?;
            }
            Ok(copy)
        })
    }
}

pub(crate) fn validate_title(title: &str) -> GatewayResult<()> {
    if title.trim().is_empty() {
        return Err(GatewayError::Validation("Title is required".to_string()));
    }
    if title.contains('/') {
        return Err(GatewayError::Validation(format!("Title must not contain '/': {title}")));
    }
    Ok(())
}

fn pick_name(new_name: Option<&str>, current: &str) -> String {
    new_name
        .filter(|n| !n.is_empty())
        .unwrap_or(current)
        .to_string()
}

/// Replace everything above `anchor` in `chain` with `new_prefix`.
fn restamp(chain: &[String], anchor: &str, new_prefix: &[String]) -> Vec<String> {
    match chain.iter().position(|id| id == anchor) {
        Some(pos) => new_prefix.iter().chain(chain[pos..].iter()).cloned().collect(),
        None => chain.to_vec(),
    }
}

/// Union of two chains, first occurrence order.
fn merge_chains(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    a.iter()
        .chain(b.iter())
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_restamp_replaces_prefix_above_anchor() {
        let chain = ids(&["g", "a", "m", "x"]);
        let restamped = restamp(&chain, "m", &ids(&["h", "d"]));
        assert_eq!(restamped, ids(&["h", "d", "m", "x"]));
    }

    #[test]
    fn test_merge_chains_dedups() {
        let merged = merge_chains(&ids(&["g", "c"]), &ids(&["g", "d"]));
        assert_eq!(merged, ids(&["g", "c", "d"]));
    }

    #[test]
    fn test_validate_title() {
        assert!(validate_title("reports").is_ok());
        assert!(validate_title("  ").is_err());
        assert!(validate_title("a/b").is_err());
    }
}
