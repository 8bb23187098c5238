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

//! Buckets: a logical blob-store bucket paired with the root folder of the
//! same name.

use arbor_blob::helpers::validate_name;
use arbor_common::RequestContext;
use arbor_meta::Folder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::tree::TreeEngine;
use crate::{GatewayError, GatewayResult};

/// What a bucket deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRemoval {
    pub bucket: String,
    pub objects: usize,
    pub folders: u64,
    pub files: u64,
}

#[derive(Clone)]
pub struct BucketService {
    tree: TreeEngine,
}

impl BucketService {
    pub fn new(tree: TreeEngine) -> Self {
        Self { tree }
    }

    /// Create the bucket and its root folder. Both steps are idempotent.
    pub async fn create_bucket(&self, ctx: &RequestContext, name: &str) -> GatewayResult<Folder> {
        validate_name("bucket", name).map_err(GatewayError::Validation)?;
        self.tree.blobs().create_bucket(name).await?;
        let root = self.tree.create_root(ctx, name).await?;
        info!(bucket = %name, subject = %ctx.subject(), "[BUCKET] bucket ready");
        Ok(root)
    }

    /// Remove every object, then every folder, then every file of the tree.
    ///
    /// A failure stops the sequence; nothing already removed is restored.
    pub async fn delete_bucket(&self, ctx: &RequestContext, id: &str) -> GatewayResult<BucketRemoval> {
        let root = self.tree.get_folder(id).await?;
        if !root.is_root() {
            return Err(GatewayError::Validation(format!("{id} is not a bucket")));
        }
        let store = self.tree.store();

        let objects = self.tree.blobs().delete_bucket(&root.id).await?;
        let folders = store.folders.delete_by_ancestor(&root.id).await?;
        store.folders.delete(&root.id).await?;

        for file in store.files.list_by_ancestor(&root.id).await? {
            store.parts.delete_by_file(&file.id).await?;
            store.streams.delete_by_file(&file.id).await?;
        }
        let files = store.files.delete_by_ancestor(&root.id).await?;

        info!(bucket = %root.id, objects, folders, files, subject = %ctx.subject(), "[BUCKET] bucket deleted");
        Ok(BucketRemoval {
            bucket: root.id,
            objects,
            folders: folders + 1,
            files,
        })
    }
}
