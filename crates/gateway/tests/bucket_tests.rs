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

//! Bucket lifecycle.

use arbor_blob::ObjectBlobStore;
use arbor_common::{Principal, RequestContext};
use arbor_gateway::{BucketService, ErrorKind, NewUpload, TransferCoordinator, TreeEngine};
use arbor_meta::{MetaStore, TransferMode};
use bytes::Bytes;
use std::sync::Arc;

struct TestBuckets {
    tree: TreeEngine,
    buckets: BucketService,
    transfer: TransferCoordinator,
    ctx: RequestContext,
}

fn create_test_buckets() -> TestBuckets {
    let tree = TreeEngine::new(MetaStore::in_memory(), Arc::new(ObjectBlobStore::in_memory()));
    TestBuckets {
        buckets: BucketService::new(tree.clone()),
        transfer: TransferCoordinator::new(tree.clone(), 100),
        ctx: RequestContext::new(Principal::new("alice").with_groups(["archive"])),
        tree,
    }
}

#[tokio::test]
async fn test_create_bucket_is_idempotent() {
    let t = create_test_buckets();
    let first = t.buckets.create_bucket(&t.ctx, "archive").await.unwrap();
    let second = t.buckets.create_bucket(&t.ctx, "archive").await.unwrap();
    assert_eq!(first.id, "archive");
    assert_eq!(first.meta.title, "archive");
    assert!(first.is_root());
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_create_bucket_rejects_bad_names() {
    let t = create_test_buckets();
    for name in ["", "a/b", ".", ".."] {
        let err = t.buckets.create_bucket(&t.ctx, name).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure, "name {name:?}");
    }
}

#[tokio::test]
async fn test_delete_bucket_removes_everything() {
    let t = create_test_buckets();
    let root = t.buckets.create_bucket(&t.ctx, "archive").await.unwrap();
    let a = t.tree.create_folder(&t.ctx, &root.id, "2024", "").await.unwrap();
    let b = t.tree.create_folder(&t.ctx, &a.id, "q1", "").await.unwrap();

    for (folder, name) in [(&a, "summary.pdf"), (&b, "raw.bin")] {
        let upload = NewUpload {
            folder_id: folder.id.clone(),
            original_title: name.to_string(),
            ..Default::default()
        };
        let file = t
            .transfer
            .initiate_upload(&t.ctx, upload, 2, TransferMode::Parts)
            .await
            .unwrap();
        for part in 1..=2u32 {
            t.transfer
                .upload_part(&t.ctx, &file.id, part, Bytes::from_static(b"0123456789"))
                .await
                .unwrap();
        }
    }

    let removal = t.buckets.delete_bucket(&t.ctx, "archive").await.unwrap();
    assert_eq!(removal.bucket, "archive");
    assert_eq!(removal.folders, 3);
    assert_eq!(removal.files, 2);
    // four parts and the bucket marker
    assert_eq!(removal.objects, 5);

    let err = t.tree.get_folder(&b.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(t.tree.store().files.list_by_ancestor("archive").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_bucket_requires_a_root() {
    let t = create_test_buckets();
    let root = t.buckets.create_bucket(&t.ctx, "archive").await.unwrap();
    let child = t.tree.create_folder(&t.ctx, &root.id, "inner", "").await.unwrap();

    let err = t.buckets.delete_bucket(&t.ctx, &child.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    let err = t.buckets.delete_bucket(&t.ctx, "nowhere").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
