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

//! Tree consistency: sizes, moves, copies, deletes and name rules.

use arbor_blob::ObjectBlobStore;
use arbor_common::{Principal, RequestContext};
use arbor_gateway::{BucketService, ErrorKind, NewUpload, TransferCoordinator, TreeEngine};
use arbor_meta::{File, Folder, MetaStore, TransferMode};
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;

struct TestTree {
    tree: TreeEngine,
    buckets: BucketService,
    transfer: TransferCoordinator,
    ctx: RequestContext,
}

fn create_test_tree() -> TestTree {
    let tree = TreeEngine::new(MetaStore::in_memory(), Arc::new(ObjectBlobStore::in_memory()));
    TestTree {
        buckets: BucketService::new(tree.clone()),
        transfer: TransferCoordinator::new(tree.clone(), 100),
        ctx: RequestContext::new(Principal::new("alice").with_groups(["team-a", "team-b"])),
        tree,
    }
}

async fn create_test_file(t: &TestTree, folder: &Folder, name: &str, sizes: &[usize]) -> File {
    let upload = NewUpload {
        folder_id: folder.id.clone(),
        original_title: name.to_string(),
        ..Default::default()
    };
    let file = t
        .transfer
        .initiate_upload(&t.ctx, upload, sizes.len() as u32, TransferMode::Parts)
        .await
        .unwrap();
    for (idx, size) in sizes.iter().enumerate() {
        t.transfer
            .upload_part(&t.ctx, &file.id, idx as u32 + 1, Bytes::from(vec![b'x'; *size]))
            .await
            .unwrap();
    }
    t.tree.get_file(&file.id).await.unwrap()
}

async fn size_of(t: &TestTree, id: &str) -> i64 {
    t.tree.get_folder(id).await.unwrap().size
}

/// R/A/B with one 450-byte file in B.
async fn create_test_chain(t: &TestTree) -> (Folder, Folder, Folder, File) {
    let root = t.buckets.create_bucket(&t.ctx, "team-a").await.unwrap();
    let a = t.tree.create_folder(&t.ctx, &root.id, "A", "").await.unwrap();
    let b = t.tree.create_folder(&t.ctx, &a.id, "B", "").await.unwrap();
    let file = create_test_file(t, &b, "data.csv", &[100, 200, 150]).await;
    (root, a, b, file)
}

#[tokio::test]
async fn test_part_sizes_reach_every_ancestor() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;

    assert_eq!(file.size, 450);
    assert_eq!(file.meta.title, "data");
    assert_eq!(file.file_type, ".csv");
    assert_eq!(file.ancestors, vec![root.id.clone(), a.id.clone(), b.id.clone()]);
    assert_eq!(size_of(&t, &root.id).await, 450);
    assert_eq!(size_of(&t, &a.id).await, 450);
    assert_eq!(size_of(&t, &b.id).await, 450);
    assert_eq!(b.level, 2);
    assert_eq!(b.ancestors, vec![root.id.clone(), a.id.clone()]);
}

#[tokio::test]
async fn test_move_within_root_keeps_root_size() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;

    let moved = t.tree.move_file(&t.ctx, &file.id, &a.id, None).await.unwrap();
    assert_eq!(moved.folder_id, a.id);
    assert_eq!(moved.ancestors, vec![root.id.clone(), a.id.clone()]);
    assert_eq!(size_of(&t, &root.id).await, 450);
    assert_eq!(size_of(&t, &a.id).await, 450);
    assert_eq!(size_of(&t, &b.id).await, 0);

    let a_now = t.tree.get_folder(&a.id).await.unwrap();
    let b_now = t.tree.get_folder(&b.id).await.unwrap();
    assert!(a_now.child_file_ids.contains(&file.id));
    assert!(!b_now.child_file_ids.contains(&file.id));
}

#[tokio::test]
async fn test_move_folder_across_roots_restamps_descendants() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;
    let other = t.buckets.create_bucket(&t.ctx, "team-b").await.unwrap();

    let moved = t.tree.move_folder(&t.ctx, &b.id, &other.id, None).await.unwrap();
    assert_eq!(moved.parent_id, other.id);
    assert_eq!(moved.ancestors, vec![other.id.clone()]);
    assert_eq!(moved.level, 1);
    assert_eq!(size_of(&t, &root.id).await, 0);
    assert_eq!(size_of(&t, &a.id).await, 0);
    assert_eq!(size_of(&t, &other.id).await, 450);
    assert_eq!(size_of(&t, &b.id).await, 450);

    let file = t.tree.get_file(&file.id).await.unwrap();
    assert_eq!(file.ancestors, vec![other.id.clone(), b.id.clone()]);
    assert_eq!(file.group_id(), other.id);

    let download = t.transfer.download_part(&file.id, 2).await.unwrap();
    assert_eq!(download.size, 200);
    let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
    assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 200);
}

#[tokio::test]
async fn test_folder_cannot_move_below_itself() {
    let t = create_test_tree();
    let (_root, a, b, _file) = create_test_chain(&t).await;

    let err = t.tree.move_folder(&t.ctx, &a.id, &b.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    let err = t.tree.move_folder(&t.ctx, &a.id, &a.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    let err = t.tree.copy_folder(&t.ctx, &a.id, &b.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_sibling_names_are_unique() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;

    let err = t.tree.create_folder(&t.ctx, &root.id, "A", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    t.tree.create_folder(&t.ctx, &a.id, "C", "").await.unwrap();
    let err = t.tree.update_folder(&t.ctx, &b.id, Some("C"), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    let other = create_test_file(&t, &b, "other.csv", &[10]).await;
    let err = t
        .tree
        .update_file(&t.ctx, &other.id, Some("data"), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    let renamed = t
        .tree
        .update_file(&t.ctx, &file.id, Some("renamed"), Some("new description"), None)
        .await
        .unwrap();
    assert_eq!(renamed.meta.title, "renamed");
    assert_eq!(renamed.meta.description, "new description");
    assert!(renamed.meta.last_update.is_some());
}

#[tokio::test]
async fn test_delete_file_subtracts_size() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;

    let deleted = t.tree.delete_file(&t.ctx, &file.id).await.unwrap();
    assert_eq!(deleted.size, 450);
    assert_eq!(size_of(&t, &root.id).await, 0);
    assert_eq!(size_of(&t, &a.id).await, 0);
    assert_eq!(size_of(&t, &b.id).await, 0);
    assert!(t.tree.store().parts.list_by_file(&file.id).await.unwrap().is_empty());
    assert_eq!(t.tree.get_file(&file.id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_folder_cascades() {
    let t = create_test_tree();
    let (root, a, b, file) = create_test_chain(&t).await;

    t.tree.delete_folder(&t.ctx, &a.id).await.unwrap();
    assert_eq!(size_of(&t, &root.id).await, 0);
    assert!(t.tree.get_folder(&b.id).await.is_err());
    assert!(t.tree.get_file(&file.id).await.is_err());
    let root = t.tree.get_folder(&root.id).await.unwrap();
    assert!(root.child_folder_ids.is_empty());

    let err = t.tree.delete_folder(&t.ctx, &root.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_copy_folder_duplicates_content() {
    let t = create_test_tree();
    let (root, a, _b, file) = create_test_chain(&t).await;
    let other = t.buckets.create_bucket(&t.ctx, "team-b").await.unwrap();

    let copy = t.tree.copy_folder(&t.ctx, &a.id, &other.id, Some("A-copy")).await.unwrap();
    assert_eq!(copy.meta.title, "A-copy");
    assert_eq!(copy.size, 450);
    assert_eq!(size_of(&t, &other.id).await, 450);
    assert_eq!(size_of(&t, &root.id).await, 450);

    let copied_b = t.tree.list_folder(&copy.id).await.unwrap();
    assert_eq!(copied_b.folders.len(), 1);
    let (b_copy_id, _) = copied_b.folders.iter().next().unwrap();
    let files = t.tree.list_folder(b_copy_id).await.unwrap();
    assert_eq!(files.files.len(), 1);
    let (file_copy_id, meta) = files.files.iter().next().unwrap();
    assert_eq!(meta.title, "data");
    assert_ne!(file_copy_id, &file.id);

    let parts = t.tree.store().parts.list_by_file(file_copy_id).await.unwrap();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.upload_info.bucket == other.id));
}

#[tokio::test]
async fn test_copy_file_name_conflict() {
    let t = create_test_tree();
    let (_root, _a, b, file) = create_test_chain(&t).await;

    let err = t.tree.copy_file(&t.ctx, &file.id, &b.id, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    let copy = t.tree.copy_file(&t.ctx, &file.id, &b.id, Some("data-2")).await.unwrap();
    assert_eq!(copy.size, 450);
    assert_eq!(size_of(&t, &b.id).await, 900);
}

#[tokio::test]
async fn test_resolve_path_and_locate() {
    let t = create_test_tree();
    let (root, a, b, _file) = create_test_chain(&t).await;

    assert_eq!(t.tree.resolve_path("/team-a").await.unwrap().id, root.id);
    assert_eq!(t.tree.resolve_path("/team-a/A").await.unwrap().id, a.id);
    assert_eq!(t.tree.resolve_path("/team-a/A/B").await.unwrap().id, b.id);
    assert_eq!(
        t.tree.resolve_path("/team-a/B").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let err = t
        .tree
        .locate_folder(Some(&a.id), Some("/team-a/A"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    assert_eq!(t.tree.locate_folder(Some(&a.id), None).await.unwrap().id, a.id);
}

#[tokio::test]
async fn test_root_rules() {
    let t = create_test_tree();
    let root = t.buckets.create_bucket(&t.ctx, "team-a").await.unwrap();
    assert_eq!(root.id, "team-a");
    assert_eq!(root.meta.description, "Main folder.");
    assert!(root.is_root());

    let again = t.buckets.create_bucket(&t.ctx, "team-a").await.unwrap();
    assert_eq!(again.id, root.id);

    let err = t.tree.update_folder(&t.ctx, &root.id, Some("renamed"), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}
