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

//! Multipart transfers: validation, progress, stream sessions and ingestion.

use arbor_blob::{BlobError, BlobResult, BlobStore, ByteStream, ObjectBlobStore, ObjectReceipt, PartReceipt};
use arbor_common::{Principal, RequestContext};
use arbor_gateway::{BucketService, ErrorKind, NewUpload, TransferCoordinator, TransferState, TreeEngine};
use arbor_meta::{File, Folder, MetaStore, StreamStatus, TransferMode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use futures::TryStreamExt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Blob store whose first `failing_closes` multipart closes fail.
struct FlakyCloseBlobs {
    inner: ObjectBlobStore,
    failing_closes: AtomicU32,
}

#[async_trait]
impl BlobStore for FlakyCloseBlobs {
    async fn create_bucket(&self, bucket: &str) -> BlobResult<()> {
        self.inner.create_bucket(bucket).await
    }

    async fn delete_bucket(&self, bucket: &str) -> BlobResult<usize> {
        self.inner.delete_bucket(bucket).await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> BlobResult<ObjectReceipt> {
        self.inner.put_object(bucket, key, data).await
    }

    async fn get_object(&self, bucket: &str, key: &str, range: Option<Range<u64>>) -> BlobResult<ByteStream> {
        self.inner.get_object(bucket, key, range).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> BlobResult<()> {
        self.inner.delete_object(bucket, key).await
    }

    async fn copy_object(&self, src_bucket: &str, src_key: &str, dst_bucket: &str, dst_key: &str) -> BlobResult<()> {
        self.inner.copy_object(src_bucket, src_key, dst_bucket, dst_key).await
    }

    async fn open_multipart(&self, bucket: &str, key: &str) -> BlobResult<String> {
        self.inner.open_multipart(bucket, key).await
    }

    async fn put_multipart_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<PartReceipt> {
        self.inner
            .put_multipart_part(bucket, key, upload_id, part_number, data)
            .await
    }

    async fn close_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> BlobResult<ObjectReceipt> {
        let remaining = self.failing_closes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_closes.store(remaining - 1, Ordering::SeqCst);
            return Err(BlobError::InternalError("backend unavailable".to_string()));
        }
        self.inner.close_multipart(bucket, key, upload_id, parts).await
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> BlobResult<()> {
        self.inner.abort_multipart(bucket, key, upload_id).await
    }
}

async fn create_test_transfer() -> (TreeEngine, TransferCoordinator, RequestContext, Folder) {
    let tree = TreeEngine::new(MetaStore::in_memory(), Arc::new(ObjectBlobStore::in_memory()));
    let ctx = RequestContext::new(Principal::new("alice").with_groups(["team-a"]));
    let root = BucketService::new(tree.clone()).create_bucket(&ctx, "team-a").await.unwrap();
    let folder = tree.create_folder(&ctx, &root.id, "uploads", "").await.unwrap();
    let transfer = TransferCoordinator::new(tree.clone(), 100).with_ingest_concurrency(2);
    (tree, transfer, ctx, folder)
}

async fn create_test_upload(
    transfer: &TransferCoordinator,
    ctx: &RequestContext,
    folder: &Folder,
    total: u32,
    mode: TransferMode,
) -> File {
    let upload = NewUpload {
        folder_id: folder.id.clone(),
        original_title: "scan.tar.gz".to_string(),
        description: "nightly".to_string(),
        tags: vec!["raw".to_string()],
    };
    transfer.initiate_upload(ctx, upload, total, mode).await.unwrap()
}

async fn read_part(transfer: &TransferCoordinator, file_id: &str, part: u32) -> Vec<u8> {
    let download = transfer.download_part(file_id, part).await.unwrap();
    let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
    chunks.iter().flat_map(|c| c.iter().copied()).collect()
}

#[tokio::test]
async fn test_initiate_validates_input() {
    let (_tree, transfer, ctx, folder) = create_test_transfer().await;

    let upload = NewUpload {
        folder_id: folder.id.clone(),
        original_title: "a.bin".to_string(),
        ..Default::default()
    };
    let err = transfer
        .initiate_upload(&ctx, upload.clone(), 0, TransferMode::Parts)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    let missing = NewUpload {
        folder_id: "nope".to_string(),
        ..upload
    };
    let err = transfer
        .initiate_upload(&ctx, missing, 1, TransferMode::Parts)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let file = create_test_upload(&transfer, &ctx, &folder, 2, TransferMode::Parts).await;
    assert_eq!(file.meta.title, "scan.tar");
    assert_eq!(file.original_title, "scan.tar.gz");
    assert_eq!(file.file_type, ".gz");
    assert_eq!(file.meta.tags, vec!["raw".to_string()]);
    assert_eq!(file.size, 0);
    assert_eq!(transfer.transfer_state(&file.id).await.unwrap(), TransferState::Initiated);
}

#[tokio::test]
async fn test_derived_titles_are_validated() {
    let (_tree, transfer, ctx, folder) = create_test_transfer().await;

    let dotfile = NewUpload {
        folder_id: folder.id.clone(),
        original_title: ".env".to_string(),
        ..Default::default()
    };
    let file = transfer
        .initiate_upload(&ctx, dotfile.clone(), 1, TransferMode::Parts)
        .await
        .unwrap();
    assert_eq!(file.meta.title, ".env");
    assert_eq!(file.file_type, "");

    for bad in ["uploads/", " .txt"] {
        let upload = NewUpload {
            original_title: bad.to_string(),
            ..dotfile.clone()
        };
        let err = transfer
            .initiate_upload(&ctx, upload, 1, TransferMode::Parts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }
}

#[tokio::test]
async fn test_part_numbers_are_checked() {
    let (_tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 2, TransferMode::Parts).await;

    for bad in [0, 3] {
        let err = transfer
            .upload_part(&ctx, &file.id, bad, Bytes::from_static(b"abc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    transfer
        .upload_part(&ctx, &file.id, 1, Bytes::from_static(b"abc"))
        .await
        .unwrap();
    let err = transfer
        .upload_part(&ctx, &file.id, 1, Bytes::from_static(b"abcdef"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    let file = transfer.file_info(&file.id).await.unwrap().file;
    assert_eq!(file.size, 3);
    assert_eq!(read_part(&transfer, &file.id, 1).await, b"abc");
}

#[tokio::test]
async fn test_progress_and_info() {
    let (tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 3, TransferMode::Parts).await;

    transfer
        .upload_part(&ctx, &file.id, 2, Bytes::from(vec![1u8; 150]))
        .await
        .unwrap();
    assert_eq!(
        transfer.transfer_state(&file.id).await.unwrap(),
        TransferState::PartsInFlight { completed: 1, total: 3 }
    );
    assert!(!transfer.is_complete(&file.id).await.unwrap());

    transfer
        .upload_part(&ctx, &file.id, 1, Bytes::from(vec![2u8; 150]))
        .await
        .unwrap();
    transfer
        .upload_part(&ctx, &file.id, 3, Bytes::from(vec![3u8; 150]))
        .await
        .unwrap();
    assert_eq!(transfer.transfer_state(&file.id).await.unwrap(), TransferState::Completed);
    assert!(transfer.is_complete(&file.id).await.unwrap());

    let info = transfer.file_info(&file.id).await.unwrap();
    assert_eq!(info.file.size, 450);
    assert_eq!(info.parts, 5);
    assert_eq!(tree.get_folder(&folder.id).await.unwrap().size, 450);
    assert_eq!(tree.get_folder("team-a").await.unwrap().size, 450);
}

#[tokio::test]
async fn test_concurrent_part_uploads_are_all_counted() {
    let (tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 8, TransferMode::Parts).await;

    let uploads = (1..=8u32).map(|n| {
        let transfer = transfer.clone();
        let ctx = ctx.clone();
        let file_id = file.id.clone();
        async move {
            transfer
                .upload_part(&ctx, &file_id, n, Bytes::from(vec![0u8; 10 * n as usize]))
                .await
        }
    });
    for result in join_all(uploads).await {
        result.unwrap();
    }

    let expected: i64 = (1..=8).map(|n| 10 * n).sum();
    assert_eq!(tree.get_file(&file.id).await.unwrap().size, expected);
    assert_eq!(tree.get_folder(&folder.id).await.unwrap().size, expected);
    assert!(transfer.is_complete(&file.id).await.unwrap());
}

#[tokio::test]
async fn test_stream_session_closes_once() {
    let (tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 2, TransferMode::Stream).await;

    transfer
        .upload_part(&ctx, &file.id, 1, Bytes::from_static(b"hello "))
        .await
        .unwrap();
    let err = transfer.download_part(&file.id, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);

    transfer
        .upload_part(&ctx, &file.id, 2, Bytes::from_static(b"world"))
        .await
        .unwrap();
    let stream = tree.store().streams.get_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(stream.status, StreamStatus::Completed);
    assert_eq!(stream.parts.len(), 2);

    assert_eq!(read_part(&transfer, &file.id, 1).await, b"hello ");
    assert_eq!(read_part(&transfer, &file.id, 2).await, b"world");
    assert_eq!(tree.get_file(&file.id).await.unwrap().size, 11);

    let err = transfer
        .upload_part(&ctx, &file.id, 2, Bytes::from_static(b"again"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_failed_stream_close_is_retried() {
    let blobs = Arc::new(FlakyCloseBlobs {
        inner: ObjectBlobStore::in_memory(),
        failing_closes: AtomicU32::new(1),
    });
    let tree = TreeEngine::new(MetaStore::in_memory(), blobs);
    let ctx = RequestContext::new(Principal::new("alice").with_groups(["team-a"]));
    let root = BucketService::new(tree.clone()).create_bucket(&ctx, "team-a").await.unwrap();
    let folder = tree.create_folder(&ctx, &root.id, "uploads", "").await.unwrap();
    let transfer = TransferCoordinator::new(tree.clone(), 100);
    let file = create_test_upload(&transfer, &ctx, &folder, 2, TransferMode::Stream).await;

    transfer
        .upload_part(&ctx, &file.id, 1, Bytes::from_static(b"left "))
        .await
        .unwrap();
    transfer
        .upload_part(&ctx, &file.id, 2, Bytes::from_static(b"right"))
        .await
        .unwrap();
    let stream = tree.store().streams.get_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(stream.status, StreamStatus::Pending);
    assert_eq!(stream.parts.len(), 2);

    assert_eq!(read_part(&transfer, &file.id, 2).await, b"right");
    let stream = tree.store().streams.get_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(stream.status, StreamStatus::Completed);
    assert_eq!(read_part(&transfer, &file.id, 1).await, b"left ");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stream_part_is_recorded_once() {
    let (tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 3, TransferMode::Stream).await;

    let uploads = (0..4).map(|_| {
        let transfer = transfer.clone();
        let ctx = ctx.clone();
        let id = file.id.clone();
        tokio::spawn(async move {
            transfer
                .upload_part(&ctx, &id, 1, Bytes::from_static(b"same"))
                .await
        })
    });
    let mut stored = 0;
    for result in join_all(uploads).await {
        match result.unwrap() {
            Ok(_) => stored += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::NameConflict),
        }
    }
    assert_eq!(stored, 1);

    let stream = tree.store().streams.get_by_file(&file.id).await.unwrap().unwrap();
    assert_eq!(stream.parts.len(), 1);
    assert_eq!(stream.status, StreamStatus::Pending);
}

#[tokio::test]
async fn test_ingest_replaces_content() {
    let (tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 1, TransferMode::Parts).await;

    let chunks = vec![
        Bytes::from(vec![1u8; 100]),
        Bytes::from(vec![2u8; 100]),
        Bytes::from(vec![3u8; 40]),
    ];
    let ingested = transfer.ingest(&ctx, &file.id, chunks).await.unwrap();
    assert_eq!(ingested.total_parts, 3);
    assert_eq!(ingested.size, 240);
    assert_eq!(tree.get_folder(&folder.id).await.unwrap().size, 240);
    assert_eq!(read_part(&transfer, &file.id, 3).await, vec![3u8; 40]);

    let again = transfer
        .ingest(&ctx, &file.id, vec![Bytes::from(vec![9u8; 70])])
        .await
        .unwrap();
    assert_eq!(again.total_parts, 1);
    assert_eq!(again.size, 70);
    assert_eq!(tree.get_folder("team-a").await.unwrap().size, 70);
    assert_eq!(tree.store().parts.list_by_file(&file.id).await.unwrap().len(), 1);

    let err = transfer.ingest(&ctx, &file.id, Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}

#[tokio::test]
async fn test_ingest_rejects_stream_files() {
    let (_tree, transfer, ctx, folder) = create_test_transfer().await;
    let file = create_test_upload(&transfer, &ctx, &folder, 1, TransferMode::Stream).await;
    let err = transfer
        .ingest(&ctx, &file.id, vec![Bytes::from_static(b"x")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
}
