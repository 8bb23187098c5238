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

//! Tests for the object-store backed blob store

use arbor_blob::{BlobError, BlobStore, ObjectBlobStore};
use bytes::Bytes;
use futures::TryStreamExt;

fn create_test_store() -> ObjectBlobStore {
    ObjectBlobStore::in_memory()
}

#[tokio::test]
async fn test_put_and_get_object() {
    let store = create_test_store();
    store.create_bucket("group-1").await.unwrap();

    let receipt = store
        .put_object("group-1", "part-1", Bytes::from_static(b"Hello, World!"))
        .await
        .unwrap();
    assert_eq!(receipt.bucket, "group-1");
    assert_eq!(receipt.key, "part-1");

    let data = store.get_object_bytes("group-1", "part-1", None).await.unwrap();
    assert_eq!(&data[..], b"Hello, World!");
}

#[tokio::test]
async fn test_get_object_range() {
    let store = create_test_store();
    store
        .put_object("group-1", "obj", Bytes::from_static(b"0123456789"))
        .await
        .unwrap();

    let chunks: Vec<Bytes> = store
        .get_object("group-1", "obj", Some(2..5))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
    assert_eq!(joined, b"234");
}

#[tokio::test]
async fn test_get_missing_object_is_not_found() {
    let store = create_test_store();
    let err = store.get_object_bytes("group-1", "missing", None).await.unwrap_err();
    assert!(matches!(err, BlobError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_object_is_idempotent() {
    let store = create_test_store();
    store.put_object("b", "k", Bytes::from_static(b"x")).await.unwrap();
    store.delete_object("b", "k").await.unwrap();
    store.delete_object("b", "k").await.unwrap();
    assert!(store.get_object_bytes("b", "k", None).await.is_err());
}

#[tokio::test]
async fn test_create_bucket_is_idempotent() {
    let store = create_test_store();
    store.create_bucket("group-1").await.unwrap();
    store.create_bucket("group-1").await.unwrap();
}

#[tokio::test]
async fn test_delete_bucket_removes_only_its_objects() {
    let store = create_test_store();
    store.create_bucket("b1").await.unwrap();
    store.create_bucket("b10").await.unwrap();
    for key in ["k1", "k2", "k3"] {
        store.put_object("b1", key, Bytes::from_static(b"data")).await.unwrap();
    }
    store.put_object("b10", "k1", Bytes::from_static(b"keep")).await.unwrap();

    let deleted = store.delete_bucket("b1").await.unwrap();
    assert_eq!(deleted, 4);
    assert!(store.get_object_bytes("b1", "k1", None).await.is_err());
    assert_eq!(&store.get_object_bytes("b10", "k1", None).await.unwrap()[..], b"keep");
}

#[tokio::test]
async fn test_copy_object_across_buckets() {
    let store = create_test_store();
    store.put_object("src", "a", Bytes::from_static(b"payload")).await.unwrap();
    store.copy_object("src", "a", "dst", "b").await.unwrap();

    assert_eq!(&store.get_object_bytes("dst", "b", None).await.unwrap()[..], b"payload");
    assert_eq!(&store.get_object_bytes("src", "a", None).await.unwrap()[..], b"payload");
}

#[tokio::test]
async fn test_multipart_session_assembles_parts_in_order() {
    let store = create_test_store();
    let upload_id = store.open_multipart("b", "file-1").await.unwrap();

    let mut receipts = Vec::new();
    for (n, chunk) in [(1u32, &b"abc"[..]), (2, &b"def"[..]), (3, &b"gh"[..])] {
        let receipt = store
            .put_multipart_part("b", "file-1", &upload_id, n, Bytes::copy_from_slice(chunk))
            .await
            .unwrap();
        assert_eq!(receipt.part_number, n);
        assert_eq!(receipt.size, chunk.len() as i64);
        receipts.push(receipt);
    }
    receipts.reverse();

    store.close_multipart("b", "file-1", &upload_id, &receipts).await.unwrap();
    assert_eq!(&store.get_object_bytes("b", "file-1", None).await.unwrap()[..], b"abcdefgh");
    assert_eq!(&store.get_object_bytes("b", "file-1", Some(3..6)).await.unwrap()[..], b"def");
}

#[tokio::test]
async fn test_part_number_zero_rejected() {
    let store = create_test_store();
    let upload_id = store.open_multipart("b", "file-1").await.unwrap();
    let err = store
        .put_multipart_part("b", "file-1", &upload_id, 0, Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::InvalidInput(_)));
    store.abort_multipart("b", "file-1", &upload_id).await.unwrap();
}

#[tokio::test]
async fn test_keys_with_separators_rejected() {
    let store = create_test_store();
    let err = store
        .put_object("b", "a/b", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::InvalidInput(_)));
}
