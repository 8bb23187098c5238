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

//! Behavioural tests run against every metadata backend.

use arbor_meta::{
    ChildKind, File, Folder, LastUpdate, Meta, MetaError, MetaStore, Stream, StreamPart, StreamStatus, TaskDetails,
    TaskRecord, TaskStatus, TransferMode, MAX_UPDATE_HISTORY,
};
use chrono::Utc;

fn folder(id: &str, ancestors: &[&str]) -> Folder {
    Folder {
        id: id.to_string(),
        meta: Meta::new("alice", id),
        parent_id: ancestors.last().map(|s| s.to_string()).unwrap_or_default(),
        ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
        level: ancestors.len() as u32,
        child_file_ids: vec![],
        child_folder_ids: vec![],
        size: 0,
    }
}

fn file(id: &str, ancestors: &[&str]) -> File {
    File {
        id: id.to_string(),
        meta: Meta::new("alice", id),
        folder_id: ancestors.last().map(|s| s.to_string()).unwrap_or_default(),
        ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
        original_title: format!("{id}.nc"),
        file_type: ".nc".to_string(),
        size: 0,
        total_parts: 0,
        copernicus_fingerprint: None,
        transfer_mode: TransferMode::Parts,
    }
}

fn task(id: &str, status: TaskStatus) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        file_id: format!("file-{id}"),
        dataset_name: "reanalysis-era5-single-levels".to_string(),
        request_params: serde_json::json!({"year": "2020"}),
        task_details: TaskDetails {
            job_id: format!("job-{id}"),
            service: "cds".to_string(),
            status,
            error: None,
        },
        submitted_by: "alice".to_string(),
        created_at: Utc::now(),
    }
}

async fn folder_children_and_sizes(store: MetaStore) {
    store.folders.insert(&folder("root", &[])).await.unwrap();
    store.folders.insert(&folder("a", &["root"])).await.unwrap();
    store.folders.insert(&folder("b", &["root", "a"])).await.unwrap();

    let err = store.folders.insert(&folder("a", &["root"])).await.unwrap_err();
    assert!(matches!(err, MetaError::AlreadyExists { .. }));

    store.folders.push_child("root", ChildKind::Folder, "a").await.unwrap();
    store.folders.push_child("a", ChildKind::Folder, "b").await.unwrap();
    store.folders.push_child("a", ChildKind::Folder, "b").await.unwrap();
    store.folders.push_child("a", ChildKind::File, "f1").await.unwrap();
    store.folders.push_child("a", ChildKind::File, "f2").await.unwrap();
    store.folders.push_child("a", ChildKind::File, "f3").await.unwrap();
    store.folders.remove_child("a", ChildKind::File, "f2").await.unwrap();

    let a = store.folders.get("a").await.unwrap().unwrap();
    assert_eq!(a.child_folder_ids, vec!["b"]);
    assert_eq!(a.child_file_ids, vec!["f1", "f3"]);

    let err = store.folders.push_child("missing", ChildKind::File, "x").await.unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));

    let chain = vec!["root".to_string(), "a".to_string(), "b".to_string()];
    store.folders.increment_size(&chain, 100).await.unwrap();
    store.folders.increment_size(&chain[..2], -40).await.unwrap();
    let sizes: Vec<i64> = {
        let mut found = store.folders.get_many(&chain).await.unwrap();
        found.sort_by_key(|f| f.level);
        found.iter().map(|f| f.size).collect()
    };
    assert_eq!(sizes, vec![60, 60, 100]);

    let under_root = store.folders.list_by_ancestor("root").await.unwrap();
    let ids: Vec<&str> = under_root.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let children = store.folders.list_by_parent("a").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, "b");

    let root = store.folders.find_root_by_title("root").await.unwrap().unwrap();
    assert_eq!(root.id, "root");
    assert!(store.folders.find_root_by_title("a").await.unwrap().is_none());
    assert_eq!(store.folders.find_by_title_and_level("b", 2).await.unwrap().len(), 1);

    assert_eq!(store.folders.delete_by_ancestor("a").await.unwrap(), 1);
    assert!(store.folders.get("b").await.unwrap().is_none());
    assert!(store.folders.delete("a").await.unwrap());
    assert!(!store.folders.delete("a").await.unwrap());
}

async fn folder_lineage_title_and_history(store: MetaStore) {
    store.folders.insert(&folder("root", &[])).await.unwrap();
    store.folders.insert(&folder("other", &[])).await.unwrap();
    store.folders.insert(&folder("a", &["root"])).await.unwrap();

    store
        .folders
        .set_lineage("a", "other", &["other".to_string()])
        .await
        .unwrap();
    store
        .folders
        .set_title("a", "renamed", Some("moved"), &LastUpdate::now("bob"))
        .await
        .unwrap();

    let a = store.folders.get("a").await.unwrap().unwrap();
    assert_eq!(a.parent_id, "other");
    assert_eq!(a.ancestors, vec!["other"]);
    assert_eq!(a.level, 1);
    assert_eq!(a.meta.title, "renamed");
    assert_eq!(a.meta.description, "moved");
    assert_eq!(a.meta.last_update.as_ref().map(|u| u.user.as_str()), Some("bob"));

    let ids = vec!["a".to_string()];
    for i in 0..MAX_UPDATE_HISTORY + 5 {
        store.folders.touch(&ids, &LastUpdate::now(format!("user-{i}"))).await.unwrap();
    }
    let a = store.folders.get("a").await.unwrap().unwrap();
    assert_eq!(a.meta.history.len(), MAX_UPDATE_HISTORY);
    let last = format!("user-{}", MAX_UPDATE_HISTORY + 4);
    assert_eq!(a.meta.history.last().map(|u| u.user.clone()), Some(last.clone()));
    assert_eq!(a.meta.last_update.map(|u| u.user), Some(last));
}

async fn files_and_parts(store: MetaStore) {
    let mut f = file("f1", &["root", "a"]);
    f.copernicus_fingerprint = Some("abc123".to_string());
    store.files.insert(&f).await.unwrap();
    store.files.insert(&file("f2", &["root"])).await.unwrap();

    assert_eq!(store.files.increment_size("f1", 10).await.unwrap(), 10);
    assert_eq!(store.files.increment_size("f1", 5).await.unwrap(), 15);
    store.files.set_total_parts("f1", 3).await.unwrap();

    let found = store.files.find_by_fingerprint("abc123").await.unwrap().unwrap();
    assert_eq!(found.id, "f1");
    assert_eq!(found.size, 15);
    assert_eq!(found.total_parts, 3);

    store
        .files
        .set_meta("f1", Some("data"), None, Some(&["era5".to_string()]), &LastUpdate::now("bob"))
        .await
        .unwrap();
    store
        .files
        .set_lineage("f1", "root", &["root".to_string()], &LastUpdate::now("bob"))
        .await
        .unwrap();
    let f1 = store.files.get("f1").await.unwrap().unwrap();
    assert_eq!(f1.meta.title, "data");
    assert_eq!(f1.meta.tags, vec!["era5"]);
    assert_eq!(f1.folder_id, "root");
    assert_eq!(store.files.list_by_folder("root").await.unwrap().len(), 2);

    for n in [2u32, 1, 3] {
        let part = arbor_meta::Part {
            id: format!("p{n}"),
            file_id: "f1".to_string(),
            part_number: n,
            size: n as i64,
            upload_info: arbor_meta::UploadInfo {
                bucket: "b".to_string(),
                key: format!("p{n}"),
                e_tag: Some(format!("etag-{n}")),
                version: None,
            },
        };
        store.parts.insert(&part).await.unwrap();
    }
    let numbers: Vec<u32> = store
        .parts
        .list_by_file("f1")
        .await
        .unwrap()
        .iter()
        .map(|p| p.part_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let p2 = store.parts.get_by_number("f1", 2).await.unwrap().unwrap();
    assert_eq!(p2.upload_info.e_tag.as_deref(), Some("etag-2"));
    assert_eq!(store.parts.delete_by_file("f1").await.unwrap(), 3);

    assert_eq!(store.files.delete_by_ancestor("root").await.unwrap(), 2);
}

async fn streams(store: MetaStore) {
    let stream = Stream {
        id: "upload-1".to_string(),
        file_id: "f1".to_string(),
        bucket: "b".to_string(),
        object_key: "f1".to_string(),
        parts: vec![],
        total: 2,
        status: StreamStatus::Pending,
    };
    store.streams.insert(&stream).await.unwrap();

    let receipt = |n: u32, etag: &str| StreamPart {
        part_number: n,
        etag: etag.to_string(),
        size: 10,
    };
    store.streams.add_part("upload-1", &receipt(2, "x")).await.unwrap();
    let after = store.streams.add_part("upload-1", &receipt(1, "y")).await.unwrap();
    assert_eq!(after.parts.len(), 2);
    assert_eq!(after.parts[0].part_number, 1);

    let err = store.streams.add_part("upload-1", &receipt(2, "z")).await.unwrap_err();
    assert!(matches!(err, MetaError::AlreadyExists { .. }));
    let err = store.streams.add_part("missing", &receipt(1, "z")).await.unwrap_err();
    assert!(matches!(err, MetaError::NotFound { .. }));
    let stored = store.streams.get("upload-1").await.unwrap().unwrap();
    assert_eq!(stored.parts.iter().find(|p| p.part_number == 2).unwrap().etag, "x");

    assert!(!store.streams.mark_completed("upload-1").await.unwrap());
    assert!(store.streams.begin_close("upload-1").await.unwrap());
    assert!(!store.streams.begin_close("upload-1").await.unwrap());
    assert_eq!(
        store.streams.get("upload-1").await.unwrap().unwrap().status,
        StreamStatus::Closing
    );
    assert!(store.streams.abort_close("upload-1").await.unwrap());
    assert!(store.streams.begin_close("upload-1").await.unwrap());
    assert!(store.streams.mark_completed("upload-1").await.unwrap());
    assert!(!store.streams.mark_completed("upload-1").await.unwrap());
    let stored = store.streams.get_by_file("f1").await.unwrap().unwrap();
    assert_eq!(stored.status, StreamStatus::Completed);
    assert_eq!(stored.part_range(2), Some(10..20));

    assert_eq!(store.streams.delete_by_file("f1").await.unwrap(), 1);
}

async fn task_records(store: MetaStore) {
    let (stored, created) = store.tasks.insert_if_absent(&task("t1", TaskStatus::Running)).await.unwrap();
    assert!(created);
    assert_eq!(stored.task_details.job_id, "job-t1");

    let mut other = task("t1", TaskStatus::Submitted);
    other.task_details.job_id = "another".to_string();
    let (stored, created) = store.tasks.insert_if_absent(&other).await.unwrap();
    assert!(!created);
    assert_eq!(stored.task_details.job_id, "job-t1");

    store.tasks.insert_if_absent(&task("t2", TaskStatus::Successful)).await.unwrap();
    let unfinished = store.tasks.list_unfinished().await.unwrap();
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].id, "t1");

    let mut done = stored.clone();
    done.task_details.status = TaskStatus::Failed;
    store.tasks.update(&done).await.unwrap();
    assert!(store.tasks.list_unfinished().await.unwrap().is_empty());
}

mod memory {
    use super::*;

    #[tokio::test]
    async fn test_folder_children_and_sizes() {
        folder_children_and_sizes(MetaStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_folder_lineage_title_and_history() {
        folder_lineage_title_and_history(MetaStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_files_and_parts() {
        files_and_parts(MetaStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_streams() {
        streams(MetaStore::in_memory()).await;
    }

    #[tokio::test]
    async fn test_task_records() {
        task_records(MetaStore::in_memory()).await;
    }
}

#[cfg(feature = "sql-backend")]
mod sqlite {
    use super::*;
    use arbor_meta::SqliteMetaStore;

    async fn store() -> MetaStore {
        MetaStore::sqlite(SqliteMetaStore::new("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_folder_children_and_sizes() {
        folder_children_and_sizes(store().await).await;
    }

    #[tokio::test]
    async fn test_folder_lineage_title_and_history() {
        folder_lineage_title_and_history(store().await).await;
    }

    #[tokio::test]
    async fn test_files_and_parts() {
        files_and_parts(store().await).await;
    }

    #[tokio::test]
    async fn test_streams() {
        streams(store().await).await;
    }

    #[tokio::test]
    async fn test_task_records() {
        task_records(store().await).await;
    }

    #[tokio::test]
    async fn test_concurrent_size_increments() {
        let store = store().await;
        store.folders.insert(&folder("root", &[])).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let folders = store.folders.clone();
            handles.push(tokio::spawn(async move {
                folders.increment_size(&["root".to_string()], 5).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.folders.get("root").await.unwrap().unwrap().size, 100);
    }
}
