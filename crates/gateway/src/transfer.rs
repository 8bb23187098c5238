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

//! Multipart Transfer Coordinator
//!
//! ## Purpose
//! Moves a file's bytes in numbered parts. Two layouts are supported:
//! - [`TransferMode::Parts`]: every part is its own object keyed by the part
//!   id; completion is simply "all part numbers are present".
//! - [`TransferMode::Stream`]: every part is a chunk of one blob-store
//!   multipart session; the upload that records the last receipt closes the
//!   session, exactly once, through a compare-and-set on the stream row.
//!
//! ## Size accounting
//! A file's size is the sum of persisted parts. Each accepted part adds its
//! length to the file and to every folder on the file's ancestor chain.

use arbor_blob::{BlobStore, ByteStream, PartReceipt};
use arbor_common::RequestContext;
use arbor_meta::{
    ChildKind, File, Meta, MetaError, MetaStore, Part, Stream, StreamPart, StreamStatus, TransferMode, UploadInfo,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::tree::{validate_title, TreeEngine};
use crate::{GatewayError, GatewayResult};

/// Client-supplied fields of a new upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUpload {
    #[serde(rename = "folder")]
    pub folder_id: String,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Progress of a file's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferState {
    Initiated,
    PartsInFlight { completed: u32, total: u32 },
    Completed,
}

/// A file plus the number of `part_size` chunks its content spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file: File,
    pub parts: u64,
}

/// Bytes of one part, ready to be streamed out.
pub struct PartDownload {
    pub size: u64,
    pub stream: ByteStream,
}

impl fmt::Debug for PartDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartDownload")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct TransferCoordinator {
    tree: TreeEngine,
    part_size: usize,
    ingest_concurrency: usize,
}

impl TransferCoordinator {
    pub fn new(tree: TreeEngine, part_size: usize) -> Self {
        Self {
            tree,
            part_size: part_size.max(1),
            ingest_concurrency: 8,
        }
    }

    /// Bound on concurrent part uploads during [`ingest`](Self::ingest) (builder pattern)
    pub fn with_ingest_concurrency(mut self, ingest_concurrency: usize) -> Self {
        self.ingest_concurrency = ingest_concurrency.max(1);
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    fn store(&self) -> &MetaStore {
        self.tree.store()
    }

    fn blobs(&self) -> &Arc<dyn BlobStore> {
        self.tree.blobs()
    }

    /// Create the File row (size 0) under the target folder. Stream-mode
    /// uploads also open the blob-store session here.
    pub async fn initiate_upload(
        &self,
        ctx: &RequestContext,
        upload: NewUpload,
        total_parts: u32,
        mode: TransferMode,
    ) -> GatewayResult<File> {
        if total_parts == 0 {
            return Err(GatewayError::Validation("total must be at least 1".to_string()));
        }
        let (base, title, extension) = split_title(&upload.original_title);
        if base.is_empty() {
            return Err(GatewayError::Validation("original_title is required".to_string()));
        }
        validate_title(title)?;
        let folder = self.tree.get_folder(&upload.folder_id).await?;

        let mut meta = Meta::new(ctx.subject(), title).with_description(upload.description);
        meta.read = folder.meta.read.clone();
        meta.write = folder.meta.write.clone();
        meta.tags = upload.tags;
        let file = File {
            id: Ulid::new().to_string(),
            meta,
            folder_id: folder.id.clone(),
            ancestors: folder.lineage(),
            original_title: base.to_string(),
            file_type: extension.to_string(),
            size: 0,
            total_parts,
            copernicus_fingerprint: None,
            transfer_mode: mode,
        };

        if mode == TransferMode::Stream {
            let bucket = folder.group_id().to_string();
            let upload_id = self.blobs().open_multipart(&bucket, &file.id).await?;
            self.store()
                .streams
                .insert(&Stream {
                    id: upload_id,
                    file_id: file.id.clone(),
                    bucket,
                    object_key: file.id.clone(),
                    parts: Vec::new(),
                    total: total_parts,
                    status: StreamStatus::Pending,
                })
                .await?;
        }

        self.store().files.insert(&file).await?;
        self.store()
            .folders
            .push_child(&folder.id, ChildKind::File, &file.id)
            .await?;
        self.tree.touch_ancestors(&file.ancestors, ctx.subject()).await?;

        info!(file_id = %file.id, folder_id = %folder.id, total_parts, mode = ?mode, "[TRANSFER] upload initiated");
        Ok(file)
    }

    /// Store part `part_number` of a file and account its size.
    pub async fn upload_part(
        &self,
        ctx: &RequestContext,
        file_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> GatewayResult<File> {
        let file = self.tree.get_file(file_id).await?;
        if part_number == 0 || part_number > file.total_parts {
            return Err(GatewayError::Validation(format!(
                "Part number {part_number} is outside 1..={}",
                file.total_parts
            )));
        }
        let len = data.len() as i64;

        match file.transfer_mode {
            TransferMode::Parts => {
                self.store_part(&file, part_number, data).await?;
                self.account(&file, len).await?;
            }
            TransferMode::Stream => {
                let stream = self.stream_part(&file, part_number, data).await?;
                self.account(&file, len).await?;
                // The part is stored either way; a failed close is retried on download.
                if let Err(e) = self.close_if_complete(&stream).await {
                    debug!(file_id = %file.id, error = %e, "[TRANSFER] stream close deferred");
                }
            }
        }

        debug!(file_id = %file.id, part_number, size = len, subject = %ctx.subject(), "[TRANSFER] part stored");
        self.tree.get_file(&file.id).await
    }

    async fn account(&self, file: &File, len: i64) -> GatewayResult<()> {
        self.store().files.increment_size(&file.id, len).await?;
        self.tree.propagate_size(&file.ancestors, len, true).await
    }

    async fn store_part(&self, file: &File, part_number: u32, data: Bytes) -> GatewayResult<()> {
        if self
            .store()
            .parts
            .get_by_number(&file.id, part_number)
            .await?
            .is_some()
        {
            return Err(duplicate_part(&file.id, part_number));
        }

        let bucket = file.group_id().to_string();
        let part_id = Ulid::new().to_string();
        let size = data.len() as i64;
        let receipt = self.blobs().put_object(&bucket, &part_id, data).await?;
        let part = Part {
            id: part_id.clone(),
            file_id: file.id.clone(),
            part_number,
            size,
            upload_info: UploadInfo {
                bucket: receipt.bucket,
                key: receipt.key,
                e_tag: receipt.e_tag,
                version: receipt.version,
            },
        };

        match self.store().parts.insert(&part).await {
            Ok(()) => Ok(()),
            Err(MetaError::AlreadyExists { .. }) => {
                if let Err(e) = self.blobs().delete_object(&bucket, &part_id).await {
                    warn!(file_id = %file.id, part_id = %part_id, error = %e, "[TRANSFER] orphan part object left behind");
                }
                Err(duplicate_part(&file.id, part_number))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stream_part(&self, file: &File, part_number: u32, data: Bytes) -> GatewayResult<Stream> {
        let stream = self
            .store()
            .streams
            .get_by_file(&file.id)
            .await?
            .ok_or_else(|| GatewayError::not_found("stream", &file.id))?;
        if stream.status != StreamStatus::Pending {
            return Err(GatewayError::Validation(format!(
                "Upload of file {} is already complete",
                file.id
            )));
        }
        if stream.parts.iter().any(|p| p.part_number == part_number) {
            return Err(duplicate_part(&file.id, part_number));
        }

        let receipt = self
            .blobs()
            .put_multipart_part(&stream.bucket, &stream.object_key, &stream.id, part_number, data)
            .await?;
        let added = self
            .store()
            .streams
            .add_part(
                &stream.id,
                &StreamPart {
                    part_number: receipt.part_number,
                    etag: receipt.etag,
                    size: receipt.size,
                },
            )
            .await;
        match added {
            Ok(updated) => Ok(updated),
            Err(MetaError::AlreadyExists { .. }) => Err(duplicate_part(&file.id, part_number)),
            Err(e) => Err(e.into()),
        }
    }

    /// Close the blob session when `stream` holds every receipt. Only the
    /// caller that wins the Pending to Closing swap closes it; the stream is
    /// Completed only after the blob store has assembled the object.
    async fn close_if_complete(&self, stream: &Stream) -> GatewayResult<bool> {
        if stream.status != StreamStatus::Pending || (stream.parts.len() as u32) < stream.total {
            return Ok(false);
        }
        if !self.store().streams.begin_close(&stream.id).await? {
            debug!(stream_id = %stream.id, "[TRANSFER] stream already closing in another upload");
            return Ok(false);
        }

        let receipts: Vec<PartReceipt> = stream
            .parts
            .iter()
            .map(|p| PartReceipt {
                part_number: p.part_number,
                etag: p.etag.clone(),
                size: p.size,
            })
            .collect();
        if let Err(e) = self
            .blobs()
            .close_multipart(&stream.bucket, &stream.object_key, &stream.id, &receipts)
            .await
        {
            warn!(file_id = %stream.file_id, error = %e, "[TRANSFER] stream close failed, will retry");
            self.store().streams.abort_close(&stream.id).await?;
            return Err(e.into());
        }
        self.store().streams.mark_completed(&stream.id).await?;
        info!(file_id = %stream.file_id, parts = receipts.len(), "[TRANSFER] stream closed");
        Ok(true)
    }

    /// Open a read of one part.
    pub async fn download_part(&self, file_id: &str, part_number: u32) -> GatewayResult<PartDownload> {
        let file = self.tree.get_file(file_id).await?;
        match file.transfer_mode {
            TransferMode::Parts => {
                let part = self
                    .store()
                    .parts
                    .get_by_number(&file.id, part_number)
                    .await?
                    .ok_or_else(|| GatewayError::not_found("part", format!("{file_id}#{part_number}")))?;
                let stream = self
                    .blobs()
                    .get_object(&part.upload_info.bucket, &part.upload_info.key, None)
                    .await?;
                Ok(PartDownload {
                    size: part.size.max(0) as u64,
                    stream,
                })
            }
            TransferMode::Stream => {
                let mut session = self
                    .store()
                    .streams
                    .get_by_file(&file.id)
                    .await?
                    .ok_or_else(|| GatewayError::not_found("stream", file_id))?;
                if session.status == StreamStatus::Pending && self.close_if_complete(&session).await? {
                    session.status = StreamStatus::Completed;
                }
                if session.status != StreamStatus::Completed {
                    return Err(GatewayError::Validation(format!(
                        "File {file_id} is still being uploaded"
                    )));
                }
                let range = session
                    .part_range(part_number)
                    .ok_or_else(|| GatewayError::not_found("part", format!("{file_id}#{part_number}")))?;
                let size = range.end - range.start;
                let stream = self
                    .blobs()
                    .get_object(&session.bucket, &session.object_key, Some(range))
                    .await?;
                Ok(PartDownload { size, stream })
            }
        }
    }

    pub async fn file_info(&self, file_id: &str) -> GatewayResult<FileInfo> {
        let file = self.tree.get_file(file_id).await?;
        let parts = (file.size.max(0) as u64).div_ceil(self.part_size as u64);
        Ok(FileInfo { file, parts })
    }

    pub async fn transfer_state(&self, file_id: &str) -> GatewayResult<TransferState> {
        let file = self.tree.get_file(file_id).await?;
        let numbers = self.part_numbers(&file).await?;
        let state = if is_full_set(&numbers, file.total_parts) {
            TransferState::Completed
        } else if numbers.is_empty() {
            TransferState::Initiated
        } else {
            TransferState::PartsInFlight {
                completed: numbers.len() as u32,
                total: file.total_parts,
            }
        };
        Ok(state)
    }

    /// True iff the stored part numbers are exactly `1..=total_parts`.
    pub async fn is_complete(&self, file_id: &str) -> GatewayResult<bool> {
        let file = self.tree.get_file(file_id).await?;
        let numbers = self.part_numbers(&file).await?;
        Ok(is_full_set(&numbers, file.total_parts))
    }

    async fn part_numbers(&self, file: &File) -> GatewayResult<BTreeSet<u32>> {
        let numbers = match file.transfer_mode {
            TransferMode::Parts => self
                .store()
                .parts
                .list_by_file(&file.id)
                .await?
                .into_iter()
                .map(|p| p.part_number)
                .collect(),
            TransferMode::Stream => self
                .store()
                .streams
                .get_by_file(&file.id)
                .await?
                .map(|s| s.parts.into_iter().map(|p| p.part_number).collect())
                .unwrap_or_default(),
        };
        Ok(numbers)
    }

    /// Replace a parts-mode file's content with `chunks`, uploading them
    /// concurrently. Every upload is joined before returning; the first
    /// failure is reported.
    pub async fn ingest(&self, ctx: &RequestContext, file_id: &str, chunks: Vec<Bytes>) -> GatewayResult<File> {
        let file = self.tree.get_file(file_id).await?;
        if file.transfer_mode != TransferMode::Parts {
            return Err(GatewayError::Validation(format!(
                "File {file_id} does not store independent parts"
            )));
        }
        if chunks.is_empty() {
            return Err(GatewayError::Validation("Nothing to ingest".to_string()));
        }

        self.reset_content(&file).await?;
        let total = chunks.len() as u32;
        self.store().files.set_total_parts(&file.id, total).await?;

        let semaphore = Arc::new(Semaphore::new(self.ingest_concurrency));
        let mut uploads = JoinSet::new();
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let this = self.clone();
            let ctx = ctx.clone();
            let file_id = file.id.clone();
            let semaphore = semaphore.clone();
            uploads.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| GatewayError::Internal(e.to_string()))?;
                this.upload_part(&ctx, &file_id, idx as u32 + 1, chunk).await.map(|_| ())
            });
        }

        let mut first_error = None;
        while let Some(joined) = uploads.join_next().await {
            let result = joined
                .map_err(|e| GatewayError::Internal(format!("Part upload task failed: {e}")))
                .and_then(|r| r);
            if let Err(e) = result {
                warn!(file_id = %file.id, error = %e, "[TRANSFER] ingest part failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(file_id = %file.id, parts = total, "[TRANSFER] ingest complete");
        self.tree.get_file(&file.id).await
    }

    /// Drop whatever content a file already has and zero its size.
    async fn reset_content(&self, file: &File) -> GatewayResult<()> {
        self.tree.purge_content(file).await?;
        if file.size != 0 {
            self.store().files.increment_size(&file.id, -file.size).await?;
            self.tree.propagate_size(&file.ancestors, file.size, false).await?;
        }
        Ok(())
    }
}

fn duplicate_part(file_id: &str, part_number: u32) -> GatewayError {
    GatewayError::NameConflict(format!("Part {part_number} of file {file_id} was already uploaded"))
}

fn is_full_set(numbers: &BTreeSet<u32>, total: u32) -> bool {
    total >= 1 && numbers.len() as u32 == total && numbers.iter().copied().eq(1..=total)
}

/// Split a client file name into `(base name, title, extension)`; the
/// extension keeps its leading dot.
fn split_title(original: &str) -> (&str, &str, &str) {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    match base.rfind('.') {
        Some(idx) if idx > 0 => (base, &base[..idx], &base[idx..]),
        _ => (base, base, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_title() {
        assert_eq!(split_title("report.final.csv"), ("report.final.csv", "report.final", ".csv"));
        assert_eq!(split_title("dir/sub/data.nc"), ("data.nc", "data", ".nc"));
        assert_eq!(split_title("README"), ("README", "README", ""));
        assert_eq!(split_title(".env"), (".env", ".env", ""));
        assert_eq!(split_title("conf/.profile.bak"), (".profile.bak", ".profile", ".bak"));
        assert_eq!(split_title("uploads/"), ("", "", ""));
    }

    #[test]
    fn test_full_set() {
        let set: BTreeSet<u32> = [1, 2, 3].into_iter().collect();
        assert!(is_full_set(&set, 3));
        assert!(!is_full_set(&set, 4));
        let gap: BTreeSet<u32> = [1, 3].into_iter().collect();
        assert!(!is_full_set(&gap, 2));
        assert!(!is_full_set(&BTreeSet::new(), 0));
    }
}
