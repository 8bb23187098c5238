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

//! SQLite metadata store.
//!
//! ## Schema
//! One table per collection. Scalar fields that are filtered on are real
//! columns; arrays and the `meta` sub-document are JSON text columns that
//! the JSON1 functions (`json_each`, `json_insert`, `json_set`) update in
//! place.
//!
//! ## Atomicity
//! Every mutating trait method is one SQL statement, so concurrent gateways
//! sharing the database never lose each other's increments or child-list
//! edits.

use crate::models::{
    ChildKind, File, Folder, LastUpdate, Meta, Part, Stream, StreamPart, StreamStatus, TaskDetails, TaskRecord,
    TransferMode, UploadInfo, MAX_UPDATE_HISTORY,
};
use crate::repository::{FileRepository, FolderRepository, PartRepository, StreamRepository, TaskRecordRepository};
use crate::{MetaError, MetaResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        ancestors TEXT NOT NULL,
        level INTEGER NOT NULL,
        child_files TEXT NOT NULL,
        child_folders TEXT NOT NULL,
        size INTEGER NOT NULL,
        meta TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS folders_parent ON folders(parent_id)",
    r#"CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        folder_id TEXT NOT NULL,
        ancestors TEXT NOT NULL,
        original_title TEXT NOT NULL,
        file_type TEXT NOT NULL,
        size INTEGER NOT NULL,
        total_parts INTEGER NOT NULL,
        fingerprint TEXT,
        transfer_mode TEXT NOT NULL,
        meta TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS files_folder ON files(folder_id)",
    "CREATE INDEX IF NOT EXISTS files_fingerprint ON files(fingerprint)",
    r#"CREATE TABLE IF NOT EXISTS parts (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL,
        part_number INTEGER NOT NULL,
        size INTEGER NOT NULL,
        upload_info TEXT NOT NULL,
        UNIQUE(file_id, part_number)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS streams (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL,
        bucket TEXT NOT NULL,
        object_key TEXT NOT NULL,
        parts TEXT NOT NULL,
        total INTEGER NOT NULL,
        status TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS streams_file ON streams(file_id)",
    r#"CREATE TABLE IF NOT EXISTS task_records (
        id TEXT PRIMARY KEY,
        file_id TEXT NOT NULL,
        dataset_name TEXT NOT NULL,
        request_params TEXT NOT NULL,
        task_details TEXT NOT NULL,
        submitted_by TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
];

const FOLDER_COLUMNS: &str = "id, parent_id, ancestors, level, child_files, child_folders, size, meta";
const FILE_COLUMNS: &str =
    "id, folder_id, ancestors, original_title, file_type, size, total_parts, fingerprint, transfer_mode, meta";
const STREAM_COLUMNS: &str = "id, file_id, bucket, object_key, parts, total, status";
const TASK_COLUMNS: &str = "id, file_id, dataset_name, request_params, task_details, submitted_by, created_at";

/// Appends `?1` (a LastUpdate document) to `meta.history`, keeping the
/// newest entries, for every row whose id is in the JSON array `?2`.
fn touch_sql(table: &str) -> String {
    format!(
        r#"UPDATE {table} SET meta = json_set(meta,
              '$.last_update', json(?1),
              '$.history', json((
                SELECT json_group_array(json(v)) FROM (
                  SELECT k, v FROM (
                    SELECT k, v FROM (
                      SELECT key AS k, value AS v FROM json_each({table}.meta, '$.history')
                      UNION ALL SELECT 1000000000 AS k, ?1 AS v
                    ) ORDER BY k DESC LIMIT {MAX_UPDATE_HISTORY}
                  ) ORDER BY k
                )
              )))
           WHERE id IN (SELECT value FROM json_each(?2))"#
    )
}

fn child_column(kind: ChildKind) -> &'static str {
    match kind {
        ChildKind::File => "child_files",
        ChildKind::Folder => "child_folders",
    }
}

fn mode_str(mode: TransferMode) -> &'static str {
    match mode {
        TransferMode::Parts => "parts",
        TransferMode::Stream => "stream",
    }
}

fn parse_mode(s: &str) -> TransferMode {
    match s {
        "stream" => TransferMode::Stream,
        _ => TransferMode::Parts,
    }
}

fn status_str(status: StreamStatus) -> &'static str {
    match status {
        StreamStatus::Pending => "pending",
        StreamStatus::Closing => "closing",
        StreamStatus::Completed => "completed",
    }
}

fn parse_status(s: &str) -> StreamStatus {
    match s {
        "closing" => StreamStatus::Closing,
        "completed" => StreamStatus::Completed,
        _ => StreamStatus::Pending,
    }
}

fn insert_error(collection: &'static str, id: &str, err: sqlx::Error) -> MetaError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => MetaError::already_exists(collection, id),
        _ => MetaError::SqlError(err),
    }
}

/// SQLite-backed store for all metadata collections.
#[derive(Clone)]
pub struct SqliteMetaStore {
    pool: SqlitePool,
}

impl SqliteMetaStore {
    /// Connect to `database_url` and create the schema.
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str) -> MetaResult<Self> {
        // Every connection to `sqlite::memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MetaError::BackendError(format!("failed to connect SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> MetaResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Underlying pool, shared with the lease table.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn folder_from_row(row: &SqliteRow) -> MetaResult<Folder> {
        let ancestors: String = row.try_get("ancestors")?;
        let child_files: String = row.try_get("child_files")?;
        let child_folders: String = row.try_get("child_folders")?;
        let meta: String = row.try_get("meta")?;
        let level: i64 = row.try_get("level")?;
        Ok(Folder {
            id: row.try_get("id")?,
            meta: serde_json::from_str::<Meta>(&meta)?,
            parent_id: row.try_get("parent_id")?,
            ancestors: serde_json::from_str(&ancestors)?,
            level: level as u32,
            child_file_ids: serde_json::from_str(&child_files)?,
            child_folder_ids: serde_json::from_str(&child_folders)?,
            size: row.try_get("size")?,
        })
    }

    fn file_from_row(row: &SqliteRow) -> MetaResult<File> {
        let ancestors: String = row.try_get("ancestors")?;
        let meta: String = row.try_get("meta")?;
        let total_parts: i64 = row.try_get("total_parts")?;
        let mode: String = row.try_get("transfer_mode")?;
        Ok(File {
            id: row.try_get("id")?,
            meta: serde_json::from_str::<Meta>(&meta)?,
            folder_id: row.try_get("folder_id")?,
            ancestors: serde_json::from_str(&ancestors)?,
            original_title: row.try_get("original_title")?,
            file_type: row.try_get("file_type")?,
            size: row.try_get("size")?,
            total_parts: total_parts as u32,
            copernicus_fingerprint: row.try_get("fingerprint")?,
            transfer_mode: parse_mode(&mode),
        })
    }

    fn part_from_row(row: &SqliteRow) -> MetaResult<Part> {
        let upload_info: String = row.try_get("upload_info")?;
        let part_number: i64 = row.try_get("part_number")?;
        Ok(Part {
            id: row.try_get("id")?,
            file_id: row.try_get("file_id")?,
            part_number: part_number as u32,
            size: row.try_get("size")?,
            upload_info: serde_json::from_str::<UploadInfo>(&upload_info)?,
        })
    }

    fn stream_from_row(row: &SqliteRow) -> MetaResult<Stream> {
        let parts: String = row.try_get("parts")?;
        let total: i64 = row.try_get("total")?;
        let status: String = row.try_get("status")?;
        Ok(Stream {
            id: row.try_get("id")?,
            file_id: row.try_get("file_id")?,
            bucket: row.try_get("bucket")?,
            object_key: row.try_get("object_key")?,
            parts: serde_json::from_str::<Vec<StreamPart>>(&parts)?,
            total: total as u32,
            status: parse_status(&status),
        })
    }

    fn task_from_row(row: &SqliteRow) -> MetaResult<TaskRecord> {
        let request_params: String = row.try_get("request_params")?;
        let task_details: String = row.try_get("task_details")?;
        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| MetaError::BackendError(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        Ok(TaskRecord {
            id: row.try_get("id")?,
            file_id: row.try_get("file_id")?,
            dataset_name: row.try_get("dataset_name")?,
            request_params: serde_json::from_str(&request_params)?,
            task_details: serde_json::from_str::<TaskDetails>(&task_details)?,
            submitted_by: row.try_get("submitted_by")?,
            created_at,
        })
    }

    async fn exists(&self, table: &str, id: &str) -> MetaResult<bool> {
        let row = sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn swap_status(&self, id: &str, from: StreamStatus, to: StreamStatus) -> MetaResult<bool> {
        let result = sqlx::query("UPDATE streams SET status = ?3 WHERE id = ?1 AND status = ?2")
            .bind(id)
            .bind(status_str(from))
            .bind(status_str(to))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.exists("streams", id).await? {
            return Err(MetaError::not_found("stream", id));
        }
        Ok(false)
    }

    async fn touch_rows(&self, table: &str, ids: &[String], update: &LastUpdate) -> MetaResult<u64> {
        let result = sqlx::query(&touch_sql(table))
            .bind(serde_json::to_string(update)?)
            .bind(serde_json::to_string(ids)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FolderRepository for SqliteMetaStore {
    #[instrument(skip(self, folder), fields(folder_id = %folder.id))]
    async fn insert(&self, folder: &Folder) -> MetaResult<()> {
        sqlx::query(&format!(
            "INSERT INTO folders ({FOLDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .bind(&folder.id)
        .bind(&folder.parent_id)
        .bind(serde_json::to_string(&folder.ancestors)?)
        .bind(folder.level as i64)
        .bind(serde_json::to_string(&folder.child_file_ids)?)
        .bind(serde_json::to_string(&folder.child_folder_ids)?)
        .bind(folder.size)
        .bind(serde_json::to_string(&folder.meta)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("folder", &folder.id, e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> MetaResult<Option<Folder>> {
        let row = sqlx::query(&format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::folder_from_row).transpose()
    }

    async fn get_many(&self, ids: &[String]) -> MetaResult<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id IN (SELECT value FROM json_each(?1))"
        ))
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::folder_from_row).collect()
    }

    #[instrument(skip(self, folder), fields(folder_id = %folder.id))]
    async fn update(&self, folder: &Folder) -> MetaResult<()> {
        let result = sqlx::query(
            r#"UPDATE folders SET parent_id = ?2, ancestors = ?3, level = ?4, child_files = ?5,
                      child_folders = ?6, size = ?7, meta = ?8
               WHERE id = ?1"#,
        )
        .bind(&folder.id)
        .bind(&folder.parent_id)
        .bind(serde_json::to_string(&folder.ancestors)?)
        .bind(folder.level as i64)
        .bind(serde_json::to_string(&folder.child_file_ids)?)
        .bind(serde_json::to_string(&folder.child_folder_ids)?)
        .bind(folder.size)
        .bind(serde_json::to_string(&folder.meta)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("folder", &folder.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> MetaResult<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64> {
        let result = sqlx::query(
            "DELETE FROM folders WHERE EXISTS (SELECT 1 FROM json_each(folders.ancestors) WHERE value = ?1)",
        )
        .bind(ancestor_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_by_parent(&self, parent_id: &str) -> MetaResult<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE parent_id = ?1 ORDER BY json_extract(meta, '$.created_at'), id"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::folder_from_row).collect()
    }

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {FOLDER_COLUMNS} FROM folders
               WHERE EXISTS (SELECT 1 FROM json_each(folders.ancestors) WHERE value = ?1)
               ORDER BY level"#
        ))
        .bind(ancestor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::folder_from_row).collect()
    }

    async fn find_root_by_title(&self, title: &str) -> MetaResult<Option<Folder>> {
        let row = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE level = 0 AND json_extract(meta, '$.title') = ?1 LIMIT 1"
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::folder_from_row).transpose()
    }

    async fn find_by_title_and_level(&self, title: &str, level: u32) -> MetaResult<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE level = ?2 AND json_extract(meta, '$.title') = ?1"
        ))
        .bind(title)
        .bind(level as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::folder_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn push_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()> {
        let column = child_column(kind);
        let result = sqlx::query(&format!(
            r#"UPDATE folders SET {column} = json_insert({column}, '$[#]', ?2)
               WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM json_each(folders.{column}) WHERE value = ?2)"#
        ))
        .bind(parent_id)
        .bind(child_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 && !self.exists("folders", parent_id).await? {
            return Err(MetaError::not_found("folder", parent_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_child(&self, parent_id: &str, kind: ChildKind, child_id: &str) -> MetaResult<()> {
        let column = child_column(kind);
        sqlx::query(&format!(
            r#"UPDATE folders SET {column} = (
                 SELECT json_group_array(value) FROM (
                   SELECT value FROM json_each(folders.{column}) WHERE value != ?2 ORDER BY key
                 )
               )
               WHERE id = ?1"#
        ))
        .bind(parent_id)
        .bind(child_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_size(&self, ids: &[String], delta: i64) -> MetaResult<()> {
        sqlx::query("UPDATE folders SET size = size + ?1 WHERE id IN (SELECT value FROM json_each(?2))")
            .bind(delta)
            .bind(serde_json::to_string(ids)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch(&self, ids: &[String], update: &LastUpdate) -> MetaResult<()> {
        self.touch_rows("folders", ids, update).await?;
        Ok(())
    }

    #[instrument(skip(self, ancestors))]
    async fn set_lineage(&self, id: &str, parent_id: &str, ancestors: &[String]) -> MetaResult<()> {
        let result = sqlx::query("UPDATE folders SET parent_id = ?2, ancestors = ?3, level = ?4 WHERE id = ?1")
            .bind(id)
            .bind(parent_id)
            .bind(serde_json::to_string(ancestors)?)
            .bind(ancestors.len() as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("folder", id));
        }
        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str, description: Option<&str>, update: &LastUpdate) -> MetaResult<()> {
        let result = sqlx::query(
            r#"UPDATE folders SET meta = json_set(meta,
                 '$.title', ?2,
                 '$.description', COALESCE(?3, json_extract(meta, '$.description')))
               WHERE id = ?1"#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("folder", id));
        }
        self.touch_rows("folders", &[id.to_string()], update).await?;
        Ok(())
    }
}

#[async_trait]
impl FileRepository for SqliteMetaStore {
    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn insert(&self, file: &File) -> MetaResult<()> {
        sqlx::query(&format!(
            "INSERT INTO files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ))
        .bind(&file.id)
        .bind(&file.folder_id)
        .bind(serde_json::to_string(&file.ancestors)?)
        .bind(&file.original_title)
        .bind(&file.file_type)
        .bind(file.size)
        .bind(file.total_parts as i64)
        .bind(&file.copernicus_fingerprint)
        .bind(mode_str(file.transfer_mode))
        .bind(serde_json::to_string(&file.meta)?)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("file", &file.id, e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> MetaResult<Option<File>> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::file_from_row).transpose()
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn update(&self, file: &File) -> MetaResult<()> {
        let result = sqlx::query(
            r#"UPDATE files SET folder_id = ?2, ancestors = ?3, original_title = ?4, file_type = ?5,
                      size = ?6, total_parts = ?7, fingerprint = ?8, transfer_mode = ?9, meta = ?10
               WHERE id = ?1"#,
        )
        .bind(&file.id)
        .bind(&file.folder_id)
        .bind(serde_json::to_string(&file.ancestors)?)
        .bind(&file.original_title)
        .bind(&file.file_type)
        .bind(file.size)
        .bind(file.total_parts as i64)
        .bind(&file.copernicus_fingerprint)
        .bind(mode_str(file.transfer_mode))
        .bind(serde_json::to_string(&file.meta)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("file", &file.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> MetaResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_by_ancestor(&self, ancestor_id: &str) -> MetaResult<u64> {
        let result = sqlx::query(
            "DELETE FROM files WHERE EXISTS (SELECT 1 FROM json_each(files.ancestors) WHERE value = ?1)",
        )
        .bind(ancestor_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_by_folder(&self, folder_id: &str) -> MetaResult<Vec<File>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE folder_id = ?1 ORDER BY json_extract(meta, '$.created_at'), id"
        ))
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::file_from_row).collect()
    }

    async fn list_by_ancestor(&self, ancestor_id: &str) -> MetaResult<Vec<File>> {
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE EXISTS (SELECT 1 FROM json_each(files.ancestors) WHERE value = ?1)"
        ))
        .bind(ancestor_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::file_from_row).collect()
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> MetaResult<Option<File>> {
        let row = sqlx::query(&format!("SELECT {FILE_COLUMNS} FROM files WHERE fingerprint = ?1 LIMIT 1"))
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::file_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn increment_size(&self, id: &str, delta: i64) -> MetaResult<i64> {
        let row = sqlx::query("UPDATE files SET size = size + ?2 WHERE id = ?1 RETURNING size")
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get("size")?),
            None => Err(MetaError::not_found("file", id)),
        }
    }

    async fn set_total_parts(&self, id: &str, total_parts: u32) -> MetaResult<()> {
        let result = sqlx::query("UPDATE files SET total_parts = ?2 WHERE id = ?1")
            .bind(id)
            .bind(total_parts as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("file", id));
        }
        Ok(())
    }

    #[instrument(skip(self, ancestors, update))]
    async fn set_lineage(&self, id: &str, folder_id: &str, ancestors: &[String], update: &LastUpdate) -> MetaResult<()> {
        let result = sqlx::query("UPDATE files SET folder_id = ?2, ancestors = ?3 WHERE id = ?1")
            .bind(id)
            .bind(folder_id)
            .bind(serde_json::to_string(ancestors)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("file", id));
        }
        self.touch_rows("files", &[id.to_string()], update).await?;
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
        let tags = tags.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            r#"UPDATE files SET meta = json_set(meta,
                 '$.title', COALESCE(?2, json_extract(meta, '$.title')),
                 '$.description', COALESCE(?3, json_extract(meta, '$.description')),
                 '$.tags', json(COALESCE(?4, json_extract(meta, '$.tags'))))
               WHERE id = ?1"#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(tags)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("file", id));
        }
        self.touch_rows("files", &[id.to_string()], update).await?;
        Ok(())
    }
}

#[async_trait]
impl PartRepository for SqliteMetaStore {
    #[instrument(skip(self, part), fields(file_id = %part.file_id, part_number = part.part_number))]
    async fn insert(&self, part: &Part) -> MetaResult<()> {
        sqlx::query("INSERT INTO parts (id, file_id, part_number, size, upload_info) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(&part.id)
            .bind(&part.file_id)
            .bind(part.part_number as i64)
            .bind(part.size)
            .bind(serde_json::to_string(&part.upload_info)?)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("part", &format!("{}#{}", part.file_id, part.part_number), e))?;
        Ok(())
    }

    async fn get_by_number(&self, file_id: &str, part_number: u32) -> MetaResult<Option<Part>> {
        let row = sqlx::query(
            "SELECT id, file_id, part_number, size, upload_info FROM parts WHERE file_id = ?1 AND part_number = ?2",
        )
        .bind(file_id)
        .bind(part_number as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::part_from_row).transpose()
    }

    async fn list_by_file(&self, file_id: &str) -> MetaResult<Vec<Part>> {
        let rows = sqlx::query(
            "SELECT id, file_id, part_number, size, upload_info FROM parts WHERE file_id = ?1 ORDER BY part_number",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::part_from_row).collect()
    }

    async fn delete(&self, id: &str) -> MetaResult<bool> {
        let result = sqlx::query("DELETE FROM parts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_by_file(&self, file_id: &str) -> MetaResult<u64> {
        let result = sqlx::query("DELETE FROM parts WHERE file_id = ?1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StreamRepository for SqliteMetaStore {
    #[instrument(skip(self, stream), fields(stream_id = %stream.id))]
    async fn insert(&self, stream: &Stream) -> MetaResult<()> {
        sqlx::query(&format!(
            "INSERT INTO streams ({STREAM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ))
        .bind(&stream.id)
        .bind(&stream.file_id)
        .bind(&stream.bucket)
        .bind(&stream.object_key)
        .bind(serde_json::to_string(&stream.parts)?)
        .bind(stream.total as i64)
        .bind(status_str(stream.status))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("stream", &stream.id, e))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> MetaResult<Option<Stream>> {
        let row = sqlx::query(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::stream_from_row).transpose()
    }

    async fn get_by_file(&self, file_id: &str) -> MetaResult<Option<Stream>> {
        let row = sqlx::query(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE file_id = ?1 LIMIT 1"))
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::stream_from_row).transpose()
    }

    #[instrument(skip(self, part), fields(part_number = part.part_number))]
    async fn add_part(&self, id: &str, part: &StreamPart) -> MetaResult<Stream> {
        let row = sqlx::query(&format!(
            r#"UPDATE streams SET parts = json((
                 SELECT json_group_array(json(v)) FROM (
                   SELECT v FROM (
                     SELECT value AS v, json_extract(value, '$.part_number') AS n
                       FROM json_each(streams.parts)
                     UNION ALL SELECT ?3 AS v, ?2 AS n
                   ) ORDER BY n
                 )
               ))
               WHERE id = ?1
                 AND NOT EXISTS (
                   SELECT 1 FROM json_each(streams.parts)
                    WHERE json_extract(value, '$.part_number') = ?2
                 )
               RETURNING {STREAM_COLUMNS}"#
        ))
        .bind(id)
        .bind(part.part_number as i64)
        .bind(serde_json::to_string(part)?)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Self::stream_from_row(&row);
        }
        if !self.exists("streams", id).await? {
            return Err(MetaError::not_found("stream", id));
        }
        Err(MetaError::already_exists(
            "stream part",
            format!("{id}#{}", part.part_number),
        ))
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
        let result = sqlx::query("DELETE FROM streams WHERE file_id = ?1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TaskRecordRepository for SqliteMetaStore {
    #[instrument(skip(self, record), fields(task_id = %record.id))]
    async fn insert_if_absent(&self, record: &TaskRecord) -> MetaResult<(TaskRecord, bool)> {
        let result = sqlx::query(&format!(
            "INSERT INTO task_records ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ON CONFLICT(id) DO NOTHING"
        ))
        .bind(&record.id)
        .bind(&record.file_id)
        .bind(&record.dataset_name)
        .bind(serde_json::to_string(&record.request_params)?)
        .bind(serde_json::to_string(&record.task_details)?)
        .bind(&record.submitted_by)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok((record.clone(), true));
        }
        let existing = TaskRecordRepository::get(self, &record.id)
            .await?
            .ok_or_else(|| MetaError::not_found("task", &record.id))?;
        Ok((existing, false))
    }

    async fn get(&self, id: &str) -> MetaResult<Option<TaskRecord>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM task_records WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::task_from_row).transpose()
    }

    #[instrument(skip(self, record), fields(task_id = %record.id))]
    async fn update(&self, record: &TaskRecord) -> MetaResult<()> {
        let result = sqlx::query(
            r#"UPDATE task_records SET file_id = ?2, dataset_name = ?3, request_params = ?4,
                      task_details = ?5, submitted_by = ?6
               WHERE id = ?1"#,
        )
        .bind(&record.id)
        .bind(&record.file_id)
        .bind(&record.dataset_name)
        .bind(serde_json::to_string(&record.request_params)?)
        .bind(serde_json::to_string(&record.task_details)?)
        .bind(&record.submitted_by)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MetaError::not_found("task", &record.id));
        }
        Ok(())
    }

    async fn list_unfinished(&self) -> MetaResult<Vec<TaskRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {TASK_COLUMNS} FROM task_records
               WHERE json_extract(task_details, '$.status') NOT IN ('successful', 'failed', 'denied')
               ORDER BY created_at"#
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::task_from_row).collect()
    }
}
