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

//! SQLite-based lease manager.
//!
//! Leases live in a single `leases` table next to the metadata collections,
//! so every gateway instance pointed at the same database sees the same
//! lease table.
//!
//! Takeover of an expired lease is an `UPDATE … WHERE version = ?` guarded
//! by the version that was read; a concurrent taker loses the compare and
//! gets `LeaseAlreadyHeld`.

use crate::error::validate_key;
use crate::{AcquireLeaseOptions, Lease, LeaseError, LeaseManager, LeaseResult, ReleaseLeaseOptions, RenewLeaseOptions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::instrument;
use ulid::Ulid;

/// SQLite-based lease manager.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS leases (
///   lease_key TEXT PRIMARY KEY,
///   holder_id TEXT NOT NULL,
///   version TEXT NOT NULL,
///   expires_at INTEGER NOT NULL,       -- epoch millis
///   lease_duration_secs INTEGER NOT NULL,
///   last_heartbeat INTEGER NOT NULL,   -- epoch millis
///   held INTEGER NOT NULL,
///   metadata TEXT
/// );
/// ```
#[derive(Clone)]
pub struct SqliteLeaseManager {
    pool: SqlitePool,
}

impl SqliteLeaseManager {
    /// Connect to `database_url` (e.g. `sqlite::memory:` or
    /// `sqlite://arbor.db?mode=rwc`) and create the table.
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str) -> LeaseResult<Self> {
        // Every connection to `sqlite::memory:` opens its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| LeaseError::BackendError(format!("failed to connect SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Reuse an existing pool, typically the metadata store's.
    pub async fn from_pool(pool: SqlitePool) -> LeaseResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS leases (
              lease_key TEXT PRIMARY KEY,
              holder_id TEXT NOT NULL,
              version TEXT NOT NULL,
              expires_at INTEGER NOT NULL,
              lease_duration_secs INTEGER NOT NULL,
              last_heartbeat INTEGER NOT NULL,
              held INTEGER NOT NULL,
              metadata TEXT
            );
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LeaseError::BackendError(format!("failed to create leases table: {e}")))?;

        Ok(Self { pool })
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn millis_to_datetime(millis: i64) -> LeaseResult<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| LeaseError::BackendError(format!("invalid timestamp: {millis}")))
    }

    fn lease_from_row(row: &SqliteRow) -> LeaseResult<Lease> {
        let metadata_json: Option<String> = row.try_get("metadata")?;
        let metadata: HashMap<String, String> = match metadata_json {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
            _ => HashMap::new(),
        };
        let lease_duration_secs: i64 = row.try_get("lease_duration_secs")?;
        let held: i64 = row.try_get("held")?;

        Ok(Lease {
            lease_key: row.try_get("lease_key")?,
            holder_id: row.try_get("holder_id")?,
            version: row.try_get("version")?,
            expires_at: Self::millis_to_datetime(row.try_get("expires_at")?)?,
            lease_duration_secs: lease_duration_secs as u32,
            last_heartbeat: Self::millis_to_datetime(row.try_get("last_heartbeat")?)?,
            metadata,
            held: held != 0,
        })
    }

    async fn load(&self, lease_key: &str) -> LeaseResult<Option<Lease>> {
        let row = sqlx::query(
            r#"SELECT lease_key, holder_id, version, expires_at, lease_duration_secs,
                      last_heartbeat, held, metadata
               FROM leases WHERE lease_key = ?1"#,
        )
        .bind(lease_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LeaseError::BackendError(format!("select lease: {e}")))?;

        row.as_ref().map(Self::lease_from_row).transpose()
    }
}

#[async_trait]
impl LeaseManager for SqliteLeaseManager {
    #[instrument(skip(self, options), fields(lease_key = %options.lease_key, holder_id = %options.holder_id))]
    async fn acquire_lease(&self, options: AcquireLeaseOptions) -> LeaseResult<Lease> {
        validate_key(&options.lease_key, &options.holder_id)?;

        let now = Self::now_millis();
        let expires_at = now + (options.lease_duration_secs as i64) * 1000;
        let version = Ulid::new().to_string();
        let metadata_json = if options.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&options.metadata)?)
        };

        match self.load(&options.lease_key).await? {
            Some(existing) => {
                if !existing.is_free_at(Self::millis_to_datetime(now)?) {
                    if existing.holder_id == options.holder_id {
                        return Ok(existing);
                    }
                    return Err(LeaseError::LeaseAlreadyHeld(existing.holder_id));
                }

                let result = sqlx::query(
                    r#"UPDATE leases
                       SET holder_id = ?1, version = ?2, expires_at = ?3, lease_duration_secs = ?4,
                           last_heartbeat = ?5, held = 1, metadata = ?6
                     WHERE lease_key = ?7 AND version = ?8"#,
                )
                .bind(&options.holder_id)
                .bind(&version)
                .bind(expires_at)
                .bind(options.lease_duration_secs as i64)
                .bind(now)
                .bind(metadata_json)
                .bind(&options.lease_key)
                .bind(&existing.version)
                .execute(&self.pool)
                .await
                .map_err(|e| LeaseError::BackendError(format!("update lease: {e}")))?;

                if result.rows_affected() != 1 {
                    // Someone else took it between our read and write.
                    let holder = self
                        .load(&options.lease_key)
                        .await?
                        .map(|l| l.holder_id)
                        .unwrap_or_default();
                    return Err(LeaseError::LeaseAlreadyHeld(holder));
                }
            }
            None => {
                let inserted = sqlx::query(
                    r#"INSERT INTO leases
                       (lease_key, holder_id, version, expires_at, lease_duration_secs, last_heartbeat, held, metadata)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)"#,
                )
                .bind(&options.lease_key)
                .bind(&options.holder_id)
                .bind(&version)
                .bind(expires_at)
                .bind(options.lease_duration_secs as i64)
                .bind(now)
                .bind(metadata_json)
                .execute(&self.pool)
                .await;

                if let Err(e) = inserted {
                    if let sqlx::Error::Database(db) = &e {
                        if db.is_unique_violation() {
                            let holder = self
                                .load(&options.lease_key)
                                .await?
                                .map(|l| l.holder_id)
                                .unwrap_or_default();
                            return Err(LeaseError::LeaseAlreadyHeld(holder));
                        }
                    }
                    return Err(LeaseError::BackendError(format!("insert lease: {e}")));
                }
            }
        }

        Ok(Lease {
            lease_key: options.lease_key,
            holder_id: options.holder_id,
            version,
            expires_at: Self::millis_to_datetime(expires_at)?,
            lease_duration_secs: options.lease_duration_secs,
            last_heartbeat: Self::millis_to_datetime(now)?,
            metadata: options.metadata,
            held: true,
        })
    }

    #[instrument(skip(self, options), fields(lease_key = %options.lease_key, holder_id = %options.holder_id))]
    async fn renew_lease(&self, options: RenewLeaseOptions) -> LeaseResult<Lease> {
        let existing = self
            .load(&options.lease_key)
            .await?
            .ok_or_else(|| LeaseError::LeaseNotFound(options.lease_key.clone()))?;

        if existing.holder_id != options.holder_id {
            return Err(LeaseError::InvalidHolderId(existing.holder_id));
        }
        if existing.version != options.version {
            return Err(LeaseError::VersionMismatch {
                expected: existing.version,
                actual: options.version,
            });
        }

        let now = Self::now_millis();
        if existing.is_free_at(Self::millis_to_datetime(now)?) {
            return Err(LeaseError::LeaseExpired(options.lease_key));
        }

        let new_version = Ulid::new().to_string();
        let new_expires = now + (options.lease_duration_secs as i64) * 1000;
        let result = sqlx::query(
            r#"UPDATE leases
               SET version = ?1, expires_at = ?2, lease_duration_secs = ?3, last_heartbeat = ?4
             WHERE lease_key = ?5 AND version = ?6 AND holder_id = ?7"#,
        )
        .bind(&new_version)
        .bind(new_expires)
        .bind(options.lease_duration_secs as i64)
        .bind(now)
        .bind(&options.lease_key)
        .bind(&options.version)
        .bind(&options.holder_id)
        .execute(&self.pool)
        .await
        .map_err(|e| LeaseError::BackendError(format!("renew lease: {e}")))?;

        if result.rows_affected() != 1 {
            return Err(LeaseError::VersionMismatch {
                expected: "<changed>".to_string(),
                actual: options.version,
            });
        }

        Ok(Lease {
            version: new_version,
            expires_at: Self::millis_to_datetime(new_expires)?,
            lease_duration_secs: options.lease_duration_secs,
            last_heartbeat: Self::millis_to_datetime(now)?,
            ..existing
        })
    }

    #[instrument(skip(self, options), fields(lease_key = %options.lease_key, holder_id = %options.holder_id))]
    async fn release_lease(&self, options: ReleaseLeaseOptions) -> LeaseResult<()> {
        let existing = self
            .load(&options.lease_key)
            .await?
            .ok_or_else(|| LeaseError::LeaseNotFound(options.lease_key.clone()))?;

        if existing.holder_id != options.holder_id {
            return Err(LeaseError::InvalidHolderId(existing.holder_id));
        }
        if existing.version != options.version {
            return Err(LeaseError::VersionMismatch {
                expected: existing.version,
                actual: options.version,
            });
        }

        let statement = if options.delete_lease {
            "DELETE FROM leases WHERE lease_key = ?1 AND version = ?2"
        } else {
            "UPDATE leases SET held = 0 WHERE lease_key = ?1 AND version = ?2"
        };
        sqlx::query(statement)
            .bind(&options.lease_key)
            .bind(&options.version)
            .execute(&self.pool)
            .await
            .map_err(|e| LeaseError::BackendError(format!("release lease: {e}")))?;

        Ok(())
    }

    #[instrument(skip(self), fields(lease_key = %lease_key))]
    async fn get_lease(&self, lease_key: &str) -> LeaseResult<Option<Lease>> {
        self.load(lease_key).await
    }
}
