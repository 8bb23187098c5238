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

//! # Arbor Leases
//!
//! ## Purpose
//! Provides the lease table used to guarantee that at most one poller per
//! external task runs at any time, across every gateway instance that shares
//! the same metadata database.
//!
//! ## Design Decisions
//! - **Version-based optimistic locking**: every acquire/renew issues a new
//!   ULID version; renew and release must present the current one.
//! - **Timestamp-based expiration**: a crashed holder stops renewing and its
//!   lease becomes acquirable once `expires_at` passes.
//! - **Backend-agnostic**: callers only see [`LeaseManager`].
//!
//! ## Backend Support
//!
//! - **InMemory**: HashMap-based (feature: `memory-backend`, default)
//! - **SQLite**: Persistent, shared with the metadata store (feature: `sqlite-backend`)
//!
//! ## Examples
//!
//! ```rust,no_run
//! use arbor_locks::{AcquireLeaseOptions, LeaseManager, ReleaseLeaseOptions, memory::MemoryLeaseManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = MemoryLeaseManager::new();
//!
//! let lease = manager.acquire_lease(AcquireLeaseOptions::new("copernicus:abc", "node-1", 30)).await?;
//!
//! manager.release_lease(ReleaseLeaseOptions {
//!     lease_key: "copernicus:abc".to_string(),
//!     holder_id: "node-1".to_string(),
//!     version: lease.version,
//!     delete_lease: true,
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod manager;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "sqlite-backend")]
pub mod sql;

pub use error::{LeaseError, LeaseResult};
pub use manager::LeaseManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row in the lease table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub lease_key: String,
    pub holder_id: String,
    pub version: String,
    pub expires_at: DateTime<Utc>,
    pub lease_duration_secs: u32,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub held: bool,
}

impl Lease {
    /// A lease can be taken over once released or past its expiry.
    pub fn is_free_at(&self, now: DateTime<Utc>) -> bool {
        !self.held || self.expires_at <= now
    }
}

/// Options for [`LeaseManager::acquire_lease`].
#[derive(Clone, Debug, Default)]
pub struct AcquireLeaseOptions {
    pub lease_key: String,
    pub holder_id: String,
    pub lease_duration_secs: u32,
    pub metadata: HashMap<String, String>,
}

impl AcquireLeaseOptions {
    pub fn new(lease_key: impl Into<String>, holder_id: impl Into<String>, lease_duration_secs: u32) -> Self {
        Self {
            lease_key: lease_key.into(),
            holder_id: holder_id.into(),
            lease_duration_secs,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata (builder pattern)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Options for [`LeaseManager::renew_lease`].
#[derive(Clone, Debug, Default)]
pub struct RenewLeaseOptions {
    pub lease_key: String,
    pub holder_id: String,
    pub version: String,
    pub lease_duration_secs: u32,
}

impl RenewLeaseOptions {
    /// Renew `lease` for another `lease_duration_secs`.
    pub fn for_lease(lease: &Lease, lease_duration_secs: u32) -> Self {
        Self {
            lease_key: lease.lease_key.clone(),
            holder_id: lease.holder_id.clone(),
            version: lease.version.clone(),
            lease_duration_secs,
        }
    }
}

/// Options for [`LeaseManager::release_lease`].
#[derive(Clone, Debug, Default)]
pub struct ReleaseLeaseOptions {
    pub lease_key: String,
    pub holder_id: String,
    pub version: String,
    /// Remove the row instead of marking it released.
    pub delete_lease: bool,
}

impl ReleaseLeaseOptions {
    pub fn for_lease(lease: &Lease) -> Self {
        Self {
            lease_key: lease.lease_key.clone(),
            holder_id: lease.holder_id.clone(),
            version: lease.version.clone(),
            delete_lease: false,
        }
    }
}
