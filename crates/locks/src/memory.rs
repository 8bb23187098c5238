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

//! In-memory lease manager implementation.

use crate::error::validate_key;
use crate::{AcquireLeaseOptions, Lease, LeaseError, LeaseManager, LeaseResult, ReleaseLeaseOptions, RenewLeaseOptions};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use ulid::Ulid;

/// In-memory lease manager.
///
/// ## Purpose
/// Single-process implementation of `LeaseManager` for tests and for
/// deployments running one gateway instance.
///
/// ## Limitations
/// - Not persistent (leases lost on restart)
/// - Not distributed (single process only)
/// - No TTL cleanup (expired leases remain until accessed)
#[derive(Clone)]
pub struct MemoryLeaseManager {
    leases: Arc<RwLock<HashMap<String, Lease>>>,
}

impl MemoryLeaseManager {
    /// Create a new in-memory lease manager.
    pub fn new() -> Self {
        Self {
            leases: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryLeaseManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseManager for MemoryLeaseManager {
    async fn acquire_lease(&self, options: AcquireLeaseOptions) -> LeaseResult<Lease> {
        validate_key(&options.lease_key, &options.holder_id)?;
        let mut leases = self.leases.write().await;
        let now = Utc::now();

        if let Some(existing) = leases.get(&options.lease_key) {
            if !existing.is_free_at(now) {
                if existing.holder_id == options.holder_id {
                    return Ok(existing.clone());
                }
                return Err(LeaseError::LeaseAlreadyHeld(existing.holder_id.clone()));
            }
        }

        let lease = Lease {
            lease_key: options.lease_key.clone(),
            holder_id: options.holder_id,
            version: Ulid::new().to_string(),
            expires_at: now + Duration::seconds(options.lease_duration_secs as i64),
            lease_duration_secs: options.lease_duration_secs,
            last_heartbeat: now,
            metadata: options.metadata,
            held: true,
        };
        leases.insert(options.lease_key, lease.clone());
        Ok(lease)
    }

    async fn renew_lease(&self, options: RenewLeaseOptions) -> LeaseResult<Lease> {
        let mut leases = self.leases.write().await;
        let now = Utc::now();

        let existing = leases
            .get_mut(&options.lease_key)
            .ok_or_else(|| LeaseError::LeaseNotFound(options.lease_key.clone()))?;

        if existing.version != options.version {
            return Err(LeaseError::VersionMismatch {
                expected: existing.version.clone(),
                actual: options.version.clone(),
            });
        }
        if existing.holder_id != options.holder_id {
            return Err(LeaseError::InvalidHolderId(existing.holder_id.clone()));
        }
        if existing.is_free_at(now) {
            return Err(LeaseError::LeaseExpired(options.lease_key.clone()));
        }

        existing.version = Ulid::new().to_string();
        existing.expires_at = now + Duration::seconds(options.lease_duration_secs as i64);
        existing.lease_duration_secs = options.lease_duration_secs;
        existing.last_heartbeat = now;
        Ok(existing.clone())
    }

    async fn release_lease(&self, options: ReleaseLeaseOptions) -> LeaseResult<()> {
        let mut leases = self.leases.write().await;

        let existing = leases
            .get_mut(&options.lease_key)
            .ok_or_else(|| LeaseError::LeaseNotFound(options.lease_key.clone()))?;

        if existing.version != options.version {
            return Err(LeaseError::VersionMismatch {
                expected: existing.version.clone(),
                actual: options.version.clone(),
            });
        }
        if existing.holder_id != options.holder_id {
            return Err(LeaseError::InvalidHolderId(existing.holder_id.clone()));
        }

        if options.delete_lease {
            leases.remove(&options.lease_key);
        } else {
            existing.held = false;
        }
        Ok(())
    }

    async fn get_lease(&self, lease_key: &str) -> LeaseResult<Option<Lease>> {
        let leases = self.leases.read().await;
        Ok(leases.get(lease_key).cloned())
    }
}
