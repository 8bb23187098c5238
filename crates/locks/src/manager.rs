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

//! Lease manager trait.

use crate::{AcquireLeaseOptions, Lease, LeaseResult, ReleaseLeaseOptions, RenewLeaseOptions};
use async_trait::async_trait;

/// Trait for lease-table backends.
///
/// ## Purpose
/// Provides atomic operations for acquiring, renewing, and releasing leases
/// with version-based optimistic locking.
///
/// ## Design
/// - **Acquire**: Atomic acquisition with version generation
/// - **Renew**: Heartbeat that extends the expiry
/// - **Release**: Atomic release with version validation
#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Acquire a lease (atomic operation).
    ///
    /// ## Behavior
    /// - If the lease doesn't exist: create it with a new version
    /// - If it exists but is expired or released: take it over with a new version
    /// - If it is held by the same holder: return the existing lease
    /// - If it is held by a different holder: `LeaseAlreadyHeld`
    async fn acquire_lease(&self, options: AcquireLeaseOptions) -> LeaseResult<Lease>;

    /// Renew a lease (heartbeat).
    ///
    /// ## Returns
    /// - `Err(LeaseError::VersionMismatch)`: Version doesn't match
    /// - `Err(LeaseError::LeaseNotFound)`: Lease doesn't exist
    /// - `Err(LeaseError::LeaseExpired)`: Lease expired or released
    async fn renew_lease(&self, options: RenewLeaseOptions) -> LeaseResult<Lease>;

    /// Release a lease (atomic operation).
    ///
    /// If `delete_lease = true` the row is removed; otherwise it is kept with
    /// `held = false`.
    async fn release_lease(&self, options: ReleaseLeaseOptions) -> LeaseResult<()>;

    /// Get current lease state (non-blocking).
    async fn get_lease(&self, lease_key: &str) -> LeaseResult<Option<Lease>>;
}
