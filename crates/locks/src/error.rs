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

//! Error types for lease operations.

use thiserror::Error;

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Errors that can occur during lease operations.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Lease not found
    #[error("Lease not found: {0}")]
    LeaseNotFound(String),

    /// Lease currently held by another holder
    #[error("Lease already held by: {0}")]
    LeaseAlreadyHeld(String),

    /// Lease expired
    #[error("Lease expired: {0}")]
    LeaseExpired(String),

    /// Version mismatch (optimistic locking failure)
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    /// Invalid lease key
    #[error("Invalid lease key: {0}")]
    InvalidKey(String),

    /// Invalid holder ID
    #[error("Invalid holder ID: {0}")]
    InvalidHolderId(String),

    /// Backend error (database, network, etc.)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for LeaseError {
    fn from(err: serde_json::Error) -> Self {
        LeaseError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "sqlite-backend")]
impl From<sqlx::Error> for LeaseError {
    fn from(err: sqlx::Error) -> Self {
        LeaseError::BackendError(format!("SQL error: {}", err))
    }
}

pub(crate) fn validate_key(lease_key: &str, holder_id: &str) -> LeaseResult<()> {
    if lease_key.trim().is_empty() {
        return Err(LeaseError::InvalidKey(lease_key.to_string()));
    }
    if holder_id.trim().is_empty() {
        return Err(LeaseError::InvalidHolderId(holder_id.to_string()));
    }
    Ok(())
}
