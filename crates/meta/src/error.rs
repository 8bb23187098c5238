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

//! Error types for metadata repositories

use thiserror::Error;

/// Result type for repository operations
pub type MetaResult<T> = Result<T, MetaError>;

/// Error types for metadata repository operations
#[derive(Error, Debug)]
pub enum MetaError {
    #[error("{collection} not found: {id}")]
    NotFound { collection: &'static str, id: String },

    #[error("{collection} already exists: {id}")]
    AlreadyExists { collection: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "sql-backend")]
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MetaError {
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        MetaError::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub fn already_exists(collection: &'static str, id: impl Into<String>) -> Self {
        MetaError::AlreadyExists {
            collection,
            id: id.into(),
        }
    }
}

impl From<&str> for MetaError {
    fn from(s: &str) -> Self {
        MetaError::InternalError(s.to_string())
    }
}

impl From<String> for MetaError {
    fn from(s: String) -> Self {
        MetaError::InternalError(s)
    }
}
