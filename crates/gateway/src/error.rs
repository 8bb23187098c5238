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

//! Error types for the gateway core
//!
//! Every lower-layer failure (metadata, blob store, lease table, remote task
//! API) converts into [`GatewayError`]; [`GatewayError::kind`] folds them into
//! the small taxonomy the HTTP layer renders.

use arbor_blob::BlobError;
use arbor_locks::LeaseError;
use arbor_meta::MetaError;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Name already taken: {0}")]
    NameConflict(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("Partial failure: {0}")]
    PartialFailure(String),

    #[error("Metadata error: {0}")]
    Meta(#[from] MetaError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NameConflict,
    Unauthenticated,
    Forbidden,
    UpstreamFailure,
    ValidationFailure,
    PartialFailure,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::NameConflict => 409,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::UpstreamFailure => 502,
            ErrorKind::ValidationFailure => 400,
            ErrorKind::PartialFailure => 500,
            ErrorKind::Internal => 500,
        }
    }
}

impl GatewayError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        GatewayError::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::NotFound { .. } => ErrorKind::NotFound,
            GatewayError::NameConflict(_) => ErrorKind::NameConflict,
            GatewayError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            GatewayError::Forbidden(_) => ErrorKind::Forbidden,
            GatewayError::Upstream(_) => ErrorKind::UpstreamFailure,
            GatewayError::Validation(_) => ErrorKind::ValidationFailure,
            GatewayError::PartialFailure(_) => ErrorKind::PartialFailure,
            GatewayError::Meta(MetaError::NotFound { .. }) => ErrorKind::NotFound,
            GatewayError::Meta(MetaError::AlreadyExists { .. }) => ErrorKind::NameConflict,
            GatewayError::Meta(MetaError::InvalidInput(_)) => ErrorKind::ValidationFailure,
            GatewayError::Meta(_) => ErrorKind::Internal,
            GatewayError::Blob(BlobError::NotFound(_)) => ErrorKind::NotFound,
            GatewayError::Blob(BlobError::InvalidInput(_)) => ErrorKind::ValidationFailure,
            GatewayError::Blob(BlobError::PartialFailure { .. }) => ErrorKind::PartialFailure,
            GatewayError::Blob(_) => ErrorKind::UpstreamFailure,
            GatewayError::Lease(_) => ErrorKind::Internal,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

impl From<&str> for GatewayError {
    fn from(s: &str) -> Self {
        GatewayError::Internal(s.to_string())
    }
}

impl From<String> for GatewayError {
    fn from(s: String) -> Self {
        GatewayError::Internal(s)
    }
}
