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

//! Request Context
//!
//! ## Purpose
//! Carries the verified principal, the resolved access scope and tracing
//! identifiers through the call chain.
//!
//! ## Design
//! - **Principal**: REQUIRED; every mutation stamps `meta.last_update` with
//!   the principal's subject.
//! - **Scope**: `group_id` and `access_mode` are filled in by the
//!   access-scope resolver; they stay empty for routes that only require an
//!   authenticated caller (bucket creation, dataset requests).
//! - **Immutable**: built once, passed by reference.

use crate::principal::{AccessMode, Principal};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use ulid::Ulid;

/// Request-scoped context.
///
/// ## Usage Pattern
/// ```rust
/// use arbor_common::{Principal, RequestContext, AccessMode};
///
/// let ctx = RequestContext::new(Principal::new("alice").with_groups(["team-a"]))
///     .with_group_id("team-a")
///     .with_access_mode(AccessMode::Normal);
/// assert_eq!(ctx.subject(), "alice");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    /// Request ID (for tracing)
    pub request_id: String,

    /// Verified caller
    pub principal: Principal,

    /// Root folder (group) owning the target, once resolved
    pub group_id: Option<String>,

    /// How access was granted
    pub access_mode: AccessMode,

    /// Request timestamp
    pub timestamp: DateTime<Utc>,

    /// Metadata (extensible key-value pairs)
    pub metadata: HashMap<String, String>,

    /// Internal flag (for background work such as dataset ingestion)
    pub internal: bool,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            request_id: Ulid::new().to_string(),
            principal,
            group_id: None,
            access_mode: AccessMode::Normal,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            internal: false,
        }
    }

    /// Context for work the service performs on behalf of `subject` after the
    /// originating request has finished.
    pub fn internal(subject: impl Into<String>) -> Self {
        let mut ctx = Self::new(Principal::new(subject));
        ctx.internal = true;
        ctx
    }

    /// Set request_id (builder pattern)
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Set resolved group (builder pattern)
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set access mode (builder pattern)
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Add metadata (builder pattern)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn subject(&self) -> &str {
        &self.principal.subject
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}
