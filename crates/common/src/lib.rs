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

//! # Arbor Common
//!
//! ## Purpose
//! Types shared by every Arbor crate: the authenticated [`Principal`], the
//! per-request [`RequestContext`] and process-wide tracing setup.
//!
//! ## Architecture Context
//! The HTTP layer builds a `RequestContext` once per request (after the
//! principal is verified and the access scope resolved) and passes it by
//! reference through the tree engine, the transfer coordinator and the task
//! poller. Background work builds an internal context for the subject that
//! originally triggered it.

pub mod principal;
pub mod request_context;
pub mod tracing_setup;

pub use principal::{AccessMode, Principal};
pub use request_context::RequestContext;
pub use tracing_setup::init_tracing;
