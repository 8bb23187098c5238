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

//! # Arbor Metadata
//!
//! ## Purpose
//! Document model and repositories for folders, files, parts, multipart
//! streams and external-task records.
//!
//! ## Backends
//! - In-memory (default, tests and single-process deployments)
//! - SQLite (`sql-backend` feature)

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

#[cfg(feature = "sql-backend")]
pub mod sql;

pub use error::{MetaError, MetaResult};
pub use memory::InMemoryMetaStore;
pub use models::*;
pub use repository::{
    FileRepository, FolderRepository, MetaStore, PartRepository, StreamRepository, TaskRecordRepository,
};

#[cfg(feature = "sql-backend")]
pub use sql::SqliteMetaStore;
