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

//! Access-Scope Resolver
//!
//! ## Purpose
//! Works out which root folder (group) owns the target of a request and how
//! the caller may act on it.
//!
//! ## Target source
//! Each route reads its target from exactly the field its handler acts on
//! (see [`TargetSource::for_route`]):
//! - the id in the URL path (`/file/{id}`, `/file/info/{id}`,
//!   `/folder/{id}`, `/bucket/{id}`)
//! - the `id` query parameter, else the first segment of `path`
//!   (`GET /folder`, `/folder/list`)
//! - the body `_id` (updates, copies and moves)
//! - the body `parent` (`POST /folder`) or `folder` (`POST /file`)
//!
//! Other fields of the request never redirect the check.
//!
//! ## Grants
//! Group membership gives [`AccessMode::Normal`], a shared folder on the
//! target's chain gives `Editor` or `Viewer` (editor wins when both apply).
//! Buckets are administered by group members only.

use arbor_common::{AccessMode, Principal};
use serde::Deserialize;
use tracing::debug;

use crate::tree::TreeEngine;
use crate::{GatewayError, GatewayResult};

/// Entity family named by the first URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    File,
    Folder,
    Bucket,
}

impl Collection {
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "file" => Some(Collection::File),
            "folder" => Some(Collection::Folder),
            "bucket" => Some(Collection::Bucket),
            _ => None,
        }
    }

    /// Collection of a request path, from its first segment.
    pub fn from_path(path: &str) -> Option<Self> {
        path.split('/').find(|s| !s.is_empty()).and_then(Self::from_segment)
    }
}

/// The few body fields the resolver cares about. Anything else in the body,
/// or a body that is not JSON at all, is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScopeHint {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

impl ScopeHint {
    pub fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// What a request points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTarget {
    FileId(String),
    FolderId(String),
    RootTitle(String),
    /// A bucket's root folder; shares never apply
    Bucket(String),
}

/// Where a route carries the id of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    PathId,
    /// `id` query parameter, else the root named by `path`
    Query,
    BodyId,
    BodyParent,
    BodyFolder,
}

impl TargetSource {
    /// Source for `method path`, or `None` when the route carries no target.
    pub fn for_route(method: &str, path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match (segments.as_slice(), method) {
            (["bucket", _], _) => Some(TargetSource::PathId),
            (["folder"], "GET") => Some(TargetSource::Query),
            (["folder"], "POST") => Some(TargetSource::BodyParent),
            (["folder"], "PUT") => Some(TargetSource::BodyId),
            (["folder", "list"], _) => Some(TargetSource::Query),
            (["folder" | "file", "copy" | "move"], _) => Some(TargetSource::BodyId),
            (["folder", _], _) => Some(TargetSource::PathId),
            (["file"], "POST") => Some(TargetSource::BodyFolder),
            (["file"], "PUT") => Some(TargetSource::BodyId),
            (["file", "info", _], _) => Some(TargetSource::PathId),
            (["file", _], _) => Some(TargetSource::PathId),
            _ => None,
        }
    }
}

/// Everything the resolver reads off one request.
#[derive(Debug, Clone)]
pub struct ScopeRequest {
    pub source: TargetSource,
    pub path_id: Option<String>,
    pub query_id: Option<String>,
    pub query_path: Option<String>,
    pub hint: ScopeHint,
}

impl ScopeRequest {
    pub fn new(source: TargetSource) -> Self {
        Self {
            source,
            path_id: None,
            query_id: None,
            query_path: None,
            hint: ScopeHint::default(),
        }
    }

    /// Read the target from the field named by `self.source` only.
    pub fn target(&self, collection: Collection) -> Option<ScopeTarget> {
        let by_id = |id: &str| match collection {
            Collection::File => ScopeTarget::FileId(id.to_string()),
            Collection::Folder => ScopeTarget::FolderId(id.to_string()),
            Collection::Bucket => ScopeTarget::Bucket(id.to_string()),
        };
        match self.source {
            TargetSource::PathId => non_empty(&self.path_id).map(by_id),
            TargetSource::Query => match non_empty(&self.query_id) {
                Some(id) => Some(by_id(id)),
                None => non_empty(&self.query_path)?
                    .split('/')
                    .find(|s| !s.is_empty())
                    .map(|root| ScopeTarget::RootTitle(root.to_string())),
            },
            TargetSource::BodyId => non_empty(&self.hint.id).map(by_id),
            TargetSource::BodyParent => non_empty(&self.hint.parent).map(|id| ScopeTarget::FolderId(id.to_string())),
            TargetSource::BodyFolder => non_empty(&self.hint.folder).map(|id| ScopeTarget::FolderId(id.to_string())),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Owning group and shared-access candidates of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub group_id: String,
    pub group_name: String,
    /// Folder ids on the target's chain that can carry a share
    pub candidates: Vec<String>,
}

#[derive(Clone)]
pub struct AccessResolver {
    tree: TreeEngine,
}

impl AccessResolver {
    pub fn new(tree: TreeEngine) -> Self {
        Self { tree }
    }

    pub async fn scope_of(&self, target: &ScopeTarget) -> GatewayResult<Scope> {
        match target {
            ScopeTarget::FileId(id) => {
                let file = self.tree.get_file(id).await?;
                let mut candidates = file.ancestors.clone();
                candidates.push(file.folder_id.clone());
                self.scope_for_root(file.group_id(), candidates).await
            }
            ScopeTarget::FolderId(id) => {
                let folder = self.tree.get_folder(id).await?;
                if folder.is_root() {
                    return Ok(Scope {
                        group_id: folder.id.clone(),
                        group_name: folder.meta.title.clone(),
                        candidates: vec![folder.id],
                    });
                }
                self.scope_for_root(folder.group_id(), folder.lineage()).await
            }
            ScopeTarget::Bucket(id) => {
                let folder = self.tree.get_folder(id).await?;
                self.scope_for_root(folder.group_id(), Vec::new()).await
            }
            ScopeTarget::RootTitle(title) => {
                let root = self
                    .tree
                    .store()
                    .folders
                    .find_root_by_title(title)
                    .await?
                    .ok_or_else(|| GatewayError::not_found("folder", title.as_str()))?;
                Ok(Scope {
                    group_id: root.id.clone(),
                    group_name: root.meta.title.clone(),
                    candidates: vec![root.id],
                })
            }
        }
    }

    async fn scope_for_root(&self, root_id: &str, candidates: Vec<String>) -> GatewayResult<Scope> {
        let root = self.tree.get_folder(root_id).await?;
        Ok(Scope {
            group_id: root.id,
            group_name: root.meta.title,
            candidates,
        })
    }

    /// How `principal` may act inside `scope`.
    pub fn grant(&self, principal: &Principal, scope: &Scope) -> GatewayResult<AccessMode> {
        let mode = if principal.is_member_of(&scope.group_name) {
            AccessMode::Normal
        } else if principal.edits_any(&scope.candidates) {
            AccessMode::Editor
        } else if principal.views_any(&scope.candidates) {
            AccessMode::Viewer
        } else {
            return Err(GatewayError::Forbidden(format!(
                "{} has no access to {}",
                principal.subject, scope.group_name
            )));
        };
        debug!(subject = %principal.subject, group = %scope.group_id, mode = %mode, "[ACCESS] granted");
        Ok(mode)
    }

    /// Resolve `target` and grant access to it in one step.
    pub async fn authorize(&self, principal: &Principal, target: &ScopeTarget) -> GatewayResult<(Scope, AccessMode)> {
        let scope = self.scope_of(target).await?;
        let mode = self.grant(principal, &scope)?;
        Ok((scope, mode))
    }

    /// Copy and move destinations must be writable for the caller.
    pub async fn authorize_destination(&self, principal: &Principal, folder_id: &str) -> GatewayResult<AccessMode> {
        let (scope, mode) = self
            .authorize(principal, &ScopeTarget::FolderId(folder_id.to_string()))
            .await?;
        if !mode.can_write() {
            return Err(GatewayError::Forbidden(format!(
                "{} can only view {}",
                principal.subject, scope.group_name
            )));
        }
        Ok(mode)
    }
}
