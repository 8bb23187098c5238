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

//! Authenticated principal and shared-access mode.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identity of the caller as extracted from verified claims.
///
/// `groups` holds the names of the root folders (groups) the subject is a
/// member of. `editor_in` / `viewer_in` hold folder ids that were shared with
/// the subject explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub editor_in: Vec<String>,
    #[serde(default)]
    pub viewer_in: Vec<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Set group memberships (builder pattern)
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Set folders shared with editor rights (builder pattern)
    pub fn with_editor_in<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.editor_in = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Set folders shared with viewer rights (builder pattern)
    pub fn with_viewer_in<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.viewer_in = folders.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_member_of(&self, group_name: &str) -> bool {
        self.groups.iter().any(|g| g == group_name)
    }

    /// True when any of `candidates` was shared with editor rights.
    pub fn edits_any(&self, candidates: &[String]) -> bool {
        intersects(&self.editor_in, candidates)
    }

    /// True when any of `candidates` was shared with viewer rights.
    pub fn views_any(&self, candidates: &[String]) -> bool {
        intersects(&self.viewer_in, candidates)
    }
}

fn intersects(shared: &[String], candidates: &[String]) -> bool {
    if shared.is_empty() || candidates.is_empty() {
        return false;
    }
    let lookup: HashSet<&str> = shared.iter().map(String::as_str).collect();
    candidates.iter().any(|c| lookup.contains(c.as_str()))
}

/// How the caller reached the target: through group membership or through a
/// folder shared with them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Normal,
    Editor,
    Viewer,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Normal => "normal",
            AccessMode::Editor => "editor",
            AccessMode::Viewer => "viewer",
        }
    }

    /// Viewers may read but not mutate.
    pub fn can_write(&self) -> bool {
        !matches!(self, AccessMode::Viewer)
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_access_intersection() {
        let principal = Principal::new("alice")
            .with_editor_in(["f1", "f2"])
            .with_viewer_in(["f9"]);

        assert!(principal.edits_any(&["root".to_string(), "f2".to_string()]));
        assert!(!principal.edits_any(&["root".to_string()]));
        assert!(principal.views_any(&["f9".to_string()]));
        assert!(!principal.views_any(&[]));
    }

    #[test]
    fn test_access_mode_serde() {
        let json = serde_json::to_string(&AccessMode::Editor).unwrap();
        assert_eq!(json, "\"editor\"");
        assert!(!AccessMode::Viewer.can_write());
        assert!(AccessMode::Normal.can_write());
    }
}
