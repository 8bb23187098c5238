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

//! Helper functions for object addressing

use object_store::path::Path as ObjectPath;

/// Name of the marker object written when a logical bucket is created.
pub const BUCKET_MARKER: &str = ".bucket";

/// Storage path of a logical bucket.
/// Format: {prefix}/{bucket}
pub fn bucket_path(prefix: &str, bucket: &str) -> ObjectPath {
    let normalized_prefix = prefix.trim_matches('/');
    ObjectPath::from(format!("{}/{}", normalized_prefix, bucket))
}

/// Storage path of an object inside a logical bucket.
/// Format: {prefix}/{bucket}/{key}
pub fn object_path(prefix: &str, bucket: &str, key: &str) -> ObjectPath {
    let normalized_prefix = prefix.trim_matches('/');
    ObjectPath::from(format!("{}/{}/{}", normalized_prefix, bucket, key))
}

/// Validate a bucket name or object key.
pub fn validate_name(kind: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{kind} is required"));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(format!("{kind} must be a single path segment: {name}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_ignore_surrounding_slashes() {
        assert_eq!(object_path("/arbor/", "b1", "k1").as_ref(), "arbor/b1/k1");
        assert_eq!(bucket_path("arbor", "b1").as_ref(), "arbor/b1");
    }

    #[test]
    fn test_empty_prefix() {
        assert_eq!(object_path("", "b1", "k1").as_ref(), "b1/k1");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("key", "01HZX").is_ok());
        assert!(validate_name("key", "").is_err());
        assert!(validate_name("bucket", "a/b").is_err());
    }
}
