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

//! Request admission: identify the caller, resolve the target's group and
//! the access mode, and hand both to the handlers as a [`RequestContext`].
//!
//! Routes outside `/file`, `/folder` and `/bucket/{id}` need only a verified
//! principal. The target of each guarded route is read from a single place,
//! chosen by [`TargetSource::for_route`].

use arbor_common::RequestContext;
use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use tracing::debug;

use super::error::ApiError;
use super::http_axum::AppState;
use crate::access::{Collection, ScopeHint, ScopeRequest, TargetSource};
use crate::ErrorKind;

/// Largest JSON body inspected for scope hints.
const MAX_HINT_BODY: usize = 1024 * 1024;

pub async fn access_layer(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let principal = state
        .principals
        .resolve(request.headers())
        .await
        .map_err(|e| ApiError::new(StatusCode::UNAUTHORIZED, "MID0010", "Not authenticated.").with_reason(e.to_string()))?;
    let mut ctx = RequestContext::new(principal);

    let (mut parts, body) = request.into_parts();
    let collection = Collection::from_path(parts.uri.path());
    let source = TargetSource::for_route(parts.method.as_str(), parts.uri.path());
    let (Some(collection), Some(source)) = (collection, source) else {
        parts.extensions.insert(ctx);
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let (body, hint) = if is_json {
        let bytes = to_bytes(body, MAX_HINT_BODY)
            .await
            .map_err(|e| ApiError::bad_request("MID0015", "Could not read request body.").with_reason(e.to_string()))?;
        let hint = ScopeHint::from_body(&bytes);
        (Body::from(bytes), hint)
    } else {
        (body, ScopeHint::default())
    };

    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let scope_request = ScopeRequest {
        source,
        path_id: path_id(parts.uri.path()),
        query_id: query.get("id").cloned(),
        query_path: query.get("path").cloned(),
        hint,
    };
    let target = scope_request.target(collection).ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "MID0011", "Could not determine the target of the request.")
    })?;

    let (scope, mode) = state
        .gateway
        .access
        .authorize(&ctx.principal, &target)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::Forbidden => ApiError::new(StatusCode::FORBIDDEN, "MID0012", "Access denied.")
                .with_reason(e.to_string()),
            _ => ApiError::new(StatusCode::UNAUTHORIZED, "MID0011", "Could not determine the target of the request.")
                .with_reason(e.to_string()),
        })?;
    if !mode.can_write() && parts.method != Method::GET {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "MID0013", "Viewers cannot modify content."));
    }
    if let Some(destination) = scope_request.hint.destination.as_deref().filter(|d| !d.is_empty()) {
        state
            .gateway
            .access
            .authorize_destination(&ctx.principal, destination)
            .await
            .map_err(|e| ApiError::from_gateway("MID0014", "Destination is not accessible.", &e))?;
    }

    debug!(subject = %ctx.subject(), group = %scope.group_id, mode = %mode, "[ACCESS] request admitted");
    if let Ok(value) = HeaderValue::from_str(&scope.group_id) {
        parts.headers.insert("x-group-id", value);
    }
    parts.headers.insert("x-mode", HeaderValue::from_static(mode.as_str()));
    ctx = ctx.with_group_id(scope.group_id).with_access_mode(mode);
    parts.extensions.insert(ctx);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Last segment of the path, the id of `/file/{id}`, `/file/info/{id}`,
/// `/folder/{id}` or `/bucket/{id}`.
fn path_id(path: &str) -> Option<String> {
    path.split('/').filter(|s| !s.is_empty()).last().map(str::to_string)
}
