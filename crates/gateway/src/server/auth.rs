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

//! Caller identity.
//!
//! ## Purpose
//! Turns the `Authorization: Bearer <token>` header into a [`Principal`].
//!
//! ## Claims
//! `sub`, `groupIDs` (root folder names), `editor_in` and `viewer_in`
//! (shared folder ids). The algorithm is read from the token header; the key
//! is an HMAC secret or the path of an RSA public key PEM.

use arbor_common::Principal;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tracing::debug;

use crate::{GatewayError, GatewayResult};

#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    /// Identify the caller, or fail with `Unauthenticated`.
    async fn resolve(&self, headers: &HeaderMap) -> GatewayResult<Principal>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "groupIDs", default)]
    group_ids: Vec<String>,
    #[serde(default)]
    editor_in: Vec<String>,
    #[serde(default)]
    viewer_in: Vec<String>,
}

/// Verifies signed bearer tokens.
#[derive(Clone)]
pub struct JwtPrincipalResolver {
    key: DecodingKey,
    timeout: Duration,
}

impl JwtPrincipalResolver {
    pub fn new(jwt_key: &str, timeout: Duration) -> GatewayResult<Self> {
        Ok(Self {
            key: load_decoding_key(jwt_key)?,
            timeout,
        })
    }

    fn verify(key: &DecodingKey, token: &str) -> GatewayResult<Principal> {
        let header = decode_header(token)
            .map_err(|e| GatewayError::Unauthenticated(format!("Invalid token header: {e}")))?;
        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, key, &validation)
            .map_err(|e| GatewayError::Unauthenticated(format!("Token validation failed: {e}")))?;
        let claims = data.claims;
        Ok(Principal::new(claims.sub)
            .with_groups(claims.group_ids)
            .with_editor_in(claims.editor_in)
            .with_viewer_in(claims.viewer_in))
    }
}

#[async_trait]
impl PrincipalResolver for JwtPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> GatewayResult<Principal> {
        let token = bearer_token(headers)?.to_string();
        let key = self.key.clone();
        let verified = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || Self::verify(&key, &token)),
        )
        .await
        .map_err(|_| GatewayError::Unauthenticated("Token verification timed out".to_string()))?
        .map_err(|e| GatewayError::Internal(format!("Token verification task failed: {e}")))?;
        let principal = verified?;
        debug!(subject = %principal.subject, "[ACCESS] token verified");
        Ok(principal)
    }
}

/// Fixed token → principal table.
#[derive(Clone, Default)]
pub struct StaticPrincipalResolver {
    principals: HashMap<String, Principal>,
}

impl StaticPrincipalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token (builder pattern)
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.principals.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl PrincipalResolver for StaticPrincipalResolver {
    async fn resolve(&self, headers: &HeaderMap) -> GatewayResult<Principal> {
        let token = bearer_token(headers)?;
        self.principals
            .get(token)
            .cloned()
            .ok_or_else(|| GatewayError::Unauthenticated("Unknown token".to_string()))
    }
}

fn bearer_token(headers: &HeaderMap) -> GatewayResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::Unauthenticated("Missing bearer token".to_string()))
}

fn load_decoding_key(key: &str) -> GatewayResult<DecodingKey> {
    if key.ends_with(".pem") || key.starts_with('/') || key.starts_with("./") {
        let pem = fs::read(key).map_err(|e| GatewayError::Internal(format!("Failed to read public key file {key}: {e}")))?;
        DecodingKey::from_rsa_pem(&pem).map_err(|e| GatewayError::Internal(format!("Invalid RSA public key: {e}")))
    } else {
        Ok(DecodingKey::from_secret(key.as_bytes()))
    }
}
