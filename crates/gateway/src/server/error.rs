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

//! HTTP error bodies.
//!
//! Every failure leaves the server as
//! `{"message", "reason", "status", "internal_status"}` where
//! `internal_status` is a stable code naming the call site.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::{ErrorKind, GatewayError, GatewayResult};

const SUPPORT_SUFFIX: &str = " Please contact the Core Platform Support Team.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub reason: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: String,
    reason: &'a str,
    status: u16,
    internal_status: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            reason: String::new(),
        }
    }

    /// Set reason (builder pattern)
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// Wrap a gateway error; the HTTP status follows its kind.
    pub fn from_gateway(code: &'static str, message: impl Into<String>, err: &GatewayError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, code, message).with_reason(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(code = %self.code, reason = %self.reason, "[HTTP] request failed");
        }
        let body = ErrorBody {
            message: format!("{}{}", self.message, SUPPORT_SUFFIX),
            reason: &self.reason,
            status: self.status.as_u16(),
            internal_status: self.code,
        };
        (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::to_string(&body).unwrap_or_else(|_| "{\"message\":\"Internal error\"}".to_string()),
        )
            .into_response()
    }
}

/// Attach a call-site code to gateway results.
pub trait ApiResultExt<T> {
    /// Any failure gets `code`.
    fn api(self, code: &'static str, message: &str) -> Result<T, ApiError>;

    /// Failures whose kind is listed get the paired code, the rest `code`.
    fn api_by_kind(self, kinds: &[(ErrorKind, &'static str)], code: &'static str, message: &str) -> Result<T, ApiError>;
}

impl<T> ApiResultExt<T> for GatewayResult<T> {
    fn api(self, code: &'static str, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_gateway(code, message, &e))
    }

    fn api_by_kind(self, kinds: &[(ErrorKind, &'static str)], code: &'static str, message: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            let kind = e.kind();
            let code = kinds
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, c)| *c)
                .unwrap_or(code);
            ApiError::from_gateway(code, message, &e)
        })
    }
}
