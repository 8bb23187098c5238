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

//! Client for the Copernicus dataset services (CDS and ADS).
//!
//! ## Purpose
//! [`TaskClient`] is the seam between the poller and the remote job API:
//! submit a retrieval, read its status, fetch the finished asset, and the
//! two catalogue calls the HTTP surface passes through.
//!
//! ## Fingerprints
//! A request is identified by the SHA-256 of its canonical JSON form
//! (object keys sorted at every depth), so clients that send the same
//! parameters in a different order hit the same record.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::{GatewayConfig, ServiceEndpoint};
use crate::{GatewayError, GatewayResult};

/// Remote dataset service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Cds,
    Ads,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Cds => "cds",
            Service::Ads => "ads",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cds" => Ok(Service::Cds),
            "ads" => Ok(Service::Ads),
            other => Err(GatewayError::Validation(format!(
                "Service not supported: {other}. Provide service 'cds' or 'ads'"
            ))),
        }
    }
}

/// Error block of a remote task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

/// Remote task as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Coarse remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Queued,
    Running,
    Completed,
    Failed,
    Denied,
}

impl RemoteTask {
    pub fn remote_state(&self) -> RemoteState {
        match self.state.as_str() {
            "completed" => RemoteState::Completed,
            "failed" => RemoteState::Failed,
            "denied" => RemoteState::Denied,
            "running" => RemoteState::Running,
            _ => RemoteState::Queued,
        }
    }
}

/// A result asset being downloaded.
pub struct FetchedAsset {
    /// Declared length, when the server sent one
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, GatewayResult<Bytes>>,
}

/// Remote job API.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Dataset ids published by `service`.
    async fn list_datasets(&self, service: Service) -> GatewayResult<Vec<String>>;

    /// Request form of a dataset, passed through verbatim.
    async fn dataset_form(&self, service: Service, dataset_id: &str) -> GatewayResult<Value>;

    /// Submit a retrieval job.
    async fn submit(&self, service: Service, dataset: &str, params: &Value) -> GatewayResult<RemoteTask>;

    /// Current state of a job.
    async fn status(&self, service: Service, job_id: &str) -> GatewayResult<RemoteTask>;

    /// Download a finished job's asset.
    async fn fetch(&self, location: &str) -> GatewayResult<FetchedAsset>;
}

/// `reqwest` implementation of [`TaskClient`].
#[derive(Clone)]
pub struct CopernicusClient {
    http: reqwest::Client,
    cds: ServiceEndpoint,
    ads: ServiceEndpoint,
    forms_url: String,
}

impl CopernicusClient {
    pub fn new(cds: ServiceEndpoint, ads: ServiceEndpoint, forms_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            cds,
            ads,
            forms_url: forms_url.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.cds.clone(), config.ads.clone(), config.forms_url.clone())
    }

    fn endpoint(&self, service: Service) -> &ServiceEndpoint {
        match service {
            Service::Cds => &self.cds,
            Service::Ads => &self.ads,
        }
    }

    fn url(&self, service: Service, path: &str) -> String {
        format!("{}/{}", self.endpoint(service).url.trim_end_matches('/'), path)
    }

    fn authorize(&self, service: Service, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.endpoint(service).key.as_deref().and_then(|k| k.split_once(':')) {
            Some((uid, key)) => request.basic_auth(uid, Some(key)),
            None => request,
        }
    }
}

#[async_trait]
impl TaskClient for CopernicusClient {
    async fn list_datasets(&self, service: Service) -> GatewayResult<Vec<String>> {
        let response = self
            .http
            .get(self.url(service, "resources/"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn dataset_form(&self, _service: Service, dataset_id: &str) -> GatewayResult<Value> {
        let url = format!("{}/{}/form.json", self.forms_url.trim_end_matches('/'), dataset_id);
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn submit(&self, service: Service, dataset: &str, params: &Value) -> GatewayResult<RemoteTask> {
        let request = self.http.post(self.url(service, &format!("resources/{dataset}"))).json(params);
        let response = self.authorize(service, request).send().await?.error_for_status()?;
        let task: RemoteTask = response.json().await?;
        debug!(service = %service, dataset = %dataset, state = %task.state, "[POLLER] job submitted");
        Ok(task)
    }

    async fn status(&self, service: Service, job_id: &str) -> GatewayResult<RemoteTask> {
        let request = self.http.get(self.url(service, &format!("tasks/{job_id}")));
        let response = self.authorize(service, request).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch(&self, location: &str) -> GatewayResult<FetchedAsset> {
        let response = self.http.get(location).send().await?.error_for_status()?;
        let content_length = response.content_length();
        let stream = response.bytes_stream().map_err(GatewayError::from).boxed();
        Ok(FetchedAsset { content_length, stream })
    }
}

/// SHA-256 hex of the canonical form of `{dataset_name, body}`.
pub fn fingerprint(dataset_name: &str, body: &Value) -> String {
    let request = serde_json::json!({ "dataset_name": dataset_name, "body": body });
    let mut canonical = String::new();
    write_canonical(&request, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
