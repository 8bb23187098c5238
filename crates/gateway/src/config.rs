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

//! Gateway configuration

use arbor_blob::BlobConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default part size: 5 MiB.
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default Copernicus landing folder.
pub const DEFAULT_COPERNICUS_FOLDER: &str = "ee7d2834-b7be-4008-8b6a-edd55729b893";

/// Location and credentials of one remote dataset service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// API base URL, e.g. `https://cds.climate.copernicus.eu/api/v2`
    pub url: String,
    /// `uid:key` pair used for basic auth
    pub key: Option<String>,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listen address
    pub listen_addr: String,

    /// `memory` or a `sqlite://` URL
    pub metadata_url: String,

    /// Size of the chunks ingested datasets are split into, and the unit
    /// `parts` is reported in
    pub part_size: usize,

    /// Sleep between remote status polls
    pub poll_interval_secs: u64,

    /// Lease duration for poll loops
    pub lease_duration_secs: u32,

    /// Concurrent part uploads per ingestion
    pub ingest_concurrency: usize,

    /// Concurrent poll loops
    pub poller_workers: usize,

    /// Upper bound on bearer token verification
    pub claims_timeout_secs: u64,

    /// HMAC secret, or path to an RSA public key PEM
    pub jwt_key: Option<String>,

    /// Folder dataset results land in
    pub copernicus_folder_id: String,

    pub cds: ServiceEndpoint,
    pub ads: ServiceEndpoint,

    /// Base URL of the published dataset forms
    pub forms_url: String,

    pub blob: BlobConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            metadata_url: "memory".to_string(),
            part_size: DEFAULT_PART_SIZE,
            poll_interval_secs: 5,
            lease_duration_secs: 300,
            ingest_concurrency: 8,
            poller_workers: 16,
            claims_timeout_secs: 10,
            jwt_key: None,
            copernicus_folder_id: DEFAULT_COPERNICUS_FOLDER.to_string(),
            cds: ServiceEndpoint {
                url: "https://cds.climate.copernicus.eu/api/v2".to_string(),
                key: None,
            },
            ads: ServiceEndpoint {
                url: "https://ads.atmosphere.copernicus.eu/api/v2".to_string(),
                key: None,
            },
            forms_url: "http://datastore.copernicus-climate.eu/c3s/published-forms/c3sprod".to_string(),
            blob: BlobConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Everything in memory; used by tests and local runs.
    pub fn in_memory() -> Self {
        Self {
            blob: BlobConfig::memory(),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: env::var("ARBOR_LISTEN_ADDR").unwrap_or_else(|_| defaults.listen_addr.clone()),
            metadata_url: env::var("ARBOR_METADATA_URL").unwrap_or_else(|_| defaults.metadata_url.clone()),
            part_size: parse_env("ARBOR_PART_SIZE", defaults.part_size),
            poll_interval_secs: parse_env("ARBOR_POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            lease_duration_secs: parse_env("ARBOR_LEASE_DURATION_SECS", defaults.lease_duration_secs),
            ingest_concurrency: parse_env("ARBOR_INGEST_CONCURRENCY", defaults.ingest_concurrency),
            poller_workers: parse_env("ARBOR_POLLER_WORKERS", defaults.poller_workers),
            claims_timeout_secs: parse_env("ARBOR_CLAIMS_TIMEOUT_SECS", defaults.claims_timeout_secs),
            jwt_key: env::var("ARBOR_JWT_KEY").ok(),
            copernicus_folder_id: env::var("COP_BUCKET_ID").unwrap_or_else(|_| defaults.copernicus_folder_id.clone()),
            cds: ServiceEndpoint {
                url: env::var("CDS_URL").unwrap_or_else(|_| defaults.cds.url.clone()),
                key: env::var("CDS_KEY").ok(),
            },
            ads: ServiceEndpoint {
                url: env::var("ADS_URL").unwrap_or_else(|_| defaults.ads.url.clone()),
                key: env::var("ADS_KEY").ok(),
            },
            forms_url: env::var("ARBOR_FORMS_URL").unwrap_or_else(|_| defaults.forms_url.clone()),
            blob: BlobConfig::from_env(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }
        if self.metadata_url != "memory" && !self.metadata_url.starts_with("sqlite:") {
            return Err(format!("Unsupported metadata_url: {}", self.metadata_url));
        }
        if self.part_size == 0 {
            return Err("part_size must be positive".to_string());
        }
        if self.ingest_concurrency == 0 {
            return Err("ingest_concurrency must be positive".to_string());
        }
        if self.poller_workers == 0 {
            return Err("poller_workers must be positive".to_string());
        }
        if self.lease_duration_secs as u64 <= self.poll_interval_secs {
            return Err("lease_duration_secs must exceed poll_interval_secs".to_string());
        }
        if self.copernicus_folder_id.is_empty() {
            return Err("copernicus_folder_id is required".to_string());
        }
        self.blob.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn claims_timeout(&self) -> Duration {
        Duration::from_secs(self.claims_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
