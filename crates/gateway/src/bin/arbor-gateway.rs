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

//! Arbor gateway server
//!
//! ## Purpose
//! Runs the HTTP surface over the configured metadata, blob and lease
//! backends. Settings come from the environment; flags override them.

use anyhow::{Context, Result};
use arbor_gateway::server::{create_router, JwtPrincipalResolver};
use arbor_gateway::{Gateway, GatewayConfig};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "arbor-gateway")]
#[command(about = "Arbor storage gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen address (e.g., 0.0.0.0:8080)
        #[arg(short, long, env = "ARBOR_LISTEN_ADDR")]
        listen: Option<String>,

        /// `memory` or a sqlite:// URL
        #[arg(short, long, env = "ARBOR_METADATA_URL")]
        metadata_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    arbor_common::init_tracing("info").map_err(|e| anyhow::anyhow!(e))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, metadata_url } => {
            let mut config = GatewayConfig::from_env();
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(metadata_url) = metadata_url {
                config.metadata_url = metadata_url;
            }
            serve(config).await
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let jwt_key = config.jwt_key.clone().context("ARBOR_JWT_KEY is required")?;
    let principals = JwtPrincipalResolver::new(&jwt_key, config.claims_timeout())?;
    let listen_addr = config.listen_addr.clone();

    let gateway = Gateway::from_config(config).await?;
    let resumed = gateway.resume_unfinished().await?;
    info!(resumed = resumed.len(), "[HTTP] dataset polling resumed");

    let router = create_router(gateway.clone(), Arc::new(principals));
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    info!(addr = %listen_addr, "[HTTP] listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Unfinished poll loops are resumed on the next start.
    if tokio::time::timeout(SHUTDOWN_GRACE, gateway.shutdown()).await.is_err() {
        warn!("[HTTP] background polling still running at shutdown");
    }
    Ok(())
}
