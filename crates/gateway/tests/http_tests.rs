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

//! HTTP surface: routing, admission and error bodies.

use arbor_common::Principal;
use arbor_gateway::server::{create_router, StaticPrincipalResolver};
use arbor_gateway::{FetchedAsset, Gateway, GatewayConfig, GatewayError, GatewayResult, RemoteTask, Service, TaskClient};
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Remote services that are always down.
struct OfflineClient;

#[async_trait]
impl TaskClient for OfflineClient {
    async fn list_datasets(&self, _service: Service) -> GatewayResult<Vec<String>> {
        Err(GatewayError::Upstream("offline".to_string()))
    }

    async fn dataset_form(&self, _service: Service, _dataset_id: &str) -> GatewayResult<Value> {
        Err(GatewayError::Upstream("offline".to_string()))
    }

    async fn submit(&self, _service: Service, _dataset: &str, _params: &Value) -> GatewayResult<RemoteTask> {
        Err(GatewayError::Upstream("offline".to_string()))
    }

    async fn status(&self, _service: Service, _job_id: &str) -> GatewayResult<RemoteTask> {
        Err(GatewayError::Upstream("offline".to_string()))
    }

    async fn fetch(&self, _location: &str) -> GatewayResult<FetchedAsset> {
        Err(GatewayError::Upstream("offline".to_string()))
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn code(&self) -> String {
        self.json()["internal_status"].as_str().unwrap_or_default().to_string()
    }
}

/// Tokens: `owner` is in group `lab`, `viewer` and `editor` hold shares on
/// the `lab` root, `stranger` has nothing.
fn create_test_app() -> Router {
    let mut config = GatewayConfig::in_memory();
    config.part_size = 4;
    let gateway = Gateway::in_memory(config, Arc::new(OfflineClient));
    let principals = StaticPrincipalResolver::new()
        .with_token("owner", Principal::new("owner").with_groups(["lab"]))
        .with_token("viewer", Principal::new("viewer").with_viewer_in(["lab"]))
        .with_token("editor", Principal::new("editor").with_editor_in(["lab"]))
        .with_token("stranger", Principal::new("stranger").with_groups(["elsewhere"]));
    create_router(gateway, Arc::new(principals))
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    Reply { status, headers, body }
}

fn json_request(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn plain_request(method: Method, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body)
        .unwrap()
}

async fn create_test_bucket(app: &Router) -> Value {
    let reply = send(app, json_request(Method::POST, "/bucket", "owner", json!({"name": "lab"}))).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.json()
}

async fn create_test_folder(app: &Router, parent: &str, name: &str) -> Reply {
    send(
        app,
        json_request(
            Method::POST,
            "/folder",
            "owner",
            json!({"folder_name": name, "parent": parent, "description": "test"}),
        ),
    )
    .await
}

#[tokio::test]
async fn test_bucket_and_folder_creation() {
    let app = create_test_app();
    let root = create_test_bucket(&app).await;
    assert_eq!(root["_id"], "lab");

    let reply = create_test_folder(&app, "lab", "raw").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let folder = reply.json();
    assert_eq!(folder["meta"]["title"], "raw");
    assert_eq!(folder["parent"], "lab");

    let reply = create_test_folder(&app, "lab", "raw").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.code(), "FOL0005");
    assert!(reply.json()["message"]
        .as_str()
        .unwrap()
        .ends_with("Please contact the Core Platform Support Team."));

    let uri = format!("/folder?id={}", folder["_id"].as_str().unwrap());
    let reply = send(&app, plain_request(Method::GET, &uri, "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["_id"], folder["_id"]);

    let reply = send(&app, plain_request(Method::GET, "/folder?path=/lab/raw", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["_id"], folder["_id"]);
}

#[tokio::test]
async fn test_folder_lookup_needs_exactly_one_key() {
    let app = create_test_app();
    create_test_bucket(&app).await;
    let reply = send(
        &app,
        plain_request(Method::GET, "/folder?id=lab&path=/lab", "owner", Body::empty()),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "FOL0023");
}

#[tokio::test]
async fn test_upload_and_download_parts() {
    let app = create_test_app();
    create_test_bucket(&app).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/file")
        .header(header::AUTHORIZATION, "Bearer owner")
        .header(header::CONTENT_TYPE, "application/json")
        .header("total", "2")
        .body(Body::from(json!({"folder": "lab", "original_title": "obs.csv"}).to_string()))
        .unwrap();
    let reply = send(&app, request).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let file = reply.json();
    let id = file["_id"].as_str().unwrap().to_string();
    assert_eq!(file["meta"]["title"], "obs");

    for (part, data) in [(1, "abcdef"), (2, "ghij")] {
        let uri = format!("/file/{id}?part={part}");
        let request = plain_request(Method::POST, &uri, "owner", Body::from(data));
        let reply = send(&app, request).await;
        assert_eq!(reply.status, StatusCode::OK, "part {part}");
    }

    let uri = format!("/file/{id}?part=1");
    let reply = send(&app, plain_request(Method::POST, &uri, "owner", Body::from("again"))).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.code(), "FIL0013");

    let uri = format!("/file/{id}?part=2");
    let reply = send(&app, plain_request(Method::GET, &uri, "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(reply.body, Bytes::from_static(b"ghij"));

    let uri = format!("/file/info/{id}");
    let reply = send(&app, plain_request(Method::GET, &uri, "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["parts"], "3");
    assert_eq!(reply.json()["size"], 10);

    let uri = format!("/file/{id}?part=0");
    let reply = send(&app, plain_request(Method::GET, &uri, "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "FIL0020");
}

#[tokio::test]
async fn test_initiate_requires_total_header() {
    let app = create_test_app();
    create_test_bucket(&app).await;
    let reply = send(
        &app,
        json_request(Method::POST, "/file", "owner", json!({"folder": "lab", "original_title": "a.txt"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "FIL0003");
}

#[tokio::test]
async fn test_admission_failures() {
    let app = create_test_app();
    create_test_bucket(&app).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/folder?id=lab")
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, request).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.code(), "MID0010");

    let reply = send(&app, plain_request(Method::GET, "/folder?id=lab", "stranger", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.code(), "MID0012");

    let reply = send(&app, plain_request(Method::GET, "/folder/list", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.code(), "MID0011");
}

#[tokio::test]
async fn test_viewers_read_but_do_not_write() {
    let app = create_test_app();
    create_test_bucket(&app).await;
    let folder = create_test_folder(&app, "lab", "shared").await.json();
    let id = folder["_id"].as_str().unwrap();

    let uri = format!("/folder/list?id={id}");
    let reply = send(&app, plain_request(Method::GET, &uri, "viewer", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(
        &app,
        json_request(Method::PUT, "/folder", "viewer", json!({"_id": id, "title": "renamed"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.code(), "MID0013");

    let reply = send(
        &app,
        json_request(Method::PUT, "/folder", "editor", json!({"_id": id, "title": "renamed"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["meta"]["title"], "renamed");
}

#[tokio::test]
async fn test_copy_destination_must_be_writable() {
    let app = create_test_app();
    create_test_bucket(&app).await;
    let source = create_test_folder(&app, "lab", "source").await.json();
    let target = create_test_folder(&app, "lab", "target").await.json();

    let body = json!({"_id": source["_id"], "destination": target["_id"]});
    let reply = send(&app, json_request(Method::POST, "/folder/copy", "viewer", body.clone())).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, json_request(Method::POST, "/folder/copy", "owner", body)).await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.json()["meta"]["title"], "source");
}

#[tokio::test]
async fn test_extra_body_fields_do_not_redirect_the_check() {
    let app = create_test_app();
    create_test_bucket(&app).await;
    let raw = create_test_folder(&app, "lab", "raw").await.json();
    let reply = send(
        &app,
        json_request(Method::POST, "/bucket", "stranger", json!({"name": "elsewhere"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let body = json!({"folder_name": "planted", "parent": "lab", "_id": "elsewhere"});
    let reply = send(&app, json_request(Method::POST, "/folder", "stranger", body)).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.code(), "MID0012");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/file")
        .header(header::AUTHORIZATION, "Bearer stranger")
        .header(header::CONTENT_TYPE, "application/json")
        .header("total", "1")
        .body(Body::from(
            json!({"folder": "lab", "_id": "elsewhere", "original_title": "x.bin"}).to_string(),
        ))
        .unwrap();
    let reply = send(&app, request).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(
        &app,
        json_request(
            Method::PUT,
            "/folder?id=elsewhere",
            "stranger",
            json!({"_id": raw["_id"], "title": "taken"}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, plain_request(Method::GET, "/folder/list?id=lab", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);
    let folders = reply.json()["folders"].clone();
    assert_eq!(folders.as_object().map(|m| m.len()), Some(1));
    assert_eq!(folders[raw["_id"].as_str().unwrap()]["title"], "raw");
}

#[tokio::test]
async fn test_buckets_need_group_membership() {
    let app = create_test_app();
    create_test_bucket(&app).await;

    for token in ["editor", "viewer"] {
        let reply = send(&app, plain_request(Method::DELETE, "/bucket/lab", token, Body::empty())).await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{token}");
        assert_eq!(reply.code(), "MID0012");
    }

    let reply = send(&app, plain_request(Method::DELETE, "/bucket/lab", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_copernicus_routes() {
    let app = create_test_app();

    let reply = send(&app, plain_request(Method::GET, "/copernicus/xyz/getall", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "COP0002");

    let reply = send(&app, plain_request(Method::GET, "/copernicus/cds/getall", "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply.code(), "COP0016");

    let uri = "/copernicus/ads/dataset/unknown-record";
    let reply = send(&app, plain_request(Method::GET, uri, "owner", Body::empty())).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.code(), "COP0011");
}
