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

//! Axum HTTP handlers for buckets, folders, files and Copernicus datasets.
//!
//! Routes:
//! - `POST /bucket`, `DELETE /bucket/{id}`
//! - `POST|GET|PUT /folder`, `DELETE /folder/{id}`, `GET /folder/list`,
//!   `POST /folder/copy`, `PUT /folder/move`
//! - `POST /file` (initiate), `POST /file/{id}?part=N` (upload),
//!   `GET /file/{id}?part=N`, `GET /file/info/{id}`, `DELETE /file/{id}`,
//!   `PUT /file`, `POST /file/copy`, `PUT /file/move`
//! - `GET /copernicus/{service}/getall`, `GET /copernicus/{service}/getform/{id}`,
//!   `POST /copernicus/{service}/dataset`, `GET /copernicus/{service}/dataset/{id}`

use arbor_common::RequestContext;
use arbor_meta::{File, TaskRecord, TaskStatus, TransferMode};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::auth::PrincipalResolver;
use super::error::{ApiError, ApiResultExt};
use super::middleware::access_layer;
use crate::copernicus::Service;
use crate::transfer::NewUpload;
use crate::{ErrorKind, Gateway};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub principals: Arc<dyn PrincipalResolver>,
}

/// Create Axum router for the gateway
pub fn create_router(gateway: Gateway, principals: Arc<dyn PrincipalResolver>) -> Router {
    let state = AppState { gateway, principals };
    Router::new()
        .route("/bucket", post(handle_create_bucket))
        .route("/bucket/:id", axum::routing::delete(handle_delete_bucket))
        .route(
            "/folder",
            post(handle_create_folder).get(handle_get_folder).put(handle_update_folder),
        )
        .route("/folder/list", get(handle_list_folder))
        .route("/folder/copy", post(handle_copy_folder))
        .route("/folder/move", put(handle_move_folder))
        .route("/folder/:id", axum::routing::delete(handle_delete_folder))
        .route("/file", post(handle_initiate_upload).put(handle_update_file))
        .route("/file/copy", post(handle_copy_file))
        .route("/file/move", put(handle_move_file))
        .route("/file/info/:id", get(handle_file_info))
        .route(
            "/file/:id",
            post(handle_upload_part)
                .get(handle_download_part)
                .delete(handle_delete_file),
        )
        .route("/copernicus/:service/getall", get(handle_list_datasets))
        .route("/copernicus/:service/getform/:id", get(handle_dataset_form))
        .route("/copernicus/:service/dataset", post(handle_submit_dataset))
        .route("/copernicus/:service/dataset/:id", get(handle_dataset_status))
        .layer(middleware::from_fn_with_state(state.clone(), access_layer))
        .with_state(state)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()),
    )
        .into_response()
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &[u8], code: &'static str) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(code, "Malformed request body.").with_reason(e.to_string()))
}

// -------------------------------------------------------------------------
// Buckets
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct PostBucketBody {
    name: String,
}

async fn handle_create_bucket(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PostBucketBody = parse_json(&body, "BUC0001")?;
    let root = state
        .gateway
        .buckets
        .create_bucket(&ctx, &request.name)
        .await
        .api("BUC0002", "Could not create bucket.")?;
    info!(bucket = %root.id, subject = %ctx.subject(), "[HTTP] bucket created");
    Ok(json_response(StatusCode::CREATED, &root))
}

async fn handle_delete_bucket(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let removal = state
        .gateway
        .buckets
        .delete_bucket(&ctx, &id)
        .await
        .api("BUC0003", "Could not delete bucket.")?;
    Ok(json_response(StatusCode::OK, &removal))
}

// -------------------------------------------------------------------------
// Folders
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct PostFolderBody {
    folder_name: String,
    parent: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct PutFolderBody {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct FolderQuery {
    id: Option<String>,
    path: Option<String>,
}

/// Body of copy and move requests.
#[derive(Deserialize)]
struct CopyMoveBody {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    destination: String,
    #[serde(default)]
    new_name: Option<String>,
}

async fn handle_create_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PostFolderBody = parse_json(&body, "FOL0001")?;
    let folder = state
        .gateway
        .tree
        .create_folder(&ctx, &request.parent, &request.folder_name, &request.description)
        .await
        .api_by_kind(
            &[(ErrorKind::NameConflict, "FOL0005"), (ErrorKind::NotFound, "FOL0007")],
            "FOL0006",
            "Could not create folder.",
        )?;
    Ok(json_response(StatusCode::CREATED, &folder))
}

async fn handle_get_folder(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> Result<Response, ApiError> {
    let folder = state
        .gateway
        .tree
        .locate_folder(query.id.as_deref(), query.path.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::ValidationFailure, "FOL0023")], "FOL0024", "Could not find folder.")?;
    Ok(json_response(StatusCode::OK, &folder))
}

async fn handle_update_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PutFolderBody = parse_json(&body, "FOL0029")?;
    let folder = state
        .gateway
        .tree
        .update_folder(&ctx, &request.id, request.title.as_deref(), request.description.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FOL0031")], "FOL0030", "Could not update folder.")?;
    Ok(json_response(StatusCode::OK, &folder))
}

async fn handle_delete_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let folder = state
        .gateway
        .tree
        .delete_folder(&ctx, &id)
        .await
        .api("FOL0040", "Could not delete folder.")?;
    Ok(json_response(StatusCode::OK, &folder))
}

async fn handle_list_folder(
    State(state): State<AppState>,
    Query(query): Query<FolderQuery>,
) -> Result<Response, ApiError> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("FOL0025", "Folder id is required."))?;
    let listing = state
        .gateway
        .tree
        .list_folder(&id)
        .await
        .api("FOL0026", "Could not list folder.")?;
    Ok(json_response(StatusCode::OK, &listing))
}

async fn handle_copy_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CopyMoveBody = parse_json(&body, "FOL0044")?;
    let copy = state
        .gateway
        .tree
        .copy_folder(&ctx, &request.id, &request.destination, request.new_name.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FOL0046")], "FOL0045", "Could not copy folder.")?;
    Ok(json_response(StatusCode::ACCEPTED, &copy))
}

async fn handle_move_folder(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CopyMoveBody = parse_json(&body, "FOL0049")?;
    let moved = state
        .gateway
        .tree
        .move_folder(&ctx, &request.id, &request.destination, request.new_name.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FOL0051")], "FOL0050", "Could not move folder.")?;
    Ok(json_response(StatusCode::ACCEPTED, &moved))
}

// -------------------------------------------------------------------------
// Files
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct PutFileBody {
    #[serde(rename = "_id", alias = "id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct InitiateQuery {
    mode: Option<String>,
}

fn part_number(query: &HashMap<String, String>, code: &'static str) -> Result<u32, ApiError> {
    query
        .get("part")
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| ApiError::bad_request(code, "A positive part number is required."))
}

/// JSON bodies initiate an upload; the part count comes from the `total`
/// header.
async fn handle_initiate_upload(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<InitiateQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return Err(ApiError::bad_request("FIL0001", "Unsupported content type."));
    }
    let total = headers
        .get("total")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|t| *t > 0)
        .ok_or_else(|| ApiError::bad_request("FIL0003", "Header 'total' must be a positive integer."))?;
    let upload: NewUpload = parse_json(&body, "FIL0002")?;
    if upload.folder_id.is_empty() {
        return Err(ApiError::bad_request("FIL0010", "Destination folder is required."));
    }
    let mode = match query.mode.as_deref() {
        Some("stream") => TransferMode::Stream,
        _ => TransferMode::Parts,
    };

    let file = state
        .gateway
        .transfer
        .initiate_upload(&ctx, upload, total, mode)
        .await
        .api_by_kind(&[(ErrorKind::NotFound, "FIL0010")], "FIL0004", "Could not initiate upload.")?;
    Ok(json_response(StatusCode::CREATED, &file))
}

async fn handle_upload_part(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let part = part_number(&query, "FIL0011")?;
    let file = state
        .gateway
        .transfer
        .upload_part(&ctx, &id, part, body)
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FIL0013")], "FIL0012", "Could not upload part.")?;
    Ok(json_response(StatusCode::OK, &file))
}

async fn handle_download_part(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let part = part_number(&query, "FIL0020")?;
    let download = state
        .gateway
        .transfer
        .download_part(&id, part)
        .await
        .api("FIL0021", "Could not download part.")?;
    let body = Body::from_stream(download.stream.map_err(std::io::Error::other));
    Ok((
        StatusCode::ACCEPTED,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, download.size.to_string()),
        ],
        body,
    )
        .into_response())
}

async fn handle_file_info(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let info = state
        .gateway
        .transfer
        .file_info(&id)
        .await
        .api("FIL0022", "Could not read file.")?;
    let mut response = json_response(StatusCode::OK, &info.file);
    if let Ok(value) = info.parts.to_string().parse() {
        response.headers_mut().insert("parts", value);
    }
    Ok(response)
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .gateway
        .tree
        .delete_file(&ctx, &id)
        .await
        .api("FIL0030", "Could not delete file.")?;
    Ok(json_response(StatusCode::OK, &file))
}

async fn handle_update_file(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: PutFileBody = parse_json(&body, "FIL0033")?;
    let file = state
        .gateway
        .tree
        .update_file(
            &ctx,
            &request.id,
            request.title.as_deref(),
            request.description.as_deref(),
            request.tags.as_deref(),
        )
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FIL0032")], "FIL0031", "Could not update file.")?;
    Ok(json_response(StatusCode::OK, &file))
}

async fn handle_copy_file(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CopyMoveBody = parse_json(&body, "FIL0042")?;
    let copy = state
        .gateway
        .tree
        .copy_file(&ctx, &request.id, &request.destination, request.new_name.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FIL0041")], "FIL0040", "Could not copy file.")?;
    Ok(json_response(StatusCode::ACCEPTED, &copy))
}

async fn handle_move_file(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CopyMoveBody = parse_json(&body, "FIL0053")?;
    let moved = state
        .gateway
        .tree
        .move_file(&ctx, &request.id, &request.destination, request.new_name.as_deref())
        .await
        .api_by_kind(&[(ErrorKind::NameConflict, "FIL0052")], "FIL0051", "Could not move file.")?;
    Ok(json_response(StatusCode::ACCEPTED, &moved))
}

// -------------------------------------------------------------------------
// Copernicus
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct DatasetRequestBody {
    dataset_name: String,
    #[serde(default)]
    body: Value,
}

#[derive(Serialize)]
struct DatasetView {
    #[serde(flatten)]
    record: TaskRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<File>,
}

fn parse_service(service: &str) -> Result<Service, ApiError> {
    service
        .parse()
        .map_err(|e: crate::GatewayError| ApiError::bad_request("COP0002", "Unknown service.").with_reason(e.to_string()))
}

/// Catalogue calls surface upstream trouble as 503.
fn upstream(code: &'static str, message: &str, err: crate::GatewayError) -> ApiError {
    if err.kind() == ErrorKind::UpstreamFailure {
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "COP0016", message).with_reason(err.to_string())
    } else {
        ApiError::from_gateway(code, message, &err)
    }
}

async fn handle_list_datasets(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Response, ApiError> {
    let service = parse_service(&service)?;
    let datasets = state
        .gateway
        .datasets
        .list_datasets(service)
        .await
        .map_err(|e| upstream("COP0001", "Could not list datasets.", e))?;
    Ok(json_response(StatusCode::ACCEPTED, &datasets))
}

async fn handle_dataset_form(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let service = parse_service(&service)?;
    let form = state
        .gateway
        .datasets
        .dataset_form(service, &id)
        .await
        .map_err(|e| upstream("COP0003", "Could not read dataset form.", e))?;
    Ok(json_response(StatusCode::OK, &form))
}

async fn handle_submit_dataset(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(service): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = parse_service(&service)?;
    let request: DatasetRequestBody = parse_json(&body, "COP0009")?;
    let task = state
        .gateway
        .datasets
        .submit(&ctx, service, &request.dataset_name, request.body)
        .await
        .api("COP0010", "Could not request dataset.")?;
    let status = if task.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok(json_response(
        status,
        &DatasetView {
            record: task.record,
            file: task.file,
        },
    ))
}

async fn handle_dataset_status(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    parse_service(&service)?;
    let task = state
        .gateway
        .datasets
        .status(&id)
        .await
        .api("COP0011", "Could not read dataset request.")?;
    let status = if task.record.task_details.status == TaskStatus::Successful {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok(json_response(
        status,
        &DatasetView {
            record: task.record,
            file: task.file,
        },
    ))
}
