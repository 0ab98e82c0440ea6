// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP handlers: a thin adapter between the REST surface and the vault.
//!
//! Request bodies mirror the upstream KV v2 wire shapes. No business logic
//! lives here; every handler builds a cancellation token, calls one facade
//! method, and maps the result into JSON.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

use bastion_vault::{
    CancelToken, InitOptions, InitResult, KvConfig, MetaUpdate, Metadata, MountSpec, Record,
    Response, SealStatus, Vault,
};

use crate::error::ApiResult;

/// Body of `POST /v1/sys/init`.
#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub secret_shares: u8,
    #[serde(default)]
    pub secret_threshold: u8,
}

/// Body of `POST /v1/sys/unseal`.
#[derive(Debug, Deserialize)]
pub struct UnsealRequest {
    pub key: String,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub migrate: bool,
}

/// Body of `POST /v1/sys/mounts/{path}`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateMountRequest {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Body of secret writes: payload plus write options.
#[derive(Debug, Deserialize)]
pub struct WriteSecretRequest {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub options: WriteOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteOptions {
    #[serde(default)]
    pub cas: Option<u64>,
}

/// Body of delete/undelete/destroy by version.
#[derive(Debug, Deserialize)]
pub struct VersionsRequest {
    pub versions: Vec<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<u64>,
}

// ---- sys ----

pub async fn init(
    State(vault): State<Arc<Vault>>,
    Json(req): Json<InitRequest>,
) -> ApiResult<Json<InitResult>> {
    let result = vault.init(
        &CancelToken::new(),
        &InitOptions {
            secret_shares: req.secret_shares,
            secret_threshold: req.secret_threshold,
        },
    )?;
    Ok(Json(result))
}

pub async fn unseal(
    State(vault): State<Arc<Vault>>,
    Json(req): Json<UnsealRequest>,
) -> ApiResult<Json<SealStatus>> {
    // Seal migration is not supported; the field is accepted for
    // compatibility and ignored.
    let _ = req.migrate;
    let status = vault.unseal(&CancelToken::new(), &req.key, req.reset)?;
    Ok(Json(status))
}

pub async fn seal(State(vault): State<Arc<Vault>>) -> ApiResult<StatusCode> {
    vault.seal(&CancelToken::new())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seal_status(State(vault): State<Arc<Vault>>) -> Json<SealStatus> {
    Json(vault.seal_status())
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn list_mounts(State(vault): State<Arc<Vault>>) -> Json<Response<Vec<String>>> {
    Json(Response::sys(vault.mounts()))
}

pub async fn create_mount(
    State(vault): State<Arc<Vault>>,
    Path(path): Path<String>,
    Json(req): Json<CreateMountRequest>,
) -> ApiResult<Json<Response<Value>>> {
    let spec = MountSpec {
        mount_type: req.mount_type,
        config: req.config,
    };
    let response = vault.create_mount(&CancelToken::new(), &path, &spec)?;
    Ok(Json(response))
}

// ---- KV config ----

pub async fn get_config(
    State(vault): State<Arc<Vault>>,
    Path(mount): Path<String>,
) -> ApiResult<Json<Response<KvConfig>>> {
    Ok(Json(vault.get_config(&CancelToken::new(), &mount)?))
}

pub async fn update_config(
    State(vault): State<Arc<Vault>>,
    Path(mount): Path<String>,
    Json(config): Json<KvConfig>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.update_config(
        &CancelToken::new(),
        &mount,
        &config,
    )?))
}

// ---- KV data ----

pub async fn get_secret(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Query(query): Query<VersionQuery>,
) -> ApiResult<Json<Response<Record>>> {
    let ctx = CancelToken::new();
    let response = match query.version {
        Some(version) => vault.get_secret_version(&ctx, &mount, &path, version)?,
        None => vault.get_secret(&ctx, &mount, &path)?,
    };
    Ok(Json(response))
}

pub async fn save_secret(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(req): Json<WriteSecretRequest>,
) -> ApiResult<Json<Response<Record>>> {
    Ok(Json(vault.save_secret(
        &CancelToken::new(),
        &mount,
        &path,
        req.data,
        req.options.cas,
    )?))
}

pub async fn update_secret(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(req): Json<WriteSecretRequest>,
) -> ApiResult<Json<Response<Record>>> {
    Ok(Json(vault.update_secret(
        &CancelToken::new(),
        &mount,
        &path,
        req.data,
    )?))
}

pub async fn delete_secret(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.delete_secret(&CancelToken::new(), &mount, &path)?))
}

pub async fn delete_secret_versions(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(req): Json<VersionsRequest>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.delete_secret_versions(
        &CancelToken::new(),
        &mount,
        &path,
        &req.versions,
    )?))
}

pub async fn undelete_secret_versions(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(req): Json<VersionsRequest>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.undelete_secret_versions(
        &CancelToken::new(),
        &mount,
        &path,
        &req.versions,
    )?))
}

pub async fn destroy_secret_versions(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(req): Json<VersionsRequest>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.destroy_secret_versions(
        &CancelToken::new(),
        &mount,
        &path,
        &req.versions,
    )?))
}

// ---- KV metadata ----

pub async fn get_metadata(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
) -> ApiResult<Json<Response<Metadata>>> {
    Ok(Json(vault.get_metadata(&CancelToken::new(), &mount, &path)?))
}

pub async fn update_metadata(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
    Json(update): Json<MetaUpdate>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.update_metadata(
        &CancelToken::new(),
        &mount,
        &path,
        &update,
    )?))
}

pub async fn delete_metadata(
    State(vault): State<Arc<Vault>>,
    Path((mount, path)): Path<(String, String)>,
) -> ApiResult<Json<Response<Value>>> {
    Ok(Json(vault.delete_metadata(
        &CancelToken::new(),
        &mount,
        &path,
    )?))
}
