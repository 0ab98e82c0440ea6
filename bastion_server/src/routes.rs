// SPDX-License-Identifier: MIT OR Apache-2.0
//! Router assembly for the vault REST API.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use bastion_vault::Vault;

use crate::handlers;

/// Maximum request body size (4MB); secret payloads are small.
const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Build the full API router.
pub fn router(vault: Arc<Vault>) -> Router {
    Router::new()
        // seal lifecycle
        .route("/v1/sys/init", post(handlers::init))
        .route("/v1/sys/unseal", post(handlers::unseal))
        .route("/v1/sys/seal", post(handlers::seal))
        .route("/v1/sys/seal-status", get(handlers::seal_status))
        .route("/v1/sys/health", get(handlers::health))
        // mounts
        .route("/v1/sys/mounts", get(handlers::list_mounts))
        .route("/v1/sys/mounts/{*path}", post(handlers::create_mount))
        // per-mount engine config
        .route(
            "/v1/{mount}/config",
            get(handlers::get_config).post(handlers::update_config),
        )
        // secret data
        .route(
            "/v1/{mount}/data/{*path}",
            get(handlers::get_secret)
                .post(handlers::save_secret)
                .put(handlers::update_secret)
                .delete(handlers::delete_secret),
        )
        .route(
            "/v1/{mount}/delete/{*path}",
            post(handlers::delete_secret_versions),
        )
        .route(
            "/v1/{mount}/undelete/{*path}",
            post(handlers::undelete_secret_versions),
        )
        .route(
            "/v1/{mount}/destroy/{*path}",
            post(handlers::destroy_secret_versions),
        )
        // secret metadata
        .route(
            "/v1/{mount}/metadata/{*path}",
            get(handlers::get_metadata)
                .post(handlers::update_metadata)
                .delete(handlers::delete_metadata),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(vault)
}
