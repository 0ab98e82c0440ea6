// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP daemon around the bastion vault engine.
//!
//! The server is pure glue: configuration loading, a REST surface over the
//! vault facade, logging, and graceful shutdown. All vault semantics live in
//! `bastion_vault`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod signals;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, ServerError};
pub use routes::router;
