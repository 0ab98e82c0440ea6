// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bastion server binary entry point.

use std::path::Path;
use std::sync::Arc;

use bastion_server::{router, signals, ServerConfig};
use bastion_vault::Vault;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Optional config file as the first argument, environment otherwise.
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(Path::new(&path))?,
        None => ServerConfig::from_env()?,
    };
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "bastion_server={level},bastion_vault={level},tower_http=warn",
                    level = config.log_level
                ))
            }),
        )
        .init();

    // A corrupt sealed-key file is fatal: refuse to start rather than
    // risk re-initializing over an existing vault.
    let vault = Arc::new(Vault::open(
        config.mount_path.clone(),
        config.encryption_method,
    )?);

    let status = vault.seal_status();
    tracing::info!(
        initialized = status.initialized,
        sealed = status.sealed,
        "vault state recovered"
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "bastion server listening");

    axum::serve(listener, router(vault))
        .with_graceful_shutdown(signals::wait_for_shutdown())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}
