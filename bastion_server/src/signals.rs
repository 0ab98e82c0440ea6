// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unix signal handling for graceful shutdown.

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be registered, which only happens when
/// the process is out of resources at startup.
#[cfg(unix)]
pub async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }
}

/// Wait for Ctrl-C on non-Unix platforms.
#[cfg(not(unix))]
pub async fn wait_for_shutdown() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received Ctrl-C, shutting down");
    }
}
