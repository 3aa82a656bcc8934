use std::sync::Arc;

use common::errors::{HeraldError, HeraldErrorKind};
use common::herald_err;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, warn};
use zbus::connection;

use crate::control::ControlServer;
use crate::notify::{DaemonHandle, NotificationDaemon};
use crate::sink::ConsoleSink;

mod config;
mod control;
mod notify;
mod sink;

#[tokio::main]
async fn main() -> Result<(), HeraldError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::load_config()?;

    let (events, _) = broadcast::channel(64);
    let daemon = Arc::new(RwLock::new(NotificationDaemon::new(
        &config,
        Arc::new(ConsoleSink),
        events,
    )));

    let conn = connection::Builder::session()
        .map_err(|e| herald_err!(HeraldErrorKind::BusConnect, e.to_string()))?
        .name(notify::BUS_NAME)
        .map_err(|e| herald_err!(HeraldErrorKind::BusName, e.to_string()))?
        .serve_at(notify::OBJECT_PATH, DaemonHandle::new(Arc::clone(&daemon)))
        .map_err(|e| herald_err!(HeraldErrorKind::BusName, e.to_string()))?
        .build()
        .await
        .map_err(|e| herald_err!(HeraldErrorKind::BusConnect, e.to_string()))?;

    daemon.write().await.set_connection(conn.clone());
    info!(name = notify::BUS_NAME, "notification service registered");

    let control = ControlServer::bind(&config.socket_path, Arc::clone(&daemon))?;

    tokio::select! {
        result = control.serve() => {
            if let Err(e) = result {
                error!(error = %e, "control socket failed");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown requested");
        }
    }

    // Teardown: give the name back and unlink the socket so the next start
    // finds a clean slate.
    if let Err(e) = conn.release_name(notify::BUS_NAME).await {
        warn!(error = %e, "failed to release bus name");
    }
    let _ = std::fs::remove_file(&config.socket_path);

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
