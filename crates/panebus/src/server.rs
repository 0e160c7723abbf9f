//! Daemon entry: bind the loopback listener and serve until signalled.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{AppState, create_router};
use crate::config::{AppConfig, AppPaths};
use crate::db::Database;
use crate::pid::PidGuard;
use crate::terminal::{PaneDriver, SubprocessDriver};

/// Run the daemon until SIGINT/SIGTERM.
///
/// The PID file is held for exactly this scope; every exit path, including
/// a failed bind, releases it.
pub async fn serve(config: &AppConfig, paths: &AppPaths) -> Result<()> {
    let db_path = paths.db_path(config)?;
    info!(path = %db_path.display(), "opening database");
    let db = Database::new(&db_path).await?;

    let _pid = PidGuard::acquire(&paths.pid_file())?;

    let driver: Arc<dyn PaneDriver> = Arc::new(SubprocessDriver::new());
    let state = AppState::new(&db, driver);
    let monitor_task = state.monitor.spawn();
    let app = create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await.map_err(|err| {
        if err.kind() == ErrorKind::AddrInUse {
            anyhow!(
                "port {} already in use; another daemon may be running, \
                 or set PANEBUS_PORT to pick a different port",
                config.port
            )
        } else {
            anyhow!(err).context(format!("binding {addr}"))
        }
    })?;

    info!("panebus daemon listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    monitor_task.abort();
    info!("panebus daemon shut down");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
