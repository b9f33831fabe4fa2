//! HTTP front end: exposes the start-run endpoint as a server-sent-events
//! stream, plus operator stop and a health probe.
mod http;
mod routes;
mod sse;
mod state;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::engine::RunController;
use crate::error::{AppError, AppResult, ServerError};
use crate::shutdown::ShutdownReceiver;

pub use sse::SseSink;

use state::ServerState;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Grace on top of the drain timeout for the last events to be written.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Binds `listen` and serves until a shutdown signal arrives on
/// `shutdown_rx`. Subscribe before spawning anything that may send.
///
/// # Errors
///
/// Returns an error when the address cannot be bound.
pub async fn serve(
    listen: SocketAddr,
    auth_token: Option<String>,
    controller: RunController,
    shutdown_rx: ShutdownReceiver,
) -> AppResult<()> {
    let listener = TcpListener::bind(listen).await.map_err(|err| {
        AppError::server(ServerError::Bind {
            addr: listen.to_string(),
            source: err,
        })
    })?;
    serve_on(listener, auth_token, controller, shutdown_rx).await
}

/// Serves on an already bound listener.
///
/// # Errors
///
/// Returns an error when the listener's local address cannot be read.
pub async fn serve_on(
    listener: TcpListener,
    auth_token: Option<String>,
    controller: RunController,
    mut shutdown_rx: ShutdownReceiver,
) -> AppResult<()> {
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::server(ServerError::Io {
            context: "read listener address",
            source: err,
        })
    })?;
    let drain_budget = controller
        .settings()
        .drain_timeout
        .saturating_add(SHUTDOWN_GRACE);
    let state = Arc::new(ServerState::new(controller, auth_token));
    info!("Listening on http://{}", local_addr);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(result) => result,
                    Err(err) => {
                        warn!("Failed to accept connection: {}", err);
                        continue;
                    }
                };
                tracing::debug!("Connection from {}", peer);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    routes::handle_connection(socket, state).await;
                });
            }
        }
    }

    drop(listener);
    if state.request_stop() {
        info!("Shutting down; waiting for the active run to drain");
        let deadline = tokio::time::Instant::now().checked_add(drain_budget);
        while state.is_running()
            && deadline.is_none_or(|deadline| tokio::time::Instant::now() < deadline)
        {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
    info!("Server stopped");
    Ok(())
}
