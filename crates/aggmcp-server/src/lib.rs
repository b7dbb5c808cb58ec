mod auth;
mod error;
mod handlers;
mod session;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use aggmcp_dispatch::Dispatcher;
use tokio_util::sync::CancellationToken;

pub use error::HttpError;
pub use session::{Session, SessionNotifier, SessionSlot};
pub use state::AppState;

/// Runs the upstream HTTP endpoint until `shutdown` is cancelled.
///
/// Grounded on the teacher's `HttpEndpoint::start`/`axum::serve(..).with_graceful_shutdown`
/// pattern, adapted to a plain TCP bind address instead of a control-socket pairing.
pub struct UpstreamServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl UpstreamServer {
    pub async fn start(
        bind_addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        session: Arc<session::SessionSlot>,
        resource_metadata_url: impl Into<String>,
        keep_server_open: bool,
    ) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind upstream HTTP endpoint at {bind_addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to resolve local upstream HTTP address")?;

        let app_state = AppState::new(dispatcher, session, resource_metadata_url.into(), keep_server_open);
        let app = handlers::router(app_state);

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                })
                .await
            {
                tracing::warn!(error = %error, "upstream HTTP server stopped with error");
            }
        });

        Ok(Self {
            addr: local_addr,
            shutdown,
            task,
        })
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.task.await {
            tracing::debug!(error = %error, "upstream HTTP server join failed");
        }
    }
}
