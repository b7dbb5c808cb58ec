use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use aggmcp_config::{config_path, listen_port, watch_config_file, ActiveSetFile};
use aggmcp_server::{SessionNotifier, SessionSlot, UpstreamServer};
use anyhow::{Context, Result};

use crate::bootstrap::Runtime;

/// Binds the upstream HTTP endpoint, restores the persisted active set, and
/// watches `config.json` for external edits until interrupted.
///
/// Exit codes: `0` on a clean `ctrl_c` shutdown, `2` if the listener can't
/// bind or the persisted active set can't be restored.
pub async fn run() -> Result<i32> {
    let session = Arc::new(SessionSlot::new());
    let notifier = Arc::new(SessionNotifier::new(Arc::clone(&session)));
    let runtime = Runtime::bootstrap(notifier).await?;

    let port = listen_port();
    let bind_addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid bind address");
    let resource_metadata_url = format!("http://127.0.0.1:{port}/.well-known/oauth-protected-resource");
    let keep_server_open = std::env::var("KEEP_SERVER_OPEN").as_deref() == Ok("1");

    let server = UpstreamServer::start(
        bind_addr,
        Arc::clone(&runtime.dispatcher),
        Arc::clone(&session),
        resource_metadata_url,
        keep_server_open,
    )
    .await
    .context("failed to start upstream HTTP endpoint")?;
    tracing::info!(addr = %server.addr, "upstream MCP endpoint listening");

    let last_known = Arc::new(Mutex::new(
        ActiveSetFile::load(&config_path()).unwrap_or_default(),
    ));
    let active_for_watch = Arc::clone(&runtime.active);
    let _watch = watch_config_file(config_path(), last_known, move |_candidate| {
        let active = Arc::clone(&active_for_watch);
        tokio::spawn(async move {
            if let Err(error) = active.reload_from_disk().await {
                tracing::warn!(%error, "config reload failed");
            }
        });
    })
    .context("failed to start config file watcher")?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    server.shutdown().await;
    Ok(0)
}
