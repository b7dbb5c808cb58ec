use anyhow::{Context, Result};
use rmcp::RoleClient;
use rmcp::service::{RunningService, ServiceExt};
use rmcp::transport::TokioChildProcess;

use aggmcp_config::TransportSpec;

/// One live connection to a downstream MCP server.
///
/// Owns exactly one of the three wire transports the catalog can name. The
/// handshake (`initialize` + `initialized`) runs as part of establishing the
/// `RunningService`, so by the time `connect` returns the backend has already
/// accepted the session. Cancelling the stdio variant's service tears down
/// its child process; there is no separate process handle to manage.
pub enum BackendTransport {
    Stdio {
        service: RunningService<RoleClient, ()>,
    },
    Sse {
        service: RunningService<RoleClient, ()>,
    },
    StreamableHttp {
        service: RunningService<RoleClient, ()>,
    },
}

impl BackendTransport {
    /// Establish one connection attempt. Callers that want the connect-retry
    /// policy (3 attempts, 2.5s gap) apply it around this call, not inside it.
    pub async fn connect(spec: &TransportSpec) -> Result<Self> {
        match spec {
            TransportSpec::Command { command, args, env } => Self::spawn_stdio(command, args, env).await,
            TransportSpec::Sse { url, headers } => Self::connect_sse(url, headers).await,
            TransportSpec::StreamableHttp { url, headers } => {
                Self::connect_streamable_http(url, headers).await
            }
        }
    }

    pub fn service(&self) -> &RunningService<RoleClient, ()> {
        match self {
            Self::Stdio { service } => service,
            Self::Sse { service } => service,
            Self::StreamableHttp { service } => service,
        }
    }

    /// Cancel the underlying service. `grace` bounds how long we wait for a
    /// clean shutdown before giving up on it (the eviction teardown sequence
    /// treats a timeout here as "proceed anyway", not as an error).
    pub async fn shutdown(self, grace: std::time::Duration) {
        let service = match self {
            Self::Stdio { service } => service,
            Self::Sse { service } => service,
            Self::StreamableHttp { service } => service,
        };
        if tokio::time::timeout(grace, service.cancel()).await.is_err() {
            tracing::debug!("backend shutdown exceeded grace period");
        }
    }

    async fn spawn_stdio(
        command: &str,
        args: &[String],
        env: &std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd).context("failed to spawn backend process")?;
        let service = ()
            .serve(transport)
            .await
            .context("backend handshake failed over stdio")?;

        Ok(Self::Stdio { service })
    }

    async fn connect_sse(
        url: &str,
        _headers: &std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        use rmcp::transport::sse_client::SseClientTransport;

        let transport = SseClientTransport::start(url.to_string())
            .await
            .with_context(|| format!("failed to open SSE transport to {url}"))?;
        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("backend handshake failed over SSE at {url}"))?;
        Ok(Self::Sse { service })
    }

    async fn connect_streamable_http(
        url: &str,
        _headers: &std::collections::HashMap<String, String>,
    ) -> Result<Self> {
        use rmcp::transport::StreamableHttpClientTransport;

        let transport = StreamableHttpClientTransport::from_uri(url.to_string());
        let service = ()
            .serve(transport)
            .await
            .with_context(|| format!("backend handshake failed over streamable-http at {url}"))?;
        Ok(Self::StreamableHttp { service })
    }
}
