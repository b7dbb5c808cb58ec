use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ReadResourceRequestParam, ReadResourceResult,
};
use tokio::sync::Mutex;

use aggmcp_config::TransportSpec;

use crate::transport::BackendTransport;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_RETRY_GAP: Duration = Duration::from_millis(2_500);
const CALL_RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors surfaced to the Dispatcher. Distinguishes the cases the spec
/// requires different handling for: swallowed-if-optional (`MethodNotFound`),
/// retried-then-surfaced (`ConnectionClosed`), and timeouts.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend transport closed mid-call")]
    ConnectionClosed,
    #[error("backend does not implement this method")]
    MethodNotFound,
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend handshake failed: {0}")]
    HandshakeFailed(#[source] anyhow::Error),
    #[error("backend call failed: {0}")]
    Other(#[source] anyhow::Error),
}

impl BackendError {
    fn classify(err: rmcp::ServiceError) -> Self {
        let message = err.to_string();
        if message.contains("-32601") || message.to_lowercase().contains("method not found") {
            return Self::MethodNotFound;
        }
        if message.contains("-32000")
            || message.to_lowercase().contains("closed")
            || message.to_lowercase().contains("disconnected")
        {
            return Self::ConnectionClosed;
        }
        Self::Other(anyhow::anyhow!(message))
    }
}

/// Wraps a [`BackendTransport`] with the MCP RPC surface and the spec's
/// retry/timeout policy. One instance per active backend.
pub struct BackendClient {
    spec: TransportSpec,
    transport: Mutex<Option<BackendTransport>>,
    call_timeout: Duration,
}

impl BackendClient {
    /// Connect with the initial-handshake retry policy: up to
    /// [`CONNECT_ATTEMPTS`] tries, a fixed gap between them.
    pub async fn connect(spec: TransportSpec) -> Result<Self, BackendError> {
        Self::connect_with_timeout(spec, DEFAULT_CALL_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        spec: TransportSpec,
        call_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match BackendTransport::connect(&spec).await {
                Ok(transport) => {
                    return Ok(Self {
                        spec,
                        transport: Mutex::new(Some(transport)),
                        call_timeout,
                    });
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "backend connect attempt failed");
                    last_err = Some(err);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_RETRY_GAP).await;
                    }
                }
            }
        }
        Err(BackendError::HandshakeFailed(last_err.unwrap_or_else(
            || anyhow::anyhow!("backend connect failed without explicit error"),
        )))
    }

    /// Drives the underlying transport's close-then-hard-kill sequence.
    /// Takes `&self` rather than `self` so it can be called through a shared
    /// `Arc<BackendClient>` while other callers still hold a reference — the
    /// active set manager's eviction path needs exactly this, since the
    /// backend being evicted may still have an in-flight call outstanding.
    /// Idempotent: a second call finds the transport slot already empty.
    pub async fn shutdown(&self) {
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.shutdown(SHUTDOWN_GRACE).await;
        }
    }

    /// Fatal category: errors always propagate, never swallowed.
    pub async fn list_tools(&self) -> Result<ListToolsResult, BackendError> {
        self.with_retry(|transport| async move {
            transport
                .service()
                .list_tools(None::<PaginatedRequestParam>)
                .await
        })
        .await
    }

    pub async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, BackendError> {
        self.with_retry(|transport| {
            let request = request.clone();
            async move { transport.service().call_tool(request).await }
        })
        .await
    }

    /// Optional category: `MethodNotFound` is the caller's signal to exclude
    /// this backend from the aggregate rather than fail the whole fan-out.
    pub async fn list_prompts(&self) -> Result<ListPromptsResult, BackendError> {
        self.with_retry(|transport| async move {
            transport
                .service()
                .list_prompts(None::<PaginatedRequestParam>)
                .await
        })
        .await
    }

    pub async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
    ) -> Result<GetPromptResult, BackendError> {
        self.with_retry(|transport| {
            let request = request.clone();
            async move { transport.service().get_prompt(request).await }
        })
        .await
    }

    pub async fn list_resources(&self) -> Result<ListResourcesResult, BackendError> {
        self.with_retry(|transport| async move {
            transport
                .service()
                .list_resources(None::<PaginatedRequestParam>)
                .await
        })
        .await
    }

    pub async fn list_resource_templates(
        &self,
    ) -> Result<ListResourceTemplatesResult, BackendError> {
        self.with_retry(|transport| async move {
            transport
                .service()
                .list_resource_templates(None::<PaginatedRequestParam>)
                .await
        })
        .await
    }

    pub async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<ReadResourceResult, BackendError> {
        self.with_retry(|transport| {
            let request = request.clone();
            async move { transport.service().read_resource(request).await }
        })
        .await
    }

    /// Runs `op` under the per-call timeout; on a connection-closed error,
    /// reconnects the underlying transport and retries up to twice with
    /// linear backoff. All other errors (including timeouts) surface at once.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, BackendError>
    where
        F: Fn(&BackendTransport) -> Fut,
        Fut: std::future::Future<Output = Result<T, rmcp::ServiceError>>,
    {
        let mut attempt = 0usize;
        loop {
            let result = {
                let guard = self.transport.lock().await;
                let Some(transport) = guard.as_ref() else {
                    return Err(BackendError::ConnectionClosed);
                };
                tokio::time::timeout(self.call_timeout, op(transport)).await
            };

            match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    let classified = BackendError::classify(err);
                    if matches!(classified, BackendError::ConnectionClosed) && attempt < CALL_RETRY_BACKOFF.len()
                    {
                        tracing::warn!(attempt, "backend connection closed, reconnecting");
                        if let Err(reconnect_err) = self.reconnect().await {
                            return Err(reconnect_err);
                        }
                        tokio::time::sleep(CALL_RETRY_BACKOFF[attempt]).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(classified);
                }
                Err(_) => return Err(BackendError::Timeout(self.call_timeout)),
            }
        }
    }

    async fn reconnect(&self) -> Result<(), BackendError> {
        let new_transport = BackendTransport::connect(&self.spec).await.map_err(|err| {
            BackendError::HandshakeFailed(err.context("reconnect after connection-closed failed"))
        })?;
        let mut guard = self.transport.lock().await;
        let old = guard.replace(new_transport);
        drop(guard);
        if let Some(old) = old {
            old.shutdown(Duration::from_millis(0)).await;
        }
        Ok(())
    }

    pub fn transport_label(&self) -> &'static str {
        self.spec.label()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use anyhow::Result;
    use serde_json::json;

    use super::*;

    fn write_mock_server(dir: &std::path::Path) -> Result<std::path::PathBuf> {
        let path = dir.join("mock-mcp.sh");
        fs::write(
            &path,
            r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id"[ ]*:[ ]*\([^,}]*\).*/\1/p')
  case "$line" in
    *\"initialize\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock","version":"0.1.0"}}}\n' "$id"
      ;;
    *\"notifications/initialized\"*)
      ;;
    *\"tools/list\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo_tool","description":"echo","inputSchema":{"type":"object","properties":{}}}]}}\n' "$id"
      ;;
    *\"tools/call\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}]}}\n' "$id"
      ;;
    *\"prompts/list\"*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id"
      ;;
  esac
done
"#,
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms)?;
        }

        Ok(path)
    }

    #[tokio::test]
    async fn tools_round_trip_against_mock_backend() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = write_mock_server(dir.path())?;

        let client = BackendClient::connect(TransportSpec::Command {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().into_owned()],
            env: HashMap::new(),
        })
        .await?;

        let tools = client.list_tools().await?;
        assert_eq!(tools.tools[0].name.as_ref(), "echo_tool");

        let result = client
            .call_tool(CallToolRequestParam {
                name: "echo_tool".into(),
                arguments: json!({"value": "ping"}).as_object().cloned(),
            })
            .await?;
        assert_eq!(
            result.content[0].as_text().map(|t| t.text.as_str()),
            Some("pong")
        );

        client.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn method_not_found_is_reported_distinctly() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = write_mock_server(dir.path())?;

        let client = BackendClient::connect(TransportSpec::Command {
            command: "sh".to_string(),
            args: vec![script.to_string_lossy().into_owned()],
            env: HashMap::new(),
        })
        .await?;

        let err = client.list_prompts().await.unwrap_err();
        assert!(matches!(err, BackendError::MethodNotFound));

        client.shutdown().await;
        Ok(())
    }

    #[test]
    fn classifies_connection_closed_message() {
        assert!(matches!(
            BackendError::classify_message_for_test("transport connection closed"),
            BackendError::ConnectionClosed
        ));
        assert!(matches!(
            BackendError::classify_message_for_test("Method not found (-32601)"),
            BackendError::MethodNotFound
        ));
    }

    impl BackendError {
        fn classify_message_for_test(message: &str) -> Self {
            if message.contains("-32601") || message.to_lowercase().contains("method not found") {
                return Self::MethodNotFound;
            }
            if message.contains("-32000")
                || message.to_lowercase().contains("closed")
                || message.to_lowercase().contains("disconnected")
            {
                return Self::ConnectionClosed;
            }
            Self::Other(anyhow::anyhow!(message.to_string()))
        }
    }
}
