use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Error surfaced from an HTTP handler. Renders as the JSON-RPC envelope
/// shape the spec requires rather than a bare HTTP error body, since every
/// route here speaks JSON-RPC even when the transport-level response is an
/// HTTP error.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub rpc_code: i64,
    pub message: String,
    pub id: Option<Value>,
    pub www_authenticate: Option<String>,
}

impl HttpError {
    pub fn unauthorized(resource_metadata_url: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            rpc_code: -32001,
            message: "missing or invalid bearer credentials".to_string(),
            id: None,
            www_authenticate: Some(format!(
                "Bearer resource_metadata=\"{resource_metadata_url}\""
            )),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            rpc_code: -32600,
            message: message.into(),
            id: None,
            www_authenticate: None,
        }
    }

    pub fn no_active_session(id: Option<Value>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            rpc_code: -32600,
            message: "no active session; call initialize first".to_string(),
            id,
            www_authenticate: None,
        }
    }

    pub fn method_not_found(id: Option<Value>, subject: &str) -> Self {
        Self {
            status: StatusCode::OK,
            rpc_code: -32601,
            message: format!("unknown method or route target '{subject}'"),
            id,
            www_authenticate: None,
        }
    }

    pub fn internal(id: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            rpc_code: -32603,
            message: message.into(),
            id,
            www_authenticate: None,
        }
    }
}

#[derive(Serialize)]
struct RpcErrorBody {
    jsonrpc: &'static str,
    id: Value,
    error: RpcErrorPayload,
}

#[derive(Serialize)]
struct RpcErrorPayload {
    code: i64,
    message: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = RpcErrorBody {
            jsonrpc: "2.0",
            id: self.id.unwrap_or(Value::Null),
            error: RpcErrorPayload {
                code: self.rpc_code,
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(challenge) = self.www_authenticate {
            if let Ok(value) = axum::http::HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(axum::http::header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}
