use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Json, Response, Sse};
use axum::Router;
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use serde_json::{json, Value};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use crate::error::HttpError;
use crate::state::AppState;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "aggmcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(4 * 60);

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/mcp", axum::routing::post(handle_post).get(handle_get).delete(handle_delete))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_bearer,
        ));

    let layers = tower::ServiceBuilder::new()
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    Router::new()
        .merge(gated)
        .route("/health", axum::routing::get(handle_health))
        .route(
            "/.well-known/oauth-protected-resource",
            axum::routing::get(handle_resource_metadata),
        )
        .layer(layers)
        .with_state(state)
}

async fn handle_post(State(state): State<AppState>, body: Bytes) -> Result<Response, HttpError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| HttpError::bad_request(format!("body must be valid JSON: {err}")))?;

    let method = payload
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| HttpError::bad_request("request must include a 'method' field"))?
        .to_string();
    let id = payload.get("id").cloned();
    let params = payload.get("params").cloned().unwrap_or(Value::Null);

    if id.is_none() {
        // Notification: acknowledge and discard (e.g. `notifications/initialized`).
        return Ok(axum::http::StatusCode::ACCEPTED.into_response());
    }

    let result = dispatch_method(&state, &method, params, id.clone()).await?;
    Ok(Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response())
}

async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: Value,
    id: Option<Value>,
) -> Result<Value, HttpError> {
    match method {
        "initialize" => {
            state.session.reset().await;
            Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {"listChanged": true},
                    "prompts": {"listChanged": true},
                    "resources": {"listChanged": true}
                },
                "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION}
            }))
        }
        "tools/list" => {
            require_session(state, id.clone()).await?;
            let tools = state.dispatcher.list_tools().await;
            Ok(json!({"tools": tools}))
        }
        "tools/call" => {
            require_session(state, id.clone()).await?;
            let (name, arguments) = call_params(&params)?;
            let result = state
                .dispatcher
                .call_tool(&name, arguments)
                .await
                .map_err(|err| dispatch_error(id.clone(), &name, err))?;
            serde_json::to_value(result).map_err(|err| HttpError::internal(id, err.to_string()))
        }
        "prompts/list" => {
            require_session(state, id.clone()).await?;
            let prompts = state.dispatcher.list_prompts().await;
            Ok(json!({"prompts": prompts}))
        }
        "prompts/get" => {
            require_session(state, id.clone()).await?;
            let (name, arguments) = call_params(&params)?;
            let result = state
                .dispatcher
                .get_prompt(&name, arguments)
                .await
                .map_err(|err| dispatch_error(id.clone(), &name, err))?;
            serde_json::to_value(result).map_err(|err| HttpError::internal(id, err.to_string()))
        }
        "resources/list" => {
            require_session(state, id.clone()).await?;
            let resources = state.dispatcher.list_resources().await;
            Ok(json!({"resources": resources}))
        }
        "resources/templates/list" => {
            require_session(state, id.clone()).await?;
            let templates = state.dispatcher.list_resource_templates().await;
            Ok(json!({"resource_templates": templates}))
        }
        "resources/read" => {
            require_session(state, id.clone()).await?;
            let uri = params
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| HttpError::bad_request("resources/read requires a 'uri' field"))?
                .to_string();
            let result = state
                .dispatcher
                .read_resource(&uri)
                .await
                .map_err(|err| dispatch_error(id.clone(), &uri, err))?;
            serde_json::to_value(result).map_err(|err| HttpError::internal(id, err.to_string()))
        }
        other => Err(HttpError::method_not_found(id, other)),
    }
}

fn call_params(params: &Value) -> Result<(String, Option<serde_json::Map<String, Value>>), HttpError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| HttpError::bad_request("request requires a 'name' field"))?
        .to_string();
    let arguments = params.get("arguments").and_then(Value::as_object).cloned();
    Ok((name, arguments))
}

fn dispatch_error(id: Option<Value>, subject: &str, err: aggmcp_dispatch::DispatchError) -> HttpError {
    use aggmcp_dispatch::DispatchError;
    match err {
        DispatchError::UnknownTool(_) | DispatchError::UnknownPrompt(_) | DispatchError::UnknownResource(_) => {
            HttpError::method_not_found(id, subject)
        }
        other => HttpError::internal(id, other.to_string()),
    }
}

async fn require_session(state: &AppState, id: Option<Value>) -> Result<(), HttpError> {
    if state.session.current().await.is_some() {
        Ok(())
    } else {
        Err(HttpError::no_active_session(id))
    }
}

async fn handle_get(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    let session = state
        .session
        .current()
        .await
        .ok_or_else(|| HttpError::no_active_session(None))?;

    let stream = BroadcastStream::new(session.subscribe()).filter_map(|item| match item {
        Ok(payload) => Some(Ok(event_for(payload))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Ok(Event::default()
            .event("warning")
            .data(format!("{{\"dropped\":{skipped}}}")))),
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text(": keep-alive"),
    ))
}

fn event_for(payload: Value) -> Event {
    Event::default().data(serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()))
}

async fn handle_delete(State(state): State<AppState>) -> impl IntoResponse {
    if !state.keep_server_open {
        state.session.teardown().await;
    }
    axum::http::StatusCode::NO_CONTENT
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let transport_active = state.session.current().await.is_some();
    Json(json!({
        "status": "ok",
        "transport_active": transport_active,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn handle_resource_metadata(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "resource": state.resource_metadata_url.as_ref(),
        "authorization_servers": Vec::<String>::new(),
    }))
}
