use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::HttpError;
use crate::state::AppState;

/// Gate applied to every route except `/health` and `/.well-known/*`: only
/// checks that an `Authorization: Bearer ...` header is present (§4.7 —
/// validating the token's contents is explicitly out of scope).
pub async fn require_bearer(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, HttpError> {
    if !has_bearer_token(&headers) {
        return Err(HttpError::unauthorized(&state.resource_metadata_url));
    }
    Ok(next.run(request).await)
}

fn has_bearer_token(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .strip_prefix("Bearer ")
                .map(|token| !token.trim().is_empty())
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_header() {
        assert!(!has_bearer_token(&HeaderMap::new()));
    }

    #[test]
    fn rejects_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer   ".parse().unwrap(),
        );
        assert!(!has_bearer_token(&headers));
    }

    #[test]
    fn accepts_present_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc123".parse().unwrap(),
        );
        assert!(has_bearer_token(&headers));
    }
}
