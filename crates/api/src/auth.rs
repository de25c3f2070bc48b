use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::AppState;

/// Reject requests without the configured bearer token. A server started
/// without a token accepts everything.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    if bearer == Some(expected) {
        Ok(next.run(request).await)
    } else {
        warn!(path = %request.uri().path(), "rejecting unauthenticated request");
        Err(StatusCode::UNAUTHORIZED)
    }
}
