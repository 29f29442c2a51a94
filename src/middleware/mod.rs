use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::util::extract_bearer_token;

/// Authenticate administrative requests from a bearer token.
///
/// The key comparison is constant-time; length mismatch short-circuits,
/// which is fine because key length is not secret.
pub async fn admin_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;

    let expected = state.admin_api_key.as_bytes();
    let provided = token.as_bytes();

    if expected.len() != provided.len() || !bool::from(expected.ct_eq(provided)) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
