//! Bearer-token authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use helpline_shared::Actor;

use super::jwt::JwtManager;
use crate::error::ApiError;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Require a valid actor token; inserts the [`Actor`] as a request extension
pub async fn require_auth(
    State(jwt): State<JwtManager>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;

    let actor: Actor = jwt.authenticate(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        ApiError::InvalidToken
    })?;

    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
