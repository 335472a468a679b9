use axum::{
    extract::{Query, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::auth::{AppState, verify_token};

/// Extract and validate JWT from the Authorization header, falling back to a
/// `token` query parameter for WebSocket clients that cannot set headers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&req)
        .or_else(|| query_token(&req))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_token(&state.jwt_secret, &token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .trim();
    let token = match value.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => value,
    };
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(req: &Request) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()?
        .0
        .token
        .filter(|token| !token.is_empty())
}
