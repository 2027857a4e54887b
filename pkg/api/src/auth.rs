use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

/// Information about the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub name: String,
}

/// Middleware: authenticates the request using a Bearer token checked
/// against the server's shared token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim()
        .to_string();

    if token != state.token {
        warn!("Invalid Bearer token provided");
        return Err(StatusCode::UNAUTHORIZED);
    }
    req.extensions_mut().insert(AuthUser {
        name: "operator".to_string(),
    });
    Ok(next.run(req).await)
}
