use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_engine::LeaseError;
use serde_json::json;
use tracing::error;

/// HTTP status for an engine error.
pub fn status_for(e: &LeaseError) -> StatusCode {
    match e {
        LeaseError::RateExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        LeaseError::CapacityExceeded { .. } => StatusCode::CONFLICT,
        LeaseError::NameExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LeaseError::NotFound(_) => StatusCode::NOT_FOUND,
        LeaseError::ExceedsMaxExtension { .. } | LeaseError::InvalidExtension => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LeaseError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        LeaseError::Provider(_) => StatusCode::BAD_GATEWAY,
        LeaseError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// User-facing errors carry their message; everything else is logged and
/// answered opaquely.
pub fn error_response(e: &LeaseError) -> Response {
    let status = status_for(e);
    let message = if e.is_user_facing() {
        e.to_string()
    } else {
        error!("Request failed: {}", e);
        match e {
            LeaseError::Cancelled(_) => "server is shutting down".to_string(),
            _ => "internal error".to_string(),
        }
    };
    (status, Json(json!({ "error": message }))).into_response()
}

/// 400 with `message`, for input rejected before it reaches the engine.
pub fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejections_map_to_client_statuses() {
        assert_eq!(
            status_for(&LeaseError::RateExceeded { limit: 2 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&LeaseError::CapacityExceeded { max: 1 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LeaseError::ExceedsMaxExtension {
                total: Duration::from_secs(10),
                max: Duration::from_secs(5),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&LeaseError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
    }
}
