use axum::{
    Extension, Json,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use pkg_constants::lease::LOG_ARCHIVE_SUFFIX;
use pkg_constants::network::REQUESTED_BY_HEADER;
use pkg_engine::CreateOutcome;
use pkg_types::lease::LeaseSpec;
use pkg_types::options::LeaseOptions;
use pkg_types::validate::{parse_duration, validate_name};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::{bad_request, error_response};

/// Body of `POST /api/v1/leases`.
#[derive(Debug, Deserialize)]
pub struct CreateLeaseRequest {
    pub region: String,
    #[serde(default)]
    pub options: LeaseOptions,
    #[serde(default)]
    pub extra_args: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Include pins in the listing.
    #[serde(default)]
    pub verbose: bool,
}

/// Body of `POST /api/v1/leases/{name}/extend`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtendRequest {
    /// Duration string, e.g. `30m` or `1h30m`.
    pub duration: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtendResponse {
    pub name: String,
    pub granted_extension_secs: u64,
}

// ============================================================
// Create
// ============================================================

pub async fn create_lease(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(req): Json<CreateLeaseRequest>,
) -> impl IntoResponse {
    let requested_by = headers
        .get(REQUESTED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or(user.name);
    let spec = LeaseSpec {
        region: req.region,
        requested_by,
        options: req.options,
        extra_args: req.extra_args,
    };

    // Run to completion even if the client disconnects, so a created
    // instance is always recorded.
    let manager = state.manager.clone();
    let cancel = state.shutdown.clone();
    let outcome = match tokio::spawn(async move { manager.create(spec, &cancel).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Lease creation task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response();
        }
    };

    match outcome {
        CreateOutcome::FullSuccess(lease) => {
            info!("Created lease {}", lease.name);
            (StatusCode::CREATED, Json(lease)).into_response()
        }
        CreateOutcome::PartialSuccess { lease, error } => {
            warn!("Lease {} created without a cache record: {}", lease.name, error);
            (
                StatusCode::MULTI_STATUS,
                Json(json!({
                    "status": "partial",
                    "lease": lease,
                    "error": "instance is running but could not be recorded; reconcile manually",
                })),
            )
                .into_response()
        }
        CreateOutcome::Failure(e) => error_response(&e),
    }
}

// ============================================================
// Read
// ============================================================

pub async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.manager.list().await {
        Ok(mut leases) => {
            if !query.verbose {
                for view in &mut leases {
                    view.lease.pin = None;
                }
            }
            (StatusCode::OK, Json(leases)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn get_lease(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&name) {
        return bad_request(e);
    }
    match state.manager.metadata(&name).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn reconcile_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.manager.report().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn lease_logs(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&name) {
        return bad_request(e);
    }
    match state.manager.extract_logs(&name, &state.shutdown).await {
        Ok(archive) => {
            let disposition = format!("attachment; filename=\"{}{}\"", name, LOG_ARCHIVE_SUFFIX);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/gzip".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                archive,
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ============================================================
// Mutations
// ============================================================

pub async fn delete_lease(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&name) {
        return bad_request(e);
    }
    match state.manager.delete_on_request(&name, &state.shutdown).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": name }))).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn restart_lease(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&name) {
        return bad_request(e);
    }
    match state.manager.restart(&name).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "restarted": name }))).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn extend_lease(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
    Json(req): Json<ExtendRequest>,
) -> impl IntoResponse {
    if let Err(e) = validate_name(&name) {
        return bad_request(e);
    }
    let requested = match parse_duration(&req.duration) {
        Ok(d) => d,
        Err(e) => return bad_request(e),
    };
    match state.manager.extend(&name, requested).await {
        Ok(total) => (
            StatusCode::OK,
            Json(ExtendResponse {
                name,
                granted_extension_secs: total.as_secs(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
