use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use pkg_types::validate::format_duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;

/// Engine metadata served by `GET /api/v1/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub endpoint: String,
    pub version: String,
    pub provider: String,
    pub max_concurrent_leases: u32,
    pub max_creations_per_hour: u32,
    pub base_lifetime: String,
    pub max_extension: String,
    pub gc_interval: String,
    pub creations_in_last_hour: usize,
    pub provisioning: usize,
}

/// GET /api/v1/info — engine limits and current admission load.
pub async fn engine_info(State(state): State<AppState>) -> impl IntoResponse {
    info!("Serving engine info request");
    let manager = &state.manager;
    let config = manager.config();
    let admission = manager.admission_state();

    let info = EngineInfo {
        endpoint: format!("http://{}", state.listen_addr),
        version: format!("v{}", env!("CARGO_PKG_VERSION")),
        provider: manager.provider_name().to_string(),
        max_concurrent_leases: config.max_concurrent_leases,
        max_creations_per_hour: config.max_creations_per_hour,
        base_lifetime: format_duration(config.base_lifetime),
        max_extension: format_duration(config.max_extension),
        gc_interval: format_duration(config.gc_interval),
        creations_in_last_hour: admission.creations_in_window(manager.clock().now()),
        provisioning: admission.in_flight(),
    };

    (StatusCode::OK, Json(info)).into_response()
}
