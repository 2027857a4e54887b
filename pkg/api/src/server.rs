use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::auth::auth_middleware;
use crate::handlers::{engine, leases};
use crate::request_id::request_id_middleware;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub token: String,
}

pub fn router(state: AppState) -> Router {
    // Protected API routes
    let api_routes = Router::new()
        .route(
            "/api/v1/leases",
            post(leases::create_lease).get(leases::list_leases),
        )
        .route(
            "/api/v1/leases/{name}",
            get(leases::get_lease).delete(leases::delete_lease),
        )
        .route("/api/v1/leases/{name}/extend", post(leases::extend_lease))
        .route("/api/v1/leases/{name}/restart", post(leases::restart_lease))
        .route("/api/v1/leases/{name}/logs", get(leases::lease_logs))
        .route("/api/v1/reconcile", get(leases::reconcile_report))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/v1/info", get(engine::engine_info))
        .merge(api_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Serve until `state.shutdown` fires.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

pub async fn start_server(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    let state = AppState {
        token: config.token,
        listen_addr: config.addr.to_string(),
        ..state
    };
    serve(listener, state).await?;
    info!("API server stopped");
    Ok(())
}
