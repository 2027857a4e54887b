pub mod auth;
pub mod error;
pub mod handlers;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_engine::{CancelSignal, LeaseManager};

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LeaseManager>,
    pub token: String,
    pub listen_addr: String,
    /// Fires on server shutdown; aborts in-flight provider calls.
    pub shutdown: CancelSignal,
}
