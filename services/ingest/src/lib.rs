pub mod cache;
pub mod config;
pub mod consumer;
pub mod handlers;
pub mod http;
pub mod hub;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

use state::AppState;

/// Assembles every HTTP/WS route exposed by the ingest service (C9's
/// bootstrap snapshots, C10's bridge, C8's subscriber streams) over the
/// shared [`AppState`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/api/messages", post(http::bridge::receive_message))
        .route("/init/gps", get(http::bootstrap::init_gps))
        .route("/init/sensor", get(http::bootstrap::init_sensor))
        .route("/init/load", get(http::bootstrap::init_load))
        .route("/init/alerts", get(http::bootstrap::init_alerts))
        .route("/ws/gps", get(http::streams::gps_stream))
        .route("/ws/sensor", get(http::streams::sensor_stream))
        .route("/ws/load", get(http::streams::load_stream))
        .route("/ws/alerts", get(http::streams::alerts_stream))
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
