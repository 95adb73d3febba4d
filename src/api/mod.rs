mod admin;
pub mod auth;
mod documents;
pub mod error;
pub mod metrics;
mod rides;
mod validation;
mod wallet;
mod ws;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/token", post(auth::token))
        .route("/me", get(auth::me));

    // Role checks live in the extractors and services
    let ride_routes = Router::new()
        .route("/", post(rides::create_ride))
        .route("/my", get(rides::my_rides))
        .route("/pending", get(rides::pending_rides))
        .route("/:id", get(rides::get_ride))
        .route("/:id/accept", post(rides::accept_ride))
        .route("/:id/complete", post(rides::complete_ride))
        .route("/:id/cancel", post(rides::cancel_ride))
        .route("/:id/rate", post(rides::rate_ride));

    let wallet_routes = Router::new()
        .route("/me", get(wallet::my_wallet))
        .route("/topup", post(wallet::topup))
        .route("/transactions", get(wallet::transactions));

    let admin_routes = Router::new()
        .route("/overview", get(admin::overview))
        .route("/heatmap", get(admin::heatmap))
        .route("/heatmap/surge", get(admin::surge))
        .route("/users", get(admin::users));

    // Sockets authenticate through `?token=` when configured to
    let ws_routes = Router::new()
        .route("/driver/:driver_key", get(ws::driver_ws))
        .route("/rider/:rider_key", get(ws::rider_ws));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .route("/drivers/upload-document", post(documents::upload_document))
        .nest("/auth", auth_routes)
        .nest("/rides", ride_routes)
        .nest("/wallet", wallet_routes)
        .nest("/admin", admin_routes)
        .nest("/ws", ws_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ridehail backend running" }))
}

async fn health_check() -> &'static str {
    "OK"
}
