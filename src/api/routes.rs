/*
 * Responsibility
 * - URL layout: /health and the authentication handler
 * - the handler path comes from configuration (APP_HANDLER_PATH)
 */
use axum::{Router, routing::get};

use crate::api::handlers::{app::app, health::health};
use crate::state::AppState;

pub fn routes(app_handler_path: &str) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(app_handler_path, get(app).post(app).head(app))
}
