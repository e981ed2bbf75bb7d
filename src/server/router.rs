use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, doctors, health, patients};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware
/// - Health check endpoint
/// - Doctor registration and OTP verification
/// - The chat endpoint and the patient/history endpoints backing the UI
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state);
    Router::new()
        .route("/health", get(health::health))
        .route("/register", post(doctors::register))
        .route("/verify-otp", post(doctors::verify_otp))
        .route("/chat", post(chat::chat))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::add_patient),
        )
        .route("/history", get(patients::history))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let configured = &state.config.server.cors_allowed_origins;

    // The UI is served separately; with no configured origins the server
    // stays open to any, the way the original deployment ran.
    let allow_origin = if configured.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            configured
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
