use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use state::AppState;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod credentials;
pub mod entity;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod token;

pub use axum;
pub use sea_orm;

pub fn construct_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health::health))
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/predict", post(routes::predict::predict))
        .route("/save_scan", post(routes::scans::save_scan))
        .route("/get_scans/{email}", get(routes::scans::get_scans))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
}
