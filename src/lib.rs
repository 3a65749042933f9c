pub mod config;
pub mod error;
pub mod handlers;
pub mod intercept;
pub mod logging;
pub mod stream;
pub mod timing;

pub use config::Config;
pub use error::{AppError, LogError};
pub use stream::{LogConfig, Loggers};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub loggers: Loggers,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let routes = Router::new().route("/time-series", get(handlers::time_series));

    instrument(routes, state)
}

/// Attach the not-found fallback, the error interceptor and access logging
/// to a set of routes. Layer order matters: the interceptor runs inside the
/// timing middleware so every failure is already a response when the access
/// record is written.
pub fn instrument(routes: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    routes
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            intercept::intercept_errors,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timing::track_request,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
