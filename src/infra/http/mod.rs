mod admin;
pub mod api;
mod middleware;
mod state;

pub use admin::build_admin_router;
pub use api::build_api_router;
pub use middleware::{RequestContext, X_REQUEST_ID};
pub use state::AppState;

use axum::{Router, middleware as axum_middleware, routing::get};

use middleware::{log_responses, set_request_context};

/// Full application router: catalog API, cache admin and health.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(build_api_router(state.clone()))
        .merge(build_admin_router(state))
        .route("/health", get(admin::health))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
