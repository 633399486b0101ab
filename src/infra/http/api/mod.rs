pub mod destinations;
pub mod error;
pub mod models;
pub mod packages;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::cache::{
    ResponseCachePolicy, ResponseCacheState, keys::TAG_HTTP, response_cache_layer,
};
use crate::infra::http::AppState;

/// Catalog routes. Reads are served through the response cache; writes pass
/// through it and invalidate by tag in the catalog service.
pub fn build_api_router(state: AppState) -> Router {
    let policy = ResponseCachePolicy::new()
        .with_tag(TAG_HTTP)
        .with_max_body_bytes(state.cache.config().max_body_bytes);
    let cache_state = ResponseCacheState::new(state.cache.clone(), policy);

    Router::new()
        .route(
            "/api/v1/destinations",
            get(destinations::list_destinations).post(destinations::create_destination),
        )
        .route(
            "/api/v1/destinations/{id}",
            get(destinations::get_destination)
                .patch(destinations::update_destination)
                .delete(destinations::delete_destination),
        )
        .route(
            "/api/v1/packages",
            get(packages::list_packages).post(packages::create_package),
        )
        .route(
            "/api/v1/packages/{id}",
            get(packages::get_package)
                .patch(packages::update_package)
                .delete(packages::delete_package),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
}
