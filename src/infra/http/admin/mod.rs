mod cache;
mod health;

use axum::{
    Router,
    routing::{get, post},
};

use crate::infra::http::AppState;

pub use health::health;

/// Operator endpoints for inspecting and steering the cache.
pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/cache/stats", get(cache::cache_stats))
        .route("/admin/cache/entry", get(cache::inspect_entry))
        .route("/admin/cache/tags/{tag}", get(cache::keys_for_tag))
        .route("/admin/cache/invalidate", post(cache::invalidate_tags))
        .route("/admin/cache/delete", post(cache::delete_keys))
        .route("/admin/cache/clear", post(cache::clear_cache))
        .route("/admin/cache/sweep", post(cache::sweep_cache))
        .route("/admin/cache/warm", post(cache::warm_cache))
        .with_state(state)
}
