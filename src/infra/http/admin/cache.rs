use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheStats;
use crate::infra::cache_warmer::{CacheWarmError, CacheWarmer};
use crate::infra::http::AppState;
use crate::infra::http::api::error::{ApiError, catalog_to_api};

#[derive(Debug, Serialize)]
pub(super) struct StatsView {
    enabled: bool,
    entries: usize,
    in_flight: usize,
    hit_rate: f64,
    #[serde(flatten)]
    counters: CacheStats,
}

#[derive(Debug, Deserialize)]
pub(super) struct EntryQuery {
    key: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TagsRequest {
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct KeysRequest {
    keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct Removed {
    removed: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct TagKeys {
    tag: String,
    keys: Vec<String>,
}

pub(super) async fn cache_stats(State(state): State<AppState>) -> Json<StatsView> {
    Json(StatsView {
        enabled: state.cache.is_enabled(),
        entries: state.cache.entry_count().await,
        in_flight: state.cache.in_flight(),
        hit_rate: state.cache.hit_rate(),
        counters: state.cache.stats(),
    })
}

pub(super) async fn inspect_entry(
    State(state): State<AppState>,
    Query(query): Query<EntryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    match state.cache.inspect(&query.key).await {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::not_found("cache entry not found")),
    }
}

pub(super) async fn keys_for_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Json<TagKeys> {
    let mut keys: Vec<String> = state.cache.keys_for_tag(&tag).await.into_iter().collect();
    keys.sort_unstable();
    Json(TagKeys { tag, keys })
}

pub(super) async fn invalidate_tags(
    State(state): State<AppState>,
    Json(payload): Json<TagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.tags.is_empty() {
        return Err(ApiError::bad_request("at least one tag is required", None));
    }
    let removed = state.cache.invalidate_by_tags(payload.tags.as_slice()).await;
    info!(
        target = "roamly::http::admin",
        tags = ?payload.tags,
        removed,
        "cache invalidated by operator"
    );
    Ok(Json(Removed { removed }))
}

pub(super) async fn delete_keys(
    State(state): State<AppState>,
    Json(payload): Json<KeysRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.keys.is_empty() {
        return Err(ApiError::bad_request("at least one key is required", None));
    }
    let removed = state.cache.delete_many(payload.keys.as_slice()).await;
    Ok(Json(Removed { removed }))
}

pub(super) async fn clear_cache(State(state): State<AppState>) -> Response {
    if state.cache.clear_all().await {
        info!(target = "roamly::http::admin", "cache cleared by operator");
    }
    StatusCode::NO_CONTENT.into_response()
}

pub(super) async fn sweep_cache(State(state): State<AppState>) -> Json<Removed> {
    Json(Removed {
        removed: state.cache.sweep_now().await,
    })
}

pub(super) async fn warm_cache(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let warmer = CacheWarmer::new(state.catalog.clone(), state.cache.clone());
    let report = warmer
        .warm_initial()
        .await
        .map_err(|CacheWarmError::Catalog(err)| catalog_to_api(err))?;
    Ok(Json(report))
}
