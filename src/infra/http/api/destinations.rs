//! Destination handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::repos::DestinationFilter;

use super::error::{ApiError, catalog_to_api};
use super::models::{DestinationCreateRequest, DestinationUpdateRequest};
use crate::infra::http::AppState;

pub async fn list_destinations(
    State(state): State<AppState>,
    Query(filter): Query<DestinationFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let destinations = state
        .catalog
        .list_destinations(filter)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(destinations))
}

pub async fn get_destination(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let destination = state
        .catalog
        .get_destination(id)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(destination))
}

pub async fn create_destination(
    State(state): State<AppState>,
    Json(payload): Json<DestinationCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let destination = state
        .catalog
        .create_destination(payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok((StatusCode::CREATED, Json(destination)))
}

pub async fn update_destination(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DestinationUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let destination = state
        .catalog
        .update_destination(id, payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(destination))
}

pub async fn delete_destination(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog
        .delete_destination(id)
        .await
        .map_err(catalog_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
