//! Travel package handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::repos::PackageFilter;

use super::error::{ApiError, catalog_to_api};
use super::models::{PackageCreateRequest, PackageUpdateRequest};
use crate::infra::http::AppState;

pub async fn list_packages(
    State(state): State<AppState>,
    Query(filter): Query<PackageFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let packages = state
        .catalog
        .list_packages(filter)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(packages))
}

pub async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let package = state
        .catalog
        .get_package(id)
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(package))
}

pub async fn create_package(
    State(state): State<AppState>,
    Json(payload): Json<PackageCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let package = state
        .catalog
        .create_package(payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn update_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PackageUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let package = state
        .catalog
        .update_package(id, payload.into())
        .await
        .map_err(catalog_to_api)?;
    Ok(Json(package))
}

pub async fn delete_package(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .catalog
        .delete_package(id)
        .await
        .map_err(catalog_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}
