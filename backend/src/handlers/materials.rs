//! HTTP handlers for the material catalog

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use super::parse_flag;
use crate::error::{AppError, AppResult};
use crate::middleware::{require_manager, CurrentUser};
use crate::services::catalog::{CreateMaterialInput, MaterialItem, UpdateMaterialInput};
use crate::services::CatalogService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListMaterialsQuery {
    pub include_inactive: Option<String>,
}

/// List catalog items
pub async fn list_materials(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<ListMaterialsQuery>, AppError>,
) -> AppResult<Json<Vec<MaterialItem>>> {
    let service = CatalogService::new(state.db.clone());
    let items = service.list(parse_flag(query.include_inactive.as_deref())).await?;
    Ok(Json(items))
}

/// Get one catalog item
pub async fn get_material(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MaterialItem>> {
    let service = CatalogService::new(state.db.clone());
    let item = service.get(id).await?;
    Ok(Json(item))
}

/// Create a catalog item
pub async fn create_material(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): WithRejection<Json<CreateMaterialInput>, AppError>,
) -> AppResult<(StatusCode, Json<MaterialItem>)> {
    require_manager(&current_user.0)?;
    let service = CatalogService::new(state.db.clone());
    let item = service.create(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Update a catalog item
pub async fn update_material(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
    WithRejection(Json(input), _): WithRejection<Json<UpdateMaterialInput>, AppError>,
) -> AppResult<Json<MaterialItem>> {
    require_manager(&current_user.0)?;
    let service = CatalogService::new(state.db.clone());
    let item = service.update(id, input).await?;
    Ok(Json(item))
}
