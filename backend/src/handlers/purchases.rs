//! HTTP handlers for purchase batches

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use super::parse_month;
use crate::error::{AppError, AppResult};
use crate::middleware::{require_manager, CurrentUser};
use crate::services::purchase::{
    CreatePurchaseInput, PurchaseBatch, PurchaseBatchDetail, PurchaseFilter,
};
use crate::services::PurchaseService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListPurchasesQuery {
    pub month: Option<String>,
    pub supplier: Option<String>,
}

/// List purchase batches
pub async fn list_purchases(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<ListPurchasesQuery>, AppError>,
) -> AppResult<Json<Vec<PurchaseBatch>>> {
    require_manager(&current_user.0)?;

    let filter = PurchaseFilter {
        month: parse_month(query.month.as_deref(), "month")?,
        supplier: query.supplier,
    };

    let service = PurchaseService::new(state.db.clone());
    let batches = service.list(filter).await?;
    Ok(Json(batches))
}

/// Get one purchase batch with its items
pub async fn get_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseBatchDetail>> {
    require_manager(&current_user.0)?;
    let service = PurchaseService::new(state.db.clone());
    let batch = service.get(id).await?;
    Ok(Json(batch))
}

/// Record a purchase batch
pub async fn create_purchase(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Json(input), _): WithRejection<Json<CreatePurchaseInput>, AppError>,
) -> AppResult<(StatusCode, Json<PurchaseBatchDetail>)> {
    require_manager(&current_user.0)?;
    let service = PurchaseService::new(state.db.clone());
    let batch = service
        .create(current_user.0.user_id, state.config.ledger.today(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(batch)))
}
