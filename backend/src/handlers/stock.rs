//! HTTP handlers for stock snapshots and the ledger audit listing

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_date, parse_flag, parse_month};
use crate::error::{AppError, AppResult};
use crate::middleware::{require_manager, CurrentUser};
use crate::services::ledger::{TransactionFilter, TransactionList};
use crate::services::valuation::StockSummary;
use crate::services::{LedgerService, ValuationService};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StockSummaryQuery {
    pub as_of: Option<String>,
    pub include_inactive: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub month: Option<String>,
    pub material_item_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Quantity on hand, average cost and stock value per material
pub async fn get_stock_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<StockSummaryQuery>, AppError>,
) -> AppResult<Json<StockSummary>> {
    let as_of = parse_date(query.as_of.as_deref(), "as_of")?;
    let include_inactive = parse_flag(query.include_inactive.as_deref());

    let service = ValuationService::new(state.db.clone());
    let summary = service.stock_summary(as_of, include_inactive).await?;
    Ok(Json(summary))
}

/// Raw ledger rows for audit, newest first
pub async fn list_stock_transactions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<TransactionQuery>, AppError>,
) -> AppResult<Json<TransactionList>> {
    require_manager(&current_user.0)?;

    let filter = TransactionFilter {
        month: parse_month(query.month.as_deref(), "month")?,
        material_item_id: query.material_item_id,
        task_id: query.task_id,
        limit: query.limit,
    };

    let service = LedgerService::new(state.db.clone());
    let transactions = service.list_transactions(filter).await?;
    Ok(Json(transactions))
}
