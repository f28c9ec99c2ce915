//! Reporting handlers

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use shared::MonthlyReport;

use super::parse_month;
use crate::error::{AppError, AppResult};
use crate::middleware::{require_manager, CurrentUser};
use crate::services::ReportingService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MonthlyReportQuery {
    pub month: Option<String>,
}

/// Monthly material statement; defaults to the current local month
pub async fn get_monthly_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    WithRejection(Query(query), _): WithRejection<Query<MonthlyReportQuery>, AppError>,
) -> AppResult<Json<MonthlyReport>> {
    require_manager(&current_user.0)?;

    let month = parse_month(query.month.as_deref(), "month")?
        .unwrap_or_else(|| state.config.ledger.current_month());

    let service = ReportingService::new(state.db.clone());
    let report = service.monthly_report(month).await?;
    Ok(Json(report))
}
