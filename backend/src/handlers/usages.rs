//! HTTP handlers for material used on tasks
//!
//! Every route is gated by the caller's access to the task, not by role tier.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::usage::{
    CreateUsageInput, TaskMaterialUsage, TaskUsageList, UpdateUsageInput,
};
use crate::services::{TaskAccessService, UsageService};
use crate::AppState;

/// List usage records of a task
pub async fn list_usages(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskUsageList>> {
    TaskAccessService::new(state.db.clone())
        .ensure_access(task_id, &current_user.0)
        .await?;

    let service = UsageService::new(state.db.clone());
    let usages = service.list(task_id).await?;
    Ok(Json(usages))
}

/// Record material used on a task
pub async fn create_usage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(task_id): Path<Uuid>,
    WithRejection(Json(input), _): WithRejection<Json<CreateUsageInput>, AppError>,
) -> AppResult<(StatusCode, Json<TaskMaterialUsage>)> {
    TaskAccessService::new(state.db.clone())
        .ensure_access(task_id, &current_user.0)
        .await?;

    let service = UsageService::new(state.db.clone());
    let usage = service
        .create(
            task_id,
            current_user.0.user_id,
            state.config.ledger.today(),
            input,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(usage)))
}

/// Update a usage record
pub async fn update_usage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((task_id, usage_id)): Path<(Uuid, Uuid)>,
    WithRejection(Json(input), _): WithRejection<Json<UpdateUsageInput>, AppError>,
) -> AppResult<Json<TaskMaterialUsage>> {
    TaskAccessService::new(state.db.clone())
        .ensure_access(task_id, &current_user.0)
        .await?;

    let service = UsageService::new(state.db.clone());
    let usage = service
        .update(task_id, usage_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(usage))
}

/// Delete a usage record and its ledger row
pub async fn delete_usage(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((task_id, usage_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    TaskAccessService::new(state.db.clone())
        .ensure_access(task_id, &current_user.0)
        .await?;

    let service = UsageService::new(state.db.clone());
    service.delete(task_id, usage_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
