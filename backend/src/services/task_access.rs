//! Task access checks
//!
//! Tasks belong to the surrounding task module; the ledger only reads them
//! to decide whether the acting user may record usage against one.

use shared::TaskAssignment;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;

/// Task access service
#[derive(Clone)]
pub struct TaskAccessService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    assigned_to_id: Option<Uuid>,
    assigned_by_id: Option<Uuid>,
}

impl TaskAccessService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Fail with 404 when the task is unknown and 403 when it is not accessible
    pub async fn ensure_access(&self, task_id: Uuid, user: &AuthUser) -> AppResult<()> {
        let task = sqlx::query_as::<_, TaskRow>(
            "SELECT assigned_to_id, assigned_by_id FROM tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Task".to_string()))?;

        let assignee_ids =
            sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM task_assignees WHERE task_id = $1")
                .bind(task_id)
                .fetch_all(&self.db)
                .await?;

        let assignment = TaskAssignment {
            assigned_to_id: task.assigned_to_id,
            assigned_by_id: task.assigned_by_id,
            assignee_ids,
        };

        if !assignment.is_accessible_by(user.role, user.user_id) {
            tracing::debug!(task_id = %task_id, user_id = %user.user_id, "Task access denied");
            return Err(AppError::TaskAccessDenied);
        }

        Ok(())
    }
}
