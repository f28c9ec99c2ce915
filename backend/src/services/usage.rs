//! Task material usage service
//!
//! A usage record freezes the unit cost it was recorded at and owns exactly
//! one `task_use` ledger row. Every write re-derives that row through the
//! same upsert, so repeated edits never add rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    double_option, material_display_name, normalize_text, require_quantity, require_unit_cost,
    round_money, FieldError, LedgerPosting, StockPosition, UsageCost, QTY_EPSILON,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{catalog, ledger, valuation};

/// Task material usage service
#[derive(Clone)]
pub struct UsageService {
    db: PgPool,
}

/// Input for recording material used on a task
#[derive(Debug, Default, Deserialize)]
pub struct CreateUsageInput {
    pub material_item_id: Option<Uuid>,
    pub used_qty: Option<Decimal>,
    /// Overrides the weighted-average cost when given
    pub unit_cost_snapshot: Option<Decimal>,
    pub used_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// Partial update of a usage record
///
/// `unit_cost_snapshot: null` re-snapshots the current weighted-average cost;
/// an absent field keeps the stored snapshot.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUsageInput {
    pub material_item_id: Option<Uuid>,
    pub used_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub unit_cost_snapshot: Option<Option<Decimal>>,
    pub used_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub note: Option<Option<String>>,
}

#[derive(Debug, FromRow)]
struct UsageRow {
    id: Uuid,
    task_id: Uuid,
    material_item_id: Uuid,
    material_name: String,
    material_spec: Option<String>,
    material_unit: String,
    used_qty: Decimal,
    unit_cost_snapshot: Decimal,
    total_cost: Decimal,
    used_date: NaiveDate,
    note: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Usage record for display
#[derive(Debug, Clone, Serialize)]
pub struct TaskMaterialUsage {
    pub id: Uuid,
    pub task_id: Uuid,
    pub material_item_id: Uuid,
    pub display_name: String,
    pub unit: String,
    pub used_qty: Decimal,
    pub unit_cost_snapshot: Decimal,
    pub total_cost: Decimal,
    pub used_date: NaiveDate,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UsageRow> for TaskMaterialUsage {
    fn from(row: UsageRow) -> Self {
        Self {
            display_name: material_display_name(&row.material_name, row.material_spec.as_deref()),
            id: row.id,
            task_id: row.task_id,
            material_item_id: row.material_item_id,
            unit: row.material_unit,
            used_qty: row.used_qty,
            unit_cost_snapshot: row.unit_cost_snapshot,
            total_cost: row.total_cost,
            used_date: row.used_date,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Usage listing for one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskUsageList {
    pub task_id: Uuid,
    pub rows: Vec<TaskMaterialUsage>,
    pub total_cost: Decimal,
}

const USAGE_SELECT: &str = r#"
    SELECT u.id, u.task_id, u.material_item_id,
           m.name AS material_name, m.spec AS material_spec, m.unit AS material_unit,
           u.used_qty, u.unit_cost_snapshot, u.total_cost, u.used_date, u.note,
           u.created_by, u.created_at, u.updated_at
    FROM task_material_usages u
    JOIN material_items m ON m.id = u.material_item_id
"#;

impl UsageService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Usage records of a task, newest first, with their summed cost
    pub async fn list(&self, task_id: Uuid) -> AppResult<TaskUsageList> {
        let rows = sqlx::query_as::<_, UsageRow>(&format!(
            "{USAGE_SELECT} WHERE u.task_id = $1 ORDER BY u.used_date DESC, u.created_at DESC"
        ))
        .bind(task_id)
        .fetch_all(&self.db)
        .await?;

        let rows: Vec<TaskMaterialUsage> = rows.into_iter().map(TaskMaterialUsage::from).collect();
        let total_cost = round_money(rows.iter().map(|r| r.total_cost).sum());

        Ok(TaskUsageList {
            task_id,
            rows,
            total_cost,
        })
    }

    /// Record material used on a task.
    ///
    /// Checks run in order: material id present, material exists, quantity
    /// positive, cost override non-negative.
    pub async fn create(
        &self,
        task_id: Uuid,
        actor_id: Uuid,
        today: NaiveDate,
        input: CreateUsageInput,
    ) -> AppResult<TaskMaterialUsage> {
        let material_item_id = input
            .material_item_id
            .ok_or_else(|| FieldError::required("material_item_id"))?;

        let mut tx = self.db.begin().await?;

        let material = catalog::find_by_id(&mut *tx, material_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Material item".to_string()))?;
        let used_qty = require_quantity(input.used_qty, "used_qty")?;
        let cost_override = input
            .unit_cost_snapshot
            .map(|cost| require_unit_cost(Some(cost), "unit_cost_snapshot"))
            .transpose()?;

        let position = valuation::position_of(&mut *tx, material_item_id).await?;
        let unit_cost = cost_override
            .unwrap_or_else(|| valuation::usage_cost_basis(&position, material.reference_cost));
        let cost = usage_cost(used_qty, unit_cost)?;
        let used_date = input.used_date.unwrap_or(today);

        let usage_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO task_material_usages (
                task_id, material_item_id, used_qty, unit_cost_snapshot, total_cost,
                used_date, note, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(task_id)
        .bind(material_item_id)
        .bind(cost.used_qty)
        .bind(cost.unit_cost_snapshot)
        .bind(cost.total_cost)
        .bind(used_date)
        .bind(normalize_text(input.note.as_deref()))
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;

        warn_on_negative_stock(material_item_id, &position, cost.used_qty);
        post_usage(&mut *tx, usage_id, task_id, material_item_id, &cost, used_date, actor_id).await?;
        let usage = fetch_usage(&mut *tx, task_id, usage_id).await?;

        tx.commit().await?;

        tracing::info!(
            usage_id = %usage_id,
            task_id = %task_id,
            material_item_id = %material_item_id,
            used_qty = %cost.used_qty,
            "Task material usage recorded"
        );

        Ok(usage)
    }

    /// Partially update a usage record and re-derive its ledger row
    pub async fn update(
        &self,
        task_id: Uuid,
        usage_id: Uuid,
        actor_id: Uuid,
        input: UpdateUsageInput,
    ) -> AppResult<TaskMaterialUsage> {
        let mut tx = self.db.begin().await?;

        let current = fetch_usage(&mut *tx, task_id, usage_id).await?;

        let material_item_id = input.material_item_id.unwrap_or(current.material_item_id);
        let material = catalog::find_by_id(&mut *tx, material_item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Material item".to_string()))?;
        let used_qty = match input.used_qty {
            Some(qty) => require_quantity(Some(qty), "used_qty")?,
            None => current.used_qty,
        };

        let position = valuation::position_of(&mut *tx, material_item_id).await?;
        let unit_cost = match input.unit_cost_snapshot {
            Some(Some(cost)) => require_unit_cost(Some(cost), "unit_cost_snapshot")?,
            Some(None) => valuation::usage_cost_basis(&position, material.reference_cost),
            None => current.unit_cost_snapshot,
        };
        let cost = usage_cost(used_qty, unit_cost)?;
        let used_date = input.used_date.unwrap_or(current.used_date);
        let note = match input.note {
            Some(note) => normalize_text(note.as_deref()),
            None => current.note,
        };

        sqlx::query(
            r#"
            UPDATE task_material_usages
            SET material_item_id = $3, used_qty = $4, unit_cost_snapshot = $5,
                total_cost = $6, used_date = $7, note = $8
            WHERE id = $1 AND task_id = $2
            "#,
        )
        .bind(usage_id)
        .bind(task_id)
        .bind(material_item_id)
        .bind(cost.used_qty)
        .bind(cost.unit_cost_snapshot)
        .bind(cost.total_cost)
        .bind(used_date)
        .bind(&note)
        .execute(&mut *tx)
        .await?;

        // The position already includes this record's old consumption when the material is unchanged
        let released = if material_item_id == current.material_item_id {
            current.used_qty
        } else {
            Decimal::ZERO
        };
        warn_on_negative_stock(material_item_id, &position, cost.used_qty - released);
        post_usage(&mut *tx, usage_id, task_id, material_item_id, &cost, used_date, actor_id).await?;
        let usage = fetch_usage(&mut *tx, task_id, usage_id).await?;

        tx.commit().await?;

        tracing::info!(usage_id = %usage_id, task_id = %task_id, "Task material usage updated");

        Ok(usage)
    }

    /// Delete a usage record together with its ledger row
    pub async fn delete(&self, task_id: Uuid, usage_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let removed_txns = ledger::delete_usage_txn(&mut *tx, usage_id).await?;

        let result = sqlx::query("DELETE FROM task_material_usages WHERE id = $1 AND task_id = $2")
            .bind(usage_id)
            .bind(task_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the ledger delete
            return Err(AppError::NotFound("Task material usage".to_string()));
        }

        tx.commit().await?;

        tracing::info!(
            usage_id = %usage_id,
            task_id = %task_id,
            ledger_rows = removed_txns,
            "Task material usage deleted"
        );

        Ok(())
    }
}

fn usage_cost(used_qty: Decimal, unit_cost: Decimal) -> Result<UsageCost, FieldError> {
    UsageCost::new(used_qty, unit_cost).map_err(|_| FieldError::out_of_range("used_qty"))
}

async fn fetch_usage(
    conn: &mut PgConnection,
    task_id: Uuid,
    usage_id: Uuid,
) -> AppResult<TaskMaterialUsage> {
    let row = sqlx::query_as::<_, UsageRow>(&format!(
        "{USAGE_SELECT} WHERE u.id = $1 AND u.task_id = $2"
    ))
    .bind(usage_id)
    .bind(task_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Task material usage".to_string()))?;

    Ok(row.into())
}

async fn post_usage(
    conn: &mut PgConnection,
    usage_id: Uuid,
    task_id: Uuid,
    material_item_id: Uuid,
    cost: &UsageCost,
    used_date: NaiveDate,
    actor_id: Uuid,
) -> AppResult<()> {
    let posting = LedgerPosting::task_use(
        task_id,
        material_item_id,
        cost.used_qty,
        cost.unit_cost_snapshot,
        cost.total_cost,
        used_date,
    );
    ledger::upsert_usage_txn(conn, usage_id, task_id, &posting, actor_id).await
}

/// Negative stock is allowed; it is only logged
fn warn_on_negative_stock(material_item_id: Uuid, position: &StockPosition, additional_use: Decimal) {
    let projected = position.qty - additional_use;
    if projected < -QTY_EPSILON {
        tracing::warn!(
            material_item_id = %material_item_id,
            projected_qty = %projected,
            "Usage drives stock on hand below zero"
        );
    }
}
