//! Stock ledger persistence
//!
//! The ledger is append-only from the caller's point of view: rows are only
//! written through their owning source document, inside that document's
//! transaction. Each purchase item and each task usage owns at most one row,
//! enforced by the unique back-reference columns.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{material_display_name, LedgerEntry, LedgerPosting, Month, StockTxnType};
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Default and maximum page sizes for the audit listing
pub const DEFAULT_TXN_LIMIT: i64 = 200;
pub const MAX_TXN_LIMIT: i64 = 1000;

/// Stock ledger read service
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// Filters for the audit listing
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub month: Option<Month>,
    pub material_item_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl TransactionFilter {
    /// Requested page size clamped to `[1, MAX_TXN_LIMIT]`
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_TXN_LIMIT).clamp(1, MAX_TXN_LIMIT)
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    material_item_id: Uuid,
    material_name: String,
    material_spec: Option<String>,
    material_unit: String,
    txn_type: String,
    qty_delta: Decimal,
    unit_cost: Decimal,
    amount_delta: Decimal,
    txn_date: NaiveDateTime,
    purchase_item_id: Option<Uuid>,
    task_material_usage_id: Option<Uuid>,
    task_id: Option<Uuid>,
    task_title: Option<String>,
    note: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

/// One ledger row for audit display
#[derive(Debug, Clone, Serialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub material_item_id: Uuid,
    pub display_name: String,
    pub unit: String,
    pub txn_type: StockTxnType,
    pub qty_delta: Decimal,
    pub unit_cost: Decimal,
    pub amount_delta: Decimal,
    pub txn_date: NaiveDateTime,
    pub purchase_item_id: Option<Uuid>,
    pub task_material_usage_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub task_title: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for StockTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        let txn_type = row
            .txn_type
            .parse::<StockTxnType>()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self {
            id: row.id,
            material_item_id: row.material_item_id,
            display_name: material_display_name(&row.material_name, row.material_spec.as_deref()),
            unit: row.material_unit,
            txn_type,
            qty_delta: row.qty_delta,
            unit_cost: row.unit_cost,
            amount_delta: row.amount_delta,
            txn_date: row.txn_date,
            purchase_item_id: row.purchase_item_id,
            task_material_usage_id: row.task_material_usage_id,
            task_id: row.task_id,
            task_title: row.task_title,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Audit listing response
#[derive(Debug, Clone, Serialize)]
pub struct TransactionList {
    pub month: Option<Month>,
    pub rows: Vec<StockTransaction>,
}

#[derive(Debug, FromRow)]
struct EntryRow {
    material_item_id: Uuid,
    txn_type: String,
    qty_delta: Decimal,
    amount_delta: Decimal,
    txn_date: NaiveDateTime,
}

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Raw ledger rows, newest first
    pub async fn list_transactions(&self, filter: TransactionFilter) -> AppResult<TransactionList> {
        let (start, end) = match filter.month {
            Some(month) => (Some(month.start()), Some(month.end())),
            None => (None, None),
        };

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT t.id, t.material_item_id,
                   m.name AS material_name, m.spec AS material_spec, m.unit AS material_unit,
                   t.txn_type, t.qty_delta, t.unit_cost, t.amount_delta, t.txn_date,
                   t.purchase_item_id, t.task_material_usage_id, t.task_id,
                   tk.title AS task_title, t.note, t.created_by, t.created_at
            FROM material_stock_transactions t
            JOIN material_items m ON m.id = t.material_item_id
            LEFT JOIN tasks tk ON tk.id = t.task_id
            WHERE ($1::timestamp IS NULL OR t.txn_date >= $1)
              AND ($2::timestamp IS NULL OR t.txn_date < $2)
              AND ($3::uuid IS NULL OR t.material_item_id = $3)
              AND ($4::uuid IS NULL OR t.task_id = $4)
            ORDER BY t.txn_date DESC, t.created_at DESC
            LIMIT $5
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(filter.material_item_id)
        .bind(filter.task_id)
        .bind(filter.effective_limit())
        .fetch_all(&self.db)
        .await?;

        let rows = rows
            .into_iter()
            .map(StockTransaction::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(TransactionList {
            month: filter.month,
            rows,
        })
    }

    /// Every ledger row dated strictly before `before`, oldest first
    pub async fn entries_before(&self, before: NaiveDateTime) -> AppResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT material_item_id, txn_type, qty_delta, amount_delta, txn_date
            FROM material_stock_transactions
            WHERE txn_date < $1
            ORDER BY txn_date, created_at
            "#,
        )
        .bind(before)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let txn_type = row
                    .txn_type
                    .parse::<StockTxnType>()
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                Ok(LedgerEntry {
                    material_item_id: row.material_item_id,
                    txn_type,
                    qty_delta: row.qty_delta,
                    amount_delta: row.amount_delta,
                    txn_date: row.txn_date,
                })
            })
            .collect()
    }
}

/// Append the ledger row owned by one purchase item
pub async fn insert_purchase_txn(
    conn: &mut PgConnection,
    purchase_item_id: Uuid,
    posting: &LedgerPosting,
    actor_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO material_stock_transactions (
            material_item_id, txn_type, qty_delta, unit_cost, amount_delta, txn_date,
            purchase_item_id, note, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(posting.material_item_id)
    .bind(posting.txn_type.as_str())
    .bind(posting.qty_delta)
    .bind(posting.unit_cost)
    .bind(posting.amount_delta)
    .bind(posting.txn_date)
    .bind(purchase_item_id)
    .bind(&posting.note)
    .bind(actor_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Create or rewrite the single ledger row owned by a usage record
pub async fn upsert_usage_txn(
    conn: &mut PgConnection,
    usage_id: Uuid,
    task_id: Uuid,
    posting: &LedgerPosting,
    actor_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO material_stock_transactions (
            material_item_id, txn_type, qty_delta, unit_cost, amount_delta, txn_date,
            task_material_usage_id, task_id, note, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (task_material_usage_id) DO UPDATE
        SET material_item_id = EXCLUDED.material_item_id,
            txn_type = EXCLUDED.txn_type,
            qty_delta = EXCLUDED.qty_delta,
            unit_cost = EXCLUDED.unit_cost,
            amount_delta = EXCLUDED.amount_delta,
            txn_date = EXCLUDED.txn_date,
            task_id = EXCLUDED.task_id,
            note = EXCLUDED.note
        "#,
    )
    .bind(posting.material_item_id)
    .bind(posting.txn_type.as_str())
    .bind(posting.qty_delta)
    .bind(posting.unit_cost)
    .bind(posting.amount_delta)
    .bind(posting.txn_date)
    .bind(usage_id)
    .bind(task_id)
    .bind(&posting.note)
    .bind(actor_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Remove the ledger row owned by a usage record; returns rows removed
pub async fn delete_usage_txn(conn: &mut PgConnection, usage_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM material_stock_transactions WHERE task_material_usage_id = $1")
        .bind(usage_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Signed totals per material, optionally bounded by `txn_date <= as_of`
#[derive(Debug, FromRow)]
pub struct AggregateRow {
    pub material_item_id: Uuid,
    pub qty: Decimal,
    pub amount: Decimal,
    pub last_txn_at: Option<NaiveDateTime>,
}

pub async fn aggregate<'e, E>(
    executor: E,
    material_ids: Option<&[Uuid]>,
    as_of: Option<NaiveDateTime>,
) -> AppResult<Vec<AggregateRow>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, AggregateRow>(
        r#"
        SELECT material_item_id,
               COALESCE(SUM(qty_delta), 0) AS qty,
               COALESCE(SUM(amount_delta), 0) AS amount,
               MAX(txn_date) AS last_txn_at
        FROM material_stock_transactions
        WHERE ($1::uuid[] IS NULL OR material_item_id = ANY($1))
          AND ($2::timestamp IS NULL OR txn_date <= $2)
        GROUP BY material_item_id
        "#,
    )
    .bind(material_ids)
    .bind(as_of)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let filter = |limit| TransactionFilter {
            limit,
            ..Default::default()
        };
        assert_eq!(filter(None).effective_limit(), 200);
        assert_eq!(filter(Some(0)).effective_limit(), 1);
        assert_eq!(filter(Some(-5)).effective_limit(), 1);
        assert_eq!(filter(Some(5000)).effective_limit(), 1000);
        assert_eq!(filter(Some(50)).effective_limit(), 50);
    }
}
