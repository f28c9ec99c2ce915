//! Purchase batch service
//!
//! A batch, its items, the reference-cost refresh and one ledger row per item
//! are written in a single transaction. Batches are create-only; corrections
//! go through a new batch.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    batch_total, material_display_name, normalize_text, require_text, resolve_statement_month,
    validate_purchase_lines, BatchSummary, LedgerPosting, Month, PurchaseLineInput,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{catalog, ledger};

/// Maximum number of batches returned by a listing
pub const PURCHASE_LIST_LIMIT: i64 = 200;

/// Purchase batch service
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
}

/// Input for recording a purchase batch
#[derive(Debug, Default, Deserialize)]
pub struct CreatePurchaseInput {
    pub supplier_name: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub statement_month: Option<String>,
    pub note: Option<String>,
    pub items: Option<Vec<PurchaseLineInput>>,
}

/// Listing filters
#[derive(Debug, Clone, Default)]
pub struct PurchaseFilter {
    pub month: Option<Month>,
    pub supplier: Option<String>,
}

/// Batch header with its derived totals
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseBatch {
    pub id: Uuid,
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub statement_month: Option<String>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub total_amount: Decimal,
    pub item_count: i64,
}

impl PurchaseBatch {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            id: self.id,
            supplier_name: self.supplier_name.clone(),
            purchase_date: self.purchase_date,
            statement_month: self.statement_month.clone(),
            total_amount: self.total_amount,
            item_count: self.item_count,
        }
    }
}

#[derive(Debug, FromRow)]
struct PurchaseItemRow {
    id: Uuid,
    material_item_id: Uuid,
    material_name: String,
    material_spec: Option<String>,
    material_unit: String,
    quantity: Decimal,
    unit_cost: Decimal,
    amount: Decimal,
    sort_order: i32,
}

/// One purchase line for display
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseItem {
    pub id: Uuid,
    pub material_item_id: Uuid,
    pub display_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
}

impl From<PurchaseItemRow> for PurchaseItem {
    fn from(row: PurchaseItemRow) -> Self {
        Self {
            display_name: material_display_name(&row.material_name, row.material_spec.as_deref()),
            id: row.id,
            material_item_id: row.material_item_id,
            unit: row.material_unit,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            amount: row.amount,
            sort_order: row.sort_order,
        }
    }
}

/// Batch with its items
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseBatchDetail {
    #[serde(flatten)]
    pub batch: PurchaseBatch,
    pub items: Vec<PurchaseItem>,
}

const BATCH_SELECT: &str = r#"
    SELECT b.id, b.supplier_name, b.purchase_date, b.statement_month, b.note,
           b.created_by, b.created_at,
           COALESCE(SUM(i.amount), 0) AS total_amount,
           COUNT(i.id) AS item_count
    FROM material_purchase_batches b
    LEFT JOIN material_purchase_items i ON i.batch_id = b.id
"#;

impl PurchaseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a purchase batch.
    ///
    /// Validation stops at the first failing field: supplier, then items,
    /// then each line in order, then the statement month. Nothing is written
    /// unless every check passes.
    pub async fn create(
        &self,
        actor_id: Uuid,
        today: NaiveDate,
        input: CreatePurchaseInput,
    ) -> AppResult<PurchaseBatchDetail> {
        let supplier_name = require_text(input.supplier_name.as_deref(), "supplier_name")?;
        let items = input.items.unwrap_or_default();

        let requested: Vec<Uuid> = items.iter().filter_map(|i| i.material_item_id).collect();
        let known: HashSet<Uuid> = if requested.is_empty() {
            HashSet::new()
        } else {
            catalog::existing_ids(&self.db, &requested).await?.into_iter().collect()
        };
        let lines = validate_purchase_lines(&items, &known)?;

        let purchase_date = input.purchase_date.unwrap_or(today);
        let statement_month = resolve_statement_month(input.statement_month.as_deref(), purchase_date)?;
        let note = normalize_text(input.note.as_deref());

        let mut tx = self.db.begin().await?;

        let batch_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO material_purchase_batches (supplier_name, purchase_date, statement_month, note, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&supplier_name)
        .bind(purchase_date)
        .bind(statement_month.to_string())
        .bind(&note)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;

        for line in &lines {
            let item_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO material_purchase_items (batch_id, material_item_id, quantity, unit_cost, amount, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                "#,
            )
            .bind(batch_id)
            .bind(line.material_item_id)
            .bind(line.quantity)
            .bind(line.unit_cost)
            .bind(line.amount)
            .bind(line.sort_order)
            .fetch_one(&mut *tx)
            .await?;

            // Last purchase price becomes the display fallback; free items keep the old one
            if line.unit_cost > Decimal::ZERO {
                sqlx::query("UPDATE material_items SET reference_cost = $2 WHERE id = $1")
                    .bind(line.material_item_id)
                    .bind(line.unit_cost)
                    .execute(&mut *tx)
                    .await?;
            }

            let posting = LedgerPosting::purchase(
                batch_id,
                line.material_item_id,
                line.quantity,
                line.unit_cost,
                line.amount,
                purchase_date,
            );
            ledger::insert_purchase_txn(&mut *tx, item_id, &posting, actor_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            batch_id = %batch_id,
            supplier = %supplier_name,
            items = lines.len(),
            total = %batch_total(&lines),
            "Purchase batch recorded"
        );

        self.get(batch_id).await
    }

    /// Batches newest first, filtered by month and exact supplier name
    pub async fn list(&self, filter: PurchaseFilter) -> AppResult<Vec<PurchaseBatch>> {
        self.query_batches(&filter, Some(PURCHASE_LIST_LIMIT)).await
    }

    /// Every batch attributed to `month`, for reporting
    pub async fn batches_for_month(&self, month: Month) -> AppResult<Vec<BatchSummary>> {
        let filter = PurchaseFilter {
            month: Some(month),
            supplier: None,
        };
        let batches = self.query_batches(&filter, None).await?;
        Ok(batches.iter().map(PurchaseBatch::summary).collect())
    }

    /// One batch with its items in entry order
    pub async fn get(&self, id: Uuid) -> AppResult<PurchaseBatchDetail> {
        let batch = sqlx::query_as::<_, PurchaseBatch>(&format!(
            "{BATCH_SELECT} WHERE b.id = $1 GROUP BY b.id"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase batch".to_string()))?;

        let items = sqlx::query_as::<_, PurchaseItemRow>(
            r#"
            SELECT i.id, i.material_item_id,
                   m.name AS material_name, m.spec AS material_spec, m.unit AS material_unit,
                   i.quantity, i.unit_cost, i.amount, i.sort_order
            FROM material_purchase_items i
            JOIN material_items m ON m.id = i.material_item_id
            WHERE i.batch_id = $1
            ORDER BY i.sort_order, i.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(PurchaseBatchDetail {
            batch,
            items: items.into_iter().map(PurchaseItem::from).collect(),
        })
    }

    /// A batch belongs to a month by its statement month, or by its purchase
    /// date when no statement month was recorded.
    async fn query_batches(
        &self,
        filter: &PurchaseFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<PurchaseBatch>> {
        let (month_key, month_start, month_end) = match filter.month {
            Some(month) => (
                Some(month.to_string()),
                Some(month.first_day()),
                Some(month.next().first_day()),
            ),
            None => (None, None, None),
        };
        let supplier = normalize_text(filter.supplier.as_deref());

        let batches = sqlx::query_as::<_, PurchaseBatch>(&format!(
            r#"
            {BATCH_SELECT}
            WHERE ($1::text IS NULL
                   OR b.statement_month = $1
                   OR (COALESCE(b.statement_month, '') = ''
                       AND b.purchase_date >= $2 AND b.purchase_date < $3))
              AND ($4::text IS NULL OR b.supplier_name = $4)
            GROUP BY b.id
            ORDER BY b.purchase_date DESC, b.created_at DESC
            LIMIT $5
            "#
        ))
        .bind(month_key)
        .bind(month_start)
        .bind(month_end)
        .bind(supplier)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(batches)
    }
}
