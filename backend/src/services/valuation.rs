//! Valuation and snapshot service
//!
//! Stateless: every figure is an aggregate of the ledger at call time.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{end_of_day, round_cost, MaterialRef, StockPosition, StockSnapshot};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ledger;

/// Maximum number of materials in one stock summary
pub const STOCK_SUMMARY_LIMIT: i64 = 1000;

/// Valuation service
#[derive(Clone)]
pub struct ValuationService {
    db: PgPool,
}

/// One material's stock position for display
#[derive(Debug, Clone, Serialize)]
pub struct StockSummaryRow {
    pub material_item_id: Uuid,
    pub name: String,
    pub spec: Option<String>,
    pub display_name: String,
    pub unit: String,
    pub reference_cost: Decimal,
    pub is_active: bool,
    #[serde(flatten)]
    pub snapshot: StockSnapshot,
}

/// Stock summary response
#[derive(Debug, Clone, Serialize)]
pub struct StockSummary {
    pub rows: Vec<StockSummaryRow>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    id: Uuid,
    name: String,
    spec: Option<String>,
    unit: String,
    reference_cost: Decimal,
    is_active: bool,
}

impl ValuationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Unrounded positions for the requested materials (all when `None`)
    pub async fn positions(
        &self,
        material_ids: Option<&[Uuid]>,
        as_of: Option<NaiveDateTime>,
    ) -> AppResult<HashMap<Uuid, StockPosition>> {
        positions(&self.db, material_ids, as_of).await
    }

    /// Snapshot rows for the catalog; an `as_of` date covers that whole day
    pub async fn stock_summary(
        &self,
        as_of: Option<NaiveDate>,
        include_inactive: bool,
    ) -> AppResult<StockSummary> {
        let materials = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT id, name, spec, unit, reference_cost, is_active
            FROM material_items
            WHERE ($1 OR is_active)
            ORDER BY name, COALESCE(spec, '')
            LIMIT $2
            "#,
        )
        .bind(include_inactive)
        .bind(STOCK_SUMMARY_LIMIT)
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = materials.iter().map(|m| m.id).collect();
        let positions = self.positions(Some(ids.as_slice()), as_of.map(end_of_day)).await?;

        let rows = materials
            .into_iter()
            .map(|m| {
                let material = MaterialRef {
                    id: m.id,
                    name: m.name,
                    spec: m.spec,
                    unit: m.unit,
                    reference_cost: m.reference_cost,
                    is_active: m.is_active,
                };
                let snapshot = positions
                    .get(&material.id)
                    .map(|p| p.snapshot(material.reference_cost))
                    .unwrap_or_else(|| StockSnapshot::empty(material.reference_cost));
                StockSummaryRow {
                    material_item_id: material.id,
                    display_name: material.display_name(),
                    name: material.name,
                    spec: material.spec,
                    unit: material.unit,
                    reference_cost: material.reference_cost,
                    is_active: material.is_active,
                    snapshot,
                }
            })
            .collect();

        Ok(StockSummary { rows, as_of })
    }
}

/// Aggregate positions on any executor, including an open transaction
pub async fn positions<'e, E>(
    executor: E,
    material_ids: Option<&[Uuid]>,
    as_of: Option<NaiveDateTime>,
) -> AppResult<HashMap<Uuid, StockPosition>>
where
    E: PgExecutor<'e>,
{
    let rows = ledger::aggregate(executor, material_ids, as_of).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.material_item_id,
                StockPosition::from_totals(row.qty, row.amount, row.last_txn_at),
            )
        })
        .collect())
}

/// Current position of one material; empty when it has no ledger rows
pub async fn position_of<'e, E>(executor: E, material_item_id: Uuid) -> AppResult<StockPosition>
where
    E: PgExecutor<'e>,
{
    let mut found = positions(executor, Some(std::slice::from_ref(&material_item_id)), None).await?;
    Ok(found.remove(&material_item_id).unwrap_or_default())
}

/// Weighted-average cost used to snapshot a usage record
pub fn usage_cost_basis(position: &StockPosition, reference_cost: Decimal) -> Decimal {
    round_cost(position.average_cost_or(reference_cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn cost_basis_falls_back_when_stock_is_empty() {
        let empty = StockPosition::from_totals(Decimal::ZERO, Decimal::ZERO, None);
        assert_eq!(usage_cost_basis(&empty, dec("12.5")), dec("12.5"));

        let held = StockPosition::from_totals(dec("3"), dec("10"), None);
        assert_eq!(usage_cost_basis(&held, dec("12.5")), dec("3.3333"));
    }

    #[test]
    fn summary_row_flattens_snapshot() {
        let row = StockSummaryRow {
            material_item_id: Uuid::new_v4(),
            name: "Cable".into(),
            spec: None,
            display_name: "Cable".into(),
            unit: "m".into(),
            reference_cost: dec("2"),
            is_active: true,
            snapshot: StockSnapshot::empty(dec("2")),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["qty_on_hand"], "0");
        assert_eq!(json["average_cost"], "2");
        assert!(json["last_txn_at"].is_null());
    }
}
