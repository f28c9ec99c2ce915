//! Purchase batch models

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{line_amount, round_cost, round_qty, AmountOutOfRange, Month};

/// Supplier label for batches recorded without a supplier name
pub const UNSPECIFIED_SUPPLIER: &str = "未指定材料行";

/// A validated purchase line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub material_item_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// `round(quantity × unit_cost, 2)`
    pub amount: Decimal,
    pub sort_order: i32,
}

impl PurchaseLine {
    /// Quantity and cost are kept at the precision they are stored with, so
    /// the ledger row and the purchase item agree.
    pub fn new(
        material_item_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
        sort_order: i32,
    ) -> Result<Self, AmountOutOfRange> {
        let quantity = round_qty(quantity);
        let unit_cost = round_cost(unit_cost);
        Ok(Self {
            material_item_id,
            quantity,
            unit_cost,
            amount: line_amount(quantity, unit_cost)?,
            sort_order,
        })
    }
}

/// Batch total is the sum of its line amounts
pub fn batch_total(lines: &[PurchaseLine]) -> Decimal {
    lines.iter().map(|line| line.amount).sum()
}

/// One purchase batch with its document-level totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: Uuid,
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub statement_month: Option<String>,
    pub total_amount: Decimal,
    pub item_count: i64,
}

impl BatchSummary {
    /// A batch belongs to the statement month it was filed under; batches with
    /// a blank statement month fall back to their purchase date.
    pub fn belongs_to(&self, month: Month) -> bool {
        match self.statement_month.as_deref().map(str::trim) {
            Some(statement) if !statement.is_empty() => statement == month.to_string(),
            _ => month.contains_date(self.purchase_date),
        }
    }

    /// Supplier name used for grouping
    pub fn supplier_label(&self) -> &str {
        let name = self.supplier_name.trim();
        if name.is_empty() {
            UNSPECIFIED_SUPPLIER
        } else {
            name
        }
    }
}
