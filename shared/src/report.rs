//! Monthly stock statement
//!
//! One pass over the ledger rows dated before the month end sorts each row
//! into opening, in-month movement and closing buckets per material. Closing
//! is accumulated from the same rows, so `closing = opening + purchased − used
//! + adjusted` holds by construction.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BatchSummary, LedgerEntry, MaterialRef, StockTxnType};
use crate::types::{round_cost, round_money, round_qty, Month};
use crate::valuation::StockPosition;

/// Quantity and amount moved in one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Movement {
    pub qty: Decimal,
    pub amount: Decimal,
}

impl Movement {
    fn add(&mut self, qty: Decimal, amount: Decimal) {
        self.qty += qty;
        self.amount += amount;
    }
}

/// Unrounded monthly buckets for one material
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialMonth {
    pub opening: Movement,
    pub purchased: Movement,
    /// Magnitudes of task usage (positive numbers)
    pub used: Movement,
    /// Signed in-month adjustments
    pub adjusted: Movement,
    pub closing: Movement,
}

impl MaterialMonth {
    /// Average cost of the closing stock, falling back to the reference cost
    pub fn closing_average_cost(&self, reference_cost: Decimal) -> Decimal {
        StockPosition::from_totals(self.closing.qty, self.closing.amount, None)
            .average_cost_or(reference_cost)
    }
}

/// Accumulates ledger rows into monthly buckets
#[derive(Debug, Clone)]
pub struct MonthlyLedger {
    month: Month,
    materials: HashMap<Uuid, MaterialMonth>,
}

impl MonthlyLedger {
    pub fn new(month: Month) -> Self {
        Self {
            month,
            materials: HashMap::new(),
        }
    }

    pub fn month(&self) -> Month {
        self.month
    }

    /// Record one ledger row; rows at or after the month end are ignored
    pub fn record(&mut self, entry: &LedgerEntry) {
        let (start, end) = (self.month.start(), self.month.end());
        if entry.txn_date >= end {
            return;
        }
        let buckets = self.materials.entry(entry.material_item_id).or_default();

        if entry.txn_date < start {
            buckets.opening.add(entry.qty_delta, entry.amount_delta);
        } else {
            match entry.txn_type {
                StockTxnType::Purchase => buckets.purchased.add(entry.qty_delta, entry.amount_delta),
                StockTxnType::TaskUse => buckets
                    .used
                    .add(entry.qty_delta.abs(), entry.amount_delta.abs()),
                StockTxnType::Adjustment => buckets.adjusted.add(entry.qty_delta, entry.amount_delta),
            }
        }
        buckets.closing.add(entry.qty_delta, entry.amount_delta);
    }

    pub fn record_all<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        for entry in entries {
            self.record(entry);
        }
    }

    /// Buckets for a material; all zero when it had no rows
    pub fn material(&self, material_item_id: Uuid) -> MaterialMonth {
        self.materials
            .get(&material_item_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Per-material statement line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialMonthlyRow {
    pub material_item_id: Uuid,
    pub display_name: String,
    pub name: String,
    pub spec: Option<String>,
    pub unit: String,
    pub opening_qty: Decimal,
    pub opening_amount: Decimal,
    pub purchased_qty: Decimal,
    pub purchase_amount: Decimal,
    pub used_qty: Decimal,
    pub used_amount: Decimal,
    pub adjusted_qty: Decimal,
    pub adjusted_amount: Decimal,
    pub closing_qty: Decimal,
    pub closing_amount: Decimal,
    pub average_cost: Decimal,
}

impl MaterialMonthlyRow {
    pub fn new(material: &MaterialRef, month: &MaterialMonth) -> Self {
        Self {
            material_item_id: material.id,
            display_name: material.display_name(),
            name: material.name.clone(),
            spec: material.spec.clone(),
            unit: material.unit.clone(),
            opening_qty: round_qty(month.opening.qty),
            opening_amount: round_money(month.opening.amount),
            purchased_qty: round_qty(month.purchased.qty),
            purchase_amount: round_money(month.purchased.amount),
            used_qty: round_qty(month.used.qty),
            used_amount: round_money(month.used.amount),
            adjusted_qty: round_qty(month.adjusted.qty),
            adjusted_amount: round_money(month.adjusted.amount),
            closing_qty: round_qty(month.closing.qty),
            closing_amount: round_money(month.closing.amount),
            average_cost: round_cost(month.closing_average_cost(material.reference_cost)),
        }
    }
}

/// Purchases grouped by supplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRow {
    pub supplier_name: String,
    pub batch_count: i64,
    pub total_amount: Decimal,
}

/// One purchase batch as listed in the statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseBatchRow {
    pub id: Uuid,
    pub supplier_name: String,
    pub purchase_date: NaiveDate,
    pub statement_month: Option<String>,
    pub total_amount: Decimal,
    pub item_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub month: Month,
    pub purchase_total_amount: Decimal,
    pub usage_total_amount: Decimal,
    pub opening_stock_amount: Decimal,
    pub closing_stock_amount: Decimal,
    pub material_item_count: usize,
    pub supplier_count: usize,
    pub purchase_batch_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub summary: MonthlySummary,
    pub materials: Vec<MaterialMonthlyRow>,
    pub suppliers: Vec<SupplierRow>,
    pub purchase_batches: Vec<PurchaseBatchRow>,
}

/// Group batches by supplier, largest total first, ties by name
pub fn supplier_rollup<'a, I>(batches: I) -> Vec<SupplierRow>
where
    I: IntoIterator<Item = &'a BatchSummary>,
{
    let mut grouped: BTreeMap<String, (i64, Decimal)> = BTreeMap::new();
    for batch in batches {
        let row = grouped.entry(batch.supplier_label().to_string()).or_default();
        row.0 += 1;
        row.1 += batch.total_amount;
    }

    let mut rows: Vec<SupplierRow> = grouped
        .into_iter()
        .map(|(supplier_name, (batch_count, total))| SupplierRow {
            supplier_name,
            batch_count,
            total_amount: round_money(total),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_amount
            .cmp(&a.total_amount)
            .then_with(|| a.supplier_name.cmp(&b.supplier_name))
    });
    rows
}

/// Assemble the statement for `month`.
///
/// `materials` is the catalog in display order, `entries` every ledger row
/// dated before the month end, `batches` the candidate purchase batches.
/// Batches not belonging to the month are skipped.
pub fn build_monthly_report<'a, I>(
    month: Month,
    materials: &[MaterialRef],
    entries: I,
    batches: &[BatchSummary],
) -> MonthlyReport
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut ledger = MonthlyLedger::new(month);
    ledger.record_all(entries);

    let material_rows: Vec<MaterialMonthlyRow> = materials
        .iter()
        .map(|material| MaterialMonthlyRow::new(material, &ledger.material(material.id)))
        .collect();

    let in_month: Vec<&BatchSummary> = batches.iter().filter(|b| b.belongs_to(month)).collect();
    let suppliers = supplier_rollup(in_month.iter().copied());
    let purchase_batches: Vec<PurchaseBatchRow> = in_month
        .iter()
        .map(|batch| PurchaseBatchRow {
            id: batch.id,
            supplier_name: batch.supplier_label().to_string(),
            purchase_date: batch.purchase_date,
            statement_month: batch.statement_month.clone(),
            total_amount: round_money(batch.total_amount),
            item_count: batch.item_count,
        })
        .collect();

    let sum = |f: fn(&MaterialMonthlyRow) -> Decimal| -> Decimal {
        round_money(material_rows.iter().map(f).sum())
    };

    let summary = MonthlySummary {
        month,
        purchase_total_amount: sum(|r| r.purchase_amount),
        usage_total_amount: sum(|r| r.used_amount),
        opening_stock_amount: sum(|r| r.opening_amount),
        closing_stock_amount: sum(|r| r.closing_amount),
        material_item_count: material_rows.len(),
        supplier_count: suppliers.len(),
        purchase_batch_count: purchase_batches.len(),
    };

    MonthlyReport {
        summary,
        materials: material_rows,
        suppliers,
        purchase_batches,
    }
}
