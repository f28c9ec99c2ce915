//! Stock valuation as a pure fold over the ledger
//!
//! A [`StockPosition`] is the running sum of signed ledger deltas for one
//! material. Positions hold unrounded values; rounding happens only when a
//! [`StockSnapshot`] is produced for display.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LedgerEntry;
use crate::types::{has_stock, round_cost, round_money, round_qty};

/// Unrounded aggregate of one material's ledger rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockPosition {
    pub qty: Decimal,
    pub amount: Decimal,
    pub last_txn_at: Option<NaiveDateTime>,
}

impl StockPosition {
    /// Build a position from already-aggregated sums
    pub fn from_totals(qty: Decimal, amount: Decimal, last_txn_at: Option<NaiveDateTime>) -> Self {
        Self {
            qty,
            amount,
            last_txn_at,
        }
    }

    pub fn apply(&mut self, entry: &LedgerEntry) {
        self.qty += entry.qty_delta;
        self.amount += entry.amount_delta;
        self.last_txn_at = match self.last_txn_at {
            Some(last) if last >= entry.txn_date => Some(last),
            _ => Some(entry.txn_date),
        };
    }

    /// Weighted-average unit cost, or `None` when nothing is on hand
    pub fn average_cost(&self) -> Option<Decimal> {
        if has_stock(self.qty) {
            self.amount.checked_div(self.qty)
        } else {
            None
        }
    }

    pub fn average_cost_or(&self, reference_cost: Decimal) -> Decimal {
        self.average_cost().unwrap_or(reference_cost)
    }

    pub fn snapshot(&self, reference_cost: Decimal) -> StockSnapshot {
        StockSnapshot {
            qty_on_hand: round_qty(self.qty),
            stock_amount: round_money(self.amount),
            average_cost: round_cost(self.average_cost_or(reference_cost)),
            last_txn_at: self.last_txn_at,
        }
    }
}

/// Presentation-rounded stock figures for one material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub qty_on_hand: Decimal,
    pub stock_amount: Decimal,
    pub average_cost: Decimal,
    pub last_txn_at: Option<NaiveDateTime>,
}

impl StockSnapshot {
    /// Snapshot of a material with no ledger history
    pub fn empty(reference_cost: Decimal) -> Self {
        StockPosition::default().snapshot(reference_cost)
    }
}

/// Fold ledger rows into per-material positions, keeping rows with
/// `txn_date <= as_of` (all rows when `as_of` is `None`).
pub fn fold_positions<'a, I>(entries: I, as_of: Option<NaiveDateTime>) -> HashMap<Uuid, StockPosition>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut positions: HashMap<Uuid, StockPosition> = HashMap::new();
    for entry in entries {
        if as_of.is_some_and(|limit| entry.txn_date > limit) {
            continue;
        }
        positions
            .entry(entry.material_item_id)
            .or_default()
            .apply(entry);
    }
    positions
}
