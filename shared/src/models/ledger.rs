//! Stock ledger models
//!
//! Every stock-affecting event is one signed ledger row. Quantity and value on
//! hand are never stored; they are folds over these rows.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{purchase_txn_at, usage_txn_at};

/// Kind of ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockTxnType {
    Purchase,
    TaskUse,
    Adjustment,
}

impl StockTxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockTxnType::Purchase => "purchase",
            StockTxnType::TaskUse => "task_use",
            StockTxnType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for StockTxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transaction type: {0}")]
pub struct UnknownTxnType(pub String);

impl FromStr for StockTxnType {
    type Err = UnknownTxnType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(StockTxnType::Purchase),
            "task_use" => Ok(StockTxnType::TaskUse),
            "adjustment" => Ok(StockTxnType::Adjustment),
            other => Err(UnknownTxnType(other.to_string())),
        }
    }
}

/// A ledger row reduced to the fields the aggregations read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub material_item_id: Uuid,
    pub txn_type: StockTxnType,
    pub qty_delta: Decimal,
    pub amount_delta: Decimal,
    pub txn_date: NaiveDateTime,
}

/// The ledger row a source document owns, before it is written
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPosting {
    pub material_item_id: Uuid,
    pub txn_type: StockTxnType,
    pub qty_delta: Decimal,
    pub unit_cost: Decimal,
    pub amount_delta: Decimal,
    pub txn_date: NaiveDateTime,
    pub note: String,
}

impl LedgerPosting {
    /// Stock received on a purchase line: positive quantity and amount
    pub fn purchase(
        batch_id: Uuid,
        material_item_id: Uuid,
        quantity: Decimal,
        unit_cost: Decimal,
        amount: Decimal,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            material_item_id,
            txn_type: StockTxnType::Purchase,
            qty_delta: quantity,
            unit_cost,
            amount_delta: amount,
            txn_date: purchase_txn_at(purchase_date),
            note: format!("Purchase batch #{}", batch_id),
        }
    }

    /// Stock consumed on a task: negative quantity and amount
    pub fn task_use(
        task_id: Uuid,
        material_item_id: Uuid,
        used_qty: Decimal,
        unit_cost_snapshot: Decimal,
        total_cost: Decimal,
        used_date: NaiveDate,
    ) -> Self {
        Self {
            material_item_id,
            txn_type: StockTxnType::TaskUse,
            qty_delta: -used_qty,
            unit_cost: unit_cost_snapshot,
            amount_delta: -total_cost,
            txn_date: usage_txn_at(used_date),
            note: format!("Task #{} material usage", task_id),
        }
    }

    pub fn entry(&self) -> LedgerEntry {
        LedgerEntry {
            material_item_id: self.material_item_id,
            txn_type: self.txn_type,
            qty_delta: self.qty_delta,
            amount_delta: self.amount_delta,
            txn_date: self.txn_date,
        }
    }
}
