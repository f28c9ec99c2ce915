//! Task material usage models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{line_amount, round_cost, round_qty, AmountOutOfRange};

/// Quantity and frozen cost of one usage record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageCost {
    pub used_qty: Decimal,
    /// Unit cost captured when the usage was recorded; later purchases do not move it
    pub unit_cost_snapshot: Decimal,
    pub total_cost: Decimal,
}

impl UsageCost {
    pub fn new(used_qty: Decimal, unit_cost: Decimal) -> Result<Self, AmountOutOfRange> {
        let used_qty = round_qty(used_qty);
        let unit_cost_snapshot = round_cost(unit_cost);
        Ok(Self {
            used_qty,
            unit_cost_snapshot,
            total_cost: line_amount(used_qty, unit_cost_snapshot)?,
        })
    }
}
