//! Material catalog models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::round_cost;

/// Unit label used when none is given
pub const DEFAULT_UNIT: &str = "個";

/// The catalog fields valuation and reporting need for display and fallback cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRef {
    pub id: Uuid,
    pub name: String,
    pub spec: Option<String>,
    pub unit: String,
    /// Last purchase price; display fallback when no stock is on hand
    pub reference_cost: Decimal,
    pub is_active: bool,
}

impl MaterialRef {
    pub fn display_name(&self) -> String {
        material_display_name(&self.name, self.spec.as_deref())
    }
}

/// `"name (spec)"`, or just the name when there is no spec
pub fn material_display_name(name: &str, spec: Option<&str>) -> String {
    match spec {
        Some(spec) if !spec.is_empty() => format!("{} ({})", name, spec),
        _ => name.to_string(),
    }
}

/// Trim a free-text field, mapping blank to `None`
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Trimmed unit label, falling back to [`DEFAULT_UNIT`]
pub fn normalize_unit(value: Option<&str>) -> String {
    normalize_text(value).unwrap_or_else(|| DEFAULT_UNIT.to_string())
}

/// Reference costs are clamped at zero and kept to 4 decimal places
pub fn normalize_reference_cost(value: Decimal) -> Decimal {
    round_cost(value.max(Decimal::ZERO))
}
