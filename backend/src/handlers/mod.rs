//! HTTP handlers for the material stock ledger

pub mod health;
pub mod materials;
pub mod purchases;
pub mod reporting;
pub mod stock;
pub mod usages;

pub use health::health_check;
pub use materials::{create_material, get_material, list_materials, update_material};
pub use purchases::{create_purchase, get_purchase, list_purchases};
pub use reporting::get_monthly_report;
pub use stock::{get_stock_summary, list_stock_transactions};
pub use usages::{create_usage, delete_usage, list_usages, update_usage};

use chrono::NaiveDate;
use shared::{FieldError, Month};

use crate::error::AppResult;

/// Optional `YYYY-MM` query parameter; blank means absent
pub(crate) fn parse_month(raw: Option<&str>, field: &str) -> AppResult<Option<Month>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => text
            .parse::<Month>()
            .map(Some)
            .map_err(|_| FieldError::invalid_month(field).into()),
        None => Ok(None),
    }
}

/// Optional `YYYY-MM-DD` query parameter; blank means absent
pub(crate) fn parse_date(raw: Option<&str>, field: &str) -> AppResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").map(Some).map_err(|_| {
            FieldError::new(
                field,
                format!("{} must be YYYY-MM-DD", field),
                format!("{} 格式須為 YYYY-MM-DD", field),
            )
            .into()
        }),
        None => Ok(None),
    }
}

/// Query flag: `1`, `true` or `yes` in any case turn it on, anything else is off
pub(crate) fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|v| v.trim().to_ascii_lowercase())
        .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}
