//! Input validation for ledger source documents
//!
//! Checks run in a fixed order and stop at the first failing field, so the
//! caller always gets one field-specific message and nothing is written.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::PurchaseLine;
use crate::types::{round_cost, round_qty, Month, MAX_QUANTITY, MAX_UNIT_COST};

/// A validation failure tied to one input field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub message_zh: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, message_zh: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            message_zh: message_zh.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, format!("{} is required", field), format!("{} 為必填欄位", field))
    }

    pub fn must_be_positive(field: &str) -> Self {
        Self::new(field, format!("{} must be > 0", field), format!("{} 必須大於 0", field))
    }

    pub fn must_be_non_negative(field: &str) -> Self {
        Self::new(field, format!("{} must be >= 0", field), format!("{} 不可為負數", field))
    }

    pub fn out_of_range(field: &str) -> Self {
        Self::new(field, format!("{} is out of range", field), format!("{} 超出允許範圍", field))
    }

    pub fn invalid_month(field: &str) -> Self {
        Self::new(field, format!("{} must be YYYY-MM", field), format!("{} 格式須為 YYYY-MM", field))
    }
}

/// One purchase line as submitted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseLineInput {
    pub material_item_id: Option<Uuid>,
    pub quantity: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
}

/// Trimmed, non-empty text
pub fn require_text(value: Option<&str>, field: &str) -> Result<String, FieldError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FieldError::required(field))
}

/// A present quantity, kept to 4 places, strictly positive and storable
pub fn require_quantity(value: Option<Decimal>, field: &str) -> Result<Decimal, FieldError> {
    let value = round_qty(value.ok_or_else(|| FieldError::required(field))?);
    if value <= Decimal::ZERO {
        return Err(FieldError::must_be_positive(field));
    }
    if value >= MAX_QUANTITY {
        return Err(FieldError::out_of_range(field));
    }
    Ok(value)
}

/// A present unit cost, kept to 4 places, non-negative and storable
pub fn require_unit_cost(value: Option<Decimal>, field: &str) -> Result<Decimal, FieldError> {
    let value = round_cost(value.ok_or_else(|| FieldError::required(field))?);
    if value < Decimal::ZERO {
        return Err(FieldError::must_be_non_negative(field));
    }
    if value >= MAX_UNIT_COST {
        return Err(FieldError::out_of_range(field));
    }
    Ok(value)
}

/// Explicit statement month, or the month of the purchase date when blank
pub fn resolve_statement_month(raw: Option<&str>, purchase_date: NaiveDate) -> Result<Month, FieldError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => text
            .parse()
            .map_err(|_| FieldError::invalid_month("statement_month")),
        None => Ok(Month::of(purchase_date)),
    }
}

/// Validate purchase lines in submission order.
///
/// Every line's material is checked first (id present, then known), then
/// every line's quantity (> 0) and unit cost (>= 0). An empty list is
/// rejected before any line is inspected.
pub fn validate_purchase_lines(
    items: &[PurchaseLineInput],
    known_materials: &HashSet<Uuid>,
) -> Result<Vec<PurchaseLine>, FieldError> {
    if items.is_empty() {
        return Err(FieldError::new(
            "items",
            "items is required and must be a non-empty array",
            "items 至少需要一筆品項",
        ));
    }

    let material_ids = items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let id_field = format!("items[{}].material_item_id", idx);
            let material_item_id = item
                .material_item_id
                .ok_or_else(|| FieldError::required(&id_field))?;
            if !known_materials.contains(&material_item_id) {
                return Err(FieldError::new(
                    id_field,
                    format!("Material item not found: {}", material_item_id),
                    format!("找不到材料品項：{}", material_item_id),
                ));
            }
            Ok(material_item_id)
        })
        .collect::<Result<Vec<_>, _>>()?;

    items
        .iter()
        .zip(material_ids)
        .enumerate()
        .map(|(idx, (item, material_item_id))| {
            let qty_field = format!("items[{}].quantity", idx);
            let quantity = require_quantity(item.quantity, &qty_field)?;
            let unit_cost = require_unit_cost(item.unit_cost, &format!("items[{}].unit_cost", idx))?;
            PurchaseLine::new(material_item_id, quantity, unit_cost, idx as i32)
                .map_err(|_| FieldError::out_of_range(&qty_field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(id: Option<Uuid>, qty: Option<&str>, cost: Option<&str>) -> PurchaseLineInput {
        PurchaseLineInput {
            material_item_id: id,
            quantity: qty.map(dec),
            unit_cost: cost.map(dec),
        }
    }

    #[test]
    fn empty_items_rejected() {
        let err = validate_purchase_lines(&[], &HashSet::new()).unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn unknown_material_reported_before_quantity() {
        let known = Uuid::new_v4();
        let items = vec![
            line(Some(known), Some("1"), Some("1")),
            line(Some(Uuid::new_v4()), Some("-1"), Some("1")),
        ];
        let err = validate_purchase_lines(&items, &HashSet::from([known])).unwrap_err();
        assert_eq!(err.field, "items[1].material_item_id");
    }

    #[test]
    fn every_material_is_checked_before_any_quantity() {
        let known = Uuid::new_v4();
        let items = vec![
            line(Some(known), Some("-1"), Some("1")),
            line(Some(Uuid::new_v4()), Some("1"), Some("1")),
        ];
        let err = validate_purchase_lines(&items, &HashSet::from([known])).unwrap_err();
        assert_eq!(err.field, "items[1].material_item_id");

        let items = vec![line(Some(known), Some("1"), Some("1")), line(None, None, None)];
        let err = validate_purchase_lines(&items, &HashSet::from([known])).unwrap_err();
        assert_eq!(err.field, "items[1].material_item_id");
    }

    #[test]
    fn oversized_values_are_field_errors() {
        let known = Uuid::new_v4();
        let set = HashSet::from([known]);

        let huge = line(Some(known), Some("100000000000000000000"), Some("10000000000"));
        let err = validate_purchase_lines(&[huge], &set).unwrap_err();
        assert_eq!(err.field, "items[0].quantity");
        assert_eq!(err.message, "items[0].quantity is out of range");

        let pricey = line(Some(known), Some("1"), Some("10000000000"));
        let err = validate_purchase_lines(&[pricey], &set).unwrap_err();
        assert_eq!(err.field, "items[0].unit_cost");

        let costly_line = line(Some(known), Some("99999999999999"), Some("9999999999"));
        let err = validate_purchase_lines(&[costly_line], &set).unwrap_err();
        assert_eq!(err.field, "items[0].quantity");
    }

    #[test]
    fn quantity_rounding_to_zero_is_not_positive() {
        let known = Uuid::new_v4();
        let err = validate_purchase_lines(&[line(Some(known), Some("0.00001"), Some("1"))], &HashSet::from([known]))
            .unwrap_err();
        assert_eq!(err.message, "items[0].quantity must be > 0");
        assert_eq!(require_quantity(Some(dec("1.00005")), "used_qty").unwrap(), dec("1.0001"));
    }

    #[test]
    fn first_failing_field_wins() {
        let known = Uuid::new_v4();
        let set = HashSet::from([known]);

        let err = validate_purchase_lines(&[line(Some(known), None, Some("1"))], &set).unwrap_err();
        assert_eq!(err.field, "items[0].quantity");
        assert_eq!(err.message, "items[0].quantity is required");

        let err = validate_purchase_lines(&[line(Some(known), Some("0"), Some("-1"))], &set).unwrap_err();
        assert_eq!(err.message, "items[0].quantity must be > 0");

        let err = validate_purchase_lines(&[line(Some(known), Some("2"), Some("-1"))], &set).unwrap_err();
        assert_eq!(err.field, "items[0].unit_cost");
    }

    #[test]
    fn valid_lines_keep_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = vec![line(Some(a), Some("10"), Some("5")), line(Some(b), Some("2"), Some("0"))];
        let lines = validate_purchase_lines(&items, &HashSet::from([a, b])).unwrap();
        assert_eq!(lines[0].amount, dec("50"));
        assert_eq!(lines[1].sort_order, 1);
        assert_eq!(lines[1].amount, Decimal::ZERO);
    }

    #[test]
    fn statement_month_defaults_to_purchase_month() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 31).unwrap();
        assert_eq!(resolve_statement_month(None, date).unwrap().to_string(), "2024-07");
        assert_eq!(resolve_statement_month(Some(" "), date).unwrap().to_string(), "2024-07");
        assert_eq!(resolve_statement_month(Some("2024-08"), date).unwrap().to_string(), "2024-08");
        assert_eq!(
            resolve_statement_month(Some("08/2024"), date).unwrap_err().field,
            "statement_month"
        );
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(require_text(Some("  Acme "), "supplier_name").unwrap(), "Acme");
        assert!(require_text(Some("   "), "supplier_name").is_err());
        assert!(require_text(None, "supplier_name").is_err());
    }
}
