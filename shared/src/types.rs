//! Common types used across the ledger: calendar months, ledger timestamps
//! and the numeric presentation policy.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Quantities within this distance of zero count as "no stock on hand"
pub const QTY_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// Hour of day at which purchases are posted to the ledger
pub const PURCHASE_TXN_HOUR: u32 = 12;

/// Hour of day at which task usage is posted, so same-day purchases sort first
pub const USAGE_TXN_HOUR: u32 = 18;

/// Exclusive upper bound of a stored quantity (`NUMERIC(18, 4)`)
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0x107A_4000, 0x5AF3, 0, false, 0);

/// Exclusive upper bound of a stored unit cost (`NUMERIC(14, 4)`)
pub const MAX_UNIT_COST: Decimal = Decimal::from_parts(0x540B_E400, 0x2, 0, false, 0);

/// Exclusive upper bound of a stored line amount (`NUMERIC(16, 2)`)
pub const MAX_AMOUNT: Decimal = MAX_QUANTITY;

/// `quantity × unit_cost` does not fit a stored amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount is out of range")]
pub struct AmountOutOfRange;

/// `round(quantity × unit_cost, 2)`, failing instead of overflowing
pub fn line_amount(quantity: Decimal, unit_cost: Decimal) -> Result<Decimal, AmountOutOfRange> {
    let amount = quantity
        .checked_mul(unit_cost)
        .map(round_money)
        .ok_or(AmountOutOfRange)?;
    if amount.abs() >= MAX_AMOUNT {
        return Err(AmountOutOfRange);
    }
    Ok(amount)
}

// ============================================================================
// Rounding (presentation boundary only)
// ============================================================================

/// Round a quantity to 4 decimal places
pub fn round_qty(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a monetary amount to 2 decimal places
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a unit cost to 4 decimal places
pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// True when a quantity is strictly positive beyond the epsilon
pub fn has_stock(qty: Decimal) -> bool {
    qty > QTY_EPSILON
}

/// True when a quantity is zero within the epsilon
pub fn is_effectively_zero(qty: Decimal) -> bool {
    qty.abs() <= QTY_EPSILON
}

// ============================================================================
// Ledger timestamps
// ============================================================================

fn at_hour(day: NaiveDate, hour: u32) -> NaiveDateTime {
    day.and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| day.and_time(NaiveTime::default()))
}

/// Ledger timestamp of a purchase made on `day`
pub fn purchase_txn_at(day: NaiveDate) -> NaiveDateTime {
    at_hour(day, PURCHASE_TXN_HOUR)
}

/// Ledger timestamp of material used on `day`
pub fn usage_txn_at(day: NaiveDate) -> NaiveDateTime {
    at_hour(day, USAGE_TXN_HOUR)
}

/// Last representable instant of `day`, used for "as of date" queries
pub fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_hms_micro_opt(23, 59, 59, 999_999)
        .unwrap_or_else(|| at_hour(day, 23))
}

// ============================================================================
// Calendar month
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("month must be YYYY-MM")]
pub struct MonthParseError;

/// A calendar month such as `2024-03`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }

    /// The month a date falls in
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Inclusive lower bound of the month as a ledger timestamp
    pub fn start(&self) -> NaiveDateTime {
        self.first_day().and_time(NaiveTime::default())
    }

    /// Exclusive upper bound of the month as a ledger timestamp
    pub fn end(&self) -> NaiveDateTime {
        self.next().start()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        Month::of(date) == *self
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start() && at < self.end()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let (Some(year), Some(month), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MonthParseError);
        };
        let year = year.parse::<i32>().map_err(|_| MonthParseError)?;
        let month = month.parse::<u32>().map_err(|_| MonthParseError)?;
        Month::new(year, month).ok_or(MonthParseError)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Deserialize a field so that "absent" and "explicit null" stay distinct.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]` on an
/// `Option<Option<T>>` field: absent → `None`, `null` → `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn column_bounds_match_schema() {
        assert_eq!(MAX_QUANTITY, dec("100000000000000"));
        assert_eq!(MAX_UNIT_COST, dec("10000000000"));
    }

    #[test]
    fn line_amount_rejects_overflow() {
        assert_eq!(line_amount(dec("3"), dec("3.333")), Ok(dec("10.00")));
        assert_eq!(
            line_amount(dec("100000000000000000000"), dec("10000000000")),
            Err(AmountOutOfRange)
        );
        assert_eq!(line_amount(dec("99999999999999"), dec("2")), Err(AmountOutOfRange));
    }

    #[test]
    fn parses_and_formats_months() {
        let month: Month = "2024-3".parse().unwrap();
        assert_eq!(month.to_string(), "2024-03");
        assert_eq!(" 2024-12 ".parse::<Month>().unwrap().next().to_string(), "2025-01");
    }

    #[test]
    fn rejects_malformed_months() {
        for raw in ["", "2024", "2024-13", "2024-00", "2024-01-01", "abcd-ef"] {
            assert_eq!(raw.parse::<Month>(), Err(MonthParseError), "{raw}");
        }
    }

    #[test]
    fn month_bounds_are_half_open() {
        let month: Month = "2024-02".parse().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let next = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(month.contains(purchase_txn_at(start)));
        assert!(month.contains(end_of_day(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())));
        assert!(!month.contains(next.and_time(NaiveTime::default())));
        assert_eq!(month.end(), next.and_time(NaiveTime::default()));
    }

    #[test]
    fn same_day_purchase_orders_before_usage() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(purchase_txn_at(day) < usage_txn_at(day));
        assert!(usage_txn_at(day) < end_of_day(day));
    }

    #[test]
    fn rounding_policy() {
        assert_eq!(round_money(dec("10.005")), dec("10.01"));
        assert_eq!(round_qty(dec("1.23456")), dec("1.2346"));
        assert_eq!(round_cost(dec("6.00004")), dec("6.0000"));
    }

    #[test]
    fn epsilon_comparisons() {
        assert!(!has_stock(dec("0.0000000001")));
        assert!(has_stock(dec("0.0001")));
        assert!(is_effectively_zero(dec("-0.0000000001")));
        assert!(!has_stock(dec("-5")));
    }

    proptest! {
        /// Every instant of a day falls in that day's month, and months tile without gaps
        #[test]
        fn prop_months_tile_the_calendar(offset in 0i64..20_000) {
            let day = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap() + chrono::Duration::days(offset);
            let month = Month::of(day);
            prop_assert!(month.contains(purchase_txn_at(day)));
            prop_assert!(month.contains(end_of_day(day)));
            prop_assert_eq!(month.end(), month.next().start());
            prop_assert_eq!(month.to_string().parse::<Month>(), Ok(month));
        }
    }
}
