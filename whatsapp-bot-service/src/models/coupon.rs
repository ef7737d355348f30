//! Restaurant-scoped discount coupons.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a coupon's `discount_value` is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// Percent of the subtotal, in (0, 100].
    Percentage,
    /// Flat amount, capped at the subtotal.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of an active coupon as seen by a conversation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
}

impl Coupon {
    /// Discount granted on `subtotal`; never negative and never above it.
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let discount = match self.discount_type {
            DiscountType::Fixed => self.discount_value,
            DiscountType::Percentage => (subtotal * self.discount_value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        };

        discount.max(Decimal::ZERO).min(subtotal)
    }
}

/// Codes are stored upper-case; customers may type them any way.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
