//! Orders produced when a conversation reaches checkout.

use crate::models::ConversationSession;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status at creation; later transitions belong to the kitchen dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
        }
    }
}

/// Immutable line snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_item_id: Uuid,
    pub item_name: String,
    pub quantity: u32,
    pub price_per_item: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Order header plus lines, ready to persist as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub restaurant_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub coupon_code: Option<String>,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub status: OrderStatus,
}

impl NewOrder {
    /// Builds the order from the session's cart and coupon.
    pub fn from_session(session: &ConversationSession, customer_name: &str) -> Self {
        let lines = session
            .cart
            .iter()
            .map(|line| OrderLine {
                menu_item_id: line.item_id,
                item_name: line.item_name.clone(),
                quantity: line.quantity,
                price_per_item: line.unit_price,
            })
            .collect();

        Self {
            restaurant_id: session.restaurant_id,
            customer_name: customer_name.to_string(),
            customer_phone: session.customer_phone.clone(),
            coupon_code: session.applied_coupon.as_ref().map(|c| c.code.clone()),
            lines,
            totals: OrderTotals {
                subtotal: session.subtotal(),
                discount: session.discount(),
                total: session.total(),
            },
            status: OrderStatus::Pending,
        }
    }
}
