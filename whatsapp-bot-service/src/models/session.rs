//! Per-customer conversation session.

use crate::models::{Coupon, MenuItem};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dialogue position of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Greeting,
    MainMenu,
    Ordering,
    CheckoutConfirmation,
    ApplyingCoupon,
    GettingName,
    /// A stored value this version does not know; recovered on the next turn.
    Unrecognized(String),
}

impl ConversationState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Greeting => "GREETING",
            Self::MainMenu => "MAIN_MENU",
            Self::Ordering => "ORDERING",
            Self::CheckoutConfirmation => "CHECKOUT_CONFIRMATION",
            Self::ApplyingCoupon => "APPLYING_COUPON",
            Self::GettingName => "GETTING_NAME",
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }

    /// Parse a stored state; never fails.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "GREETING" => Self::Greeting,
            "MAIN_MENU" => Self::MainMenu,
            "ORDERING" => Self::Ordering,
            "CHECKOUT_CONFIRMATION" => Self::CheckoutConfirmation,
            "APPLYING_COUPON" => Self::ApplyingCoupon,
            "GETTING_NAME" => Self::GettingName,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Bounded label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::MainMenu => "main_menu",
            Self::Ordering => "ordering",
            Self::CheckoutConfirmation => "checkout_confirmation",
            Self::ApplyingCoupon => "applying_coupon",
            Self::GettingName => "getting_name",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One distinct menu item in the cart, with name and price frozen at add time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub item_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Conversation record keyed by (customer phone, restaurant).
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSession {
    pub id: Uuid,
    pub customer_phone: String,
    pub restaurant_id: Uuid,
    pub state: ConversationState,
    pub cart: Vec<CartLine>,
    pub customer_name: Option<String>,
    pub applied_coupon: Option<Coupon>,
    pub updated_utc: DateTime<Utc>,
}

impl ConversationSession {
    /// Fresh session for a first-time customer.
    pub fn new(customer_phone: &str, restaurant_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_phone: customer_phone.to_string(),
            restaurant_id,
            state: ConversationState::Greeting,
            cart: Vec::new(),
            customer_name: None,
            applied_coupon: None,
            updated_utc: Utc::now(),
        }
    }

    /// Adds one unit of `item`, merging with an existing line for the same id.
    pub fn add_item(&mut self, item: &MenuItem) {
        match self.cart.iter_mut().find(|line| line.item_id == item.id) {
            Some(line) => line.quantity += 1,
            None => self.cart.push(CartLine {
                item_id: item.id,
                item_name: item.name.clone(),
                unit_price: item.price,
                quantity: 1,
            }),
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.cart.iter().map(CartLine::line_total).sum()
    }

    pub fn discount(&self) -> Decimal {
        self.applied_coupon
            .as_ref()
            .map(|coupon| coupon.discount_for(self.subtotal()))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total(&self) -> Decimal {
        (self.subtotal() - self.discount()).max(Decimal::ZERO)
    }

    /// Empties cart and coupon after an order; the customer name is kept.
    pub fn clear_order(&mut self) {
        self.cart.clear();
        self.applied_coupon = None;
    }

    /// True when the last activity is older than `ttl`.
    pub fn is_idle_longer_than(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.updated_utc) > ttl
    }

    /// Restarts an abandoned conversation from the greeting.
    pub fn restart(&mut self) {
        self.clear_order();
        self.state = ConversationState::Greeting;
    }
}
