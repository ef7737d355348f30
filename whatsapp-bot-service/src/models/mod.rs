//! Domain models for whatsapp-bot-service.

mod coupon;
mod order;
mod restaurant;
mod session;

pub use coupon::{normalize_code, Coupon, DiscountType};
pub use order::{NewOrder, OrderLine, OrderStatus, OrderTotals};
pub use restaurant::{best_menu_match, MenuItem, Restaurant};
pub use session::{CartLine, ConversationSession, ConversationState};
